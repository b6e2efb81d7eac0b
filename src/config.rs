//! Assistant Configuration
//!
//! Reads completion-service credentials and pipeline limits from the
//! environment (after `.env` has been loaded by the binary).

use crate::error::{AssistantError, Result};
use std::path::PathBuf;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";

/// Which chat-completions flavour to talk to
#[derive(Debug, Clone, PartialEq)]
pub enum LlmProvider {
    OpenAi {
        base_url: String,
        model: String,
    },
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// SQL statements executed per question, corrections included
    pub max_attempts: u8,
    /// Previous Q/A exchanges replayed to SQL generation
    pub history_exchanges: usize,
    /// Previous interactions summarized for data analysis
    pub context_interactions: usize,
    /// Rows shown in the analysis text table
    pub table_preview_rows: usize,
    /// Rows shown in the analysis JSON excerpt
    pub json_excerpt_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            history_exchanges: 3,
            context_interactions: 2,
            table_preview_rows: 20,
            json_excerpt_rows: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistantConfig {
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub database_path: Option<PathBuf>,
}

impl AssistantConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let azure = (
            get("AZURE_OPENAI_ENDPOINT"),
            get("AZURE_OPENAI_API_KEY"),
            get("AZURE_OPENAI_DEPLOYMENT"),
        );

        let llm = match azure {
            (Some(endpoint), Some(api_key), Some(deployment)) => {
                // Portal URLs often carry the full deployment path
                let endpoint = match endpoint.find("/openai/") {
                    Some(idx) => endpoint[..idx].to_string(),
                    None => endpoint.trim_end_matches('/').to_string(),
                };
                LlmConfig {
                    provider: LlmProvider::Azure {
                        endpoint,
                        deployment,
                        api_version: get("AZURE_OPENAI_API_VERSION")
                            .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
                    },
                    api_key,
                    temperature: 0.1,
                    max_tokens: 1500,
                }
            }
            _ => {
                let api_key = get("OPENAI_API_KEY").ok_or_else(|| {
                    AssistantError::Config(
                        "No completion service credentials: set OPENAI_API_KEY or the AZURE_OPENAI_* variables"
                            .to_string(),
                    )
                })?;
                LlmConfig {
                    provider: LlmProvider::OpenAi {
                        base_url: get("OPENAI_BASE_URL")
                            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                        model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                    },
                    api_key,
                    temperature: 0.1,
                    max_tokens: 1500,
                }
            }
        };

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            max_attempts: parse_number(get("MEDDATA_MAX_ATTEMPTS"), "MEDDATA_MAX_ATTEMPTS", defaults.max_attempts)?
                .max(1),
            history_exchanges: parse_number(
                get("MEDDATA_HISTORY_EXCHANGES"),
                "MEDDATA_HISTORY_EXCHANGES",
                defaults.history_exchanges,
            )?,
            context_interactions: parse_number(
                get("MEDDATA_CONTEXT_INTERACTIONS"),
                "MEDDATA_CONTEXT_INTERACTIONS",
                defaults.context_interactions,
            )?,
            ..defaults
        };

        Ok(Self {
            llm,
            pipeline,
            database_path: get("MEDDATA_DB_PATH").map(PathBuf::from),
        })
    }
}

fn parse_number<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(value) => value
            .parse::<T>()
            .map_err(|_| AssistantError::Config(format!("{} must be a number, got '{}'", key, value))),
        None => Ok(default),
    }
}
