//! Intent Classifier
//!
//! Heuristic scorer deciding whether a question needs the ontology database.
//! Pure function of the question text: lower-case it, look for indicator
//! phrases, then score keyword, medical-term and retrieval-pattern hits.
//!
//! Multi-word or hyphenated terms match as substrings. Single words match as
//! the prefix of a word token, so "tests" hits "test" but "show" never hits
//! "how" and "latest" never hits "test".

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryIntent {
    SqlRequired,
    SqlPreferred,
    KnowledgeBase,
    Clarification,
    MedicalLookup,
}

impl QueryIntent {
    fn base_likelihood(&self) -> f64 {
        match self {
            QueryIntent::SqlRequired => 1.0,
            QueryIntent::SqlPreferred => 0.7,
            QueryIntent::MedicalLookup => 0.8,
            QueryIntent::KnowledgeBase => 0.2,
            QueryIntent::Clarification => 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Comparative,
    Aggregation,
    Retrieval,
    Relationship,
    Definition,
    General,
}

/// Which pipeline answers the question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Generate and run SQL, then analyze the rows
    SqlThenAnalysis,
    /// Answer from general knowledge only
    KnowledgeOnly,
}

/// Preferred shape of the final answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    StructuredData,
    NaturalLanguage,
    ComparisonTable,
    SummaryStatistics,
    RelationshipDiagram,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub intent: QueryIntent,
    pub sql_likelihood: f64,
    pub complexity: Complexity,
    pub confidence: f64,
    pub needs_verification: bool,
    pub should_use_sql: bool,
    pub has_medical_codes: bool,
    pub medical_concepts: Vec<String>,
    pub query_type: QueryType,
}

impl RoutingDecision {
    pub fn route(&self) -> Route {
        if self.should_use_sql {
            Route::SqlThenAnalysis
        } else {
            Route::KnowledgeOnly
        }
    }

    pub fn response_format(&self) -> ResponseFormat {
        match self.query_type {
            QueryType::Comparative => ResponseFormat::ComparisonTable,
            QueryType::Aggregation => ResponseFormat::SummaryStatistics,
            QueryType::Relationship => ResponseFormat::RelationshipDiagram,
            _ if self.should_use_sql => ResponseFormat::StructuredData,
            _ => ResponseFormat::NaturalLanguage,
        }
    }

    /// Formatting guidance appended to answer prompts
    pub fn format_instructions(&self) -> &'static str {
        match self.response_format() {
            ResponseFormat::ComparisonTable => {
                "Present the comparison as a markdown table with one row per item compared."
            }
            ResponseFormat::SummaryStatistics => {
                "Lead with the totals, then summarize the breakdown as a short list."
            }
            ResponseFormat::RelationshipDiagram => {
                "Describe how the items connect, listing each relationship as 'A -> B'."
            }
            ResponseFormat::StructuredData => {
                "Organize the answer with headings and bullet points."
            }
            ResponseFormat::NaturalLanguage => "Answer in clear, well-structured prose.",
        }
    }

    /// Short status line shown while the question is processed
    pub fn status_message(&self) -> &'static str {
        match self.route() {
            Route::SqlThenAnalysis if self.complexity == Complexity::High => {
                "Complex medical query detected. Querying database and analyzing results..."
            }
            Route::SqlThenAnalysis if self.has_medical_codes => {
                "Medical query detected. Searching database for medical concepts..."
            }
            Route::SqlThenAnalysis => "Data query detected. Retrieving and analyzing results...",
            Route::KnowledgeOnly => "Processing your question...",
        }
    }
}

/// Checked in order; first match wins
const INTENT_INDICATORS: &[(&str, QueryIntent)] = &[
    ("how many", QueryIntent::SqlRequired),
    ("count", QueryIntent::SqlRequired),
    ("total", QueryIntent::SqlRequired),
    ("list all", QueryIntent::SqlRequired),
    ("show all", QueryIntent::SqlRequired),
    ("what are", QueryIntent::SqlRequired),
    ("provide", QueryIntent::SqlRequired),
    ("retrieve", QueryIntent::SqlRequired),
    ("find", QueryIntent::SqlPreferred),
    ("search", QueryIntent::SqlPreferred),
    ("compare", QueryIntent::SqlPreferred),
    ("clarify", QueryIntent::Clarification),
    ("what do you mean", QueryIntent::Clarification),
    ("difference", QueryIntent::KnowledgeBase),
    ("explain", QueryIntent::KnowledgeBase),
    ("what is", QueryIntent::KnowledgeBase),
    ("why", QueryIntent::KnowledgeBase),
    ("how", QueryIntent::KnowledgeBase),
];

const SQL_KEYWORDS: &[(&str, f64)] = &[
    ("data", 1.0),
    ("database", 1.0),
    ("query", 0.8),
    ("list", 0.8),
    ("show", 0.7),
    ("find", 0.7),
    ("get", 0.7),
    ("retrieve", 0.9),
    ("count", 0.9),
    ("total", 0.8),
    ("where", 0.9),
    ("filter", 0.8),
    ("search", 0.7),
    ("match", 0.7),
    ("related", 0.7),
    ("associated", 0.7),
];

const MEDICAL_TERMS: &[&str] = &[
    "loinc",
    "snomed",
    "cpt",
    "icd",
    "pt-problem",
    "patient problem",
    "test",
    "procedure",
    "diagnosis",
    "condition",
];

const RETRIEVAL_WORDS: &[&str] = &["for", "with", "by", "from", "in"];
const RETRIEVAL_PHRASES: &[&str] = &["related to", "associated with"];

const QUERY_TYPES: &[(QueryType, &[&str])] = &[
    (QueryType::Comparative, &["compare", "difference", "vs"]),
    (QueryType::Aggregation, &["count", "how many", "total"]),
    (QueryType::Retrieval, &["list", "show", "all"]),
    (QueryType::Relationship, &["related", "associated", "linked"]),
    (QueryType::Definition, &["explain", "what is", "define"]),
];

/// Lower-cased question with its word tokens
struct Text {
    lower: String,
    words: Vec<String>,
}

impl Text {
    fn new(question: &str) -> Self {
        let lower = question.to_lowercase();
        let words = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(String::from)
            .collect();
        Self { lower, words }
    }

    fn has_term(&self, term: &str) -> bool {
        if term.contains(' ') || term.contains('-') {
            self.lower.contains(term)
        } else {
            self.words.iter().any(|w| w.starts_with(term))
        }
    }

    fn has_word(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }

    fn count_words(&self, word: &str) -> usize {
        self.words.iter().filter(|w| *w == word).count()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a question and decide how to answer it
    pub fn analyze(&self, question: &str) -> RoutingDecision {
        let text = Text::new(question);

        let medical_concepts: Vec<String> = MEDICAL_TERMS
            .iter()
            .filter(|term| text.has_term(term))
            .map(|term| term.to_string())
            .collect();
        let has_medical_codes = !medical_concepts.is_empty();

        let intent = detect_intent(&text, has_medical_codes);
        let sql_likelihood = sql_likelihood(&text, intent, has_medical_codes);
        let should_use_sql = matches!(
            intent,
            QueryIntent::SqlRequired | QueryIntent::SqlPreferred | QueryIntent::MedicalLookup
        ) || sql_likelihood > 0.6;

        RoutingDecision {
            intent,
            sql_likelihood,
            complexity: complexity(&text),
            confidence: confidence(sql_likelihood, intent),
            needs_verification: needs_verification(&text, intent),
            should_use_sql,
            has_medical_codes,
            medical_concepts,
            query_type: query_type(&text),
        }
    }
}

fn detect_intent(text: &Text, has_medical_codes: bool) -> QueryIntent {
    INTENT_INDICATORS
        .iter()
        .find(|(phrase, _)| text.has_term(phrase))
        .map(|(_, intent)| *intent)
        .unwrap_or(if has_medical_codes {
            QueryIntent::MedicalLookup
        } else {
            QueryIntent::KnowledgeBase
        })
}

fn sql_likelihood(text: &Text, intent: QueryIntent, has_medical_codes: bool) -> f64 {
    let mut score = intent.base_likelihood();

    for (keyword, weight) in SQL_KEYWORDS {
        if text.has_term(keyword) {
            score = (score + weight * 0.1).min(1.0);
        }
    }

    if has_medical_codes {
        score = (score + 0.15).min(1.0);
    }

    let retrieval = RETRIEVAL_WORDS.iter().any(|w| text.has_word(w))
        || RETRIEVAL_PHRASES.iter().any(|p| text.lower.contains(p))
        || text.has_term("code");
    if retrieval {
        score = (score + 0.1).min(1.0);
    }

    round2(score)
}

fn needs_verification(text: &Text, intent: QueryIntent) -> bool {
    text.lower.chars().count() > 100
        || text.count_words("and") > 1
        || text.lower.matches(',').count() > 1
        || matches!(intent, QueryIntent::Clarification | QueryIntent::KnowledgeBase)
        || text.lower.matches('?').count() > 1
}

fn complexity(text: &Text) -> Complexity {
    let conjunctions = text.count_words("and") + text.count_words("or") + text.count_words("but");
    let nested = text.lower.contains('(') || text.lower.contains(')');

    let score = text.lower.matches('?').count() as f64
        + conjunctions as f64 * 0.5
        + if nested { 1.0 } else { 0.0 }
        + text.lower.chars().count() as f64 / 100.0;

    if score > 3.0 {
        Complexity::High
    } else if score > 1.5 {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}

fn confidence(sql_likelihood: f64, intent: QueryIntent) -> f64 {
    let mut confidence = ((sql_likelihood - 0.5).abs() * 2.0).clamp(0.0, 1.0);
    if matches!(intent, QueryIntent::SqlRequired | QueryIntent::KnowledgeBase) {
        confidence = (confidence + 0.2).min(1.0);
    }
    round2(confidence)
}

fn query_type(text: &Text) -> QueryType {
    QUERY_TYPES
        .iter()
        .find(|(_, terms)| terms.iter().any(|t| text.has_term(t)))
        .map(|(query_type, _)| *query_type)
        .unwrap_or(QueryType::General)
}
