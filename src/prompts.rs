//! Prompts - text sent to the completion service at each pipeline stage
//!
//! Generation and correction prompts are dialect-aware; everything else is
//! dialect-neutral prose.

use crate::ontology::{describe_key_slots, MED_SLOTS_TABLE, MED_TABLE};
use crate::sql::dialect::SqlDialect;
use crate::sql::rows::ResultSet;

/// Domain-knowledge preamble for SQL generation
pub fn ontology_system_prompt(dialect: SqlDialect) -> String {
    format!(
        r#"You are an expert at querying a slot-based medical ontology knowledge base.

## Data Model

- {med} (CODE, SLOT_NUMBER, SLOT_VALUE): one row per attribute of a medical concept.
  A CODE identifies one concept (test, procedure, patient problem, measurement).
  SLOT_VALUE is either a literal value or the CODE of another concept.
- {slots} (SLOT_NUMBER, SLOT_NAME): names each slot, formatted "SLOT-NAME,TYPE".

The {med} table is a semantic network: relationships flow through
SLOT_NUMBER/SLOT_VALUE pairs, and following a reference means joining
SLOT_VALUE back onto another row's CODE.

## Key Slots

{key_slots}

## Query Patterns

1. Tests by LOINC code: filter SLOT_NUMBER = 212 on the LOINC value, then
   LEFT JOIN the same CODE for slot 6 (name) and slot 266 (SNOMED code).
2. Problems indicated by a procedure: start from the procedure rows, INNER JOIN
   slot 150 on the same CODE, then join its SLOT_VALUE to the problem CODE and
   enrich the problem with slots 6 and 266.
3. Name search: SLOT_NUMBER = 6 AND SLOT_VALUE LIKE '%term%'.
4. All attributes of a concept: join {med} to {slots} on SLOT_NUMBER for one CODE.
5. Hierarchies ("all types of", "subcategories of"): chain joins over slot 3
   (DESCENDANT-OF) or slot 4 (SUBCLASS-OF).
6. Several criteria at once: multi-way joins with GROUP BY and HAVING counts.

## Rules

- Use MAX(CASE WHEN alias.SLOT_NUMBER = N THEN alias.SLOT_VALUE END) to pivot several slots into one row.
- Always GROUP BY when aggregating.
- LEFT JOIN optional attributes (names, SNOMED codes); INNER JOIN required relationships.
- Use DISTINCT when joining the same table several times.
- Alias every joined table (m1, m2, m3, ...) and give result columns descriptive aliases.
- Never confuse SLOT_VALUE with CODE, and always constrain SLOT_NUMBER on every join.
- NULL slot values are valid: they mean the attribute is missing.
- Include slot 6 (PRINT-NAME) for readability and slot 266 (SNOMED-CODE) when available.
- {limit}

## Output

Return ONLY one valid {dialect} query. No explanations, no markdown, no code fences.
Build a single query that traverses every relationship needed; never return several queries."#,
        med = MED_TABLE,
        slots = MED_SLOTS_TABLE,
        key_slots = describe_key_slots(),
        limit = dialect.limit_rule(),
        dialect = dialect,
    )
}

/// Schema, dialect requirements and a worked example
pub fn generation_instructions(schema: &str, dialect: SqlDialect) -> String {
    let (top, limit) = match dialect {
        SqlDialect::TSql => ("TOP 100 ", ""),
        SqlDialect::Sqlite => ("", " LIMIT 100"),
    };

    format!(
        r#"SQL GENERATION INSTRUCTIONS

Database Schema:
{schema}

Generate a {dialect} query that answers the user's question.

Requirements:
1. Return ONLY the SQL: no markdown, no code fences, no explanations
2. {limit_rule}
3. Use slot 150 (PROCEDURE-(INDICATES)->PT-PROBLEM) to link procedures to problems
4. Resolve pronouns such as "those" or "them" using the previous questions and queries

Example (problems indicated by LOINC 2947-0):
SELECT DISTINCT {top}prob.CODE, MAX(CASE WHEN n.SLOT_NUMBER = 6 THEN n.SLOT_VALUE END) AS Name, MAX(CASE WHEN s.SLOT_NUMBER = 266 THEN s.SLOT_VALUE END) AS SNOMEDCode FROM MED loinc_ref INNER JOIN MED indicates ON loinc_ref.CODE = indicates.CODE AND indicates.SLOT_NUMBER = 150 INNER JOIN MED prob ON indicates.SLOT_VALUE = prob.CODE LEFT JOIN MED n ON prob.CODE = n.CODE AND n.SLOT_NUMBER = 6 LEFT JOIN MED s ON prob.CODE = s.CODE AND s.SLOT_NUMBER = 266 WHERE loinc_ref.SLOT_NUMBER = 212 AND loinc_ref.SLOT_VALUE = '2947-0' GROUP BY prob.CODE{limit}"#,
        schema = schema,
        dialect = dialect,
        limit_rule = dialect.limit_rule(),
        top = top,
        limit = limit,
    )
}

/// Ask the model to diagnose a failed statement and propose a fix
pub fn correction_prompt(
    question: &str,
    failed_sql: &str,
    category: &str,
    message: &str,
    hint: &str,
    dialect: SqlDialect,
) -> String {
    let rules = dialect
        .correction_rules()
        .iter()
        .map(|rule| format!("- {}", rule))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"The user asked this medical database question: "{question}"

This query was generated:
{failed_sql}

It failed with this database error:
ERROR TYPE: {category}
ERROR MESSAGE: {message}
ERROR HINT: {hint}

Analyze the error and answer in this format:
- PROBLEM: [what is wrong with the SQL]
- FIX: [the corrected SQL query; it will be executed as-is]
- EXPLANATION: [why the fix works]

The FIX must be valid {dialect} and follow these rules:
{rules}"#,
        question = question,
        failed_sql = failed_sql,
        category = category,
        message = message,
        hint = hint,
        dialect = dialect,
        rules = rules,
    )
}

/// Plain-language explanation once automatic correction has given up
pub fn exhaustion_prompt(
    question: &str,
    last_sql: &str,
    category: &str,
    message: &str,
    hint: &str,
) -> String {
    format!(
        r#"A user asked this medical database question: "{question}"

The generated query failed with a database error that could not be fixed automatically:

ERROR TYPE: {category}
ERROR MESSAGE: {message}
LAST SQL ATTEMPTED: {last_sql}
ERROR HINT: {hint}

Help the user understand:
1. What went wrong, in simple non-technical language
2. Why the error occurred and why it was hard to fix automatically
3. How they could rephrase the question to avoid it
4. Two or three concrete alternative questions they could try instead

Be friendly and conversational. Medical database queries can be complex."#,
        question = question,
        category = category,
        message = message,
        last_sql = last_sql,
        hint = hint,
    )
}

/// Analysis prompt over the rows a query actually returned
pub fn analysis_prompt(
    question: &str,
    rows: &ResultSet,
    table_rows: usize,
    json_rows: usize,
    recent_context: &str,
) -> String {
    let table = rows.to_text_table(table_rows);
    let json_detail = if rows.is_empty() {
        String::new()
    } else {
        format!("\n\nDetailed Data (JSON):\n{}", rows.to_json_excerpt(json_rows))
    };

    format!(
        r#"You are a medical data analysis expert interpreting results from a medical ontology database.
The table and JSON below are the actual rows returned for the user's question.

=== QUESTION ===
{question}

=== DATA RESULTS ===
Total rows returned: {row_count}

Data Table:
```
{table}
```{json_detail}

=== RECENT CONVERSATION CONTEXT ===
{recent_context}

=== TASK ===
Using only the data above:
1. Identify the key entities (procedures, tests, problems, codes) and how they relate
2. Extract the key findings, explaining LOINC, SNOMED and other codes
3. Answer the question directly in complete sentences, citing the data
4. Add clinical context: what procedures measure and which problems they help diagnose
5. Use headings, bullet points and tables where they help readability
6. If the table says "... and N more rows", say that more findings exist beyond the ones shown
7. Point out gaps (missing names or codes) and related lookups worth doing next

Your analysis and answer:"#,
        question = question,
        row_count = rows.row_count(),
        table = table,
        json_detail = json_detail,
        recent_context = recent_context,
    )
}

pub const GENERAL_KNOWLEDGE_SYSTEM_PROMPT: &str = r#"You are a knowledgeable medical informatics assistant.
Answer questions about medical terminology, coding systems (LOINC, SNOMED CT, CPT, ICD) and clinical concepts clearly and accurately.
Use markdown headings, lists and tables when they make the answer easier to read.
If a question needs data from the ontology database, say which lookup would answer it."#;

/// User message for the knowledge-only route
pub fn knowledge_prompt(question: &str, recent_context: &str, format_instructions: &str) -> String {
    format!(
        "Recent conversation:\n{}\n\nQuestion: {}\n\n{}",
        recent_context, question, format_instructions
    )
}
