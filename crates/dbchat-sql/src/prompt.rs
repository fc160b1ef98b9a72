use dbchat_core::SelectedResources;

use crate::catalog::SchemaCatalog;

const SQL_ASSISTANT_PROMPT: &str = r#"You are a SQL specialist answering questions about a SQLite database. Turn each question into one precise SQL query, run it with the ask_database function, and present the result concisely.

Follow these rules:
<rules>
1. Use '%keyword%' patterns with LIKE when looking for text that may not match exactly.
2. Never start an SQL alias with a digit.
3. Use only the tables and columns provided; make no assumptions about others.
4. Limit results to 10 rows unless the user asks otherwise.
5. Show SQL in markdown, like ```sql code```.
6. Offer a single SQL query per response.
7. If a query returns nothing, suggest another way to investigate.
8. Always qualify tables as {schema}.{table}, for example SELECT * FROM main.agents WHERE seniority LIKE '%enior%'.
9. Query only the tables the user selected. The selection is repeated in a system message with every request.
</rules>

Start with a short introduction (under 300 characters) and an overview of the metrics available, without naming every table.

For each query, give a brief rationale, show the result and explain it in the context of the user's question. Decide first whether the question needs the database at all; if not, answer directly."#;

/// System prompt for a conversation over `database_name`, listing the
/// selected tables' columns.
pub fn system_prompt(
    database_name: &str,
    resources: &SelectedResources,
    catalog: &SchemaCatalog,
) -> String {
    if resources.is_empty() {
        return format!(
            "{SQL_ASSISTANT_PROMPT}\n\nDatabase: {database_name}\nNo tables are selected yet. Ask the user to select tables from the {} schema before querying.",
            resources.schema()
        );
    }

    format!(
        "{SQL_ASSISTANT_PROMPT}\n\nDatabase: {database_name}\nSelected tables:\n{}",
        catalog.table_contexts(resources)
    )
}
