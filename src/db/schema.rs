pub const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// Splits the embedded schema into executable statements. Statements in the
/// schema never contain literal semicolons, so a plain split is enough once
/// comment lines are stripped.
pub fn schema_statements() -> Vec<String> {
    SCHEMA_SQL
        .split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|stmt| !stmt.is_empty())
        .collect()
}
