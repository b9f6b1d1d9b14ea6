//! SQL generation for per-task item tables
//!
//! Every task gets its own table: an auto-increment `id`, one TEXT column per item
//! field, then `url` and `time`. Identifiers come from task and field names, so they
//! are always quoted. A field named like one of the fixed columns is stored under a
//! `field_` prefix.

use std::borrow::Cow;

/// Columns appended after the item fields
pub const META_COLUMNS: [&str; 2] = ["url", "time"];

const RESERVED_COLUMNS: [&str; 3] = ["id", "url", "time"];

/// Maps an item field to its column name
///
/// SQLite compares identifiers case-insensitively, so `URL` is reserved too.
pub fn column_name(field: &str) -> Cow<'_, str> {
    if RESERVED_COLUMNS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(field))
    {
        Cow::Owned(format!("field_{}", field))
    } else {
        Cow::Borrowed(field)
    }
}

/// Quotes an SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Builds the `CREATE TABLE` statement for a task table
pub fn create_table_sql(table: &str, fields: &[String]) -> String {
    let mut columns = vec!["\"id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    columns.extend(
        fields
            .iter()
            .map(|f| format!("{} TEXT", quote_ident(&column_name(f)))),
    );
    columns.extend(META_COLUMNS.iter().map(|c| format!("{} TEXT", quote_ident(c))));

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        columns.join(", ")
    )
}

/// Builds an `ALTER TABLE` statement adding a field column
pub fn add_column_sql(table: &str, field: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} TEXT",
        quote_ident(table),
        quote_ident(&column_name(field))
    )
}

/// Builds an `INSERT` statement for one item with the given fields
pub fn insert_sql(table: &str, fields: &[String]) -> String {
    let columns: Vec<String> = fields
        .iter()
        .map(|f| column_name(f))
        .chain(META_COLUMNS.map(Cow::Borrowed))
        .map(|c| quote_ident(&c))
        .collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", ")
    )
}
