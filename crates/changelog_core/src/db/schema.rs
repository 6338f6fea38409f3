//! Schema inspection helpers for change tracking.
//!
//! # Responsibility
//! - Validate identifiers that are interpolated into SQL text.
//! - Inspect tables/columns so repositories can refuse unmigrated schemas.
//! - Add the nullable change reference column to enrolled tables.
//!
//! # Invariants
//! - Only identifiers matching `[A-Za-z_][A-Za-z0-9_]*` reach SQL text.
//! - `add_change_column` is idempotent.

use super::{DbError, DbResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;

/// Table holding one row per change.
pub const CHANGES_TABLE: &str = "changes";

/// Columns the change repository reads and writes.
pub const CHANGES_REQUIRED_COLUMNS: &[&str] = &[
    "id",
    "user_id",
    "interface",
    "notes",
    "status",
    "created_at",
    "updated_at",
];

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Returns whether `value` is safe to interpolate as a table/column name.
pub fn is_valid_identifier(value: &str) -> bool {
    value.len() <= 64 && IDENTIFIER_RE.is_match(value)
}

/// Returns `value` unchanged when it is a valid identifier.
pub fn checked_identifier(value: &str) -> DbResult<&str> {
    if is_valid_identifier(value) {
        Ok(value)
    } else {
        Err(DbError::InvalidIdentifier(value.to_string()))
    }
}

/// Returns whether a table with the given name exists.
pub fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Returns whether `table` has a column named `column`.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> DbResult<bool> {
    let table = checked_identifier(table)?;
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get("name")?;
        if name.eq_ignore_ascii_case(column) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Adds a nullable `INTEGER REFERENCES changes(id)` column to `table`.
///
/// Returns `true` when the column was added, `false` when it already existed.
pub fn add_change_column(conn: &Connection, table: &str, column: &str) -> DbResult<bool> {
    let table = checked_identifier(table)?;
    let column = checked_identifier(column)?;
    if column_exists(conn, table, column)? {
        return Ok(false);
    }

    conn.execute_batch(&format!(
        "ALTER TABLE {table} ADD COLUMN {column} INTEGER NULL REFERENCES {CHANGES_TABLE}(id);"
    ))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::{add_change_column, column_exists, is_valid_identifier};
    use crate::db::open_db_in_memory;

    #[test]
    fn identifier_check_rejects_sql_fragments() {
        assert!(is_valid_identifier("change_id"));
        assert!(is_valid_identifier("_widgets2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier("id; DROP TABLE changes"));
        assert!(!is_valid_identifier("a.b"));
    }

    #[test]
    fn add_change_column_is_idempotent() {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT);")
            .unwrap();

        assert!(add_change_column(&conn, "widgets", "change_id").unwrap());
        assert!(!add_change_column(&conn, "widgets", "change_id").unwrap());
        assert!(column_exists(&conn, "widgets", "change_id").unwrap());
    }
}
