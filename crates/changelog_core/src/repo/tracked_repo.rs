//! Generic SQLite persistence for tracked entity rows.
//!
//! # Responsibility
//! - Insert/update rows of enrolled tables, including the change column.
//! - Load the change id a persisted row is stamped with.
//!
//! # Invariants
//! - Every table/column name is validated before it reaches SQL text.
//! - Values are always bound as parameters.

use crate::db::schema::{checked_identifier, column_exists, table_exists};
use crate::model::change::ChangeId;
use crate::model::tracking::TrackedRecord;
use super::change_repo::{RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};

/// SQLite writer for `TrackedRecord` rows.
pub struct SqliteTrackedRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTrackedRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Inserts `record` and returns the new row id.
    ///
    /// When `change_column` is set, the record's change id is written to it.
    pub fn insert<R: TrackedRecord>(
        &self,
        record: &R,
        change_column: Option<&str>,
    ) -> RepoResult<i64> {
        let table = checked_identifier(R::TABLE)?;
        let (columns, values) = collect_columns(record, change_column)?;

        if columns.is_empty() {
            self.conn
                .execute(&format!("INSERT INTO {table} DEFAULT VALUES;"), [])?;
        } else {
            let placeholders = (1..=columns.len())
                .map(|index| format!("?{index}"))
                .collect::<Vec<_>>()
                .join(", ");
            self.conn.execute(
                &format!(
                    "INSERT INTO {table} ({}) VALUES ({placeholders});",
                    columns.join(", ")
                ),
                params_from_iter(values),
            )?;
        }

        Ok(self.conn.last_insert_rowid())
    }

    /// Updates the row `row_id` with the record's current values.
    pub fn update<R: TrackedRecord>(
        &self,
        row_id: i64,
        record: &R,
        change_column: Option<&str>,
    ) -> RepoResult<()> {
        let table = checked_identifier(R::TABLE)?;
        let (columns, mut values) = collect_columns(record, change_column)?;
        if columns.is_empty() {
            return Ok(());
        }

        let assignments = columns
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{column} = ?{}", index + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let id_index = columns.len() + 1;
        values.push(Value::Integer(row_id));

        let changed = self.conn.execute(
            &format!("UPDATE {table} SET {assignments} WHERE id = ?{id_index};"),
            params_from_iter(values),
        )?;
        if changed == 0 {
            return Err(RepoError::RowNotFound {
                table: R::TABLE,
                row_id,
            });
        }
        Ok(())
    }

    /// Loads the change id stored on row `row_id`.
    pub fn load_change_id<R: TrackedRecord>(
        &self,
        row_id: i64,
        change_column: &str,
    ) -> RepoResult<Option<ChangeId>> {
        let table = checked_identifier(R::TABLE)?;
        let column = checked_identifier(change_column)?;
        let value: Option<Option<ChangeId>> = self
            .conn
            .query_row(
                &format!("SELECT {column} FROM {table} WHERE id = ?1;"),
                [row_id],
                |row| row.get(0),
            )
            .optional()?;

        value.ok_or(RepoError::RowNotFound {
            table: R::TABLE,
            row_id,
        })
    }
}

/// Verifies that `R::TABLE` exists and carries `change_column`.
pub fn ensure_tracked_table_ready<R: TrackedRecord>(
    conn: &Connection,
    change_column: &str,
) -> RepoResult<()> {
    let table = checked_identifier(R::TABLE)?;
    if !table_exists(conn, table)? {
        return Err(RepoError::MissingRequiredTable(R::TABLE));
    }
    for column in ["id", change_column] {
        if !column_exists(conn, table, column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: R::TABLE,
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

fn collect_columns<R: TrackedRecord>(
    record: &R,
    change_column: Option<&str>,
) -> RepoResult<(Vec<String>, Vec<Value>)> {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    for (column, value) in record.column_values() {
        columns.push(checked_identifier(column)?.to_string());
        values.push(value);
    }
    if let Some(column) = change_column {
        columns.push(checked_identifier(column)?.to_string());
        values.push(match record.change_id() {
            Some(id) => Value::Integer(id),
            None => Value::Null,
        });
    }
    Ok((columns, values))
}

#[cfg(test)]
mod tests {
    use super::{ensure_tracked_table_ready, SqliteTrackedRepository};
    use crate::db::open_db_in_memory;
    use crate::model::change::ChangeId;
    use crate::model::tracking::TrackedRecord;
    use crate::repo::change_repo::RepoError;
    use rusqlite::types::Value;
    use rusqlite::Connection;

    struct Label {
        text: String,
        change_id: Option<ChangeId>,
    }

    impl TrackedRecord for Label {
        const TABLE: &'static str = "labels";

        fn row_id(&self) -> Option<i64> {
            None
        }

        fn set_row_id(&mut self, _row_id: i64) {}

        fn column_values(&self) -> Vec<(&'static str, Value)> {
            vec![("text", Value::Text(self.text.clone()))]
        }

        fn is_dirty(&self) -> bool {
            true
        }

        fn mark_clean(&mut self) {}

        fn change_id(&self) -> Option<ChangeId> {
            self.change_id
        }

        fn set_change_id(&mut self, change_id: Option<ChangeId>) {
            self.change_id = change_id;
        }
    }

    fn setup() -> Connection {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE labels (id INTEGER PRIMARY KEY, text TEXT NOT NULL, change_id INTEGER NULL);
             INSERT INTO changes (id) VALUES (7);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn insert_and_update_write_change_column() {
        let conn = setup();
        let repo = SqliteTrackedRepository::new(&conn);
        let mut label = Label {
            text: "draft".to_string(),
            change_id: None,
        };

        let row_id = repo.insert(&label, Some("change_id")).unwrap();
        assert_eq!(repo.load_change_id::<Label>(row_id, "change_id").unwrap(), None);

        label.text = "final".to_string();
        label.change_id = Some(7);
        repo.update(row_id, &label, Some("change_id")).unwrap();
        assert_eq!(
            repo.load_change_id::<Label>(row_id, "change_id").unwrap(),
            Some(7)
        );

        let text: String = conn
            .query_row("SELECT text FROM labels WHERE id = ?1;", [row_id], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(text, "final");
    }

    #[test]
    fn untracked_write_leaves_change_column_alone() {
        let conn = setup();
        let repo = SqliteTrackedRepository::new(&conn);
        let label = Label {
            text: "plain".to_string(),
            change_id: Some(7),
        };

        let row_id = repo.insert(&label, None).unwrap();
        assert_eq!(repo.load_change_id::<Label>(row_id, "change_id").unwrap(), None);
    }

    #[test]
    fn missing_rows_and_columns_are_reported() {
        let conn = setup();
        let repo = SqliteTrackedRepository::new(&conn);

        assert!(matches!(
            repo.load_change_id::<Label>(41, "change_id"),
            Err(RepoError::RowNotFound { table: "labels", row_id: 41 })
        ));
        assert!(matches!(
            ensure_tracked_table_ready::<Label>(&conn, "revision_id"),
            Err(RepoError::MissingRequiredColumn { table: "labels", .. })
        ));
        assert!(ensure_tracked_table_ready::<Label>(&conn, "change_id").is_ok());
    }

    #[test]
    fn unsafe_column_names_never_reach_sql() {
        let conn = setup();
        let repo = SqliteTrackedRepository::new(&conn);
        let label = Label {
            text: "x".to_string(),
            change_id: None,
        };

        assert!(repo.insert(&label, Some("change_id; DROP TABLE labels")).is_err());
        assert!(ensure_tracked_table_ready::<Label>(&conn, "change_id").is_ok());
    }
}
