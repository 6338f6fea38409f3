//! Change repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Insert `pending` change rows and finalize them exactly once.
//! - Provide read/list APIs for audit queries.
//!
//! # Invariants
//! - `finish_change` only transitions rows whose status is `pending`.
//! - Read paths reject invalid persisted status values instead of masking them.

use crate::db::schema::{column_exists, table_exists, CHANGES_REQUIRED_COLUMNS, CHANGES_TABLE};
use crate::db::DbError;
use crate::model::change::{ChangeId, ChangeRecord, ChangeStatus, NewChange, PrincipalId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const CHANGE_SELECT_SQL: &str = "SELECT
    id,
    user_id,
    interface,
    notes,
    status,
    created_at,
    updated_at
FROM changes";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for change and tracked-row persistence.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// No change row with this id.
    ChangeNotFound(ChangeId),
    /// No row with this id in an enrolled table.
    RowNotFound { table: &'static str, row_id: i64 },
    /// Change row already reached a terminal status.
    AlreadyFinalized {
        id: ChangeId,
        status: ChangeStatus,
    },
    /// `pending` is not a valid finalization target.
    InvalidTransition(ChangeStatus),
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn { table: &'static str, column: String },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ChangeNotFound(id) => write!(f, "change not found: {id}"),
            Self::RowNotFound { table, row_id } => {
                write!(f, "row {row_id} not found in `{table}`")
            }
            Self::AlreadyFinalized { id, status } => write!(
                f,
                "change {id} is already {} and cannot be modified",
                status.as_str()
            ),
            Self::InvalidTransition(status) => {
                write!(f, "cannot finalize a change as `{}`", status.as_str())
            }
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{column}` is missing from `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted change data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Query options for listing changes, newest first.
#[derive(Debug, Clone, Default)]
pub struct ChangeListQuery {
    pub status: Option<ChangeStatus>,
    pub user_id: Option<PrincipalId>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for change rows.
pub trait ChangeRepository {
    /// Inserts a `pending` row and returns it as stored.
    fn create_change(&self, change: &NewChange) -> RepoResult<ChangeRecord>;
    /// Moves a `pending` row to `status` and returns the updated row.
    fn finish_change(&self, id: ChangeId, status: ChangeStatus) -> RepoResult<ChangeRecord>;
    fn get_change(&self, id: ChangeId) -> RepoResult<Option<ChangeRecord>>;
    fn list_changes(&self, query: &ChangeListQuery) -> RepoResult<Vec<ChangeRecord>>;
}

/// SQLite-backed change repository.
pub struct SqliteChangeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteChangeRepository<'conn> {
    /// Creates a repository without schema checks.
    ///
    /// Callers must pass a connection returned by `open_db*`.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates a repository after verifying the `changes` schema.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_changes_table_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ChangeRepository for SqliteChangeRepository<'_> {
    fn create_change(&self, change: &NewChange) -> RepoResult<ChangeRecord> {
        self.conn.execute(
            "INSERT INTO changes (
                user_id,
                interface,
                notes,
                status
            ) VALUES (?1, ?2, ?3, 'pending');",
            params![
                change.user_id,
                change.interface.as_deref(),
                change.notes.as_deref(),
            ],
        )?;

        load_required_change(self.conn, self.conn.last_insert_rowid())
    }

    fn finish_change(&self, id: ChangeId, status: ChangeStatus) -> RepoResult<ChangeRecord> {
        if !status.is_terminal() {
            return Err(RepoError::InvalidTransition(status));
        }

        let changed = self.conn.execute(
            "UPDATE changes
             SET
                status = ?2,
                updated_at = MAX(updated_at, strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND status = 'pending';",
            params![id, status.as_str()],
        )?;

        if changed == 0 {
            return match self.get_change(id)? {
                None => Err(RepoError::ChangeNotFound(id)),
                Some(existing) => Err(RepoError::AlreadyFinalized {
                    id,
                    status: existing.status,
                }),
            };
        }

        load_required_change(self.conn, id)
    }

    fn get_change(&self, id: ChangeId) -> RepoResult<Option<ChangeRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CHANGE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_change_row(row)?));
        }
        Ok(None)
    }

    fn list_changes(&self, query: &ChangeListQuery) -> RepoResult<Vec<ChangeRecord>> {
        let mut sql = format!("{CHANGE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }

        if let Some(user_id) = query.user_id {
            sql.push_str(" AND user_id = ?");
            bind_values.push(Value::Integer(user_id));
        }

        sql.push_str(" ORDER BY id DESC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut changes = Vec::new();
        while let Some(row) = rows.next()? {
            changes.push(parse_change_row(row)?);
        }

        Ok(changes)
    }
}

fn load_required_change(conn: &Connection, id: ChangeId) -> RepoResult<ChangeRecord> {
    SqliteChangeRepository::new(conn)
        .get_change(id)?
        .ok_or(RepoError::ChangeNotFound(id))
}

fn ensure_changes_table_ready(conn: &Connection) -> RepoResult<()> {
    if !table_exists(conn, CHANGES_TABLE)? {
        return Err(RepoError::MissingRequiredTable(CHANGES_TABLE));
    }
    for column in CHANGES_REQUIRED_COLUMNS {
        if !column_exists(conn, CHANGES_TABLE, column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: CHANGES_TABLE,
                column: (*column).to_string(),
            });
        }
    }
    Ok(())
}

fn parse_change_row(row: &Row<'_>) -> RepoResult<ChangeRecord> {
    let status_text: String = row.get("status")?;
    let status = ChangeStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid change status `{status_text}` in changes.status"
        ))
    })?;

    Ok(ChangeRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        interface: row.get("interface")?,
        notes: row.get("notes")?,
        status,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
