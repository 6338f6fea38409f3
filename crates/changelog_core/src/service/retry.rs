//! Retry classification for transactional units of work.

use crate::db::DbError;
use crate::repo::change_repo::RepoError;
use crate::service::error::ChangeError;
use rusqlite::ErrorCode;

/// Classifies failures that `run_in_session` may retry.
///
/// Retrying only makes sense for contention (deadlock, busy, locked); any
/// other failure stops the retry loop immediately.
pub trait TransientFailure {
    fn is_transient(&self) -> bool;
}

impl TransientFailure for rusqlite::Error {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    }
}

impl TransientFailure for DbError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl TransientFailure for RepoError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Db(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl TransientFailure for ChangeError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Repo(err) => err.is_transient(),
            _ => false,
        }
    }
}
