//! Change service errors.

use crate::db::DbError;
use crate::model::tracking::EnrollmentError;
use crate::repo::change_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ChangeResult<T> = Result<T, ChangeError>;

/// Errors raised by the change manager and the write pipeline.
///
/// The first four variants signal protocol misuse by the caller.
#[derive(Debug)]
pub enum ChangeError {
    /// `begin`/`run_in_session` while a change is open.
    SessionAlreadyActive,
    /// Transactional `begin`/`run_in_session` while a transaction is open.
    TransactionAlreadyActive,
    /// `commit`/`roll_back` with no change open.
    NoActiveSession,
    /// Write to an enforcing table with no change open.
    WriteOutsideSession { table: &'static str },
    /// Selected connection name is not registered.
    UnknownConnection(String),
    /// Enrollment knobs for `table` are invalid.
    InvalidEnrollment {
        table: &'static str,
        reason: EnrollmentError,
    },
    /// Table was never enrolled with the record store.
    NotEnrolled(&'static str),
    /// Persistence failure.
    Repo(RepoError),
}

impl Display for ChangeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionAlreadyActive => write!(
                f,
                "cannot begin a change because one is already in progress"
            ),
            Self::TransactionAlreadyActive => write!(
                f,
                "cannot begin a transaction because one is already in progress"
            ),
            Self::NoActiveSession => write!(f, "there is no change in progress"),
            Self::WriteOutsideSession { table } => write!(
                f,
                "cannot write to `{table}` outside of a change (change logging is enforced); begin a change first"
            ),
            Self::UnknownConnection(name) => write!(f, "unknown connection `{name}`"),
            Self::InvalidEnrollment { table, reason } => {
                write!(f, "invalid enrollment for `{table}`: {reason}")
            }
            Self::NotEnrolled(table) => write!(f, "table `{table}` is not enrolled"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ChangeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidEnrollment { reason, .. } => Some(reason),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ChangeError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<DbError> for ChangeError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

impl From<rusqlite::Error> for ChangeError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}
