//! Change tracking for SQLite-backed applications.
//!
//! Writes to enrolled records are grouped into named changes and stamped with
//! the open change's id, linking every row edit to the operation behind it.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ChangelogConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, ConnectionRegistry, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::change::{
    ChangeId, ChangeRecord, ChangeRequest, ChangeStatus, NewChange, PrincipalId,
};
pub use model::tracking::{Enrollment, EnrollmentError, TrackedRecord, DEFAULT_CHANGE_ID_COLUMN};
pub use repo::change_repo::{
    ChangeListQuery, ChangeRepository, RepoError, RepoResult, SqliteChangeRepository,
};
pub use service::change_manager::{ChangeContext, ChangeManager, ChangeScope};
pub use service::error::{ChangeError, ChangeResult};
pub use service::interceptor::{before_write, WriteDecision};
pub use service::principal::{NoPrincipal, PrincipalResolver};
pub use service::record_store::RecordStore;
pub use service::retry::TransientFailure;

/// Minimal health-check API for linkage probes.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
