//! Write pipeline for tracked records.
//!
//! # Responsibility
//! - Hold the explicit enrollment of entity types into change tracking.
//! - Run `before_write` synchronously before any SQL for enrolled types.
//! - Resolve the change a persisted record is stamped with.
//!
//! # Invariants
//! - Enrolled tables are verified to carry their change column.
//! - A write vetoed by the interceptor issues no SQL.
//! - A failed write restores the record's previous change id.

use crate::config::ChangelogConfig;
use crate::model::change::ChangeRecord;
use crate::model::tracking::{Enrollment, TrackedRecord};
use crate::repo::change_repo::{ChangeRepository, SqliteChangeRepository};
use crate::repo::tracked_repo::{ensure_tracked_table_ready, SqliteTrackedRepository};
use crate::service::change_manager::ChangeContext;
use crate::service::error::{ChangeError, ChangeResult};
use crate::service::interceptor::{before_write, WriteDecision};
use log::debug;
use rusqlite::Connection;
use std::collections::BTreeMap;

/// Host write pipeline with per-table enrollment.
pub struct RecordStore<'conn> {
    conn: &'conn Connection,
    defaults: Enrollment,
    enrollments: BTreeMap<&'static str, Enrollment>,
}

impl<'conn> RecordStore<'conn> {
    /// Creates a store whose defaults enforce change logging on `change_id`.
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_defaults(conn, Enrollment::default())
    }

    /// Creates a store with custom default knobs.
    pub fn with_defaults(conn: &'conn Connection, defaults: Enrollment) -> Self {
        Self {
            conn,
            defaults,
            enrollments: BTreeMap::new(),
        }
    }

    /// Creates a store using the configured default knobs.
    pub fn from_config(conn: &'conn Connection, config: &ChangelogConfig) -> Self {
        Self::with_defaults(conn, config.defaults.clone())
    }

    /// Enrolls `R` using its own knobs, falling back to the store defaults.
    pub fn enroll<R: TrackedRecord>(&mut self) -> ChangeResult<&Enrollment> {
        let enrollment = R::enrollment().unwrap_or_else(|| self.defaults.clone());
        self.enroll_with::<R>(enrollment)
    }

    /// Enrolls `R` with explicit knobs, replacing any previous enrollment.
    ///
    /// # Errors
    /// - `InvalidEnrollment` when the knobs fail validation.
    /// - `Repo(MissingRequiredTable | MissingRequiredColumn)` when the table
    ///   lacks `id` or the change column.
    pub fn enroll_with<R: TrackedRecord>(
        &mut self,
        enrollment: Enrollment,
    ) -> ChangeResult<&Enrollment> {
        enrollment
            .validate()
            .map_err(|reason| ChangeError::InvalidEnrollment {
                table: R::TABLE,
                reason,
            })?;
        ensure_tracked_table_ready::<R>(self.conn, &enrollment.change_id_column)?;

        debug!(
            "event=record_enroll module=record_store status=ok table={} column={} force={}",
            R::TABLE,
            enrollment.change_id_column,
            enrollment.force_changelogging
        );
        self.enrollments.insert(R::TABLE, enrollment);
        Ok(&self.enrollments[R::TABLE])
    }

    /// Enrollment registered for `table`, if any.
    pub fn enrollment_for(&self, table: &str) -> Option<&Enrollment> {
        self.enrollments.get(table)
    }

    pub fn is_enrolled<R: TrackedRecord>(&self) -> bool {
        self.enrollments.contains_key(R::TABLE)
    }

    /// Persists `record` if dirty.
    ///
    /// Enrolled types pass through `before_write` first; unenrolled types are
    /// written without stamping. Returns whether SQL was issued.
    pub fn save<R: TrackedRecord>(
        &self,
        context: &dyn ChangeContext,
        record: &mut R,
    ) -> ChangeResult<bool> {
        let previous_change_id = record.change_id();
        let change_column = match self.enrollments.get(R::TABLE) {
            Some(enrollment) => {
                if before_write(context, enrollment, record)? == WriteDecision::Skip {
                    return Ok(false);
                }
                Some(enrollment.change_id_column.as_str())
            }
            None if !record.is_dirty() => return Ok(false),
            None => None,
        };

        let repo = SqliteTrackedRepository::new(self.conn);
        let written = match record.row_id() {
            Some(row_id) => repo.update(row_id, record, change_column).map(|()| row_id),
            None => repo.insert(record, change_column),
        };

        let row_id = match written {
            Ok(row_id) => row_id,
            Err(err) => {
                record.set_change_id(previous_change_id);
                return Err(err.into());
            }
        };

        record.set_row_id(row_id);
        record.mark_clean();
        debug!(
            "event=record_save module=record_store status=ok table={} row_id={row_id} change_id={:?}",
            R::TABLE,
            record.change_id()
        );
        Ok(true)
    }

    /// Loads the change a persisted record is stamped with.
    ///
    /// Returns `None` for unsaved records and rows written outside a change.
    pub fn owning_change<R: TrackedRecord>(
        &self,
        record: &R,
    ) -> ChangeResult<Option<ChangeRecord>> {
        let enrollment = self
            .enrollments
            .get(R::TABLE)
            .ok_or(ChangeError::NotEnrolled(R::TABLE))?;
        let Some(row_id) = record.row_id() else {
            return Ok(None);
        };

        let change_id = SqliteTrackedRepository::new(self.conn)
            .load_change_id::<R>(row_id, &enrollment.change_id_column)?;
        match change_id {
            Some(change_id) => Ok(SqliteChangeRepository::new(self.conn).get_change(change_id)?),
            None => Ok(None),
        }
    }
}
