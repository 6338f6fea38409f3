//! Pre-write hook that stamps and gates writes to enrolled records.
//!
//! # Invariants
//! - Clean records pass through untouched.
//! - A rejected write leaves the record exactly as it was.

use crate::model::tracking::{Enrollment, TrackedRecord};
use crate::service::change_manager::ChangeContext;
use crate::service::error::{ChangeError, ChangeResult};

/// Outcome of `before_write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    /// Nothing changed; no SQL should be issued.
    Skip,
    /// Record is stamped and may be written.
    Write,
}

/// Stamps `record` with the open change id, or vetoes the write.
///
/// # Errors
/// - `WriteOutsideSession` when no change is open and `enrollment` enforces
///   change logging.
pub fn before_write<R: TrackedRecord>(
    context: &dyn ChangeContext,
    enrollment: &Enrollment,
    record: &mut R,
) -> ChangeResult<WriteDecision> {
    if !record.is_dirty() {
        return Ok(WriteDecision::Skip);
    }

    let change_id = context.current_change_id();
    if change_id.is_none() && enrollment.force_changelogging {
        return Err(ChangeError::WriteOutsideSession { table: R::TABLE });
    }

    record.set_change_id(change_id);
    Ok(WriteDecision::Write)
}
