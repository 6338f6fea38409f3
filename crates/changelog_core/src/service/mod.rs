//! Change tracking services.
//!
//! # Responsibility
//! - Drive the change lifecycle (`ChangeManager`).
//! - Gate and stamp writes to enrolled records (`before_write`, `RecordStore`).
//!
//! # Invariants
//! - At most one change is open per manager.
//! - Protocol misuse is reported as `ChangeError`, never ignored.

pub mod change_manager;
pub mod error;
pub mod interceptor;
pub mod principal;
pub mod record_store;
pub mod retry;
