//! Domain model for change tracking.
//!
//! # Responsibility
//! - Define the persisted change record and its lifecycle status.
//! - Define the contract an entity type implements to opt into tracking.
//!
//! # Invariants
//! - A change is identified by its integer primary key (`ChangeId`).
//! - A change reaches a terminal status at most once.

pub mod change;
pub mod tracking;
