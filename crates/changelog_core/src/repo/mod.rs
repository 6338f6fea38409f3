//! Repository layer for change rows and tracked entity rows.
//!
//! # Responsibility
//! - Keep SQL text for `changes` and enrolled tables inside one boundary.
//! - Return semantic errors (`ChangeNotFound`, `AlreadyFinalized`) in
//!   addition to DB transport errors.
//!
//! # Invariants
//! - A change row is finalized at most once (`pending` -> terminal).
//! - Table/column names reaching SQL text are validated identifiers.

pub mod change_repo;
pub mod tracked_repo;
