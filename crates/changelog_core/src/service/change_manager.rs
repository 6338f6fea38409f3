//! Change lifecycle manager.
//!
//! # Responsibility
//! - Open, commit and roll back changes, one at a time per manager.
//! - Drive an optional SQLite transaction in lock-step with the change.
//! - Expose the open change id so writes can be stamped with it.
//!
//! # Invariants
//! - `Idle --begin/run_in_session--> Open --commit/roll_back/run end--> Idle`.
//!   Any other call is an error, never a silent no-op.
//! - A change row is `pending` while open and finalized exactly once.
//! - `roll_back` rolls the transaction back before writing `failed`, so the
//!   failure record survives even when the transaction covered `changes`.
//! - No change opens while the default connection is inside a transaction
//!   this manager does not own; the `pending` row would share its fate.
//! - `complete` is written only once the change's writes are durable: inside
//!   the transaction on the default connection, after commit elsewhere.
//! - `run_in_session` clears the open change only after its final status
//!   write, on every exit path.

use crate::config::ChangelogConfig;
use crate::db::ConnectionRegistry;
use crate::model::change::{ChangeId, ChangeRecord, ChangeRequest, ChangeStatus, NewChange};
use crate::repo::change_repo::{ChangeRepository, RepoResult, SqliteChangeRepository};
use crate::service::error::{ChangeError, ChangeResult};
use crate::service::principal::{NoPrincipal, PrincipalResolver};
use crate::service::retry::TransientFailure;
use log::{info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Source of the change id a write should be stamped with.
pub trait ChangeContext {
    fn current_change_id(&self) -> Option<ChangeId>;
}

/// View handed to a `run_in_session` unit of work.
pub struct ChangeScope<'s> {
    conn: &'s Connection,
    change_id: ChangeId,
    attempt: u32,
}

impl<'s> ChangeScope<'s> {
    /// Connection to write through; inside the managed transaction when
    /// `attempts > 0`.
    pub fn connection(&self) -> &'s Connection {
        self.conn
    }

    pub fn change_id(&self) -> ChangeId {
        self.change_id
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl ChangeContext for ChangeScope<'_> {
    fn current_change_id(&self) -> Option<ChangeId> {
        Some(self.change_id)
    }
}

/// Per-connection change session manager.
///
/// Not shareable across threads; concurrent workers each own a manager.
/// Change rows are stored on the registry's default connection while
/// transactions run on the selected connection.
pub struct ChangeManager<'db> {
    db: &'db ConnectionRegistry,
    connection: Option<String>,
    principal: Box<dyn PrincipalResolver + 'db>,
    active: Option<ChangeRecord>,
    transaction: Option<Transaction<'db>>,
}

impl<'db> ChangeManager<'db> {
    /// Creates an idle manager targeting the default connection.
    pub fn new(db: &'db ConnectionRegistry) -> Self {
        Self {
            db,
            connection: None,
            principal: Box::new(NoPrincipal),
            active: None,
            transaction: None,
        }
    }

    /// Creates an idle manager using the configured connection selector.
    pub fn from_config(db: &'db ConnectionRegistry, config: &ChangelogConfig) -> Self {
        let mut manager = Self::new(db);
        manager.set_connection(config.connection.as_deref());
        manager
    }

    /// Replaces the principal resolver used by the next change.
    pub fn set_principal_resolver(
        &mut self,
        resolver: impl PrincipalResolver + 'db,
    ) -> &mut Self {
        self.principal = Box::new(resolver);
        self
    }

    /// Selects the connection transactions run on; `None` is the default.
    ///
    /// Unknown names surface as `UnknownConnection` on the next begin.
    pub fn set_connection(&mut self, name: Option<&str>) -> &mut Self {
        self.connection = name.map(str::to_string);
        self
    }

    pub fn connection_name(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    /// Open change row as of `begin`.
    pub fn current_change(&self) -> Option<&ChangeRecord> {
        self.active.as_ref()
    }

    /// Id of the open change, if any.
    pub fn current_change_id(&self) -> Option<ChangeId> {
        self.active.as_ref().map(|change| change.id)
    }

    /// Whether this manager owns an open transaction.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Opens a change and, when `use_transaction`, a transaction with it.
    ///
    /// # Errors
    /// - `SessionAlreadyActive` when a change is open.
    /// - `UnknownConnection` when the selected connection is not registered.
    /// - `TransactionAlreadyActive` when the default connection is inside a
    ///   foreign transaction, or a transaction is requested while the target
    ///   connection already holds one.
    pub fn begin(
        &mut self,
        request: &ChangeRequest,
        use_transaction: bool,
    ) -> ChangeResult<ChangeId> {
        let target = self.check_can_open(use_transaction)?;
        let change = self.insert_pending(request)?;
        let change_id = change.id;

        if use_transaction {
            match Transaction::new_unchecked(target, TransactionBehavior::Immediate) {
                Ok(tx) => self.transaction = Some(tx),
                Err(err) => {
                    self.finish_quietly(change_id, ChangeStatus::Failed);
                    return Err(err.into());
                }
            }
        }

        self.active = Some(change);
        info!(
            "event=change_begin module=change status=ok change_id={change_id} transaction={use_transaction}"
        );
        Ok(change_id)
    }

    /// Commits the open change's transaction and marks the change `complete`.
    ///
    /// If the status write fails the change stays open and `commit` may be
    /// called again. If the transaction commit fails the transaction is
    /// rolled back, the change is marked `failed` and the manager returns to
    /// idle.
    pub fn commit(&mut self) -> ChangeResult<()> {
        let change_id = self
            .current_change_id()
            .ok_or(ChangeError::NoActiveSession)?;

        if let Some(tx) = self.transaction.take() {
            // On the default connection the status write rides in the
            // transaction; a failed commit rolls it back to `pending`.
            if self.connection.is_none() {
                let marked = self.changes().finish_change(change_id, ChangeStatus::Complete);
                if let Err(err) = marked {
                    self.transaction = Some(tx);
                    return Err(err.into());
                }
            }
            if let Err(err) = tx.commit() {
                self.active = None;
                self.finish_quietly(change_id, ChangeStatus::Failed);
                return Err(err.into());
            }
            if self.connection.is_some() {
                self.changes().finish_change(change_id, ChangeStatus::Complete)?;
            }
        } else {
            self.changes().finish_change(change_id, ChangeStatus::Complete)?;
        }

        self.active = None;
        info!("event=change_commit module=change status=ok change_id={change_id}");
        Ok(())
    }

    /// Rolls back the transaction (if any), then marks the change `failed`.
    ///
    /// The manager is idle afterwards even when an error is returned.
    pub fn roll_back(&mut self) -> ChangeResult<()> {
        let change_id = self
            .current_change_id()
            .ok_or(ChangeError::NoActiveSession)?;

        let rolled_back = match self.transaction.take() {
            Some(tx) => tx.rollback().map_err(ChangeError::from),
            None => Ok(()),
        };
        let marked = self
            .changes()
            .finish_change(change_id, ChangeStatus::Failed)
            .map(|_| ())
            .map_err(ChangeError::from);
        self.active = None;

        let status = if rolled_back.is_ok() && marked.is_ok() {
            "ok"
        } else {
            "error"
        };
        info!("event=change_roll_back module=change status={status} change_id={change_id}");
        rolled_back.and(marked)
    }

    /// Runs `work` inside a change.
    ///
    /// With `attempts > 0` every attempt runs in its own transaction on the
    /// selected connection; failures whose `is_transient()` is true are
    /// retried until `attempts` is exhausted. With `attempts == 0` the work
    /// runs once without any transaction.
    ///
    /// The change ends `complete` with `work`'s value, or `failed` with
    /// `work`'s own error returned unchanged.
    pub fn run_in_session<T, E, F>(
        &mut self,
        request: &ChangeRequest,
        attempts: u32,
        mut work: F,
    ) -> Result<T, E>
    where
        F: FnMut(&ChangeScope<'_>) -> Result<T, E>,
        E: From<ChangeError> + TransientFailure,
    {
        let transactional = attempts > 0;
        let conn = self.check_can_open(transactional)?;
        let change = self.insert_pending(request)?;
        let change_id = change.id;
        self.active = Some(change);
        info!(
            "event=change_run module=change status=start change_id={change_id} attempts={attempts}"
        );

        let changes = self.changes();
        let guard = OpenChange {
            slot: &mut self.active,
            changes,
            change_id,
            settled: false,
        };

        let outcome = if transactional {
            run_with_retries(conn, change_id, attempts, &mut work)
        } else {
            work(&ChangeScope {
                conn,
                change_id,
                attempt: 1,
            })
        };

        let status = if outcome.is_ok() {
            ChangeStatus::Complete
        } else {
            ChangeStatus::Failed
        };
        let settled = guard.settle(status);
        info!(
            "event=change_run module=change status={} change_id={change_id}",
            status.as_str()
        );

        let value = outcome?;
        settled.map_err(ChangeError::from)?;
        Ok(value)
    }

    /// Resolves the target connection for a new change.
    fn check_can_open(&self, transactional: bool) -> ChangeResult<&'db Connection> {
        if self.active.is_some() {
            return Err(ChangeError::SessionAlreadyActive);
        }
        let target = self.target_connection()?;

        // Idle managers own no transaction, so any open one is foreign.
        let db: &'db ConnectionRegistry = self.db;
        if !db.default_connection().is_autocommit() {
            return Err(ChangeError::TransactionAlreadyActive);
        }
        if transactional && !target.is_autocommit() {
            return Err(ChangeError::TransactionAlreadyActive);
        }
        Ok(target)
    }

    fn target_connection(&self) -> ChangeResult<&'db Connection> {
        let db: &'db ConnectionRegistry = self.db;
        db.connection(self.connection.as_deref()).ok_or_else(|| {
            ChangeError::UnknownConnection(self.connection.clone().unwrap_or_default())
        })
    }

    fn changes(&self) -> SqliteChangeRepository<'db> {
        let db: &'db ConnectionRegistry = self.db;
        SqliteChangeRepository::new(db.default_connection())
    }

    fn insert_pending(&self, request: &ChangeRequest) -> ChangeResult<ChangeRecord> {
        let user_id = self.principal.resolve_principal();
        let change = self
            .changes()
            .create_change(&NewChange::from_request(request, user_id))?;
        Ok(change)
    }

    fn finish_quietly(&self, change_id: ChangeId, status: ChangeStatus) {
        if let Err(err) = self.changes().finish_change(change_id, status) {
            warn!(
                "event=change_finalize module=change status=error change_id={change_id} target={} error={err}",
                status.as_str()
            );
        }
    }
}

impl ChangeContext for ChangeManager<'_> {
    fn current_change_id(&self) -> Option<ChangeId> {
        ChangeManager::current_change_id(self)
    }
}

impl Drop for ChangeManager<'_> {
    fn drop(&mut self) {
        if let Some(change_id) = self.current_change_id() {
            warn!("event=change_abandoned module=change status=rolled_back change_id={change_id}");
            if let Err(err) = self.roll_back() {
                warn!(
                    "event=change_abandoned module=change status=error change_id={change_id} error={err}"
                );
            }
        }
    }
}

/// Open change owned by `run_in_session` until its final status write.
///
/// Dropping it unsettled (unwinding out of the unit of work) marks the
/// change `failed` and clears the manager's slot.
struct OpenChange<'a, 'db> {
    slot: &'a mut Option<ChangeRecord>,
    changes: SqliteChangeRepository<'db>,
    change_id: ChangeId,
    settled: bool,
}

impl OpenChange<'_, '_> {
    fn settle(mut self, status: ChangeStatus) -> RepoResult<ChangeRecord> {
        self.settled = true;
        let result = self.changes.finish_change(self.change_id, status);
        *self.slot = None;
        result
    }
}

impl Drop for OpenChange<'_, '_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(
            "event=change_abandoned module=change status=failed change_id={}",
            self.change_id
        );
        if let Err(err) = self
            .changes
            .finish_change(self.change_id, ChangeStatus::Failed)
        {
            warn!(
                "event=change_abandoned module=change status=error change_id={} error={err}",
                self.change_id
            );
        }
        *self.slot = None;
    }
}

fn run_with_retries<T, E, F>(
    conn: &Connection,
    change_id: ChangeId,
    attempts: u32,
    work: &mut F,
) -> Result<T, E>
where
    F: FnMut(&ChangeScope<'_>) -> Result<T, E>,
    E: From<ChangeError> + TransientFailure,
{
    let mut attempt = 1;
    loop {
        let failure = match Transaction::new_unchecked(conn, TransactionBehavior::Immediate) {
            Err(err) => E::from(ChangeError::from(err)),
            Ok(tx) => {
                let result = work(&ChangeScope {
                    conn: &tx,
                    change_id,
                    attempt,
                });
                match result {
                    Ok(value) => match tx.commit() {
                        Ok(()) => return Ok(value),
                        Err(err) => E::from(ChangeError::from(err)),
                    },
                    Err(err) => {
                        if let Err(rollback_err) = tx.rollback() {
                            warn!(
                                "event=change_retry module=change status=rollback_error change_id={change_id} attempt={attempt} error={rollback_err}"
                            );
                        }
                        err
                    }
                }
            }
        };

        if attempt < attempts && failure.is_transient() {
            warn!(
                "event=change_retry module=change status=retrying change_id={change_id} attempt={attempt} attempts={attempts}"
            );
            attempt += 1;
            continue;
        }
        return Err(failure);
    }
}
