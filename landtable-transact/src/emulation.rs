//! Consistency emulation
//!
//! Backends without native isolation get a table-wide reader/writer lock held
//! while the primary executes. `STRICT` takes it exclusively, which totally
//! orders all coordinated transactions on the table. `RELAXED` takes it
//! shared, which keeps writers out but lets readers run alongside. `NONE`
//! takes nothing.
//!
//! Guards release on drop, so every exit path gives the lock back.

use crate::error::{Result, TransactionError};
use landtable_backend::TransactionConsistency;
use landtable_core::TableId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

/// Lifecycle of one transaction attempt
///
/// `PENDING → EXECUTING → COMMITTED | ABORTED`; a pending attempt may also
/// abort directly (validation failure, lock timeout).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Executing,
    Committed,
    Aborted,
}

impl AttemptState {
    pub fn can_transition_to(self, next: AttemptState) -> bool {
        matches!(
            (self, next),
            (AttemptState::Pending, AttemptState::Executing)
                | (AttemptState::Pending, AttemptState::Aborted)
                | (AttemptState::Executing, AttemptState::Committed)
                | (AttemptState::Executing, AttemptState::Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Committed | AttemptState::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttemptState::Pending => "PENDING",
            AttemptState::Executing => "EXECUTING",
            AttemptState::Committed => "COMMITTED",
            AttemptState::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transaction attempt and where it is in its lifecycle
#[derive(Debug)]
pub struct Attempt {
    id: Uuid,
    state: AttemptState,
}

impl Default for Attempt {
    fn default() -> Self {
        Self::new()
    }
}

impl Attempt {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: AttemptState::Pending,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn advance(&mut self, next: AttemptState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid attempt transition {} -> {}",
            self.state,
            next
        );
        tracing::trace!(attempt = %self.id, from = %self.state, to = %next, "attempt state");
        self.state = next;
    }

    /// Abort unless already finished
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            self.advance(AttemptState::Aborted);
        }
    }
}

/// How the emulation lock is held
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    Exclusive,
    Shared,
    Unlocked,
}

impl LockMode {
    pub fn for_consistency(consistency: TransactionConsistency) -> Self {
        match consistency {
            TransactionConsistency::Strict => LockMode::Exclusive,
            TransactionConsistency::Relaxed => LockMode::Shared,
            TransactionConsistency::None => LockMode::Unlocked,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LockMode::Exclusive => "exclusive",
            LockMode::Shared => "shared",
            LockMode::Unlocked => "unlocked",
        }
    }
}

/// A held emulation lock; dropping it releases the lock
#[derive(Debug)]
pub enum EmulationGuard {
    Exclusive(OwnedRwLockWriteGuard<()>),
    Shared(OwnedRwLockReadGuard<()>),
    Unlocked,
}

impl EmulationGuard {
    pub fn mode(&self) -> LockMode {
        match self {
            EmulationGuard::Exclusive(_) => LockMode::Exclusive,
            EmulationGuard::Shared(_) => LockMode::Shared,
            EmulationGuard::Unlocked => LockMode::Unlocked,
        }
    }
}

/// Per-table emulation locks
#[derive(Default)]
pub struct TableLocks {
    locks: Mutex<HashMap<TableId, Arc<RwLock<()>>>>,
}

impl fmt::Debug for TableLocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableLocks")
            .field("table_count", &self.locks.lock().len())
            .finish()
    }
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, table: TableId) -> Arc<RwLock<()>> {
        Arc::clone(self.locks.lock().entry(table).or_default())
    }

    /// Acquire the lock `consistency` needs, waiting at most `timeout`
    pub async fn acquire(
        &self,
        table: TableId,
        consistency: TransactionConsistency,
        timeout: Duration,
    ) -> Result<EmulationGuard> {
        let lock = self.lock_for(table);
        let timed_out = |_| TransactionError::LockTimeout {
            table,
            waited: timeout,
        };

        let guard = match LockMode::for_consistency(consistency) {
            LockMode::Exclusive => EmulationGuard::Exclusive(
                tokio::time::timeout(timeout, lock.write_owned())
                    .await
                    .map_err(timed_out)?,
            ),
            LockMode::Shared => EmulationGuard::Shared(
                tokio::time::timeout(timeout, lock.read_owned())
                    .await
                    .map_err(timed_out)?,
            ),
            LockMode::Unlocked => EmulationGuard::Unlocked,
        };
        Ok(guard)
    }

    /// Whether a transaction currently holds the table's lock in any mode
    pub fn is_held(&self, table: TableId) -> bool {
        self.locks
            .lock()
            .get(&table)
            .is_some_and(|lock| lock.try_write().is_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine() {
        use AttemptState::*;
        assert!(Pending.can_transition_to(Executing));
        assert!(Pending.can_transition_to(Aborted));
        assert!(Executing.can_transition_to(Committed));
        assert!(Executing.can_transition_to(Aborted));
        assert!(!Pending.can_transition_to(Committed));
        assert!(!Committed.can_transition_to(Aborted));
        assert!(!Aborted.can_transition_to(Executing));
        assert!(Committed.is_terminal() && Aborted.is_terminal());
        assert!(!Executing.is_terminal());
    }

    #[test]
    fn test_attempt_abort_is_idempotent() {
        let mut attempt = Attempt::new();
        attempt.advance(AttemptState::Executing);
        attempt.advance(AttemptState::Committed);
        attempt.abort();
        assert_eq!(attempt.state(), AttemptState::Committed);

        let mut attempt = Attempt::new();
        attempt.abort();
        assert_eq!(attempt.state(), AttemptState::Aborted);
    }

    #[tokio::test]
    async fn test_strict_excludes_everyone() {
        let locks = TableLocks::new();
        let table = TableId::generate();
        let timeout = Duration::from_millis(20);

        let held = locks
            .acquire(table, TransactionConsistency::Strict, timeout)
            .await
            .unwrap();
        assert_eq!(held.mode(), LockMode::Exclusive);
        assert!(locks.is_held(table));

        for consistency in [TransactionConsistency::Strict, TransactionConsistency::Relaxed] {
            let err = locks.acquire(table, consistency, timeout).await.unwrap_err();
            assert!(matches!(err, TransactionError::LockTimeout { .. }));
        }

        // NONE never waits
        let none = locks
            .acquire(table, TransactionConsistency::None, timeout)
            .await
            .unwrap();
        assert_eq!(none.mode(), LockMode::Unlocked);

        drop(held);
        assert!(!locks.is_held(table));
        locks
            .acquire(table, TransactionConsistency::Strict, timeout)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_relaxed_shares() {
        let locks = TableLocks::new();
        let table = TableId::generate();
        let timeout = Duration::from_millis(20);

        let first = locks
            .acquire(table, TransactionConsistency::Relaxed, timeout)
            .await
            .unwrap();
        let second = locks
            .acquire(table, TransactionConsistency::Relaxed, timeout)
            .await
            .unwrap();
        assert_eq!(second.mode(), LockMode::Shared);

        assert!(locks
            .acquire(table, TransactionConsistency::Strict, timeout)
            .await
            .is_err());
        drop((first, second));
        assert!(!locks.is_held(table));
    }

    #[tokio::test]
    async fn test_tables_are_independent() {
        let locks = TableLocks::new();
        let timeout = Duration::from_millis(20);
        let _users = locks
            .acquire(TableId::generate(), TransactionConsistency::Strict, timeout)
            .await
            .unwrap();
        locks
            .acquire(TableId::generate(), TransactionConsistency::Strict, timeout)
            .await
            .unwrap();
    }
}
