//! The coarse controller lock.
//!
//! Controller state shared between request handlers and background tasks
//! lives behind one readers-writer lock. Components receive the lock as
//! an `Arc<ControllerLock<_>>` instead of reaching for a global, and take
//! the read form for queries and the write form for reconfiguration.
//!
//! The lock is not re-entrant. Code that already holds the write guard
//! passes `&mut T` down to helpers rather than locking again.

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Lock mode, for logs and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

/// A readers-writer lock around controller state.
///
/// Writers are queued fairly, so a steady stream of readers (the health
/// monitor, info queries) cannot starve a join or leave.
#[derive(Debug, Default)]
pub struct ControllerLock<T> {
    inner: RwLock<T>,
}

impl<T> ControllerLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    /// Acquires the shared (read) form.
    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().await
    }

    /// Acquires the exclusive (write) form.
    pub async fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().await
    }

    /// Runs `f` under the read form.
    pub async fn with_read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.read().await;
        f(&guard)
    }

    /// Runs `f` under the write form.
    pub async fn with_write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.write().await;
        f(&mut guard)
    }

    /// Acquires the read form only if no writer holds or waits for the lock.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        self.inner.try_read().ok()
    }

    /// Returns which form, if any, could be acquired right now without
    /// waiting. `None` means a writer holds the lock.
    pub fn available_mode(&self) -> Option<LockMode> {
        if self.inner.try_write().is_ok() {
            Some(LockMode::Write)
        } else if self.inner.try_read().is_ok() {
            Some(LockMode::Read)
        } else {
            None
        }
    }
}
