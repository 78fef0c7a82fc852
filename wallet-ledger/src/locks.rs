//! Per-user mutual exclusion
//!
//! Every read-check-write-append sequence on a wallet runs while holding
//! that user's [`WalletGuard`]. Guards for different users never contend.
//! Entries are dropped from the table once no task holds or waits on them.

use crate::types::UserId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<UserId, Arc<Mutex<()>>>;

/// Table of per-user locks
#[derive(Debug, Default, Clone)]
pub struct UserLocks {
    table: Arc<LockTable>,
}

impl UserLocks {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one user's wallet
    pub async fn acquire(&self, user_id: &UserId) -> WalletGuard {
        let mutex = self
            .table
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = mutex.lock_owned().await;

        WalletGuard {
            user_id: user_id.clone(),
            guard: Some(guard),
            table: Arc::clone(&self.table),
        }
    }

    /// Number of users with a live lock entry
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// No live lock entries
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Proof of exclusive access to one user's wallet
#[derive(Debug)]
pub struct WalletGuard {
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<LockTable>,
}

impl WalletGuard {
    /// User this guard locks
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Does this guard cover `user_id`
    pub fn covers(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }
}

impl Drop for WalletGuard {
    fn drop(&mut self) {
        // Release before checking, so our own Arc is gone from the count
        drop(self.guard.take());
        // Only the table holds it: nobody owns or waits on this lock
        self.table
            .remove_if(&self.user_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_user_is_exclusive() {
        let locks = UserLocks::new();
        let alice = UserId::new("alice");

        let guard = locks.acquire(&alice).await;
        assert!(guard.covers(&alice));

        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&alice)).await;
        assert!(second.is_err(), "second guard for the same user must wait");

        drop(guard);
        let second = tokio::time::timeout(Duration::from_millis(500), locks.acquire(&alice)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let locks = UserLocks::new();

        let _alice = locks.acquire(&UserId::new("alice")).await;
        let bob = tokio::time::timeout(
            Duration::from_millis(500),
            locks.acquire(&UserId::new("bob")),
        )
        .await;

        assert!(bob.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_entries_are_removed() {
        let locks = UserLocks::new();

        {
            let _guard = locks.acquire(&UserId::new("alice")).await;
            assert_eq!(locks.len(), 1);
        }

        assert!(locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_guard_serializes_increments() {
        let locks = UserLocks::new();
        let counter = Arc::new(std::sync::Mutex::new(0u32));
        let alice = UserId::new("alice");

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let locks = locks.clone();
            let counter = Arc::clone(&counter);
            let alice = alice.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire(&alice).await;
                let read = *counter.lock().unwrap();
                tokio::task::yield_now().await;
                *counter.lock().unwrap() = read + 1;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(*counter.lock().unwrap(), 32);
        assert!(locks.is_empty());
    }
}
