// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user request gate.
//!
//! Each user id maps to one `tokio::sync::Mutex<()>` created lazily on first
//! contact. DashMap's entry API serializes insertion, so two concurrent first
//! contacts from the same user end up sharing one permit. Entries live for
//! the process lifetime.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use parley_core::types::UserId;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Proof that the holder is the only in-flight request for `user`.
///
/// Dropping the permit releases it, on every exit path.
#[derive(Debug)]
pub struct GatePermit {
    user: UserId,
    _guard: OwnedMutexGuard<()>,
}

impl GatePermit {
    pub fn user(&self) -> UserId {
        self.user
    }
}

/// Registry of per-user permits.
#[derive(Debug, Default)]
pub struct RequestGate {
    permits: DashMap<UserId, Arc<Mutex<()>>>,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn permit_for(&self, user: UserId) -> Arc<Mutex<()>> {
        self.permits
            .entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Non-blocking acquire. `None` means a request for `user` is in flight.
    pub fn try_enter(&self, user: UserId) -> Option<GatePermit> {
        let guard = self.permit_for(user).try_lock_owned().ok()?;
        trace!(user_id = user.0, "gate entered");
        Some(GatePermit {
            user,
            _guard: guard,
        })
    }

    /// Waits until the permit for `user` is free, then takes it.
    pub async fn acquire(&self, user: UserId) -> GatePermit {
        let guard = self.permit_for(user).lock_owned().await;
        trace!(user_id = user.0, "gate acquired");
        GatePermit {
            user,
            _guard: guard,
        }
    }

    /// Runs `action` while holding the permit for `user`, queueing behind
    /// any request already in flight.
    pub async fn run_exclusive<F, Fut, T>(&self, user: UserId, action: F) -> T
    where
        F: FnOnce(GatePermit) -> Fut,
        Fut: Future<Output = T>,
    {
        let permit = self.acquire(user).await;
        action(permit).await
    }

    /// True while some request for `user` holds the permit.
    pub fn is_busy(&self, user: UserId) -> bool {
        self.permits
            .get(&user)
            .is_some_and(|permit| permit.try_lock().is_err())
    }

    /// Number of users seen since start.
    pub fn len(&self) -> usize {
        self.permits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn second_try_enter_is_refused_until_release() {
        let gate = RequestGate::new();
        let first = gate.try_enter(UserId(1)).unwrap();
        assert!(gate.try_enter(UserId(1)).is_none());
        assert!(gate.is_busy(UserId(1)));

        drop(first);
        assert!(!gate.is_busy(UserId(1)));
        assert!(gate.try_enter(UserId(1)).is_some());
    }

    #[test]
    fn users_do_not_block_each_other() {
        let gate = RequestGate::new();
        let _a = gate.try_enter(UserId(1)).unwrap();
        assert!(gate.try_enter(UserId(2)).is_some());
        assert_eq!(gate.len(), 2);
    }

    #[tokio::test]
    async fn run_exclusive_waits_for_the_holder() {
        let gate = Arc::new(RequestGate::new());
        let held = gate.try_enter(UserId(7)).unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.run_exclusive(UserId(7), |_permit| async { 42 }).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap(), 42);
        assert!(!gate.is_busy(UserId(7)));
    }

    #[tokio::test]
    async fn permit_is_released_when_the_action_fails() {
        let gate = RequestGate::new();
        let result: Result<(), &str> = gate
            .run_exclusive(UserId(3), |_permit| async { Err("boom") })
            .await;
        assert!(result.is_err());
        assert!(gate.try_enter(UserId(3)).is_some());
    }

    #[tokio::test]
    async fn concurrent_first_contacts_share_one_permit() {
        let gate = Arc::new(RequestGate::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.try_enter(UserId(99)).map(|permit| {
                    std::thread::sleep(Duration::from_millis(5));
                    permit.user()
                })
            }));
        }
        let mut entered = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                entered += 1;
            }
        }
        assert!(entered >= 1);
        assert_eq!(gate.len(), 1);
    }
}
