use crate::key::RequestKey;
use dashmap::{mapref::entry::Entry, DashMap};
use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

type OutcomeChannel<T> = Shared<oneshot::Receiver<T>>;

/// Represents a running execution
struct InFlightEntry<T> {
    claim_id: u64,
    outcome: OutcomeChannel<T>,
    waiters: Arc<AtomicUsize>,
}

/// In-flight call coalescing.
///
/// For every key at most one caller holds a [`Claim`] at any instant. All
/// other callers for that key join it and receive the claimer's outcome.
pub struct InFlightRegistry<T> {
    /// Map of request keys to running executions
    pending: DashMap<RequestKey, InFlightEntry<T>>,
    next_claim_id: AtomicU64,
}

/// Result of [`InFlightRegistry::claim_or_join`]
pub enum ClaimOrJoin<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    /// The caller must execute the request and complete the claim
    Claimed(Claim<'a, T>),
    /// Another caller is executing the request
    Joined(Waiter<T>),
}

/// The claimer was dropped before completing its claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("claimer dropped before publishing an outcome")]
pub struct Abandoned;

/// A second claim was observed for the key being released
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("in-flight entry is owned by another claim")]
pub struct ForeignClaim;

impl<T> Default for InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_claim_id: AtomicU64::new(0),
        }
    }

    /// Atomically claim `key` or join the caller that already holds it
    pub fn claim_or_join(&self, key: &RequestKey) -> ClaimOrJoin<'_, T> {
        match self.pending.entry(key.clone()) {
            Entry::Occupied(entry) => {
                entry.get().waiters.fetch_add(1, Ordering::Relaxed);
                ClaimOrJoin::Joined(Waiter {
                    outcome: entry.get().outcome.clone(),
                    waiters: Arc::clone(&entry.get().waiters),
                })
            }
            Entry::Vacant(entry) => {
                let claim_id = self.next_claim_id.fetch_add(1, Ordering::Relaxed);
                let (sender, receiver) = oneshot::channel();
                entry.insert(InFlightEntry {
                    claim_id,
                    outcome: receiver.shared(),
                    waiters: Arc::new(AtomicUsize::new(0)),
                });
                ClaimOrJoin::Claimed(Claim {
                    registry: self,
                    key: key.clone(),
                    claim_id,
                    sender: Some(sender),
                })
            }
        }
    }

    /// Removes the entry for `key` if `claim_id` owns it
    fn release(&self, key: &RequestKey, claim_id: u64) -> Result<(), ForeignClaim> {
        if self
            .pending
            .remove_if(key, |_, entry| entry.claim_id == claim_id)
            .is_some()
        {
            return Ok(());
        }
        if self.pending.contains_key(key) {
            log::error!("In-flight entry for key {} is owned by another claim", key);
            return Err(ForeignClaim);
        }
        Ok(())
    }

    /// Whether an execution is currently running for `key`
    pub fn is_pending(&self, key: &RequestKey) -> bool {
        self.pending.contains_key(key)
    }

    /// Get statistics about pending requests
    pub fn stats(&self) -> InFlightStats {
        let pending_requests = self.pending.len();
        let total_waiters = self
            .pending
            .iter()
            .map(|entry| entry.value().waiters.load(Ordering::Relaxed))
            .sum();

        InFlightStats {
            pending_requests,
            total_waiters,
        }
    }
}

/// Ownership of one running execution.
///
/// Dropping a claim without completing it retires the entry and resolves
/// every waiter with [`Abandoned`].
pub struct Claim<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    registry: &'a InFlightRegistry<T>,
    key: RequestKey,
    claim_id: u64,
    sender: Option<oneshot::Sender<T>>,
}

impl<T> Claim<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    /// Retires the entry and publishes `outcome` to every waiter
    pub fn complete(mut self, outcome: T) -> Result<(), ForeignClaim> {
        let released = self.registry.release(&self.key, self.claim_id);
        if let Some(sender) = self.sender.take() {
            // No waiter left is not an error
            let _ = sender.send(outcome);
        }
        released
    }
}

impl<T> Drop for Claim<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.sender.is_some() {
            log::debug!("Claim for key {} dropped before completion", self.key);
            let _ = self.registry.release(&self.key, self.claim_id);
            // Dropping the sender resolves the waiters as abandoned
            self.sender.take();
        }
    }
}

/// Handle of a caller that joined a running execution
pub struct Waiter<T> {
    outcome: OutcomeChannel<T>,
    waiters: Arc<AtomicUsize>,
}

impl<T: Clone> Waiter<T> {
    /// Suspends until the claimer publishes its outcome.
    ///
    /// Dropping the waiter does not affect the claimer.
    pub async fn wait(self) -> Result<T, Abandoned> {
        self.outcome.clone().await.map_err(|_| Abandoned)
    }
}

impl<T> Drop for Waiter<T> {
    fn drop(&mut self) {
        self.waiters.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Statistics for in-flight requests
#[derive(Debug, Clone, Serialize)]
pub struct InFlightStats {
    pub pending_requests: usize,
    pub total_waiters: usize,
}
