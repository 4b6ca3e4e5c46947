use crate::{
    cache::{CacheStats, TtlCache},
    config::GuardConfig,
    error::{ConfigError, GuardError, IdentityError},
    hasher::{KeyHasher, Sha256Hasher},
    identity::IdentityBuilder,
    inflight::{Abandoned, ClaimOrJoin, InFlightRegistry, InFlightStats},
    key::RequestKey,
    observer::{BypassReason, GuardEvent, GuardObserver},
    overrides::RequestOverride,
    request::RequestDescriptor,
    response::{HttpResponse, ResponseHandle, ResponseSnapshot},
};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What one physical execution produced, shared with every joiner
type Outcome<E> = Result<ResponseHandle, Arc<E>>;

/// Decision taken for a request before anything is sent
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Send straight to the transport
    Bypass(BypassReason),
    /// Serve through the cache and the in-flight registry under this key
    Guarded(RequestKey),
}

#[derive(Default)]
struct Counters {
    executed: AtomicU64,
    coalesced: AtomicU64,
    served_from_cache: AtomicU64,
    bypassed: AtomicU64,
}

/// Statistics for the guard
#[derive(Debug, Clone, Serialize)]
pub struct GuardStats {
    pub executed: u64,
    pub coalesced: u64,
    pub served_from_cache: u64,
    pub bypassed: u64,
    pub cache: CacheStats,
    pub in_flight: InFlightStats,
}

/// Request interceptor combining the response cache and in-flight coalescing.
///
/// `E` is the failure type of the transport the guard sits in front of.
pub struct Guard<E> {
    config: GuardConfig,
    identity: IdentityBuilder,
    inflight: InFlightRegistry<Outcome<E>>,
    cache: Arc<TtlCache>,
    observer: Option<Arc<dyn GuardObserver>>,
    counters: Counters,
}

impl<E> Guard<E>
where
    E: Send + Sync + 'static,
{
    /// Create a guard keyed with SHA-256
    pub fn new(config: GuardConfig) -> Result<Self, ConfigError> {
        Self::with_hasher(config, Arc::new(Sha256Hasher))
    }

    pub fn with_hasher(
        config: GuardConfig,
        hasher: Arc<dyn KeyHasher>,
    ) -> Result<Self, ConfigError> {
        let config = config.validate()?;
        log::info!(
            "Initialized request guard (window: {:?}, enabled: {})",
            config.window,
            config.enabled
        );
        Ok(Self {
            identity: IdentityBuilder::new(&config, hasher),
            config,
            inflight: InFlightRegistry::new(),
            cache: Arc::new(TtlCache::new()),
            observer: None,
            counters: Counters::default(),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn GuardObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn compute_key(
        &self,
        request: &RequestDescriptor,
        overrides: Option<&RequestOverride>,
    ) -> Result<RequestKey, IdentityError> {
        self.identity.compute_key(request, overrides)
    }

    /// Intercepts one outgoing request.
    ///
    /// `proceed` performs the network round trip. It is invoked at most once,
    /// and not at all when the response is served from the cache or by a
    /// duplicate already in flight.
    pub async fn on_send<F, Fut>(
        &self,
        request: &RequestDescriptor,
        overrides: Option<&RequestOverride>,
        proceed: F,
    ) -> Result<HttpResponse, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<HttpResponse, E>>,
    {
        match self.admit(request, overrides)? {
            Admission::Bypass(_) => proceed().await.map_err(GuardError::transport),
            Admission::Guarded(key) => self.run_guarded(key, proceed).await,
        }
    }

    /// Checks overrides and method eligibility, then computes the key
    pub fn admit(
        &self,
        request: &RequestDescriptor,
        overrides: Option<&RequestOverride>,
    ) -> Result<Admission, GuardError<E>> {
        let bypass = if !self.config.enabled {
            Some(BypassReason::Disabled)
        } else if overrides.is_some_and(|o| !o.dedupe_enabled()) {
            Some(BypassReason::Override)
        } else if !self.config.is_eligible(request.method()) {
            Some(BypassReason::IneligibleMethod)
        } else {
            None
        };
        if let Some(reason) = bypass {
            self.record(GuardEvent::Bypassed(reason));
            return Ok(Admission::Bypass(reason));
        }

        match self.identity.compute_key(request, overrides) {
            Ok(key) => Ok(Admission::Guarded(key)),
            Err(IdentityError::Hash(err)) => {
                log::warn!(
                    "Cannot compute key for {} {}: {}",
                    request.method(),
                    request.url(),
                    err
                );
                self.record(GuardEvent::Bypassed(BypassReason::HashUnavailable));
                Ok(Admission::Bypass(BypassReason::HashUnavailable))
            }
            Err(IdentityError::UnhashableBody { kind }) => Err(GuardError::UnhashableBody { kind }),
        }
    }

    /// Serves `key` from the cache, from a running duplicate, or by executing
    /// `proceed` and recording the result
    pub async fn run_guarded<F, Fut>(
        &self,
        key: RequestKey,
        proceed: F,
    ) -> Result<HttpResponse, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<HttpResponse, E>>,
    {
        if let Some(handle) = self.cache.lookup(&key, Instant::now()) {
            self.record(GuardEvent::ServedFromCache(key));
            return Ok(handle.readable_copy());
        }

        let claim = match self.inflight.claim_or_join(&key) {
            ClaimOrJoin::Claimed(claim) => claim,
            ClaimOrJoin::Joined(waiter) => {
                self.record(GuardEvent::Coalesced(key.clone()));
                return match waiter.wait().await {
                    Ok(Ok(handle)) => Ok(handle.readable_copy()),
                    Ok(Err(err)) => Err(GuardError::Transport(err)),
                    Err(Abandoned) => Err(GuardError::Cancelled(key)),
                };
            }
        };

        // A previous claimer may have stored the response between our lookup and claim
        if let Some(handle) = self.cache.lookup(&key, Instant::now()) {
            self.record(GuardEvent::ServedFromCache(key.clone()));
            let response = handle.readable_copy();
            claim
                .complete(Ok(handle))
                .map_err(|_| GuardError::InvariantViolation(key))?;
            return Ok(response);
        }

        self.record(GuardEvent::Executed(key.clone()));
        let outcome: Outcome<E> = match proceed().await {
            Ok(response) => {
                let handle: ResponseHandle = Arc::new(ResponseSnapshot::from(response));
                self.store(&key, &handle);
                Ok(handle)
            }
            Err(err) => Err(Arc::new(err)),
        };

        claim
            .complete(outcome.clone())
            .map_err(|_| GuardError::InvariantViolation(key))?;
        outcome
            .map(|handle| handle.readable_copy())
            .map_err(GuardError::Transport)
    }

    fn store(&self, key: &RequestKey, handle: &ResponseHandle) {
        if self.config.window.is_zero() {
            return;
        }
        if !self.config.is_cacheable(handle.status()) {
            log::debug!(
                "Not caching status {} for key: {}",
                handle.status(),
                key
            );
            return;
        }
        self.cache.insert(
            key.clone(),
            Arc::clone(handle),
            Instant::now() + self.config.window,
        );
    }

    fn record(&self, event: GuardEvent) {
        let counter = match &event {
            GuardEvent::ServedFromCache(_) => &self.counters.served_from_cache,
            GuardEvent::Coalesced(_) => &self.counters.coalesced,
            GuardEvent::Executed(_) => &self.counters.executed,
            GuardEvent::Bypassed(_) => &self.counters.bypassed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        log::debug!("{}", event);
        if let Some(observer) = &self.observer {
            observer.on_event(&event);
        }
    }

    /// Whether an execution is currently running for `key`
    pub fn is_in_flight(&self, key: &RequestKey) -> bool {
        self.inflight.is_pending(key)
    }

    /// Get statistics about the guard
    pub fn stats(&self) -> GuardStats {
        GuardStats {
            executed: self.counters.executed.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            served_from_cache: self.counters.served_from_cache.load(Ordering::Relaxed),
            bypassed: self.counters.bypassed.load(Ordering::Relaxed),
            cache: self.cache.stats(Instant::now()),
            in_flight: self.inflight.stats(),
        }
    }

    /// Clear cached responses
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Evict expired cached responses
    pub fn evict_expired_cache(&self) -> usize {
        self.cache.evict_expired(Instant::now())
    }

    /// Starts the background sweep when `sweep_interval` is configured.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        self.config
            .sweep_interval
            .map(|interval| self.cache.spawn_sweeper(interval))
    }
}
