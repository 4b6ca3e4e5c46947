//! Advisory notifications about what the guard did with each request.
//!
//! Observers never influence the outcome of a request.

use crate::key::RequestKey;
use std::fmt;
use std::sync::Mutex;
use strum_macros::{AsRefStr, Display};

/// Why a request skipped dedup and caching
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum BypassReason {
    /// The guard is disabled by configuration
    Disabled,
    /// The caller opted out with a [`RequestOverride`](crate::overrides::RequestOverride)
    Override,
    /// The method is not configured for dedup
    IneligibleMethod,
    /// No request key could be computed
    HashUnavailable,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardEvent {
    ServedFromCache(RequestKey),
    Coalesced(RequestKey),
    Executed(RequestKey),
    Bypassed(BypassReason),
}

impl fmt::Display for GuardEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardEvent::ServedFromCache(key) => write!(f, "served from cache {key}"),
            GuardEvent::Coalesced(key) => write!(f, "coalesced {key}"),
            GuardEvent::Executed(key) => write!(f, "executing {key}"),
            GuardEvent::Bypassed(reason) => write!(f, "bypassing ({reason})"),
        }
    }
}

impl GuardEvent {
    pub fn key(&self) -> Option<&RequestKey> {
        match self {
            GuardEvent::ServedFromCache(key)
            | GuardEvent::Coalesced(key)
            | GuardEvent::Executed(key) => Some(key),
            GuardEvent::Bypassed(_) => None,
        }
    }
}

pub trait GuardObserver: Send + Sync {
    fn on_event(&self, event: &GuardEvent);
}

/// Forwards events to the `log` facade
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl GuardObserver for LogObserver {
    fn on_event(&self, event: &GuardEvent) {
        match event {
            GuardEvent::Bypassed(BypassReason::HashUnavailable) => log::warn!("{}", event),
            _ => log::info!("{}", event),
        }
    }
}

/// Keeps every event in memory, in the order observed
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<GuardEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GuardEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Events recorded for `key`
    pub fn events_for(&self, key: &RequestKey) -> Vec<GuardEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.key() == Some(key))
            .collect()
    }
}

impl GuardObserver for RecordingObserver {
    fn on_event(&self, event: &GuardEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_rendering() {
        let key = RequestKey::explicit("k");
        assert_eq!(
            GuardEvent::Coalesced(key.clone()).to_string(),
            "coalesced explicit:k"
        );
        assert_eq!(
            GuardEvent::Bypassed(BypassReason::IneligibleMethod).to_string(),
            "bypassing (ineligible-method)"
        );
        assert_eq!(BypassReason::HashUnavailable.as_ref(), "hash-unavailable");
    }

    #[test]
    fn test_recording_observer_filters_by_key() {
        let observer = RecordingObserver::new();
        let a = RequestKey::explicit("a");
        let b = RequestKey::explicit("b");
        observer.on_event(&GuardEvent::Executed(a.clone()));
        observer.on_event(&GuardEvent::Executed(b.clone()));
        observer.on_event(&GuardEvent::Coalesced(a.clone()));
        observer.on_event(&GuardEvent::Bypassed(BypassReason::Override));

        assert_eq!(observer.events().len(), 4);
        assert_eq!(
            observer.events_for(&a),
            vec![GuardEvent::Executed(a.clone()), GuardEvent::Coalesced(a)]
        );
    }
}
