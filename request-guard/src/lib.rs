//! Client-side request deduplication and short-term response caching.
//!
//! A [`Guard`] sits in front of a transport. Identical requests issued
//! concurrently share one network execution, and cacheable responses are
//! replayed for a short window.

pub mod cache;
pub mod canonical;
pub mod config;
mod error;
pub mod guard;
pub mod hasher;
pub mod identity;
pub mod inflight;
mod key;
pub mod observer;
pub mod overrides;
pub mod request;
pub mod response;
pub mod transport;


pub use cache::{CacheStats, SharedTtlCache, TtlCache};
pub use config::GuardConfig;
pub use error::{ConfigError, GuardError, HashError, IdentityError};
pub use guard::{Admission, Guard, GuardStats};
pub use hasher::{KeyHasher, Sha256Hasher};
pub use identity::IdentityBuilder;
pub use inflight::{InFlightRegistry, InFlightStats};
pub use key::{RequestKey, EXPLICIT_KEY_PREFIX};
pub use observer::{BypassReason, GuardEvent, GuardObserver, LogObserver, RecordingObserver};
pub use overrides::{BodyInclusion, RequestOverride};
pub use request::{RequestBody, RequestDescriptor};
pub use response::{HttpResponse, ResponseHandle, ResponseSnapshot};
pub use transport::{GuardedClient, Transport};
