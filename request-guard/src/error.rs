use crate::key::RequestKey;
use std::sync::Arc;

/// Errors produced by a [`KeyHasher`](crate::hasher::KeyHasher)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    /// No digest could be produced. Identity computation cannot continue,
    /// so the guard sends the request without dedup or caching.
    #[error("secure hash unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while computing a request key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error(transparent)]
    Hash(#[from] HashError),
    /// The caller forced the body into the identity but the body cannot be
    /// read twice (one-shot stream or opaque content).
    #[error("request body of kind `{kind}` cannot be included in the request key")]
    UnhashableBody { kind: &'static str },
}

/// Errors raised when validating a [`GuardConfig`](crate::config::GuardConfig)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid method token `{0}`")]
    InvalidMethod(String),
    #[error("invalid header name `{0}`")]
    InvalidHeaderName(String),
}

/// Errors surfaced by the [`Guard`](crate::guard::Guard) to its caller.
///
/// `E` is the transport's own failure type. It is wrapped in an [`Arc`] so
/// that the claimer and every coalesced joiner observe the very same failure.
#[derive(Debug, thiserror::Error)]
pub enum GuardError<E> {
    #[error("transport failure: {0}")]
    Transport(Arc<E>),
    /// The request executing on behalf of this key was dropped before it
    /// produced a result.
    #[error("in-flight request for key {0} was cancelled")]
    Cancelled(RequestKey),
    #[error("request body of kind `{kind}` cannot be included in the request key")]
    UnhashableBody { kind: &'static str },
    /// A second claim was observed for one key. This breaks the single-flight
    /// guarantee and points at a concurrency bug.
    #[error("in-flight registry invariant violated for key {0}")]
    InvariantViolation(RequestKey),
}

impl<E> GuardError<E> {
    pub(crate) fn transport(error: E) -> Self {
        GuardError::Transport(Arc::new(error))
    }

    /// Returns the transport failure, if this error carries one
    pub fn transport_error(&self) -> Option<&E> {
        match self {
            GuardError::Transport(error) => Some(error),
            _ => None,
        }
    }
}

impl<E> Clone for GuardError<E> {
    fn clone(&self) -> Self {
        match self {
            GuardError::Transport(error) => GuardError::Transport(Arc::clone(error)),
            GuardError::Cancelled(key) => GuardError::Cancelled(key.clone()),
            GuardError::UnhashableBody { kind } => GuardError::UnhashableBody { kind },
            GuardError::InvariantViolation(key) => GuardError::InvariantViolation(key.clone()),
        }
    }
}
