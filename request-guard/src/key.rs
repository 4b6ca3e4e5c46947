use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker prepended to caller-supplied keys.
///
/// Computed keys are base64 and never contain `:`, so the two key spaces
/// cannot collide.
pub const EXPLICIT_KEY_PREFIX: &str = "explicit:";

/// Identity of a request for dedup and caching purposes.
///
/// Two requests are the same iff their keys are equal.
#[derive(Hash, Eq, PartialEq, Clone, Debug, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    pub(crate) fn computed(digest: String) -> Self {
        RequestKey(digest)
    }

    pub(crate) fn explicit(key: &str) -> Self {
        RequestKey(format!("{EXPLICIT_KEY_PREFIX}{key}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the key was supplied by the caller rather than computed
    pub fn is_explicit(&self) -> bool {
        self.0.starts_with(EXPLICIT_KEY_PREFIX)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
