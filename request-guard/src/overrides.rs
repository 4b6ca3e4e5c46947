use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Whether the request body takes part in the request key
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BodyInclusion {
    /// Decided by the configured include-body methods
    #[default]
    Inherit,
    Include,
    Exclude,
}

impl BodyInclusion {
    pub fn resolve(self, default: bool) -> bool {
        match self {
            BodyInclusion::Inherit => default,
            BodyInclusion::Include => true,
            BodyInclusion::Exclude => false,
        }
    }
}

/// Per-request adjustments to identity computation.
///
/// Attached by the caller right before a request is sent, read once by the
/// guard and dropped with the request.
#[derive(Clone, Debug, PartialEq, Eq, Getters, CopyGetters)]
pub struct RequestOverride {
    /// Used verbatim as the request identity when present
    #[getset(get = "pub")]
    explicit_key: Option<String>,
    #[getset(get_copy = "pub")]
    include_body: BodyInclusion,
    /// `false` sends the request straight to the transport
    #[getset(get_copy = "pub")]
    dedupe_enabled: bool,
}

impl Default for RequestOverride {
    fn default() -> Self {
        Self {
            explicit_key: None,
            include_body: BodyInclusion::Inherit,
            dedupe_enabled: true,
        }
    }
}

impl RequestOverride {
    /// Opts the request out of dedup and caching
    pub fn bypass() -> Self {
        Self {
            dedupe_enabled: false,
            ..Default::default()
        }
    }

    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            explicit_key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn with_body_inclusion(mut self, include_body: BodyInclusion) -> Self {
        self.include_body = include_body;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_inclusion_resolution() {
        assert!(BodyInclusion::Inherit.resolve(true));
        assert!(!BodyInclusion::Inherit.resolve(false));
        assert!(BodyInclusion::Include.resolve(false));
        assert!(!BodyInclusion::Exclude.resolve(true));
    }

    #[test]
    fn test_inclusion_parses_from_config_strings() {
        assert_eq!(
            BodyInclusion::from_str("include").unwrap(),
            BodyInclusion::Include
        );
        assert_eq!(BodyInclusion::Exclude.to_string(), "exclude");
    }

    #[test]
    fn test_builders() {
        let bypass = RequestOverride::bypass();
        assert!(!bypass.dedupe_enabled());
        assert!(bypass.explicit_key().is_none());

        let keyed =
            RequestOverride::with_key("profile").with_body_inclusion(BodyInclusion::Exclude);
        assert!(keyed.dedupe_enabled());
        assert_eq!(keyed.explicit_key().as_deref(), Some("profile"));
        assert_eq!(keyed.include_body(), BodyInclusion::Exclude);
    }
}
