use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

/// Configuration for the request guard
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// How long a cacheable response is served from memory
    #[serde(rename = "window_ms", with = "millis")]
    pub window: Duration,
    /// Methods that are deduplicated and cached
    pub dedupe_methods: HashSet<String>,
    /// Methods whose body takes part in the request key.
    /// These are deduplicated and cached as well.
    pub include_body_for_methods: HashSet<String>,
    /// Header names whose values take part in the request key
    pub header_keys_for_key: BTreeSet<String>,
    /// Cache responses regardless of status
    pub cache_non_2xx: bool,
    /// Whether the guard is active at all
    pub enabled: bool,
    /// Interval of the background sweep of expired cache entries
    #[serde(rename = "sweep_interval_ms", with = "millis_opt")]
    pub sweep_interval: Option<Duration>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(2),
            dedupe_methods: ["GET", "HEAD"].into_iter().map(String::from).collect(),
            include_body_for_methods: ["POST", "PUT", "PATCH"]
                .into_iter()
                .map(String::from)
                .collect(),
            header_keys_for_key: ["accept", "authorization"]
                .into_iter()
                .map(String::from)
                .collect(),
            cache_non_2xx: false,
            enabled: true,
            sweep_interval: None,
        }
    }
}

impl GuardConfig {
    /// Create a new configuration with the default method and header sets
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            ..Default::default()
        }
    }

    pub fn with_dedupe_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dedupe_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_include_body_for_methods<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        methods: I,
    ) -> Self {
        self.include_body_for_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_header_keys<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header_keys_for_key = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cache_non_2xx(mut self, cache_non_2xx: bool) -> Self {
        self.cache_non_2xx = cache_non_2xx;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Normalizes method tokens to upper case and header names to lower case
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.dedupe_methods = normalize_methods(self.dedupe_methods)?;
        self.include_body_for_methods = normalize_methods(self.include_body_for_methods)?;
        self.header_keys_for_key = self
            .header_keys_for_key
            .into_iter()
            .map(|name| {
                if is_token(&name) {
                    Ok(name.to_ascii_lowercase())
                } else {
                    Err(ConfigError::InvalidHeaderName(name))
                }
            })
            .collect::<Result<_, _>>()?;
        Ok(self)
    }

    /// Whether requests with `method` go through dedup and caching
    pub fn is_eligible(&self, method: &str) -> bool {
        self.dedupe_methods.contains(method) || self.include_body_for_methods.contains(method)
    }

    pub fn includes_body(&self, method: &str) -> bool {
        self.include_body_for_methods.contains(method)
    }

    /// Whether a response with `status` may be stored
    pub fn is_cacheable(&self, status: u16) -> bool {
        self.cache_non_2xx || (200..300).contains(&status) || status == 304
    }
}

fn normalize_methods(methods: HashSet<String>) -> Result<HashSet<String>, ConfigError> {
    methods
        .into_iter()
        .map(|method| {
            if is_token(&method) {
                Ok(method.to_ascii_uppercase())
            } else {
                Err(ConfigError::InvalidMethod(method))
            }
        })
        .collect()
}

/// RFC 9110 token
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

mod millis {
    use serde::{ser::Error as _, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(as_millis::<S>(duration)?)
    }

    /// Whole milliseconds of `duration`, rejecting values beyond `u64`
    pub(super) fn as_millis<S: Serializer>(duration: &Duration) -> Result<u64, S::Error> {
        u64::try_from(duration.as_millis()).map_err(|_| {
            S::Error::custom(format!("duration of {:?} does not fit in u64 milliseconds", duration))
        })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod millis_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => serializer.serialize_some(&super::millis::as_millis::<S>(duration)?),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_normalizes_case() {
        let config = GuardConfig::default()
            .with_dedupe_methods(["get"])
            .with_header_keys(["X-Api-Key"])
            .validate()
            .unwrap();
        assert!(config.dedupe_methods.contains("GET"));
        assert!(config.header_keys_for_key.contains("x-api-key"));
    }

    #[test]
    fn test_validate_rejects_bad_tokens() {
        assert_eq!(
            GuardConfig::default().with_dedupe_methods([""]).validate(),
            Err(ConfigError::InvalidMethod(String::new()))
        );
        assert_eq!(
            GuardConfig::default().with_header_keys(["bad header"]).validate(),
            Err(ConfigError::InvalidHeaderName("bad header".into()))
        );
    }

    #[test]
    fn test_cacheability_policy() {
        let config = GuardConfig::default();
        assert!(config.is_cacheable(200));
        assert!(config.is_cacheable(204));
        assert!(config.is_cacheable(304));
        assert!(!config.is_cacheable(301));
        assert!(!config.is_cacheable(404));
        assert!(!config.is_cacheable(500));
        assert!(config.with_cache_non_2xx(true).is_cacheable(500));
    }

    #[test]
    fn test_eligibility() {
        let config = GuardConfig::default();
        assert!(config.is_eligible("GET"));
        assert!(config.is_eligible("POST"));
        assert!(!config.is_eligible("DELETE"));
        assert!(config.includes_body("POST"));
        assert!(!config.includes_body("GET"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: GuardConfig =
            serde_json::from_str(r#"{ "window_ms": 500, "sweep_interval_ms": 1000 }"#).unwrap();
        assert_eq!(config.window, Duration::from_millis(500));
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(1)));
        assert!(config.dedupe_methods.contains("GET"));
        assert!(config.enabled);

        let json = serde_json::to_value(&GuardConfig::default()).unwrap();
        assert_eq!(json["window_ms"], 2000);
        assert!(json["sweep_interval_ms"].is_null());
    }

    #[test]
    fn test_serialize_rejects_unrepresentable_durations() {
        let config = GuardConfig::new(Duration::MAX);
        assert!(serde_json::to_value(&config).is_err());

        let config = GuardConfig::default().with_sweep_interval(Duration::MAX);
        assert!(serde_json::to_value(&config).is_err());

        let config = GuardConfig::new(Duration::from_millis(u64::MAX));
        assert_eq!(serde_json::to_value(&config).unwrap()["window_ms"], u64::MAX);
    }
}
