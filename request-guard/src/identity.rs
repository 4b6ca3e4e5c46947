use crate::{
    canonical::{canonical_body, canonical_request, BodyCanon},
    config::GuardConfig,
    error::IdentityError,
    hasher::{digest, KeyHasher},
    key::RequestKey,
    overrides::RequestOverride,
    request::RequestDescriptor,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Turns requests into [`RequestKey`]s.
///
/// The key is a pure function of method, canonical URL, the configured header
/// values and, when included, the body digest.
#[derive(Clone)]
pub struct IdentityBuilder {
    hasher: Arc<dyn KeyHasher>,
    include_body_for_methods: HashSet<String>,
    header_keys: BTreeSet<String>,
}

impl IdentityBuilder {
    /// `config` is expected to be validated
    pub fn new(config: &GuardConfig, hasher: Arc<dyn KeyHasher>) -> Self {
        Self {
            hasher,
            include_body_for_methods: config.include_body_for_methods.clone(),
            header_keys: config.header_keys_for_key.clone(),
        }
    }

    pub fn compute_key(
        &self,
        request: &RequestDescriptor,
        overrides: Option<&RequestOverride>,
    ) -> Result<RequestKey, IdentityError> {
        if let Some(key) = overrides.and_then(|o| o.explicit_key().as_deref()) {
            return Ok(RequestKey::explicit(key));
        }

        let default_inclusion = self.include_body_for_methods.contains(request.method());
        let forced = overrides.map(|o| o.include_body()).unwrap_or_default();
        let include_body = forced.resolve(default_inclusion);

        let body = if include_body {
            match canonical_body(request.body(), self.hasher.as_ref())? {
                BodyCanon::Digest(digest) => Some(digest),
                BodyCanon::Absent => Some(String::new()),
                BodyCanon::Unhashable if forced.resolve(false) => {
                    return Err(IdentityError::UnhashableBody {
                        kind: request.body().kind(),
                    });
                }
                BodyCanon::Unhashable => {
                    log::debug!(
                        "Excluding {} body of {} {} from request key",
                        request.body().kind(),
                        request.method(),
                        request.url()
                    );
                    None
                }
            }
        } else {
            None
        };

        let canonical = canonical_request(request, &self.header_keys, body.as_deref());
        Ok(RequestKey::computed(digest(
            self.hasher.as_ref(),
            canonical.as_bytes(),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::HashError, hasher::Sha256Hasher, overrides::BodyInclusion, request::RequestBody,
    };
    use url::Url;

    fn builder() -> IdentityBuilder {
        let config = GuardConfig::default().validate().unwrap();
        IdentityBuilder::new(&config, Arc::new(Sha256Hasher))
    }

    fn get(url: &str) -> RequestDescriptor {
        RequestDescriptor::get(Url::parse(url).unwrap())
    }

    fn post(url: &str, body: RequestBody) -> RequestDescriptor {
        RequestDescriptor::post(Url::parse(url).unwrap()).with_body(body)
    }

    #[test]
    fn test_equivalent_requests_share_a_key() {
        let identity = builder();
        let a = get("https://API.example.com:443/users?page=2&sort=name")
            .with_header("Accept", "application/json")
            .with_header("X-Request-Id", "1");
        let b = get("https://api.example.com/users?sort=name&page=2")
            .with_header("accept", "application/json")
            .with_header("X-Request-Id", "2");
        assert_eq!(
            identity.compute_key(&a, None).unwrap(),
            identity.compute_key(&b, None).unwrap()
        );
    }

    #[test]
    fn test_discriminating_fields_change_the_key() {
        let identity = builder();
        let base = get("https://example.com/users").with_header("Authorization", "a");
        let variants = vec![
            base.clone(),
            RequestDescriptor::new("HEAD", Url::parse("https://example.com/users").unwrap())
                .with_header("Authorization", "a"),
            get("https://example.com/groups").with_header("Authorization", "a"),
            get("https://example.com/users").with_header("Authorization", "b"),
            get("https://example.com/users"),
            post("https://example.com/users", RequestBody::text("one")),
            post("https://example.com/users", RequestBody::text("two")),
            post("https://example.com/users", RequestBody::Empty),
        ];
        let keys: HashSet<_> = variants
            .iter()
            .map(|r| identity.compute_key(r, None).unwrap())
            .collect();
        assert_eq!(keys.len(), variants.len());
    }

    #[test]
    fn test_header_value_cannot_impersonate_credentials() {
        let identity = builder();
        let anonymous = get("https://example.com/me")
            .with_header("Accept", "x;authorization=Bearer alice-token");
        let alice = get("https://example.com/me")
            .with_header("Accept", "x")
            .with_header("Authorization", "Bearer alice-token");
        assert_ne!(
            identity.compute_key(&anonymous, None).unwrap(),
            identity.compute_key(&alice, None).unwrap()
        );
    }

    #[test]
    fn test_get_bodies_are_ignored_by_default() {
        let identity = builder();
        let a = get("https://example.com/search").with_body(RequestBody::text("alpha"));
        let b = get("https://example.com/search").with_body(RequestBody::text("beta"));
        assert_eq!(
            identity.compute_key(&a, None).unwrap(),
            identity.compute_key(&b, None).unwrap()
        );

        let include = RequestOverride::default().with_body_inclusion(BodyInclusion::Include);
        assert_ne!(
            identity.compute_key(&a, Some(&include)).unwrap(),
            identity.compute_key(&b, Some(&include)).unwrap()
        );
    }

    #[test]
    fn test_explicit_key_short_circuits() {
        let identity = builder();
        let explicit = RequestOverride::with_key("current-user");
        let a = get("https://example.com/a");
        let b = post("https://example.com/b", RequestBody::Stream);

        let key = identity.compute_key(&a, Some(&explicit)).unwrap();
        assert_eq!(key.as_str(), "explicit:current-user");
        assert!(key.is_explicit());
        assert_eq!(key, identity.compute_key(&b, Some(&explicit)).unwrap());
        assert!(!identity.compute_key(&a, None).unwrap().is_explicit());
    }

    #[test]
    fn test_stream_body_is_excluded_unless_forced() {
        let identity = builder();
        let stream = post("https://example.com/upload", RequestBody::Stream);
        let opaque = post("https://example.com/upload", RequestBody::Opaque);
        assert_eq!(
            identity.compute_key(&stream, None).unwrap(),
            identity.compute_key(&opaque, None).unwrap()
        );

        let forced = RequestOverride::default().with_body_inclusion(BodyInclusion::Include);
        assert_eq!(
            identity.compute_key(&stream, Some(&forced)),
            Err(IdentityError::UnhashableBody { kind: "stream" })
        );
    }

    #[test]
    fn test_unavailable_hasher_is_reported() {
        let config = GuardConfig::default().validate().unwrap();
        let identity = IdentityBuilder::new(
            &config,
            Arc::new(|_: &[u8]| -> Result<String, HashError> {
                Err(HashError::Unavailable("no provider".into()))
            }),
        );
        assert!(matches!(
            identity.compute_key(&get("https://example.com/"), None),
            Err(IdentityError::Hash(_))
        ));
    }
}
