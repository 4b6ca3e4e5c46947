//! Deterministic string forms of requests.
//!
//! Every field of the final canonical string is tagged and length-prefixed
//! (`U42:https://…`), so two different combinations of method, URL, headers
//! and body can never serialize to the same string.

use crate::{
    error::HashError,
    hasher::{digest, KeyHasher},
    request::{RequestBody, RequestDescriptor},
};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use url::Url;

/// Emitted in place of headers when no header names are configured
pub const NO_HEADER_KEYS: &str = "<none>";

/// Canonical form of a request body
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BodyCanon {
    Absent,
    Digest(String),
    /// The body is not safely re-readable and must stay out of the identity.
    /// This is a signal, not an error.
    Unhashable,
}

/// Default port of the well-known schemes
fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        "ftp" => Some(21),
        _ => None,
    }
}

/// `scheme://host[:port]path[?sorted query]`, without userinfo or fragment
pub fn canonical_url(url: &Url) -> String {
    let scheme = url.scheme().to_ascii_lowercase();
    let mut canonical = format!(
        "{}://{}",
        scheme,
        url.host_str().unwrap_or_default().to_ascii_lowercase()
    );

    if let Some(port) = url.port().filter(|p| Some(*p) != default_port(&scheme)) {
        let _ = write!(canonical, ":{port}");
    }
    canonical.push_str(url.path());

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            (
                urlencoding::encode(&k).into_owned(),
                urlencoding::encode(&v).into_owned(),
            )
        })
        .collect();
    if !pairs.is_empty() {
        pairs.sort_by(|(ka, va), (kb, vb)| {
            ka.to_ascii_lowercase()
                .cmp(&kb.to_ascii_lowercase())
                .then_with(|| va.cmp(vb))
                .then_with(|| ka.cmp(kb))
        });
        let query: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        canonical.push('?');
        canonical.push_str(&query.join("&"));
    }

    canonical
}

/// `name=v1,v2;` per configured header that is present, names sorted.
///
/// Values are percent-encoded so a value can never contain the separators.
pub fn canonical_headers(request: &RequestDescriptor, header_keys: &BTreeSet<String>) -> String {
    if header_keys.is_empty() {
        return NO_HEADER_KEYS.to_string();
    }

    let mut canonical = String::new();
    for name in header_keys {
        let mut values = request.header_values(name);
        if values.is_empty() {
            continue;
        }
        values.sort_unstable();
        let values = values
            .iter()
            .map(|value| urlencoding::encode(value))
            .collect::<Vec<_>>()
            .join(",");
        let _ = write!(canonical, "{}={};", urlencoding::encode(name), values);
    }
    canonical
}

/// Digest of the body when it is safely re-readable
pub fn canonical_body(body: &RequestBody, hasher: &dyn KeyHasher) -> Result<BodyCanon, HashError> {
    let bytes = match body {
        RequestBody::Empty => return Ok(BodyCanon::Absent),
        RequestBody::Stream | RequestBody::Opaque => return Ok(BodyCanon::Unhashable),
        RequestBody::Bytes(bytes) => bytes.to_vec(),
        RequestBody::Text { content, encoding } => {
            let mut bytes = encoding.to_ascii_lowercase().into_bytes();
            bytes.push(0);
            bytes.extend_from_slice(content.as_bytes());
            bytes
        }
        RequestBody::Form(fields) => {
            let mut fields: Vec<_> = fields.iter().collect();
            fields.sort();
            fields
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&")
                .into_bytes()
        }
    };
    Ok(BodyCanon::Digest(digest(hasher, &bytes)?))
}

fn push_field(out: &mut String, tag: char, value: &str) {
    let _ = write!(out, "{}{}:{}|", tag, value.len(), value);
}

/// Full canonical string.
///
/// `body` is `None` when the body is excluded from the identity, by policy or
/// because it is unhashable.
pub fn canonical_request(
    request: &RequestDescriptor,
    header_keys: &BTreeSet<String>,
    body: Option<&str>,
) -> String {
    let mut out = String::new();
    push_field(&mut out, 'M', request.method());
    push_field(&mut out, 'U', &canonical_url(request.url()));
    push_field(&mut out, 'H', &canonical_headers(request, header_keys));
    match body {
        Some(digest) => push_field(&mut out, 'B', digest),
        None => out.push_str("B-|"),
    }
    out
}
