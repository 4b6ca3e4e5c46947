use bytes::Bytes;
use std::sync::Arc;

/// A completed response as handed to one caller.
///
/// Every caller gets its own value, so consuming the body never affects
/// another caller served from the same execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: vec![],
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Immutable snapshot of one physical network execution
#[derive(Debug, PartialEq, Eq)]
pub struct ResponseSnapshot {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

/// Shared, read-only reference held by the in-flight registry and the cache
pub type ResponseHandle = Arc<ResponseSnapshot>;

impl ResponseSnapshot {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Independent, consumable copy of the response
    pub fn readable_copy(&self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

impl From<HttpResponse> for ResponseSnapshot {
    fn from(response: HttpResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copies_are_independent() {
        let handle: ResponseHandle = Arc::new(
            HttpResponse::new(200, "payload")
                .with_header("content-type", "text/plain")
                .into(),
        );
        let mut first = handle.readable_copy();
        let second = handle.readable_copy();

        first.body = Bytes::new();
        first.headers.clear();

        assert_eq!(second.body, Bytes::from_static(b"payload"));
        assert_eq!(second.headers.len(), 1);
        assert_eq!(handle.readable_copy(), second);
    }
}
