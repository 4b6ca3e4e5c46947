use bytes::Bytes;
use getset::Getters;
use url::Url;

/// Body of an outgoing request, as far as identity computation is concerned
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    Text { content: String, encoding: String },
    /// Form fields in submission order, names may repeat
    Form(Vec<(String, String)>),
    /// One-shot content that cannot be read twice
    Stream,
    Opaque,
}

impl RequestBody {
    pub fn text(content: impl Into<String>) -> Self {
        RequestBody::Text {
            content: content.into(),
            encoding: "utf-8".to_string(),
        }
    }

    pub fn form<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        RequestBody::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Whether the content can be read again without consuming the request
    pub fn is_replayable(&self) -> bool {
        !matches!(self, RequestBody::Stream | RequestBody::Opaque)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RequestBody::Empty => "empty",
            RequestBody::Bytes(_) => "bytes",
            RequestBody::Text { .. } => "text",
            RequestBody::Form(_) => "form",
            RequestBody::Stream => "stream",
            RequestBody::Opaque => "opaque",
        }
    }
}

/// Read-only view of an outgoing request.
///
/// Built by the surrounding HTTP client before the request is sent. Building
/// it must not consume one-shot body content; such bodies are described as
/// [`RequestBody::Stream`] instead.
#[derive(Clone, Debug, Getters)]
#[get = "pub"]
pub struct RequestDescriptor {
    /// Upper-case method token
    method: String,
    url: Url,
    headers: Vec<(String, String)>,
    body: RequestBody,
}

impl RequestDescriptor {
    pub fn new(method: &str, url: Url) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url,
            headers: vec![],
            body: RequestBody::Empty,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: Url) -> Self {
        Self::new("POST", url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// All values of header `name`, compared case-insensitively, in insertion order
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_is_upper_cased() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(RequestDescriptor::new("patch", url).method(), "PATCH");
    }

    #[test]
    fn test_header_values_case_insensitive() {
        let url = Url::parse("https://example.com/").unwrap();
        let request = RequestDescriptor::get(url)
            .with_header("Accept", "text/html")
            .with_header("accept", "application/json")
            .with_header("X-Other", "1");
        assert_eq!(
            request.header_values("ACCEPT"),
            vec!["text/html", "application/json"]
        );
        assert!(request.header_values("authorization").is_empty());
    }

    #[test]
    fn test_stream_bodies_are_not_replayable() {
        assert!(RequestBody::Empty.is_replayable());
        assert!(RequestBody::text("x").is_replayable());
        assert!(!RequestBody::Stream.is_replayable());
        assert!(!RequestBody::Opaque.is_replayable());
    }
}
