//! [`surf`] middleware that routes requests through a [`Guard`].
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use request_guard::{GuardConfig, RequestOverride};
//! use surf_guard::GuardMiddleware;
//!
//! let client = surf::Client::new().with(GuardMiddleware::new(GuardConfig::default())?);
//! let mut fresh = surf::get("https://example.com/clock").build();
//! fresh.set_ext(RequestOverride::bypass());
//! client.send(fresh).await?;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use request_guard::{
    Admission, ConfigError, Guard, GuardConfig, GuardError, HttpResponse, RequestBody,
    RequestDescriptor, RequestOverride,
};
use std::sync::Arc;
use surf::http::{mime::Mime, Body};
use surf::middleware::{Middleware, Next};
use surf::{Client, Request, Response, StatusCode};

/// Deduplicates and briefly caches the requests of a surf client.
///
/// Attach a [`RequestOverride`] with [`Request::set_ext`] to adjust a single
/// request.
#[derive(Clone)]
pub struct GuardMiddleware {
    guard: Arc<Guard<surf::Error>>,
}

impl GuardMiddleware {
    pub fn new(config: GuardConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_guard(Arc::new(Guard::new(config)?)))
    }

    pub fn with_guard(guard: Arc<Guard<surf::Error>>) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &Arc<Guard<surf::Error>> {
        &self.guard
    }
}

#[surf::utils::async_trait]
impl Middleware for GuardMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        client: Client,
        next: Next<'_>,
    ) -> surf::Result<Response> {
        let overrides = req.ext::<RequestOverride>().cloned();
        let inspect_body = self.guard.config().is_eligible(&req.method().to_string());
        let descriptor = describe(&mut req, inspect_body).await?;

        let key = match self
            .guard
            .admit(&descriptor, overrides.as_ref())
            .map_err(into_surf_error)?
        {
            Admission::Bypass(_) => return next.run(req, client).await,
            Admission::Guarded(key) => key,
        };

        let response = self
            .guard
            .run_guarded(key, || async move {
                let res = next.run(req, client).await?;
                snapshot(res).await
            })
            .await
            .map_err(into_surf_error)?;
        Ok(into_surf_response(response))
    }
}

/// Builds a descriptor of `req` without losing its body.
///
/// Bodies of known length are read into memory and put back. Bodies of
/// unknown length are left untouched and described as a stream. With
/// `inspect_body` unset the body is not looked at.
pub async fn describe(req: &mut Request, inspect_body: bool) -> surf::Result<RequestDescriptor> {
    let mut descriptor = RequestDescriptor::new(&req.method().to_string(), req.url().clone());
    for (name, values) in req.iter() {
        for value in values.iter() {
            descriptor = descriptor.with_header(name.as_str(), value.as_str());
        }
    }

    if !inspect_body {
        return Ok(descriptor.with_body(RequestBody::Opaque));
    }

    let body = req.take_body();
    if body.len().is_none() {
        req.set_body(body);
        return Ok(descriptor.with_body(RequestBody::Stream));
    }

    let mime = body.mime().clone();
    let bytes = body.into_bytes().await?;
    let described = describe_body(&mime, &bytes);
    let mut restored = Body::from_bytes(bytes);
    restored.set_mime(mime);
    req.set_body(restored);

    Ok(descriptor.with_body(described))
}

fn describe_body(mime: &Mime, bytes: &[u8]) -> RequestBody {
    if bytes.is_empty() {
        return RequestBody::Empty;
    }

    let essence = mime.essence();
    if essence == "application/x-www-form-urlencoded" {
        return RequestBody::Form(url::form_urlencoded::parse(bytes).into_owned().collect());
    }

    let textual = mime.basetype() == "text"
        || essence == "application/json"
        || essence.ends_with("+json");
    match std::str::from_utf8(bytes) {
        Ok(content) if textual => RequestBody::Text {
            content: content.to_string(),
            encoding: charset(mime),
        },
        _ => RequestBody::Bytes(Bytes::copy_from_slice(bytes)),
    }
}

/// `charset` parameter of `mime`, defaulting to utf-8
fn charset(mime: &Mime) -> String {
    mime.to_string()
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(name, _)| name.eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim_matches('"').to_ascii_lowercase())
        .unwrap_or_else(|| "utf-8".to_string())
}

/// Reads the whole response so it can be replayed
async fn snapshot(mut res: Response) -> surf::Result<HttpResponse> {
    let status = u16::from(res.status());
    let headers = res
        .iter()
        .flat_map(|(name, values)| {
            values
                .iter()
                .map(move |value| (name.as_str().to_string(), value.as_str().to_string()))
        })
        .collect();
    let body = res.body_bytes().await?;

    Ok(HttpResponse {
        status,
        headers,
        body: body.into(),
    })
}

/// Fresh surf response for one caller
fn into_surf_response(response: HttpResponse) -> Response {
    let mut res = surf::http::Response::new(response.status);
    for (name, value) in &response.headers {
        res.append_header(name.as_str(), value.as_str());
    }
    res.set_body(Body::from_bytes(response.body.to_vec()));
    res.into()
}

fn into_surf_error(err: GuardError<surf::Error>) -> surf::Error {
    match err {
        // The claimer alone holds the failure when nobody joined it
        GuardError::Transport(shared) => Arc::try_unwrap(shared)
            .unwrap_or_else(|shared| surf::Error::from_str(shared.status(), shared.to_string())),
        GuardError::UnhashableBody { .. } => {
            surf::Error::from_str(StatusCode::BadRequest, err.to_string())
        }
        other => {
            log::error!("Request guard failed: {}", other);
            surf::Error::from_str(StatusCode::InternalServerError, other.to_string())
        }
    }
}
