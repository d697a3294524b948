//! HTTP host for the interception cache.
//!
//! Every inbound request is described relative to the configured origin and
//! routed through [`InterceptCache::intercept`]. Requests the cache does not
//! intercept are forwarded to the origin unchanged.

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use http::{HeaderName, HeaderValue, StatusCode, header};
use tower_http::trace::TraceLayer;
use url::Url;

use gramsevak_client::fetch::{is_end_to_end, is_forwardable};
use gramsevak_client::{InterceptCache, Network, Outcome, Phase, ResponseSource};
use gramsevak_core::{CacheStorage, RequestDescriptor, RequestMode, ResponseSnapshot};

use crate::error::HostError;

/// Response header naming where the body came from: `network`, `cache` or `offline`.
pub const SOURCE_HEADER: &str = "x-gramsevak-source";

/// Shared state handed to every request.
pub struct HostState<S: CacheStorage, N: Network> {
    cache: InterceptCache<S, N>,
    origin: Url,
    max_body: usize,
}

impl<S: CacheStorage, N: Network> Clone for HostState<S, N> {
    fn clone(&self) -> Self {
        Self { cache: self.cache.clone(), origin: self.origin.clone(), max_body: self.max_body }
    }
}

/// Build the host router. Every path is handled by the interception cache.
pub fn router<S, N>(cache: InterceptCache<S, N>, origin: Url, max_body: usize) -> Router
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    let state = HostState { cache, origin, max_body };
    Router::new()
        .fallback(intercept::<S, N>)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn intercept<S, N>(State(state): State<HostState<S, N>>, request: Request) -> Result<Response, HostError>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    if state.cache.phase().await != Phase::Activated {
        return Err(HostError::NotReady);
    }

    let descriptor = describe(&state.origin, request, state.max_body).await?;

    let outcome = state.cache.intercept(&descriptor).await?;
    let source = match &outcome {
        Outcome::PassThrough | Outcome::Resolved { source: ResponseSource::Network, .. } => "network",
        Outcome::Resolved { source: ResponseSource::Cache, .. } => "cache",
        Outcome::Fallback(_) => "offline",
    };
    let snapshot = match outcome.into_response() {
        Some(response) => response,
        None => state.cache.network().fetch(&descriptor).await?,
    };

    Ok(render(snapshot, source))
}

/// Turn an inbound request into a descriptor addressed at the origin.
async fn describe(origin: &Url, request: Request, max_body: usize) -> Result<RequestDescriptor, HostError> {
    let (parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = origin
        .join(path_and_query)
        .map_err(|e| HostError::BadRequest(format!("{path_and_query}: {e}")))?;

    let body = to_bytes(body, max_body)
        .await
        .map_err(|e| HostError::BadRequest(format!("failed to read request body: {e}")))?;

    let mut descriptor = RequestDescriptor::with_method(parts.method.as_str(), url, body);
    descriptor.headers = parts
        .headers
        .iter()
        .filter(|(name, _)| is_forwardable(name.as_str()))
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect();
    descriptor.mode = navigation_mode(&descriptor);

    Ok(descriptor)
}

fn navigation_mode(request: &RequestDescriptor) -> RequestMode {
    if let Some(mode) = request.header_value("sec-fetch-mode") {
        return if mode.eq_ignore_ascii_case("navigate") { RequestMode::Navigate } else { RequestMode::SameOrigin };
    }
    let wants_html = request
        .header_value("accept")
        .is_some_and(|accept| accept.contains("text/html"));
    if request.is_get() && wants_html { RequestMode::Navigate } else { RequestMode::SameOrigin }
}

fn render(snapshot: ResponseSnapshot, source: &'static str) -> Response {
    let status = StatusCode::from_u16(snapshot.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, Body::from(snapshot.body)).into_response();

    let headers = response.headers_mut();
    for (name, value) in &snapshot.headers {
        if !is_end_to_end(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            headers.append(name, value);
        }
    }
    headers.insert(HeaderName::from_static(SOURCE_HEADER), HeaderValue::from_static(source));
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    }

    response
}
