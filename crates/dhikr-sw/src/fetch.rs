//! Intercepted requests and the responses handed back to the page.

use std::fmt;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::CacheEntry;

// ==================== Request ====================

/// A request seen at the interception boundary.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a request with an arbitrary method.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            url,
            method,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a body.
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// Path component used for routing.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Whether the request targets the same origin as `origin`.
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }

    /// Drop the page's validators and range.
    ///
    /// The worker fetches whole resources for itself; a `304` or `206`
    /// answering the page's own cache state must never reach the cache.
    pub fn without_conditionals(mut self) -> Self {
        for name in [
            header::IF_NONE_MATCH,
            header::IF_MODIFIED_SINCE,
            header::IF_MATCH,
            header::IF_UNMODIFIED_SINCE,
            header::IF_RANGE,
            header::RANGE,
        ] {
            self.headers.remove(name);
        }
        self
    }

    /// Normalized cache key for this request.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.method, &self.url)
    }
}

/// Normalized request identity: upper-case method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("{} {}", method.as_str().to_ascii_uppercase(), url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ==================== Response ====================

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Synthesized,
}

/// A response with an owned, single-consume body.
///
/// `Response` is deliberately not `Clone`. Handing a response to the page and
/// persisting it requires an explicit [`Response::duplicate`].
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Opaque responses carry no readable status but may still be cached.
    pub opaque: bool,
    body: Bytes,
    source: ResponseSource,
}

impl Response {
    /// Create a network response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            opaque: false,
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    /// Create a response synthesized by the worker itself.
    pub fn synthesized(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            status,
            headers,
            opaque: false,
            body: body.into(),
            source: ResponseSource::Synthesized,
        }
    }

    /// Rebuild a response from a stored cache entry.
    pub fn from_entry(entry: &CacheEntry) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &entry.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(n, v);
            }
        }

        Self {
            status: StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK),
            headers,
            opaque: entry.opaque,
            body: Bytes::copy_from_slice(&entry.body),
            source: ResponseSource::Cache,
        }
    }

    /// Check if the response is successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// A 2xx carrying the whole resource. `206 Partial Content` does not.
    pub fn is_complete(&self) -> bool {
        self.ok() && self.status != StatusCode::PARTIAL_CONTENT
    }

    /// Complete or opaque responses may be written to the cache.
    pub fn is_cacheable(&self) -> bool {
        self.is_complete() || self.opaque
    }

    pub fn source(&self) -> ResponseSource {
        self.source
    }

    /// Content-Type header, if present and readable.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Borrow the body without consuming it.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consume the response, yielding its body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Copy this response into a new, independent buffer.
    ///
    /// The copy keeps status, headers and opacity; its body shares nothing
    /// with the original.
    pub fn duplicate(&self) -> Self {
        Self {
            status: self.status,
            headers: self.headers.clone(),
            opaque: self.opaque,
            body: Bytes::copy_from_slice(&self.body),
            source: self.source,
        }
    }

    /// Consume the response into a storable snapshot.
    pub fn into_entry(self, request: &Request) -> CacheEntry {
        let mut url = request.url.clone();
        url.set_fragment(None);

        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        CacheEntry {
            url: url.to_string(),
            method: request.method.as_str().to_ascii_uppercase(),
            status: self.status.as_u16(),
            headers,
            body: self.body.to_vec(),
            opaque: self.opaque,
            cached_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }
}

// ==================== Fetch Outcome ====================

/// Result of offering a request to the worker.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the host sends the request to the network unchanged.
    Passthrough(Request),
    /// The worker supplied the response.
    Respond(Response),
}

impl FetchOutcome {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, FetchOutcome::Passthrough(_))
    }

    /// The response, if the worker supplied one.
    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::Passthrough(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_cache_key_normalization() {
        let a = CacheKey::new(&Method::GET, &url("https://dhikr.example/app.js#top"));
        let b = CacheKey::new(&Method::GET, &url("https://dhikr.example/app.js"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "GET https://dhikr.example/app.js");

        let with_query = CacheKey::new(&Method::GET, &url("https://dhikr.example/app.js?v=2"));
        assert_ne!(with_query, b);
    }

    #[test]
    fn test_same_origin() {
        let origin = url("https://dhikr.example/");
        assert!(Request::get(url("https://dhikr.example/styles.css")).is_same_origin(&origin));
        assert!(!Request::get(url("https://fonts.example/a.woff2")).is_same_origin(&origin));
        assert!(!Request::get(url("http://dhikr.example/")).is_same_origin(&origin));
    }

    #[test]
    fn test_duplicate_copies_body() {
        let original = Response::new(StatusCode::OK, HeaderMap::new(), "body { color: teal }");
        let copy = original.duplicate();

        assert_eq!(copy.status, StatusCode::OK);
        assert_eq!(copy.body(), original.body());
        assert_ne!(copy.body().as_ptr(), original.body().as_ptr());

        let consumed = original.into_body();
        assert_eq!(&consumed[..], copy.body());
    }

    #[test]
    fn test_entry_round_trip_keeps_headers_and_status() {
        let request = Request::get(url("https://dhikr.example/index.html#counter"));
        let response = Response::synthesized(StatusCode::OK, "text/html", "<p>hi</p>");

        let entry = response.into_entry(&request);
        assert_eq!(entry.url, "https://dhikr.example/index.html");
        assert_eq!(entry.method, "GET");

        let restored = Response::from_entry(&entry);
        assert_eq!(restored.status, StatusCode::OK);
        assert_eq!(restored.content_type(), Some("text/html"));
        assert_eq!(restored.source(), ResponseSource::Cache);
        assert_eq!(restored.body(), b"<p>hi</p>");
    }

    #[test]
    fn test_cacheable() {
        let not_found = Response::new(StatusCode::NOT_FOUND, HeaderMap::new(), "");
        assert!(!not_found.is_cacheable());

        let mut opaque = Response::new(StatusCode::NOT_FOUND, HeaderMap::new(), "");
        opaque.opaque = true;
        assert!(opaque.is_cacheable());

        let partial = Response::new(StatusCode::PARTIAL_CONTENT, HeaderMap::new(), "body {");
        assert!(partial.ok());
        assert!(!partial.is_complete());
        assert!(!partial.is_cacheable());
    }

    #[test]
    fn test_without_conditionals() {
        let request = Request::get(url("https://dhikr.example/about.html"))
            .header(header::IF_NONE_MATCH, HeaderValue::from_static("\"abc\""))
            .header(header::IF_MODIFIED_SINCE, HeaderValue::from_static("Sat, 01 Jan 2022 00:00:00 GMT"))
            .header(header::RANGE, HeaderValue::from_static("bytes=0-99"))
            .header(header::ACCEPT, HeaderValue::from_static("text/html"))
            .without_conditionals();

        assert_eq!(request.headers.len(), 1);
        assert!(request.headers.contains_key(header::ACCEPT));
    }
}
