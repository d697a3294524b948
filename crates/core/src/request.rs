//! Request descriptors and response snapshots.
//!
//! A [`ResponseSnapshot`] owns its body as [`Bytes`]: the network body is read
//! exactly once into that buffer, after which the cache-write path and the
//! caller each hold an independent handle to the same immutable bytes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;

/// How the host issued the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// A full-page navigation; eligible for the application-shell fallback.
    Navigate,
    /// Any sub-resource or API request.
    #[default]
    SameOrigin,
}

/// Routing class of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Backend API call served network-first.
    DynamicApi,
    /// Application asset served cache-first.
    StaticAsset,
}

/// An inbound fetch as seen by the interception layer.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Upper-case HTTP method.
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub mode: RequestMode,
    /// Request body; only forwarded on pass-through.
    pub body: Bytes,
}

impl RequestDescriptor {
    /// Build a `GET` descriptor for a URL.
    pub fn get(url: Url) -> Self {
        Self { method: "GET".into(), url, headers: Vec::new(), mode: RequestMode::SameOrigin, body: Bytes::new() }
    }

    /// Build a `GET` descriptor from a URL string.
    pub fn parse_get(url: &str) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self::get(url))
    }

    /// Build a descriptor with an explicit method and body.
    pub fn with_method(method: &str, url: Url, body: Bytes) -> Self {
        Self { method: method.to_ascii_uppercase(), url, headers: Vec::new(), mode: RequestMode::SameOrigin, body }
    }

    pub fn navigate(mut self) -> Self {
        self.mode = RequestMode::Navigate;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// URL used for store keys: the request URL without its fragment.
    pub fn cache_url(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.to_string()
    }

    /// Classify by substring match of the full URL against API patterns.
    pub fn classify<S: AsRef<str>>(&self, api_patterns: &[S]) -> RequestClass {
        let url = self.url.as_str();
        if api_patterns.iter().any(|p| url.contains(p.as_ref())) {
            RequestClass::DynamicApi
        } else {
            RequestClass::StaticAsset
        }
    }
}

/// An immutable, independently readable copy of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ResponseSnapshot {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self { status, headers, body: body.into() }
    }

    /// True for 2xx statuses; only these are ever written to a store.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header_value("content-type")
    }

    /// Header names listed in `Vary`, lower-cased.
    pub fn vary(&self) -> Vec<String> {
        self.header_value("vary")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERNS: &[&str] = &["/query", "/offline-pack"];

    #[test]
    fn test_classify_dynamic() {
        let req = RequestDescriptor::parse_get("http://localhost:8000/query?text=pm-kisan").unwrap();
        assert_eq!(req.classify(PATTERNS), RequestClass::DynamicApi);

        let req = RequestDescriptor::parse_get("http://localhost:8000/offline-pack").unwrap();
        assert_eq!(req.classify(PATTERNS), RequestClass::DynamicApi);
    }

    #[test]
    fn test_classify_substring_anywhere() {
        let req = RequestDescriptor::parse_get("http://localhost:8000/api/v2/query/history").unwrap();
        assert_eq!(req.classify(PATTERNS), RequestClass::DynamicApi);
    }

    #[test]
    fn test_classify_static() {
        let req = RequestDescriptor::parse_get("http://localhost:8000/style.css").unwrap();
        assert_eq!(req.classify(PATTERNS), RequestClass::StaticAsset);
    }

    #[test]
    fn test_method_normalized() {
        let url = Url::parse("http://localhost/query").unwrap();
        let req = RequestDescriptor::with_method("post", url, Bytes::from_static(b"{}"));
        assert_eq!(req.method, "POST");
        assert!(!req.is_get());
    }

    #[test]
    fn test_cache_url_drops_fragment() {
        let req = RequestDescriptor::parse_get("http://localhost/index.html#top").unwrap();
        assert_eq!(req.cache_url(), "http://localhost/index.html");
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let req = RequestDescriptor::parse_get("http://localhost/").unwrap().header("Accept-Language", "hi");
        assert_eq!(req.header_value("accept-language"), Some("hi"));
        assert_eq!(req.header_value("ACCEPT-LANGUAGE"), Some("hi"));
    }

    #[test]
    fn test_response_is_ok() {
        assert!(ResponseSnapshot::new(200, vec![], "x").is_ok());
        assert!(ResponseSnapshot::new(204, vec![], "").is_ok());
        assert!(!ResponseSnapshot::new(304, vec![], "").is_ok());
        assert!(!ResponseSnapshot::new(500, vec![], "").is_ok());
    }

    #[test]
    fn test_vary_parsing() {
        let resp = ResponseSnapshot::new(200, vec![("Vary".into(), "Accept-Encoding, Accept-Language".into())], "");
        assert_eq!(resp.vary(), vec!["accept-encoding".to_string(), "accept-language".to_string()]);
        assert!(ResponseSnapshot::new(200, vec![], "").vary().is_empty());
    }
}
