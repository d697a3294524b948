//! Network capability and its HTTP implementation.
//!
//! ### Body capture
//! - The response body is read exactly once into an owned buffer.
//! - Callers receive a [`ResponseSnapshot`] whose body can be shared freely.
//!
//! ### Limits
//! - Max redirects: 5 (configurable)
//! - Max body bytes: 5MB (configurable)
//! - Timeout: none unless configured

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, header};
use std::time::{Duration, Instant};

pub use url::{UrlError, resolve};

use gramsevak_core::{AppConfig, Error, RequestDescriptor, ResponseSnapshot};

/// Connection-level headers, never copied between connections in either direction.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-connection",
    "te",
    "trailer",
];

/// Request headers the client sets itself. The compression it can decode and
/// its user agent are its own to negotiate.
const CLIENT_OWNED_HEADERS: &[&str] = &["accept-encoding", "user-agent"];

/// Capability for performing a request over the network.
///
/// Implementations return the response for any HTTP status; only
/// transport failures are errors.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "gramsevak/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: none)
    pub timeout: Option<Duration>,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "gramsevak/0.1".to_string(), max_bytes: 5 * 1024 * 1024, timeout: None, max_redirects: 5 }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
        }
    }
}

/// HTTP client backed by reqwest.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    fn too_large(&self, len: usize) -> Error {
        Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes))
    }
}

fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::FetchTimeout(e.to_string())
    } else {
        Error::Network(format!("network error: {}", e))
    }
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {}", request.method, e)))?;

        let mut builder = self.http.request(method, request.url.clone());
        for (name, value) in request.headers.iter().filter(|(name, _)| is_forwardable(name)) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(map_send_error)?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(self.too_large(len as usize));
        }

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        let bytes: Bytes = response.bytes().await.map_err(map_send_error)?;

        if bytes.len() > self.config.max_bytes {
            return Err(self.too_large(bytes.len()));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status.as_u16(),
            fetch_ms,
            bytes.len()
        );

        Ok(ResponseSnapshot::new(status.as_u16(), headers, bytes))
    }
}

fn listed(list: &[&str], name: &str) -> bool {
    list.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Whether an inbound request header may be sent on to the origin.
pub fn is_forwardable(name: &str) -> bool {
    !listed(HOP_BY_HOP_HEADERS, name) && !listed(CLIENT_OWNED_HEADERS, name)
}

/// Whether a response header may be copied onto another connection.
///
/// `content-encoding` is dropped because the body has already been decoded.
pub fn is_end_to_end(name: &str) -> bool {
    !listed(HOP_BY_HOP_HEADERS, name) && !name.eq_ignore_ascii_case(header::CONTENT_ENCODING.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn get(server: &MockServer, p: &str) -> RequestDescriptor {
        RequestDescriptor::parse_get(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "gramsevak/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, None);
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { timeout_ms: Some(1500), user_agent: "ua/1".into(), ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.user_agent, "ua/1");
    }

    #[test]
    fn test_is_forwardable() {
        assert!(is_forwardable("accept"));
        assert!(is_forwardable("Accept-Language"));
        assert!(!is_forwardable("Accept-Encoding"));
        assert!(!is_forwardable("user-agent"));
        assert!(!is_forwardable("Host"));
        assert!(!is_forwardable("connection"));
    }

    #[test]
    fn test_is_end_to_end() {
        assert!(is_end_to_end("content-type"));
        assert!(is_end_to_end("Vary"));
        assert!(!is_end_to_end("Transfer-Encoding"));
        assert!(!is_end_to_end("content-length"));
        assert!(!is_end_to_end("content-encoding"));
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        let client = FetchClient::new(FetchConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_reads_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/style.css"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("body{}", "text/css"),
            )
            .mount(&server)
            .await;

        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let response = client.fetch(&get(&server, "/style.css")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.content_type(), Some("text/css"));
        assert_eq!(&response.body[..], b"body{}");
    }

    #[tokio::test]
    async fn test_fetch_error_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let response = client.fetch(&get(&server, "/missing")).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_forwards_method_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header_is("content-type", "application/json"))
            .and(body_string(r#"{"text":"kisan"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let url = ::url::Url::parse(&format!("{}/query", server.uri())).unwrap();
        let request = RequestDescriptor::with_method("POST", url, Bytes::from_static(br#"{"text":"kisan"}"#))
            .header("Content-Type", "application/json")
            .header("Host", "ignored.example");

        let response = client.fetch(&request).await.unwrap();
        assert_eq!(&response.body[..], b"ok");
    }

    #[tokio::test]
    async fn test_fetch_negotiates_its_own_encoding() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/style.css"))
            .and(header_is("user-agent", "gramsevak/0.1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("body{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let request = get(&server, "/style.css")
            .header("Accept-Encoding", "zstd")
            .header("User-Agent", "Mozilla/5.0");

        let response = client.fetch(&request).await.unwrap();
        assert_eq!(&response.body[..], b"body{}");

        let received = server.received_requests().await.unwrap();
        let encoding = received[0].headers.get("accept-encoding").and_then(|v| v.to_str().ok());
        assert_ne!(encoding, Some("zstd"));
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let server = MockServer::start().await;
        Mock::given(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 64]))
            .mount(&server)
            .await;

        let client = FetchClient::new(FetchConfig { max_bytes: 16, ..Default::default() }).unwrap();
        let result = client.fetch(&get(&server, "/big")).await;
        assert!(matches!(result, Err(Error::FetchTooLarge(_))));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let request = RequestDescriptor::parse_get(&format!("http://{addr}/query")).unwrap();

        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let result = client.fetch(&request).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = FetchClient::new(FetchConfig { timeout: Some(Duration::from_millis(100)), ..Default::default() })
            .unwrap();
        let result = client.fetch(&get(&server, "/slow")).await;
        assert!(matches!(result, Err(Error::FetchTimeout(_))));
    }
}
