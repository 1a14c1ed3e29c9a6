//! # Folio Net
//!
//! Requests, buffered responses and the [`Fetcher`] seam the offline worker
//! uses to reach the origin.
//!
//! Responses are read to the end before they are handed out. A [`Response`]
//! is then cheap to clone, so the worker can answer the page with one copy
//! and write the other into the cache. [`HttpFetcher`] is the reqwest-backed
//! implementation; tests substitute their own to count calls or go offline.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use folio_common::FolioError;
use http::{header, HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, trace};

pub use http::{Method, StatusCode};
pub use url::Url;

pub mod intercept;

pub use intercept::{BypassRule, InterceptAction, RequestInterceptor};

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network unavailable: {0}")]
    Offline(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl NetError {
    /// Whether the origin could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, NetError::Offline(_) | NetError::Timeout(_))
    }
}

impl From<NetError> for FolioError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Timeout(after) => FolioError::Timeout(after),
            other => FolioError::network_with_source("fetch failed", other),
        }
    }
}

/// What the page will do with the response. Only `Document` changes how the
/// worker treats a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestDestination {
    /// Top-level page navigation.
    Document,
    Script,
    Style,
    Font,
    Image,
    Video,
    #[default]
    Other,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub destination: RequestDestination,
}

impl Request {
    fn with_method(method: Method, url: Url) -> Self {
        Self {
            url,
            method,
            headers: HeaderMap::new(),
            body: None,
            destination: RequestDestination::default(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::with_method(Method::GET, url)
    }

    pub fn post(url: Url, body: Bytes) -> Self {
        let mut request = Self::with_method(Method::POST, url);
        request.body = Some(body);
        request
    }

    /// GET issued by the page navigating to `url`.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).destination(RequestDestination::Document)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn destination(mut self, destination: RequestDestination) -> Self {
        self.destination = destination;
        self
    }

    pub fn is_navigation(&self) -> bool {
        matches!(self.destination, RequestDestination::Document)
    }
}

/// A response whose body has been read in full.
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Plain-text response produced locally, without a network round trip.
    pub fn synthetic(url: Url, status: StatusCode, body: &'static str) -> Self {
        let headers = HeaderMap::from_iter([(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )]);
        Self {
            url,
            status,
            headers,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    /// 2xx status.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or_default()
    }

    pub fn text(&self) -> Result<String, NetError> {
        std::str::from_utf8(&self.body)
            .map(str::to_owned)
            .map_err(|e| NetError::RequestFailed(format!("body is not UTF-8: {e}")))
    }
}

/// Turns a request into a fully buffered response.
///
/// An HTTP error status is still `Ok`; only failing to get any response at
/// all is an `Err`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    /// Whole-request timeout, body included.
    pub timeout: Duration,
    pub max_redirects: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("Folio/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// [`Fetcher`] backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        info!(
            user_agent = %config.user_agent,
            timeout_ms = config.timeout.as_millis() as u64,
            "HTTP fetcher ready"
        );
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    fn classify(&self, err: reqwest::Error) -> NetError {
        if err.is_timeout() {
            NetError::Timeout(self.config.timeout)
        } else if err.is_connect() {
            NetError::Offline(err.to_string())
        } else {
            NetError::HttpError(err)
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching from origin");

        let builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        let builder = match &request.body {
            Some(body) => builder.body(body.clone()),
            None => builder,
        };

        let reply = builder.send().await.map_err(|e| self.classify(e))?;
        let url = reply.url().clone();
        let status = reply.status();
        let headers = reply.headers().clone();
        let body = reply.bytes().await.map_err(|e| self.classify(e))?;

        trace!(%url, %status, bytes = body.len(), "Origin replied");
        Ok(Response {
            url,
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_request_constructors() {
        let get = Request::get(url("https://example.com/"));
        assert_eq!(get.method, Method::GET);
        assert!(get.body.is_none());
        assert!(!get.is_navigation());

        let post = Request::post(url("https://example.com/contact"), Bytes::from_static(b"x"));
        assert_eq!(post.method, Method::POST);
        assert_eq!(post.body.as_deref(), Some(&b"x"[..]));

        let nav = Request::navigate(url("https://example.com/about"));
        assert!(nav.is_navigation());
        assert_eq!(nav.method, Method::GET);
    }

    #[test]
    fn test_synthetic_response() {
        let response = Response::synthetic(
            url("https://example.com/missing.png"),
            StatusCode::NOT_FOUND,
            "Resource not available",
        );
        assert!(!response.ok());
        assert_eq!(response.status_text(), "Not Found");
        assert_eq!(response.text().unwrap(), "Resource not available");
        assert_eq!(
            response.headers.get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_error_conversion() {
        let timeout: FolioError = NetError::Timeout(Duration::from_secs(5)).into();
        assert_eq!(timeout.category(), "timeout");

        let offline = NetError::Offline("connection refused".into());
        assert!(offline.is_unreachable());
        let offline: FolioError = offline.into();
        assert_eq!(offline.category(), "network");
    }

    #[tokio::test]
    async fn test_http_fetcher_reads_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/static/css/main.css"))
            .and(header_is("accept", "text/css"))
            .respond_with(ResponseTemplate::new(200).set_body_string("body { margin: 0 }"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetcherConfig::default()).unwrap();
        let request = Request::get(url(&format!("{}/static/css/main.css", server.uri())))
            .header(header::ACCEPT, HeaderValue::from_static("text/css"));
        let response = fetcher.fetch(&request).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.text().unwrap(), "body { margin: 0 }");
    }

    #[tokio::test]
    async fn test_http_fetcher_passes_error_status_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(FetcherConfig::default()).unwrap();
        let response = fetcher
            .fetch(&Request::get(url(&format!("{}/broken", server.uri()))))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_http_fetcher_unreachable_host_errors() {
        let fetcher = HttpFetcher::new(FetcherConfig::default()).unwrap();
        assert!(fetcher
            .fetch(&Request::get(url("http://127.0.0.1:1/")))
            .await
            .is_err());
    }

    #[test]
    fn test_fetcher_config_default() {
        let config = FetcherConfig::default();
        assert!(config.user_agent.starts_with("Folio/"));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_redirects, 10);
    }
}
