//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse},
};
use futures_util::TryStreamExt;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Reqwest-based HTTP client implementation
///
/// Provides HTTP operations with:
/// - Connection pooling via reqwest
/// - rustls TLS
/// - Streaming downloads exposed as `AsyncRead`
///
/// Each call is a single attempt. Failures are classified so the caller's
/// retry policy can tell transient faults from fatal ones.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("photo-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self { client }
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Convert bridge HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    /// Build reqwest request from bridge request
    fn build_request(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        if let Some(body) = request.body {
            req = req.body(body);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    async fn send(&self, request: HttpRequest) -> Result<reqwest::Response> {
        debug!(method = ?request.method, url = %request.url, "Executing HTTP request");
        self.build_request(request)
            .send()
            .await
            .map_err(classify_error)
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Timeouts, refused connections and broken bodies are worth another try;
/// a request that cannot even be built is not.
fn classify_error(error: reqwest::Error) -> BridgeError {
    if error.is_builder() {
        return BridgeError::Permanent(format!("Invalid request: {}", error));
    }
    if error.is_timeout() {
        warn!(error = %error, "HTTP request timed out");
        return BridgeError::Transient(format!("Request timed out: {}", error));
    }
    if error.is_connect() {
        warn!(error = %error, "HTTP connection failed");
        return BridgeError::Transient(format!("Connection failed: {}", error));
    }
    warn!(error = %error, "HTTP request failed");
    BridgeError::Transient(error.to_string())
}

/// Classify a non-2xx status for calls that cannot hand back a response.
fn status_error(status: StatusCode, retry_after: Option<Duration>) -> BridgeError {
    let message = format!("HTTP error: {}", status);
    match status.as_u16() {
        401 | 403 => BridgeError::Auth(message),
        404 => BridgeError::NotFound(message),
        429 => BridgeError::RateLimited {
            message,
            retry_after,
        },
        500..=599 => BridgeError::Transient(message),
        _ => BridgeError::Permanent(message),
    }
}

fn stream_error(error: reqwest::Error) -> std::io::Error {
    let kind = if error.is_timeout() {
        std::io::ErrorKind::TimedOut
    } else {
        std::io::ErrorKind::ConnectionAborted
    };
    std::io::Error::new(kind, error)
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
        .collect()
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.send(request).await?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.bytes().await.map_err(classify_error)?;

        debug!(status, bytes = body.len(), "HTTP response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn download_stream(
        &self,
        request: HttpRequest,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Unpin>> {
        let response = self.send(request).await?;

        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(status_error(response.status(), retry_after));
        }

        let stream = response.bytes_stream().map_err(stream_error);
        let reader = tokio_util::io::StreamReader::new(stream);

        Ok(Box::new(reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ErrorKind;

    #[tokio::test]
    async fn test_http_client_creation() {
        let _client = ReqwestHttpClient::new();
        let _custom = ReqwestHttpClient::with_client(Client::new());
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Get),
            reqwest::Method::GET
        );
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Post),
            reqwest::Method::POST
        );
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Delete),
            reqwest::Method::DELETE
        );
    }

    #[test]
    fn test_status_error_classification() {
        let kind = |code: u16| status_error(StatusCode::from_u16(code).unwrap(), None).kind();

        assert_eq!(kind(401), ErrorKind::Auth);
        assert_eq!(kind(403), ErrorKind::Auth);
        assert_eq!(kind(429), ErrorKind::RateLimit);
        assert_eq!(kind(502), ErrorKind::Transient);
        assert_eq!(kind(404), ErrorKind::Permanent);
        assert_eq!(kind(410), ErrorKind::Permanent);
    }

    #[test]
    fn test_rate_limit_keeps_hint() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(4)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(4)));
    }

    #[tokio::test]
    async fn test_invalid_url_is_permanent() {
        let client = ReqwestHttpClient::new();
        let err = client
            .execute(HttpRequest::new(HttpMethod::Get, "not a url"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }
}
