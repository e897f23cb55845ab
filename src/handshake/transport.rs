use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use thiserror::Error;
use tokio::time;
use tracing::debug;

/// Failures that happen before the TV has answered. A request that fails this
/// way may not have been delivered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("io: {0}")]
    Io(String),
    #[error("request timed out")]
    Timeout,
    #[error("malformed http exchange: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::Protocol(err.to_string())
        } else {
            TransportError::Io(err.to_string())
        }
    }
}

/// One HTTP request against the TV's control endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapRequest {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl SoapRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Whatever the TV answered, including SOAP faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapResponse {
    pub status: u16,
    pub body: String,
}

impl SoapResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Capability to deliver a request and return the TV's complete answer.
///
/// The command channel never opens sockets itself; anything implementing this
/// trait can carry it (real HTTP, an in-memory device for tests, a proxy).
/// Non-2xx answers are returned as a [`SoapResponse`], not as an error.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    async fn post(&self, request: SoapRequest) -> Result<SoapResponse, TransportError>;
}

#[async_trait]
impl<T> SoapTransport for Arc<T>
where
    T: SoapTransport + ?Sized,
{
    async fn post(&self, request: SoapRequest) -> Result<SoapResponse, TransportError> {
        (**self).post(request).await
    }
}

/// HTTP transport backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpSoapTransport {
    client: reqwest::Client,
}

impl HttpSoapTransport {
    /// The TV sits on the local network and drops idle connections, so proxies
    /// are bypassed and nothing is pooled.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SoapTransport for HttpSoapTransport {
    async fn post(&self, request: SoapRequest) -> Result<SoapResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::Protocol(format!("method {}: {}", request.method, e)))?;
        let url = request.url();

        let mut builder = self.client.request(method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.body(request.body).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, bytes = body.len(), %url, "received http response");
        Ok(SoapResponse { status, body })
    }
}

/// Wrapper that bounds every request with a deadline.
#[derive(Debug, Clone)]
pub struct TimeoutTransport<T> {
    inner: T,
    timeout: Duration,
}

impl<T> TimeoutTransport<T> {
    pub fn new(inner: T, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T> SoapTransport for TimeoutTransport<T>
where
    T: SoapTransport,
{
    async fn post(&self, request: SoapRequest) -> Result<SoapResponse, TransportError> {
        match time::timeout(self.timeout, self.inner.post(request)).await {
            Ok(res) => res,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn request(host: String, port: u16) -> SoapRequest {
        SoapRequest {
            host,
            port,
            path: "/nrc/control_0".into(),
            method: "POST".into(),
            headers: vec![("SOAPAction".into(), "\"urn:x#Y\"".into())],
            body: "<ping/>".into(),
        }
    }

    /// Accepts one connection, reads the request and answers with `reply`
    /// verbatim before closing.
    async fn serve_once(reply: &'static [u8]) -> (u16, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut seen = Vec::new();
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                seen.extend_from_slice(&buf[..n]);
                if n == 0 || seen.ends_with(b"<ping/>") {
                    break;
                }
            }
            socket.write_all(reply).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8(seen).unwrap()
        });
        (port, server)
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = request("127.0.0.1".into(), 1);
        assert_eq!(req.header("soapaction"), Some("\"urn:x#Y\""));
        assert_eq!(req.header("Accept"), None);
        assert_eq!(req.url(), "http://127.0.0.1:1/nrc/control_0");
    }

    #[tokio::test]
    async fn posts_over_http() {
        let (port, server) =
            serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\nConnection: close\r\n\r\n<pong>")
                .await;

        let response = HttpSoapTransport::new()
            .unwrap()
            .post(request("127.0.0.1".into(), port))
            .await
            .unwrap();
        assert_eq!(response, SoapResponse::ok("<pong>"));

        let seen = server.await.unwrap().to_ascii_lowercase();
        assert!(seen.starts_with("post /nrc/control_0 http/1.1\r\n"));
        assert!(seen.contains("soapaction: \"urn:x#y\"\r\n"));
        assert!(seen.contains("content-length: 7\r\n"));
    }

    #[tokio::test]
    async fn decodes_chunked_body() {
        let (port, _server) = serve_once(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
              4\r\n<ab>\r\n3\r\ncde\r\n0\r\n\r\n",
        )
        .await;
        let response = HttpSoapTransport::new()
            .unwrap()
            .post(request("127.0.0.1".into(), port))
            .await
            .unwrap();
        assert_eq!(response.body, "<ab>cde");
    }

    #[tokio::test]
    async fn error_status_is_an_answer() {
        let (port, _server) = serve_once(
            b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 10\r\nConnection: close\r\n\r\n<s:Fault/>",
        )
        .await;
        let response = HttpSoapTransport::new()
            .unwrap()
            .post(request("127.0.0.1".into(), port))
            .await
            .unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.body, "<s:Fault/>");
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let (port, _server) = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 500\r\nConnection: close\r\n\r\n<CurrentVolume>1",
        )
        .await;
        let result = HttpSoapTransport::new()
            .unwrap()
            .post(request("127.0.0.1".into(), port))
            .await;
        assert!(result.is_err(), "accepted a truncated body: {:?}", result);
    }

    #[tokio::test]
    async fn refused_connection_is_io() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let result = HttpSoapTransport::new()
            .unwrap()
            .post(request("127.0.0.1".into(), port))
            .await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    struct Stalled;

    #[async_trait]
    impl SoapTransport for Stalled {
        async fn post(&self, _request: SoapRequest) -> Result<SoapResponse, TransportError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn timeout_wrapper_fires() {
        let transport = TimeoutTransport::new(Stalled, Duration::from_millis(20));
        assert_eq!(
            transport.post(request("127.0.0.1".into(), 1)).await,
            Err(TransportError::Timeout)
        );
    }
}
