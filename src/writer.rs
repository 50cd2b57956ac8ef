//! HTTP writer module for delivering payloads to the Waysense API.
//!
//! Each call to [`HttpWriter::write`] performs exactly one authenticated
//! POST and interprets the JSON envelope returned by the server. There is
//! no buffering and no retry; every failure goes straight back to the caller.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{parse_timeout, WriterConfig};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-waysense-api-key";

/// Header carrying the API secret.
pub const API_SECRET_HEADER: &str = "x-waysense-api-secret";

/// Response envelope returned by the ingestion API for every status code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HttpResponse {
    /// Server-reported status code
    #[serde(default)]
    pub code: i64,

    /// Server-reported result message
    #[serde(default)]
    pub result: String,
}

/// Errors that can occur while building or using a writer.
#[derive(Debug)]
pub enum WriterError {
    /// Writer configuration is unusable (empty URL, client build failure)
    Config(String),

    /// Request never produced a response (DNS, connect, TLS, timeout)
    Transport(reqwest::Error),

    /// Response body, possibly cut short by a read failure, is not a valid
    /// envelope. Bytes that are not valid UTF-8 are replaced with U+FFFD in `body`.
    ResponseFormat { status: StatusCode, body: String },

    /// Server answered with a non-200 status and a valid envelope
    Application { code: i64, result: String },
}

impl WriterError {
    /// Whether the failure happened below the HTTP layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, WriterError::Transport(_))
    }

    /// Whether the failure was the request timeout expiring.
    pub fn is_timeout(&self) -> bool {
        match self {
            WriterError::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}

impl fmt::Display for WriterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterError::Config(message) => write!(f, "{}", message),
            WriterError::Transport(e) => write!(f, "{}", e),
            WriterError::ResponseFormat { status, body } => {
                write!(f, "Bad code:{} response: {}", status.as_u16(), body)
            }
            WriterError::Application { code, result } => {
                write!(f, "{} with code:{}", result, code)
            }
        }
    }
}

impl std::error::Error for WriterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriterError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for WriterError {
    fn from(err: reqwest::Error) -> Self {
        WriterError::Transport(err)
    }
}

/// A sink that accepts whole payloads.
///
/// The timeout and close hooks exist so every transport can sit behind the
/// same interface, even when, as for [`HttpWriter`], they have nothing to do.
#[async_trait]
pub trait Writer: Send + Sync {
    /// Deliver `data`, returning the number of bytes the transport reports.
    async fn write(&self, data: &[u8]) -> Result<usize, WriterError>;

    fn set_write_timeout(&self, timeout: Duration) -> Result<(), WriterError>;

    fn close(&self) -> Result<(), WriterError>;
}

/// Writer posting each payload to a fixed URL with API key credentials.
///
/// The underlying `reqwest::Client` keeps a connection pool shared by every
/// call, so one writer can serve concurrent tasks through `&self` or an
/// `Arc`. All fields are fixed at construction.
///
/// # Example
///
/// ```no_run
/// use waysense_writer::writer::HttpWriter;
///
/// #[tokio::main]
/// async fn main() {
///     let writer = HttpWriter::with_settings(
///         "https://api.waysense.example/v1/points",
///         "my-key",
///         "my-secret",
///         "30s",
///         false,
///     )
///     .expect("Failed to create writer");
///
///     match writer.write(b"cpu,host=a value=1").await {
///         Ok(_) => println!("delivered"),
///         Err(e) => eprintln!("Failed to send: {}", e),
///     }
/// }
/// ```
#[derive(Clone)]
pub struct HttpWriter {
    /// The underlying HTTP client (reused for connection pooling)
    client: Client,

    /// Endpoint every payload is posted to
    url: String,

    api_key: String,
    api_secret: String,

    /// Overall request timeout; zero means unlimited
    timeout: Duration,
}

impl fmt::Debug for HttpWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpWriter")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpWriter {
    /// Create a new writer from a configuration.
    ///
    /// # Errors
    ///
    /// Returns `WriterError::Config` if the URL is empty or the HTTP client
    /// cannot be built.
    pub fn new(config: &WriterConfig) -> Result<Self, WriterError> {
        if config.url.is_empty() {
            return Err(WriterError::Config(
                "you must provide an API url".to_string(),
            ));
        }

        let transport = &config.transport;
        let mut builder = Client::builder()
            .connect_timeout(transport.connect_timeout())
            .tcp_keepalive(transport.tcp_keepalive)
            .pool_idle_timeout(transport.idle_timeout)
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .no_proxy();

        // A zero timeout leaves requests unbounded.
        if !config.request_timeout.is_zero() {
            builder = builder.timeout(config.request_timeout);
        }

        let client = builder
            .build()
            .map_err(|e| WriterError::Config(e.to_string()))?;

        debug!(
            url = %config.url,
            timeout_ms = config.request_timeout.as_millis(),
            skip_tls_verify = config.skip_tls_verify,
            "HTTP writer initialized"
        );

        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            timeout: config.request_timeout,
        })
    }

    /// Create a new writer from individual settings.
    ///
    /// `timeout` is a duration string like `"1s"` or `"1m"`; an empty or
    /// malformed value silently becomes 20 seconds.
    pub fn with_settings(
        address: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        timeout: &str,
        skip_tls_verify: bool,
    ) -> Result<Self, WriterError> {
        let config = WriterConfig::new(address)
            .with_credentials(api_key, api_secret)
            .with_timeout(parse_timeout(timeout))
            .with_skip_tls_verify(skip_tls_verify);

        Self::new(&config)
    }

    /// Post `data` to the configured URL.
    ///
    /// # Returns
    ///
    /// `Ok(0)` when the server answers 200 with a valid envelope. The count
    /// is always zero, not `data.len()`.
    ///
    /// # Errors
    ///
    /// - `Transport` when no response arrives
    /// - `ResponseFormat` when the body is not a valid envelope, for any
    ///   status, including a body cut short by a read failure
    /// - `Application` when the status is not 200 and the envelope is valid
    pub async fn write(&self, data: &[u8]) -> Result<usize, WriterError> {
        debug!(
            url = %self.url,
            payload_bytes = data.len(),
            "Posting payload"
        );

        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(API_SECRET_HEADER, &self.api_secret)
            .body(data.to_vec())
            .send()
            .await?;

        let status = response.status();

        let body = read_body(response).await;

        let envelope: HttpResponse = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    status = status.as_u16(),
                    error = %e,
                    "Response is not a valid envelope"
                );
                return Err(WriterError::ResponseFormat {
                    status,
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }
        };

        if status == StatusCode::OK {
            debug!(code = envelope.code, "Payload accepted");
            Ok(0)
        } else {
            warn!(
                status = status.as_u16(),
                code = envelope.code,
                result = %envelope.result,
                "Payload rejected"
            );
            Err(WriterError::Application {
                code: envelope.code,
                result: envelope.result,
            })
        }
    }

    /// Get the configured URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the effective request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }
}

/// Drain the response body so the connection goes back to the pool.
///
/// A read failure part way through keeps whatever arrived before it; the
/// envelope decode then decides what to report.
async fn read_body(mut response: reqwest::Response) -> Vec<u8> {
    let mut body = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => body.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(e) => {
                warn!(
                    error = %e,
                    received_bytes = body.len(),
                    "Response body read failed"
                );
                break;
            }
        }
    }
    body
}

#[async_trait]
impl Writer for HttpWriter {
    async fn write(&self, data: &[u8]) -> Result<usize, WriterError> {
        HttpWriter::write(self, data).await
    }

    /// The timeout is fixed at construction; this only exists for interface
    /// conformance.
    fn set_write_timeout(&self, _timeout: Duration) -> Result<(), WriterError> {
        Ok(())
    }

    /// The connection pool belongs to the shared client and is not torn down here.
    fn close(&self) -> Result<(), WriterError> {
        Ok(())
    }
}
