//! Configuration module for the Waysense writer.
//!
//! This module holds the writer configuration (endpoint, credentials, request
//! timeout, TLS verification) and the transport tuning that used to live in
//! process-wide globals. Values can be built programmatically or loaded from
//! environment variables.

use std::env;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// Request timeout used when the configured value is empty or unparsable
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Maximum time a dial will wait for a connect to complete
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(20);

/// Maximum time allowed for the TLS handshake
pub const DEFAULT_TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Keep-alive period for active connections
pub const DEFAULT_TCP_KEEPALIVE: Duration = Duration::from_secs(60);

const ENV_API_URL: &str = "WAYSENSE_API_URL";
const ENV_API_KEY: &str = "WAYSENSE_API_KEY";
const ENV_API_SECRET: &str = "WAYSENSE_API_SECRET";
const ENV_TIMEOUT: &str = "WAYSENSE_TIMEOUT";
const ENV_SKIP_TLS_VERIFY: &str = "WAYSENSE_SKIP_TLS_VERIFY";

/// Whole duration string: optional sign, then number+unit terms with no spaces.
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?(?:(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:ns|us|µs|μs|ms|s|m|h))+$")
        .expect("valid duration regex")
});

/// One number+unit term. Longer units come first so `ms` is not read as `m`.
static TERM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]*)(?:\.([0-9]*))?(ns|us|µs|μs|ms|s|m|h)").expect("valid term regex")
});

/// Largest duration representable as signed 64-bit nanoseconds.
const MAX_DURATION_NANOS: u128 = i64::MAX as u128;

/// Parse a duration string such as `"1s"`, `"2m"`, `"1.5h"` or `"1h30m"`.
///
/// Accepted units are `ns`, `us` (`µs`), `ms`, `s`, `m` and `h`; terms may
/// carry a fraction and are written back to back with no spaces. A bare `0`
/// is also accepted. Negative values mean "no limit" and come back as zero.
///
/// Empty or malformed input falls back to [`DEFAULT_REQUEST_TIMEOUT`]
/// instead of producing an error.
pub fn parse_timeout(value: &str) -> Duration {
    parse_duration(value).unwrap_or(DEFAULT_REQUEST_TIMEOUT)
}

fn parse_duration(value: &str) -> Option<Duration> {
    let (negative, unsigned) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };

    if unsigned == "0" {
        return Some(Duration::ZERO);
    }

    if !DURATION_RE.is_match(value) {
        return None;
    }

    let mut total: u128 = 0;
    for term in TERM_RE.captures_iter(unsigned) {
        let unit = unit_nanos(&term[3]);

        let whole: u128 = match &term[1] {
            "" => 0,
            digits => digits.parse().ok()?,
        };
        total = total.checked_add(whole.checked_mul(unit)?)?;

        if let Some(frac) = term.get(2) {
            // Digits past nanosecond precision cannot change the result.
            let frac = &frac.as_str()[..frac.as_str().len().min(18)];
            if !frac.is_empty() {
                let scale = 10u128.pow(frac.len() as u32);
                let digits: u128 = frac.parse().ok()?;
                total = total.checked_add(digits * unit / scale)?;
            }
        }

        if total > MAX_DURATION_NANOS {
            return None;
        }
    }

    if negative {
        return Some(Duration::ZERO);
    }

    Some(Duration::from_nanos(u64::try_from(total).ok()?))
}

fn unit_nanos(unit: &str) -> u128 {
    match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        _ => 60 * 60 * 1_000_000_000,
    }
}

/// Connection-level tuning for the pooled HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    /// Time allowed to establish the TCP connection
    pub dial_timeout: Duration,

    /// Time allowed for the TLS handshake once connected
    pub tls_handshake_timeout: Duration,

    /// TCP keep-alive interval for open connections
    pub tcp_keepalive: Duration,

    /// How long an idle pooled connection is kept; `None` means no limit
    pub idle_timeout: Option<Duration>,
}

impl TransportSettings {
    /// Total budget for the connect phase, TCP dial plus TLS handshake.
    pub fn connect_timeout(&self) -> Duration {
        self.dial_timeout.saturating_add(self.tls_handshake_timeout)
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            tls_handshake_timeout: DEFAULT_TLS_HANDSHAKE_TIMEOUT,
            tcp_keepalive: DEFAULT_TCP_KEEPALIVE,
            idle_timeout: None,
        }
    }
}

/// Configuration for an [`HttpWriter`](crate::writer::HttpWriter).
///
/// Settings can be loaded from environment variables:
/// - `WAYSENSE_API_URL`: ingestion endpoint (required)
/// - `WAYSENSE_API_KEY`: API key (default: empty)
/// - `WAYSENSE_API_SECRET`: API secret (default: empty)
/// - `WAYSENSE_TIMEOUT`: request timeout such as `30s` (default: 20s)
/// - `WAYSENSE_SKIP_TLS_VERIFY`: disable certificate checks (default: false)
#[derive(Clone)]
pub struct WriterConfig {
    /// Target URL every payload is posted to
    pub url: String,

    /// Value of the `x-waysense-api-key` header
    pub api_key: String,

    /// Value of the `x-waysense-api-secret` header
    pub api_secret: String,

    /// Overall request timeout; zero disables the limit
    pub request_timeout: Duration,

    /// Accept any server certificate when true
    pub skip_tls_verify: bool,

    /// Connection-level tuning
    pub transport: TransportSettings,
}

impl fmt::Debug for WriterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("skip_tls_verify", &self.skip_tls_verify)
            .field("transport", &self.transport)
            .finish()
    }
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl WriterConfig {
    /// Create a configuration for `url` with default credentials and timeouts.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the API key and secret sent with every request.
    pub fn with_credentials(
        mut self,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        self.api_key = api_key.into();
        self.api_secret = api_secret.into();
        self
    }

    /// Set the request timeout from a duration string, see [`parse_timeout`].
    pub fn with_timeout_str(mut self, timeout: &str) -> Self {
        self.request_timeout = parse_timeout(timeout);
        self
    }

    /// Set the request timeout directly.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_skip_tls_verify(mut self, skip: bool) -> Self {
        self.skip_tls_verify = skip;
        self
    }

    pub fn with_transport(mut self, transport: TransportSettings) -> Self {
        self.transport = transport;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `WAYSENSE_API_URL` is missing or empty
    /// - `WAYSENSE_SKIP_TLS_VERIFY` is not a recognised boolean
    ///
    /// An unparsable `WAYSENSE_TIMEOUT` is not an error; the 20 second
    /// default is used instead.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use waysense_writer::config::WriterConfig;
    ///
    /// let config = WriterConfig::from_env().expect("Failed to load config");
    /// println!("API URL: {}", config.url);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = Self::parse_url()?;

        let api_key = env::var(ENV_API_KEY).unwrap_or_default();
        let api_secret = env::var(ENV_API_SECRET).unwrap_or_default();

        let request_timeout = parse_timeout(&env::var(ENV_TIMEOUT).unwrap_or_default());

        let skip_tls_verify = Self::parse_skip_tls_verify()?;

        Ok(Self {
            url,
            api_key,
            api_secret,
            request_timeout,
            skip_tls_verify,
            transport: TransportSettings::default(),
        })
    }

    fn parse_url() -> Result<String, ConfigError> {
        match env::var(ENV_API_URL) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfigError {
                message: "you must provide an API url".to_string(),
                env_var: Some(ENV_API_URL.to_string()),
            }),
        }
    }

    fn parse_skip_tls_verify() -> Result<bool, ConfigError> {
        match env::var(ENV_SKIP_TLS_VERIFY) {
            Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
                "" | "0" | "false" | "no" => Ok(false),
                "1" | "true" | "yes" => Ok(true),
                _ => Err(ConfigError {
                    message: format!("'{}' is not a valid boolean", value),
                    env_var: Some(ENV_SKIP_TLS_VERIFY.to_string()),
                }),
            },
            Err(_) => Ok(false),
        }
    }
}

impl Default for WriterConfig {
    /// An empty URL with default timeouts; the URL must be filled in before
    /// a writer can be built from it.
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            skip_tls_verify: false,
            transport: TransportSettings::default(),
        }
    }
}
