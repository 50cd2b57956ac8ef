//! Waysense Writer - deliver one payload to the ingestion API
//!
//! Reads everything from stdin and posts it to the configured endpoint in a
//! single authenticated request. Exits with status 1 if delivery fails.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `WAYSENSE_API_URL`: Ingestion endpoint (required)
//! - `WAYSENSE_API_KEY`: API key
//! - `WAYSENSE_API_SECRET`: API secret
//! - `WAYSENSE_TIMEOUT`: Request timeout such as `30s` (default: 20s)
//! - `WAYSENSE_SKIP_TLS_VERIFY`: Skip certificate verification (default: false)
//! - `RUST_LOG`: Logging level filter (default: info)

use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use waysense_writer::config::WriterConfig;
use waysense_writer::writer::{HttpWriter, Writer};

#[tokio::main]
async fn main() {
    init_tracing();

    let config = match WriterConfig::from_env() {
        Ok(config) => {
            info!(
                api_url = %config.url,
                timeout_ms = config.request_timeout.as_millis(),
                skip_tls_verify = config.skip_tls_verify,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let writer = match HttpWriter::new(&config) {
        Ok(writer) => writer,
        Err(e) => {
            error!(error = %e, "Failed to create HTTP writer");
            std::process::exit(1);
        }
    };

    let mut payload = Vec::new();
    if let Err(e) = tokio::io::stdin().read_to_end(&mut payload).await {
        error!(error = %e, "Failed to read payload from stdin");
        std::process::exit(1);
    }

    let delivered = deliver(&writer, &payload).await;

    if let Err(e) = writer.close() {
        error!(error = %e, "Failed to close writer");
    }

    if !delivered {
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Send one payload through any writer, logging the outcome.
async fn deliver(writer: &dyn Writer, payload: &[u8]) -> bool {
    match writer.write(payload).await {
        Ok(_) => {
            info!(payload_bytes = payload.len(), "Payload delivered");
            true
        }
        Err(e) if e.is_transport() => {
            error!(error = %e, "Could not reach ingestion API");
            false
        }
        Err(e) => {
            error!(error = %e, "Ingestion API rejected payload");
            false
        }
    }
}
