//! Waysense Writer Library
//!
//! This library delivers byte payloads to the Waysense ingestion API with a
//! single authenticated HTTP POST per write:
//!
//! - **config**: Writer configuration, transport tuning and environment loading
//! - **writer**: The `Writer` trait and its HTTP implementation
//!
//! # Example
//!
//! ```no_run
//! use waysense_writer::config::WriterConfig;
//! use waysense_writer::writer::{HttpWriter, Writer};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Load configuration from environment
//!     let config = WriterConfig::from_env().expect("Failed to load config");
//!
//!     let writer = HttpWriter::new(&config).expect("Failed to create writer");
//!
//!     if let Err(e) = writer.write(b"payload").await {
//!         eprintln!("delivery failed: {}", e);
//!     }
//!
//!     writer.close().ok();
//! }
//! ```

pub mod config;
pub mod writer;

// Re-export commonly used types at the crate root
pub use config::{ConfigError, TransportSettings, WriterConfig};
pub use writer::{HttpResponse, HttpWriter, Writer, WriterError};
