//! Shared foundation for Skycast: error taxonomy, configuration, log redaction.

pub mod config;
pub mod error;
pub mod redact;

pub use config::{
    CacheConfig, Config, GeocoderKind, HttpConfig, ProviderConfig, UnitSystem, ValidationResult,
};
pub use error::{BoxError, ErrorKind, Outcome, ServiceError};

use anyhow::Result;

/// Initialize tracing/logging.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::debug!("Skycast core initialized");
    Ok(())
}
