//! Client configuration.
//!
//! Every section has defaults, so an empty TOML document is a valid config.
//! Durations are written in milliseconds:
//!
//! ```toml
//! auto_content_type = true
//!
//! [chunk]
//! min_size = 500000
//! max_workers = 5
//!
//! [upload]
//! max_chunk_attempts = 3
//! chunk_timeout_ms = 60000
//!
//! [funding]
//! balance_refresh_attempts = 3
//! balance_refresh_interval_ms = 1000
//! ```

use std::path::Path;
use std::time::Duration;

use permabundle_transport::{serde_ms, ChunkPolicy, UploadConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Configuration for the funding pre-flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundingConfig {
    /// Balance reads after a confirmed top-up, waiting for it to show.
    pub balance_refresh_attempts: u32,
    #[serde(rename = "balance_refresh_interval_ms", with = "serde_ms")]
    pub balance_refresh_interval: Duration,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            balance_refresh_attempts: 3,
            balance_refresh_interval: Duration::from_secs(1),
        }
    }
}

/// Configuration for the [`Uploader`](crate::Uploader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub chunk: ChunkPolicy,
    pub upload: UploadConfig,
    pub funding: FundingConfig,
    /// Add a sniffed `Content-Type` tag when the caller gives none.
    pub auto_content_type: bool,
    /// Attach a random anchor when the caller gives none.
    pub random_anchor: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkPolicy::default(),
            upload: UploadConfig::default(),
            funding: FundingConfig::default(),
            auto_content_type: true,
            random_anchor: false,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunk
            .validate()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        if self.upload.max_chunk_attempts == 0 {
            return Err(ClientError::Config(
                "upload.max_chunk_attempts must be at least 1".into(),
            ));
        }
        if self.upload.poll_attempts == 0 {
            return Err(ClientError::Config(
                "upload.poll_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(ClientConfig::from_toml_str("").unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = ClientConfig::from_toml_str(
            r#"
            random_anchor = true

            [chunk]
            max_workers = 8

            [funding]
            balance_refresh_interval_ms = 250
            "#,
        )
        .unwrap();

        assert!(config.random_anchor);
        assert!(config.auto_content_type);
        assert_eq!(config.chunk.max_workers, 8);
        assert_eq!(config.chunk.min_size, 500_000);
        assert_eq!(
            config.funding.balance_refresh_interval,
            Duration::from_millis(250)
        );
        assert_eq!(config.funding.balance_refresh_attempts, 3);
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let err = ClientConfig::from_toml_str("[chunk]\nmax_workers = 0\n").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));

        let err = ClientConfig::from_toml_str("[upload]\nmax_chunk_attempts = 0\n").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[upload]\npoll_attempts = 7").unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.upload.poll_attempts, 7);
    }

    #[test]
    fn test_missing_file() {
        let err = ClientConfig::load("/nonexistent/permabundle.toml").unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
    }
}
