//! Runtime configuration
//!
//! All settings come from the process environment (a `.env` file is loaded
//! first when present). Everything has a default except the inference
//! credential: a missing `GEMINI_API_KEY` aborts startup instead of silently
//! disabling the vision path.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Credential for the remote inference service (required)
    pub gemini_api_key: String,
    /// Structured-generation model name
    pub gemini_model: String,
    /// Video device node used by the capture adapter
    pub capture_device: PathBuf,
    /// Preferred capture width (graceful fallback if the device refuses)
    pub capture_width: u32,
    /// Preferred capture height
    pub capture_height: u32,
    /// Timeout for a single still-frame grab
    pub capture_timeout: Duration,
    /// Capture-and-analyze tick interval
    pub scan_interval: Duration,
    /// Recent-scans buffer capacity
    pub history_capacity: usize,
    /// Radio reader device node; absent means radio scanning is unsupported
    pub radio_reader_device: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let gemini_api_key = var("GEMINI_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "GEMINI_API_KEY is not set; the vision path cannot run without it"
                        .to_string(),
                )
            })?;

        Ok(Self {
            gemini_api_key,
            gemini_model: var("GEMINI_MODEL")
                .unwrap_or_else(|| "gemini-3-flash-preview".to_string()),
            capture_device: var("CAPTURE_DEVICE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/dev/video0")),
            capture_width: var("CAPTURE_WIDTH")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3840),
            capture_height: var("CAPTURE_HEIGHT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(2160),
            capture_timeout: Duration::from_secs(
                var("CAPTURE_TIMEOUT_SEC")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            scan_interval: Duration::from_millis(
                var("SCAN_INTERVAL_MS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(4000),
            ),
            history_capacity: var("HISTORY_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            radio_reader_device: var("NFC_READER_DEVICE").map(PathBuf::from),
        })
    }
}
