//! Error handling for the scanner core

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No camera matched or permission was denied
    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A still frame could not be grabbed from the active stream.
    /// Transient during auto-scan: swallowed and retried on the next tick.
    #[error("Frame capture failed: {0}")]
    FrameCaptureFailed(String),

    /// Remote identification failed (transport, non-JSON body, or a response
    /// missing a required field). Transient during auto-scan.
    #[error("Inference error: {0}")]
    Inference(String),

    /// The host platform exposes no radio-tag reading facility
    #[error("Radio scanning is not supported on this platform")]
    Unsupported,

    /// Radio hardware access denied by the hosting context or the platform
    #[error("Radio access blocked: {0}")]
    SecurityBlocked(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),
}
