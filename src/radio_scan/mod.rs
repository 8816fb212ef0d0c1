//! RadioScan - Proximity Tag Reading
//!
//! ## Responsibilities
//!
//! - Report whether the platform exposes a radio-tag reading facility
//! - Start a listen session and deliver detected-tag events asynchronously
//! - Normalize hardware reads into the shared ScanResult shape

use crate::error::{Error, Result};
use crate::models::{ScanResult, TagCondition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Fixed hardware-type label for radio reads
pub const RADIO_TAG_TYPE: &str = "RFID HF / NFC";

/// Fixed description attached to every radio-sourced result
pub const RADIO_READ_NOTE: &str = "Direct read via radio hardware.";

/// One detected-tag event from the reader
#[derive(Debug, Clone)]
pub struct RadioTagEvent {
    /// Hardware-assigned serial identifier, as delivered by the reader
    pub serial_number: String,
    pub detected_at: DateTime<Utc>,
}

impl RadioTagEvent {
    /// Map the hardware read into the shared result shape. Radio reads are
    /// exact, not inferred, so the condition is always excellent and there is
    /// no confidence value.
    pub fn normalize(&self) -> ScanResult {
        ScanResult {
            id: self.serial_number.trim().to_uppercase(),
            tag_type: RADIO_TAG_TYPE.to_string(),
            condition: TagCondition::Excellent,
            visual_data: RADIO_READ_NOTE.to_string(),
            confidence: None,
            scanned_at: self.detected_at,
        }
    }
}

/// Active listen session. Dropping the handle stops listening.
pub struct RadioScanHandle {
    events: mpsc::Receiver<RadioTagEvent>,
    task: JoinHandle<()>,
}

impl RadioScanHandle {
    pub fn new(events: mpsc::Receiver<RadioTagEvent>, task: JoinHandle<()>) -> Self {
        Self { events, task }
    }

    /// Next detected-tag event; None once the reader disconnects
    pub async fn recv(&mut self) -> Option<RadioTagEvent> {
        self.events.recv().await
    }
}

impl Drop for RadioScanHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Radio adapter contract
#[async_trait]
pub trait RadioScanner: Send + Sync {
    /// False when the host platform exposes no radio-tag reading facility
    fn is_supported(&self) -> bool;

    /// True when the hosting context forbids radio hardware access
    fn is_restricted_context(&self) -> bool;

    /// Begin listening for proximity reads. Fails with `Unsupported` or
    /// `SecurityBlocked`; a platform refusal mid-setup is `SecurityBlocked`
    /// as well (radio access denied is one terminal condition).
    async fn start_scan(&self) -> Result<RadioScanHandle>;
}

/// Line-oriented reader adapter for keyboard-wedge/serial UID readers.
///
/// Such readers present as a character device emitting one tag serial per
/// line. The device node is supplied by configuration; no configured node
/// means the capability is absent.
pub struct SerialReaderRadioScanner {
    device: Option<PathBuf>,
}

impl SerialReaderRadioScanner {
    pub fn new(device: Option<PathBuf>) -> Self {
        Self { device }
    }
}

#[async_trait]
impl RadioScanner for SerialReaderRadioScanner {
    fn is_supported(&self) -> bool {
        self.device.as_ref().map(|p| p.exists()).unwrap_or(false)
    }

    fn is_restricted_context(&self) -> bool {
        // The reader exists but this process may not open it: the platform
        // analogue of an embedded context being denied radio access.
        let Some(device) = &self.device else {
            return false;
        };
        if !device.exists() {
            return false;
        }
        match std::fs::File::open(device) {
            Ok(_) => false,
            Err(e) => e.kind() == std::io::ErrorKind::PermissionDenied,
        }
    }

    async fn start_scan(&self) -> Result<RadioScanHandle> {
        if !self.is_supported() {
            return Err(Error::Unsupported);
        }
        if self.is_restricted_context() {
            return Err(Error::SecurityBlocked(
                "radio reader access denied in this context".to_string(),
            ));
        }

        let device = self.device.clone().ok_or(Error::Unsupported)?;
        let file = tokio::fs::File::open(&device)
            .await
            .map_err(|e| Error::SecurityBlocked(format!("reader open refused: {}", e)))?;

        tracing::info!(device = %device.display(), "Radio listen session started");

        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(file).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let serial = line.trim().to_string();
                        if serial.is_empty() {
                            continue;
                        }
                        tracing::debug!(serial = %serial, "Radio tag detected");
                        let event = RadioTagEvent {
                            serial_number: serial,
                            detected_at: Utc::now(),
                        };
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Radio reader disconnected");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Radio reader error, stopping listen");
                        break;
                    }
                }
            }
        });

        Ok(RadioScanHandle::new(rx, task))
    }
}
