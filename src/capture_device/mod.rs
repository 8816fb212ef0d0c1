//! CaptureDevice - Video Stream Acquisition and Still-Frame Capture
//!
//! ## Responsibilities
//!
//! - Acquire/release a video stream from the physical camera
//! - Zoom and illumination control behind explicit capability queries
//! - One-frame JPEG capture (base64) for the vision pipeline

use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;

/// mjpeg qscale corresponding to the fixed 0.9 JPEG quality
const JPEG_QSCALE: &str = "3";

/// Requested capture resolution hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// 3840x2160, preferred for long-distance tag reads
    pub const ULTRA_HD: Resolution = Resolution {
        width: 3840,
        height: 2160,
    };
}

impl Default for Resolution {
    fn default() -> Self {
        Self::ULTRA_HD
    }
}

/// Capture adapter contract.
///
/// Zoom and torch capability vary by device; `supports_zoom`/`supports_torch`
/// answer explicitly and the setters are lenient no-ops when the capability is
/// absent.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    type Stream: Send + Sync;

    /// Acquire a video stream at a resolution hint, falling back to whatever
    /// the device grants. Fails with `DeviceUnavailable` when no camera
    /// matches or permission is denied.
    async fn acquire(&self, resolution: Resolution) -> Result<Self::Stream>;

    /// Stop the stream. Idempotent; safe on an already-released stream.
    async fn release(&self, stream: &Self::Stream);

    fn supports_zoom(&self, stream: &Self::Stream) -> bool;

    fn supports_torch(&self, stream: &Self::Stream) -> bool;

    /// Apply a continuous zoom level; no-op when unsupported.
    async fn set_zoom(&self, stream: &Self::Stream, level: f64) -> Result<()>;

    /// Apply the illumination constraint; no-op when unsupported.
    async fn set_torch(&self, stream: &Self::Stream, on: bool) -> Result<()>;

    /// Grab the current frame at native resolution, encode it as JPEG at the
    /// fixed quality and return the base64 text form.
    async fn capture_still_frame(&self, stream: &Self::Stream) -> Result<String>;
}

/// Stream handle for the ffmpeg-backed device
pub struct DeviceStream {
    device: PathBuf,
    resolution: Resolution,
    released: AtomicBool,
}

impl DeviceStream {
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// ffmpeg-backed capture adapter for V4L2 devices.
///
/// UVC cameras expose neither continuous zoom nor a torch through this path,
/// so both capability queries answer false and the setters no-op.
pub struct FfmpegCaptureDevice {
    device: PathBuf,
    capture_timeout: Duration,
}

impl FfmpegCaptureDevice {
    pub fn new(device: PathBuf, capture_timeout: Duration) -> Self {
        Self {
            device,
            capture_timeout,
        }
    }

    /// Check that ffmpeg is available
    pub async fn check_ffmpeg() -> Result<String> {
        let output = Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(|e| Error::DeviceUnavailable(format!("ffmpeg not found: {}", e)))?;

        if !output.status.success() {
            return Err(Error::DeviceUnavailable(
                "ffmpeg version check failed".to_string(),
            ));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        let first_line = version.lines().next().unwrap_or("unknown");
        Ok(first_line.to_string())
    }

    fn frame_args(device: &PathBuf, resolution: Option<Resolution>) -> Vec<String> {
        let mut args = vec!["-f".to_string(), "v4l2".to_string()];
        if let Some(res) = resolution {
            args.push("-video_size".to_string());
            args.push(format!("{}x{}", res.width, res.height));
        }
        args.push("-i".to_string());
        args.push(device.display().to_string());
        for arg in [
            "-frames:v",
            "1",
            "-f",
            "image2pipe",
            "-vcodec",
            "mjpeg",
            "-q:v",
            JPEG_QSCALE,
            "-loglevel",
            "error",
            "-y",
            "-",
        ] {
            args.push(arg.to_string());
        }
        args
    }

    /// Grab one JPEG frame via ffmpeg.
    ///
    /// Uses kill_on_drop(true): when the timeout fires and the future is
    /// cancelled, the Child is dropped and ffmpeg receives SIGKILL, so an
    /// unresponsive device cannot leave zombie processes behind.
    async fn grab_frame(&self, resolution: Option<Resolution>) -> Result<Vec<u8>> {
        let child = Command::new("ffmpeg")
            .args(Self::frame_args(&self.device, resolution))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::FrameCaptureFailed(format!("ffmpeg spawn failed: {}", e)))?;

        match tokio::time::timeout(self.capture_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Error::FrameCaptureFailed(format!(
                        "ffmpeg failed: {}",
                        stderr.trim()
                    )));
                }

                if output.stdout.is_empty() {
                    return Err(Error::FrameCaptureFailed(
                        "ffmpeg returned empty output".to_string(),
                    ));
                }

                Ok(output.stdout)
            }
            Ok(Err(e)) => Err(Error::FrameCaptureFailed(format!(
                "ffmpeg execution failed: {}",
                e
            ))),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.capture_timeout.as_millis() as u64,
                    device = %self.device.display(),
                    "ffmpeg timeout, process killed via kill_on_drop"
                );
                Err(Error::FrameCaptureFailed(format!(
                    "ffmpeg timeout ({}ms)",
                    self.capture_timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl CaptureDevice for FfmpegCaptureDevice {
    type Stream = DeviceStream;

    async fn acquire(&self, resolution: Resolution) -> Result<DeviceStream> {
        if let Err(e) = tokio::fs::metadata(&self.device).await {
            return Err(Error::DeviceUnavailable(format!(
                "{}: {}",
                self.device.display(),
                e
            )));
        }

        tracing::info!(
            device = %self.device.display(),
            width = resolution.width,
            height = resolution.height,
            "Capture stream acquired"
        );

        Ok(DeviceStream {
            device: self.device.clone(),
            resolution,
            released: AtomicBool::new(false),
        })
    }

    async fn release(&self, stream: &DeviceStream) {
        if stream.released.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(device = %stream.device.display(), "Capture stream released");
    }

    fn supports_zoom(&self, _stream: &DeviceStream) -> bool {
        false
    }

    fn supports_torch(&self, _stream: &DeviceStream) -> bool {
        false
    }

    async fn set_zoom(&self, _stream: &DeviceStream, level: f64) -> Result<()> {
        tracing::debug!(level, "Zoom capability absent on this device, ignoring");
        Ok(())
    }

    async fn set_torch(&self, _stream: &DeviceStream, on: bool) -> Result<()> {
        tracing::debug!(on, "Torch capability absent on this device, ignoring");
        Ok(())
    }

    async fn capture_still_frame(&self, stream: &DeviceStream) -> Result<String> {
        if stream.is_released() {
            return Err(Error::FrameCaptureFailed(
                "stream already released".to_string(),
            ));
        }

        // Requested resolution first, then whatever the device grants.
        let jpeg = match self.grab_frame(Some(stream.resolution)).await {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    "Requested resolution rejected, retrying with device default"
                );
                self.grab_frame(None).await?
            }
        };

        tracing::debug!(size = jpeg.len(), "Still frame captured");
        Ok(base64::engine::general_purpose::STANDARD.encode(jpeg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_stream(released: bool) -> DeviceStream {
        DeviceStream {
            device: PathBuf::from("/dev/video9"),
            resolution: Resolution::default(),
            released: AtomicBool::new(released),
        }
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let device = FfmpegCaptureDevice::new(PathBuf::from("/dev/video9"), Duration::from_secs(1));
        let stream = test_stream(false);

        device.release(&stream).await;
        device.release(&stream).await;
        assert!(stream.is_released());
    }

    #[tokio::test]
    async fn test_capture_on_released_stream_fails() {
        let device = FfmpegCaptureDevice::new(PathBuf::from("/dev/video9"), Duration::from_secs(1));
        let stream = test_stream(true);

        let result = device.capture_still_frame(&stream).await;
        assert!(matches!(result, Err(Error::FrameCaptureFailed(_))));
    }

    #[tokio::test]
    async fn test_acquire_missing_device_is_unavailable() {
        let device = FfmpegCaptureDevice::new(
            PathBuf::from("/dev/video-does-not-exist"),
            Duration::from_secs(1),
        );
        let result = device.acquire(Resolution::default()).await;
        assert!(matches!(result, Err(Error::DeviceUnavailable(_))));
    }

    #[test]
    fn test_frame_args_resolution_hint() {
        let device = PathBuf::from("/dev/video0");
        let args = FfmpegCaptureDevice::frame_args(&device, Some(Resolution::ULTRA_HD));
        assert!(args.contains(&"3840x2160".to_string()));
        assert!(args.contains(&"-video_size".to_string()));

        let args = FfmpegCaptureDevice::frame_args(&device, None);
        assert!(!args.contains(&"-video_size".to_string()));
        assert!(args.contains(&"mjpeg".to_string()));
    }
}
