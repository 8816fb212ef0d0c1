//! ScanOrchestrator - Capture/Analysis State Machine
//!
//! ## Responsibilities
//!
//! - Drive the vision and radio capture paths
//! - Enforce timing and single-flight concurrency policy
//! - Normalize results into ScanResult and keep bounded history
//! - Emit phase transitions and haptic cues for the presentation layer
//!
//! All orchestration state is owned here: adapters are stateless apart from
//! the stream handle, whose ownership transfers to the active session on
//! acquisition.

use crate::capture_device::{CaptureDevice, Resolution};
use crate::error::Result;
use crate::models::{AppPhase, ScanResult};
use crate::radio_scan::RadioScanner;
use crate::vision_inference::VisionInference;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Vibration pattern emitted after a vision identification
pub const VISION_HAPTIC: &[u64] = &[200];
/// Vibration pattern emitted after a radio read, distinct from the vision one
pub const RADIO_HAPTIC: &[u64] = &[100, 50, 100];

pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 10.0;

/// Clamp a requested zoom level to the supported range
pub fn clamp_zoom(level: f64) -> f64 {
    level.clamp(MIN_ZOOM, MAX_ZOOM)
}

/// Notification fan-out to presentation subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum ScannerEvent {
    PhaseChanged { phase: AppPhase },
    ResultRecorded { result: ScanResult },
    /// Vibration request for the presentation layer; the core owns no
    /// vibration hardware
    Haptic { pattern: Vec<u64> },
}

/// Bounded most-recent-first buffer of completed scans
struct ScanHistory {
    entries: VecDeque<ScanResult>,
    capacity: usize,
}

impl ScanHistory {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, result: ScanResult) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(result);
    }

    fn entries(&self) -> Vec<ScanResult> {
        self.entries.iter().cloned().collect()
    }
}

/// Per-attempt vision state, owned exclusively by the orchestrator
struct VisionSession<S> {
    stream: Arc<S>,
    zoom: f64,
    torch_on: bool,
    timer: JoinHandle<()>,
    generation: u64,
}

/// Releases the single-flight slot on every exit path of a cycle, but only
/// while this cycle's generation still owns it. A stale cycle resolving after
/// cancel/restart must not free a slot taken by a newer tick.
struct InFlightGuard<'a> {
    slot: &'a AtomicU64,
    generation: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let _ = self
            .slot
            .compare_exchange(self.generation, 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}

/// ScanOrchestrator instance
pub struct ScanOrchestrator<C: CaptureDevice, R, V> {
    /// Back-reference handed to spawned session tasks
    self_ref: Weak<Self>,
    capture: Arc<C>,
    radio: Arc<R>,
    vision: Arc<V>,
    resolution: Resolution,
    scan_interval: Duration,
    phase: RwLock<AppPhase>,
    history: RwLock<ScanHistory>,
    last_result: RwLock<Option<ScanResult>>,
    vision_session: Mutex<Option<VisionSession<C::Stream>>>,
    radio_listener: Mutex<Option<JoinHandle<()>>>,
    /// Single-flight slot for the capture-and-analyze cycle: 0 when free,
    /// otherwise the generation of the owning cycle
    in_flight: AtomicU64,
    /// Session generation; bumped on every session start and cancel so a
    /// stale in-flight response can never materialize a phantom result
    generation: AtomicU64,
    subscribers: RwLock<Vec<mpsc::UnboundedSender<ScannerEvent>>>,
}

impl<C, R, V> ScanOrchestrator<C, R, V>
where
    C: CaptureDevice + 'static,
    C::Stream: Send + Sync + 'static,
    R: RadioScanner + 'static,
    V: VisionInference + 'static,
{
    /// Create new ScanOrchestrator
    pub fn new(
        capture: Arc<C>,
        radio: Arc<R>,
        vision: Arc<V>,
        resolution: Resolution,
        scan_interval: Duration,
        history_capacity: usize,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            capture,
            radio,
            vision,
            resolution,
            scan_interval,
            phase: RwLock::new(AppPhase::Idle),
            history: RwLock::new(ScanHistory::new(history_capacity)),
            last_result: RwLock::new(None),
            vision_session: Mutex::new(None),
            radio_listener: Mutex::new(None),
            in_flight: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            subscribers: RwLock::new(Vec::new()),
        })
    }

    /// Register a presentation subscriber
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<ScannerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().await.push(tx);
        rx
    }

    pub async fn phase(&self) -> AppPhase {
        *self.phase.read().await
    }

    /// Recent scans, most-recent-first
    pub async fn history(&self) -> Vec<ScanResult> {
        self.history.read().await.entries()
    }

    pub async fn last_result(&self) -> Option<ScanResult> {
        self.last_result.read().await.clone()
    }

    pub async fn zoom(&self) -> f64 {
        self.vision_session
            .lock()
            .await
            .as_ref()
            .map(|s| s.zoom)
            .unwrap_or(MIN_ZOOM)
    }

    pub async fn torch_on(&self) -> bool {
        self.vision_session
            .lock()
            .await
            .as_ref()
            .map(|s| s.torch_on)
            .unwrap_or(false)
    }

    /// Start a vision scan session. Ignored unless idle; on camera
    /// acquisition failure the phase becomes `Error`.
    pub async fn start_vision_scan(&self) -> Result<()> {
        if *self.phase.read().await != AppPhase::Idle {
            tracing::debug!("scan already in progress, ignoring vision scan request");
            return Ok(());
        }

        *self.last_result.write().await = None;
        self.set_phase(AppPhase::ScanningVision).await;

        let stream = match self.capture.acquire(self.resolution).await {
            Ok(stream) => Arc::new(stream),
            Err(e) => {
                tracing::error!(error = %e, "Camera acquisition failed");
                self.set_phase(AppPhase::Error).await;
                return Err(e);
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // The tick body is spawned so slow capture/inference never blocks the
        // timer; overlap is prevented by the single-flight slot instead. The
        // task holds a Weak so an orphaned timer cannot keep the orchestrator
        // alive.
        let timer = {
            let orch = Weak::clone(&self.self_ref);
            let period = self.scan_interval;
            tokio::spawn(async move {
                let start = tokio::time::Instant::now() + period;
                let mut interval = tokio::time::interval_at(start, period);
                loop {
                    interval.tick().await;
                    let Some(tick) = orch.upgrade() else {
                        break;
                    };
                    tokio::spawn(async move {
                        tick.capture_and_analyze(generation).await;
                    });
                }
            })
        };

        *self.vision_session.lock().await = Some(VisionSession {
            stream,
            zoom: MIN_ZOOM,
            torch_on: false,
            timer,
            generation,
        });

        tracing::info!(interval_ms = self.scan_interval.as_millis() as u64, "Vision scan started");
        Ok(())
    }

    /// Start a radio listen session. Ignored unless idle; unsupported and
    /// restricted platforms short-circuit to their terminal phases without
    /// registering a listener.
    pub async fn start_radio_scan(&self) -> Result<()> {
        if *self.phase.read().await != AppPhase::Idle {
            tracing::debug!("scan already in progress, ignoring radio scan request");
            return Ok(());
        }

        if !self.radio.is_supported() {
            tracing::warn!("Radio scanning unsupported on this platform");
            self.set_phase(AppPhase::Unsupported).await;
            return Ok(());
        }
        if self.radio.is_restricted_context() {
            tracing::warn!("Radio access blocked by the hosting context");
            self.set_phase(AppPhase::SecurityBlocked).await;
            return Ok(());
        }

        *self.last_result.write().await = None;
        self.set_phase(AppPhase::ScanningNfc).await;

        let mut handle = match self.radio.start_scan().await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "Radio scan could not start");
                self.set_phase(AppPhase::SecurityBlocked).await;
                return Err(e);
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // The listener survives a Result (radio sessions are lightweight) and
        // is stopped on the next return to Idle. Holds a Weak for the same
        // reason the timer does.
        let listener = {
            let orch = Weak::clone(&self.self_ref);
            tokio::spawn(async move {
                // One tag held against the reader can emit repeatedly; only a
                // different serial yields a new history entry.
                let mut last_serial: Option<String> = None;
                while let Some(event) = handle.recv().await {
                    let Some(orch) = orch.upgrade() else {
                        break;
                    };
                    if orch.generation.load(Ordering::SeqCst) != generation {
                        break;
                    }
                    let serial = event.serial_number.trim().to_uppercase();
                    if last_serial.as_deref() == Some(serial.as_str()) {
                        tracing::debug!(serial = %serial, "Duplicate radio read ignored");
                        continue;
                    }
                    last_serial = Some(serial);
                    orch.record_result(event.normalize(), RADIO_HAPTIC).await;
                }
            })
        };

        *self.radio_listener.lock().await = Some(listener);
        Ok(())
    }

    /// Run one capture-and-analyze cycle against the active vision session
    pub async fn scan_now(&self) {
        let generation = {
            let session = self.vision_session.lock().await;
            match session.as_ref() {
                Some(s) => s.generation,
                None => return,
            }
        };
        self.capture_and_analyze(generation).await;
    }

    /// Adjust the session zoom by a delta; the stored value is clamped to
    /// [1.0, 10.0] and delegated leniently. Returns the stored zoom.
    pub async fn adjust_zoom(&self, delta: f64) -> f64 {
        let mut slot = self.vision_session.lock().await;
        let Some(session) = slot.as_mut() else {
            return MIN_ZOOM;
        };

        session.zoom = clamp_zoom(session.zoom + delta);
        if self.capture.supports_zoom(&session.stream) {
            if let Err(e) = self.capture.set_zoom(&session.stream, session.zoom).await {
                tracing::debug!(error = %e, "Zoom constraint not applied");
            }
        } else {
            tracing::debug!(zoom = session.zoom, "Zoom capability absent, keeping software value");
        }
        session.zoom
    }

    /// Toggle the session illumination flag; delegated leniently, affecting
    /// the next captured frame. Returns the new flag.
    pub async fn toggle_torch(&self) -> bool {
        let mut slot = self.vision_session.lock().await;
        let Some(session) = slot.as_mut() else {
            return false;
        };

        session.torch_on = !session.torch_on;
        if self.capture.supports_torch(&session.stream) {
            if let Err(e) = self
                .capture
                .set_torch(&session.stream, session.torch_on)
                .await
            {
                tracing::debug!(error = %e, "Torch constraint not applied");
            }
        } else {
            tracing::debug!(torch = session.torch_on, "Torch capability absent");
        }
        session.torch_on
    }

    /// Tear down any active session and return to idle
    pub async fn cancel(&self) {
        // Invalidate in-flight work before releasing resources: a response
        // arriving after this point is discarded by the generation check.
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(session) = self.vision_session.lock().await.take() {
            self.teardown_vision_session(session).await;
        }
        if let Some(listener) = self.radio_listener.lock().await.take() {
            listener.abort();
        }
        self.in_flight.store(0, Ordering::SeqCst);
        self.set_phase(AppPhase::Idle).await;
    }

    /// One tick of the recurring capture-and-analyze cycle.
    ///
    /// Transient failures (frame capture, inference, no readable tag) are
    /// logged at debug level and recovered locally: the tick only clears the
    /// single-flight lock and the next one proceeds.
    async fn capture_and_analyze(&self, generation: u64) {
        if self
            .in_flight
            .compare_exchange(0, generation, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("analysis already in flight, skipping tick");
            return;
        }
        let _guard = InFlightGuard {
            slot: &self.in_flight,
            generation,
        };

        let stream = {
            let session = self.vision_session.lock().await;
            match session.as_ref() {
                Some(s) if s.generation == generation => Arc::clone(&s.stream),
                _ => {
                    tracing::debug!("no active vision session for this tick");
                    return;
                }
            }
        };

        let frame = match self.capture.capture_still_frame(&stream).await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "Frame capture failed, retrying next tick");
                return;
            }
        };

        let identification = match self.vision.identify(&frame).await {
            Ok(identification) => identification,
            Err(e) => {
                tracing::debug!(error = %e, "Inference failed, retrying next tick");
                return;
            }
        };

        if !identification.is_detection() {
            tracing::debug!("no readable tag in frame");
            return;
        }

        // The session may have been cancelled or replaced while the inference
        // call was in flight; a stale response must not become a result.
        let session = {
            let mut slot = self.vision_session.lock().await;
            let current = slot
                .as_ref()
                .map(|s| s.generation == generation)
                .unwrap_or(false);
            if !current {
                tracing::debug!("session ended mid-inference, discarding stale result");
                return;
            }
            slot.take()
        };

        if let Some(session) = session {
            self.teardown_vision_session(session).await;
        }
        self.record_result(identification.into_result(), VISION_HAPTIC)
            .await;
    }

    /// Stop the timer, force illumination off and release the stream
    async fn teardown_vision_session(&self, session: VisionSession<C::Stream>) {
        session.timer.abort();
        if let Err(e) = self.capture.set_torch(&session.stream, false).await {
            tracing::debug!(error = %e, "Torch off on teardown not applied");
        }
        self.capture.release(&session.stream).await;
    }

    /// Record a completed scan: history, last-result slot, phase, haptics
    async fn record_result(&self, result: ScanResult, haptic: &[u64]) {
        tracing::info!(
            id = %result.id,
            tag_type = %result.tag_type,
            condition = %result.condition,
            "Scan result recorded"
        );

        self.history.write().await.push(result.clone());
        *self.last_result.write().await = Some(result.clone());
        self.set_phase(AppPhase::Result).await;
        self.notify(ScannerEvent::ResultRecorded { result }).await;
        self.notify(ScannerEvent::Haptic {
            pattern: haptic.to_vec(),
        })
        .await;
    }

    async fn set_phase(&self, phase: AppPhase) {
        {
            let mut current = self.phase.write().await;
            if *current == phase {
                return;
            }
            *current = phase;
        }
        tracing::info!(?phase, "Phase transition");
        self.notify(ScannerEvent::PhaseChanged { phase }).await;
    }

    async fn notify(&self, event: ScannerEvent) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
