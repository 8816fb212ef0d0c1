//! REIS Scanner Library
//!
//! Hybrid asset-tag scanner core
//!
//! ## Architecture (4 Components)
//!
//! 1. CaptureDevice - Video stream acquisition and still-frame capture
//! 2. VisionInference - Remote tag identification (Gemini)
//! 3. RadioScan - Proximity tag reading
//! 4. ScanOrchestrator - Capture/analysis state machine
//!
//! ## Design Principles
//!
//! - Adapters are trait seams; the orchestrator owns all session state
//! - One in-flight analysis at a time, stale responses never surface
//! - History is bounded and most-recent-first

pub mod capture_device;
pub mod config;
pub mod error;
pub mod models;
pub mod radio_scan;
pub mod scan_orchestrator;
pub mod vision_inference;

pub use error::{Error, Result};
