//! REIS Scanner - Hybrid Asset-Tag Scanner
//!
//! Main entry point. Wires the hardware adapters to the orchestrator and
//! drives it from a line-oriented console.

use reis_scanner::{
    capture_device::{FfmpegCaptureDevice, Resolution},
    config::AppConfig,
    radio_scan::SerialReaderRadioScanner,
    scan_orchestrator::{ScanOrchestrator, ScannerEvent},
    vision_inference::GeminiVisionClient,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reis_scanner=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    match FfmpegCaptureDevice::check_ffmpeg().await {
        Ok(version) => tracing::info!(version = %version, "ffmpeg available"),
        Err(e) => tracing::warn!(error = %e, "ffmpeg unavailable, vision scans will fail"),
    }

    let capture = Arc::new(FfmpegCaptureDevice::new(
        config.capture_device.clone(),
        config.capture_timeout,
    ));
    let radio = Arc::new(SerialReaderRadioScanner::new(
        config.radio_reader_device.clone(),
    ));
    let vision = Arc::new(GeminiVisionClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
    ));

    let orchestrator = ScanOrchestrator::new(
        capture,
        radio,
        vision,
        Resolution {
            width: config.capture_width,
            height: config.capture_height,
        },
        config.scan_interval,
        config.history_capacity,
    );

    // Console stand-in for the presentation layer: print events as they come.
    let mut events = orchestrator.subscribe().await;
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ScannerEvent::PhaseChanged { phase } => {
                    println!("[phase] {:?}", phase);
                }
                ScannerEvent::ResultRecorded { result } => {
                    println!(
                        "[result] {} ({}) condition={} {}",
                        result.id, result.tag_type, result.condition, result.visual_data
                    );
                }
                ScannerEvent::Haptic { pattern } => {
                    println!("[haptic] {:?}", pattern);
                }
            }
        }
    });

    tracing::info!("Scanner ready. Commands: v r c + - t s h q");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "v" => {
                if let Err(e) = orchestrator.start_vision_scan().await {
                    tracing::error!(error = %e, "Vision scan failed to start");
                }
            }
            "r" => {
                if let Err(e) = orchestrator.start_radio_scan().await {
                    tracing::error!(error = %e, "Radio scan failed to start");
                }
            }
            "c" => orchestrator.cancel().await,
            "+" => {
                let zoom = orchestrator.adjust_zoom(0.5).await;
                println!("[zoom] {:.1}", zoom);
            }
            "-" => {
                let zoom = orchestrator.adjust_zoom(-0.5).await;
                println!("[zoom] {:.1}", zoom);
            }
            "t" => {
                let on = orchestrator.toggle_torch().await;
                println!("[torch] {}", if on { "on" } else { "off" });
            }
            "s" => orchestrator.scan_now().await,
            "h" => {
                for (i, result) in orchestrator.history().await.iter().enumerate() {
                    println!(
                        "{}. {} ({}) at {}",
                        i + 1,
                        result.id,
                        result.tag_type,
                        result.scanned_at.to_rfc3339()
                    );
                }
            }
            "q" => break,
            "" => {}
            other => println!("unknown command: {}", other),
        }
    }

    orchestrator.cancel().await;
    tracing::info!("Scanner stopped");
    Ok(())
}
