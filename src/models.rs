//! Shared domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Physical condition of a scanned tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCondition {
    Excellent,
    Good,
    Worn,
    Critical,
}

impl TagCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagCondition::Excellent => "excellent",
            TagCondition::Good => "good",
            TagCondition::Worn => "worn",
            TagCondition::Critical => "critical",
        }
    }
}

impl std::fmt::Display for TagCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized output of either capture path (radio or vision).
/// Immutable once created; `id` is never the "N/A" sentinel by the time a
/// result reaches history or the result phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// Non-empty identifier, uppercased when sourced from radio hardware
    pub id: String,
    /// Hardware/category label (e.g. "RFID HF / NFC", "Inlay UHF")
    pub tag_type: String,
    /// Physical condition; radio reads are always `Excellent` (exact reads)
    pub condition: TagCondition,
    /// Free-text technical description; empty for radio-sourced results
    #[serde(default)]
    pub visual_data: String,
    /// 0-1 certainty, present only for vision-sourced results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// When the read completed
    pub scanned_at: DateTime<Utc>,
}

/// Orchestrator state machine value, rendered by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppPhase {
    Idle,
    ScanningVision,
    ScanningNfc,
    Result,
    Error,
    Unsupported,
    SecurityBlocked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_serde_lowercase() {
        let json = serde_json::to_string(&TagCondition::Worn).unwrap();
        assert_eq!(json, "\"worn\"");

        let parsed: TagCondition = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(parsed, TagCondition::Critical);
    }

    #[test]
    fn test_condition_rejects_unknown_value() {
        let parsed = serde_json::from_str::<TagCondition>("\"pristine\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_scan_result_wire_shape() {
        let result = ScanResult {
            id: "REIS-4502".to_string(),
            tag_type: "Inlay UHF".to_string(),
            condition: TagCondition::Worn,
            visual_data: "Peeling laminate".to_string(),
            confidence: Some(0.8),
            scanned_at: Utc::now(),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["tagType"], "Inlay UHF");
        assert_eq!(json["visualData"], "Peeling laminate");
        assert_eq!(json["condition"], "worn");
    }

    #[test]
    fn test_phase_serde_snake_case() {
        let json = serde_json::to_string(&AppPhase::SecurityBlocked).unwrap();
        assert_eq!(json, "\"security_blocked\"");
    }
}
