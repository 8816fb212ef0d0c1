//! VisionInference - Remote Tag Identification
//!
//! ## Responsibilities
//!
//! - Send captured frames to the Gemini structured-generation endpoint
//! - Enforce the strict identification schema on responses
//! - Distinguish "no readable tag in frame" from a real identification

use crate::error::{Error, Result};
use crate::models::{ScanResult, TagCondition};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reserved identifier meaning "no tag detected", never a real result
pub const NO_DETECTION_ID: &str = "N/A";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const SYSTEM_INSTRUCTION: &str = "\
You are the computer-vision engine of an industrial asset-tag scanner.
You analyze photos of asset tags, often captured from a distance, blurred, or in low light.

Extraction rules:
1. Identify the unique ID: look for alphanumeric sequences (e.g. REIS-1234, R-99).
2. If the text is partially illegible, use visual context to infer the most likely ID consistent with the REIS pattern.
3. Identify the visible RFID antenna type (UHF inlay, HF spiral coil, round NFC).
4. Describe the physical condition of the tag.
5. If no tag is legible at all, answer with the id \"N/A\".

Respond with strict JSON only.";

const USER_PROMPT: &str =
    "Analyze this industrial asset tag. If the print is blurred, reconstruct the most likely ID.";

/// Structured identification returned by the inference service.
/// `id`, `tag_type` and `condition` are required on the wire; a response
/// missing any of them is an inference error, not a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagIdentification {
    pub id: String,
    pub tag_type: String,
    pub condition: TagCondition,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub visual_data: Option<String>,
}

impl TagIdentification {
    /// Whether this response names a real tag. The "N/A" sentinel (or a blank
    /// id) means "no result this attempt" and must never reach history.
    pub fn is_detection(&self) -> bool {
        !self.id.trim().is_empty() && self.id != NO_DETECTION_ID
    }

    pub fn into_result(self) -> ScanResult {
        ScanResult {
            id: self.id,
            tag_type: self.tag_type,
            condition: self.condition,
            visual_data: self.visual_data.unwrap_or_default(),
            confidence: self.confidence,
            scanned_at: Utc::now(),
        }
    }
}

/// Vision adapter contract
#[async_trait]
pub trait VisionInference: Send + Sync {
    /// Identify the tag in a base64 JPEG frame
    async fn identify(&self, image_base64: &str) -> Result<TagIdentification>;
}

/// Gemini structured-generation client
pub struct GeminiVisionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiVisionClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }
}

fn request_body(image_base64: &str) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "role": "user",
            "parts": [
                { "text": USER_PROMPT },
                {
                    "inlineData": {
                        "mimeType": "image/jpeg",
                        "data": image_base64
                    }
                }
            ]
        }],
        "systemInstruction": {
            "parts": [{ "text": SYSTEM_INSTRUCTION }]
        },
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "id": {
                        "type": "STRING",
                        "description": "Identified asset ID (e.g. REIS-4502)"
                    },
                    "tagType": {
                        "type": "STRING",
                        "description": "RFID hardware family visible in the frame"
                    },
                    "condition": {
                        "type": "STRING",
                        "enum": ["excellent", "good", "worn", "critical"]
                    },
                    "confidence": {
                        "type": "NUMBER",
                        "description": "Certainty from 0 to 1"
                    },
                    "visualData": {
                        "type": "STRING",
                        "description": "Technical description of the asset"
                    }
                },
                "required": ["id", "tagType", "condition"]
            }
        }
    })
}

/// Extract and validate the identification from a generateContent response
fn parse_response(body: &serde_json::Value) -> Result<TagIdentification> {
    let text = body["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or_else(|| Error::Inference("response carried no candidate text".to_string()))?;

    serde_json::from_str::<TagIdentification>(text)
        .map_err(|e| Error::Inference(format!("malformed identification payload: {}", e)))
}

#[async_trait]
impl VisionInference for GeminiVisionClient {
    async fn identify(&self, image_base64: &str) -> Result<TagIdentification> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        // Everything here maps to Inference: the auto-scan loop must be able
        // to swallow any failure of this call, auth-level included.
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(image_base64))
            .send()
            .await
            .map_err(|e| Error::Inference(format!("transport failure: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "inference endpoint returned {}: {}",
                status, body
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Inference(format!("non-JSON response: {}", e)))?;

        let identification = parse_response(&body)?;
        tracing::debug!(
            id = %identification.id,
            tag_type = %identification.tag_type,
            confidence = ?identification.confidence,
            "Identification received"
        );
        Ok(identification)
    }
}
