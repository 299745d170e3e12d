//! Service layer types

use serde::{Deserialize, Serialize};

/// One face in a recognition result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedFace {
    /// Display name, or "Unknown" when nothing cleared the threshold
    pub name: String,
    /// x1, y1, x2, y2 in probe-image pixels
    pub bbox: [i32; 4],
    pub score: f32,
    pub employee_id: Option<String>,
}

/// Result of recognizing one probe image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub faces: Vec<RecognizedFace>,
    /// Employee whose attendance this request logged, if any
    pub logged_employee_id: Option<String>,
    pub inference_time_ms: u64,
}

/// Result of an enrollment attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollResult {
    pub success: bool,
    pub message: String,
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub version: String,
    pub enrolled: usize,
}
