//! REST API request/response data transfer objects

use serde::Serialize;

/// Recognize response
#[derive(Debug, Serialize)]
pub struct RecognizeResponse {
    pub faces: Vec<FaceResultDto>,
    pub inference_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct FaceResultDto {
    pub name: String,
    #[serde(rename = "box")]
    pub bbox: [i32; 4],
    pub score: f32,
}

/// Enroll response
#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub success: bool,
    pub message: String,
}

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Employee record DTO (no embedding blob)
#[derive(Debug, Serialize)]
pub struct EmployeeDto {
    pub employee_id: String,
    pub name: String,
    pub member_code: String,
    pub image_path: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// List employees response
#[derive(Debug, Serialize)]
pub struct ListEmployeesResponse {
    pub employees: Vec<EmployeeDto>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

/// Attendance log row DTO
#[derive(Debug, Serialize)]
pub struct AttendanceRecordDto {
    pub employee_id: String,
    pub name: String,
    pub member_code: String,
    pub timestamp: i64,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub enrolled: usize,
}

/// Metrics response
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub total_employees: i64,
    pub enrolled_in_gallery: usize,
    pub uptime_seconds: u64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
        }
    }
}
