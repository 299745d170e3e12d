//! Axum REST API handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::service::AttendanceService;
use crate::storage::AttendanceStorage;

use super::dto::*;

/// Application state shared across handlers
pub struct AppState<S: AttendanceStorage> {
    pub service: Arc<AttendanceService<S>>,
    pub start_time: Instant,
}

/// Create the REST API router
pub fn create_rest_router<S: AttendanceStorage>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        // Recognition and enrollment
        .route("/api/v1/recognize", post(recognize_handler::<S>))
        .route("/api/v1/enroll", post(enroll_handler::<S>))
        .route("/api/v1/employees", get(list_employees_handler::<S>))
        .route(
            "/api/v1/employees/:employee_id",
            put(update_handler::<S>).delete(delete_handler::<S>),
        )
        .route("/api/v1/attendance/recent", get(recent_attendance_handler::<S>))
        // System endpoints
        .route("/health", get(health_handler::<S>))
        .route("/api/v1/health", get(health_handler::<S>))
        .route("/metrics", get(metrics_handler::<S>))
        // Stored face images
        .nest_service("/data", ServeDir::new("data"))
        // Middleware
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Fields accepted by enrollment requests
struct EnrollForm {
    employee_id: Option<String>,
    name: Option<String>,
    member_code: String,
    pictures: Vec<Vec<u8>>,
}

async fn read_enroll_form(
    multipart: &mut Multipart,
) -> Result<EnrollForm, (StatusCode, Json<ErrorResponse>)> {
    let mut form = EnrollForm {
        employee_id: None,
        name: None,
        member_code: String::new(),
        pictures: Vec::new(),
    };

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "MULTIPART_ERROR")))
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "employee_id" | "id" => form.employee_id = Some(field.text().await.unwrap_or_default()),
            "name" => form.name = Some(field.text().await.unwrap_or_default()),
            "member_code" => form.member_code = field.text().await.unwrap_or_default(),
            "pictures" | "picture" | "image" => {
                let data = field.bytes().await.map_err(|e| {
                    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "READ_ERROR")))
                })?;
                form.pictures.push(data.to_vec());
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Recognize faces in a probe image and log attendance
async fn recognize_handler<S: AttendanceStorage>(
    State(state): State<Arc<AppState<S>>>,
    mut multipart: Multipart,
) -> Result<Json<RecognizeResponse>, (StatusCode, Json<ErrorResponse>)> {
    let mut image_data: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "MULTIPART_ERROR")))
    })? {
        let name = field.name().unwrap_or("").to_string();

        if name == "file" || name == "image" {
            image_data = Some(field.bytes().await.map_err(|e| {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string(), "READ_ERROR")))
            })?.to_vec());
        }
    }

    let image_data = image_data.ok_or_else(|| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new("Missing image field", "MISSING_IMAGE")))
    })?;

    // Reject undecodable uploads before they reach the recognition core
    if image::guess_format(&image_data).is_err() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Unsupported or corrupt image", "INVALID_IMAGE")),
        ));
    }

    let result = state.service.recognize(&image_data).await.map_err(|e| {
        error!("Recognition failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(&e.to_string(), "RECOGNITION_FAILED")))
    })?;

    let faces = result
        .faces
        .into_iter()
        .map(|f| FaceResultDto {
            name: f.name,
            bbox: f.bbox,
            score: f.score,
        })
        .collect();

    Ok(Json(RecognizeResponse {
        faces,
        inference_time_ms: result.inference_time_ms,
    }))
}

/// Enroll a new employee from one or more photos
async fn enroll_handler<S: AttendanceStorage>(
    State(state): State<Arc<AppState<S>>>,
    mut multipart: Multipart,
) -> Result<Json<EnrollResponse>, (StatusCode, Json<ErrorResponse>)> {
    let form = read_enroll_form(&mut multipart).await?;

    let employee_id = form.employee_id.filter(|v| !v.is_empty()).ok_or_else(|| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new("Missing employee_id field", "MISSING_EMPLOYEE_ID")))
    })?;
    let name = form.name.filter(|v| !v.is_empty()).ok_or_else(|| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new("Missing name field", "MISSING_NAME")))
    })?;
    if form.pictures.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Missing pictures field", "MISSING_PICTURES")),
        ));
    }

    let result = state
        .service
        .enroll(&employee_id, &name, &form.member_code, form.pictures)
        .await
        .map_err(|e| {
            error!("Enrollment failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(&e.to_string(), "ENROLLMENT_FAILED")))
        })?;

    Ok(Json(EnrollResponse {
        success: result.success,
        message: result.message,
    }))
}

/// Re-enroll an existing employee with fresh photos
async fn update_handler<S: AttendanceStorage>(
    State(state): State<Arc<AppState<S>>>,
    Path(employee_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<EnrollResponse>, (StatusCode, Json<ErrorResponse>)> {
    let form = read_enroll_form(&mut multipart).await?;

    let name = form.name.filter(|v| !v.is_empty()).ok_or_else(|| {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse::new("Missing name field", "MISSING_NAME")))
    })?;
    if form.pictures.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Missing pictures field", "MISSING_PICTURES")),
        ));
    }

    let result = state
        .service
        .update_enrollment(&employee_id, &name, &form.member_code, form.pictures)
        .await
        .map_err(|e| {
            error!("Update failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(&e.to_string(), "UPDATE_FAILED")))
        })?;

    Ok(Json(EnrollResponse {
        success: result.success,
        message: result.message,
    }))
}

/// Delete an employee
async fn delete_handler<S: AttendanceStorage>(
    State(state): State<Arc<AppState<S>>>,
    Path(employee_id): Path<String>,
) -> Result<Json<DeleteResponse>, (StatusCode, Json<ErrorResponse>)> {
    let deleted = state.service.remove_employee(&employee_id).await.map_err(|e| {
        error!("Delete failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(&e.to_string(), "DELETE_FAILED")))
    })?;

    Ok(Json(DeleteResponse {
        success: deleted,
        message: if deleted { "Employee deleted successfully" } else { "Employee not found" }.to_string(),
    }))
}

/// Query parameters for listing employees
#[derive(Debug, Deserialize)]
pub struct ListEmployeesQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// List enrolled employees
async fn list_employees_handler<S: AttendanceStorage>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListEmployeesQuery>,
) -> Result<Json<ListEmployeesResponse>, (StatusCode, Json<ErrorResponse>)> {
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(20).min(100);

    let employees = state.service.storage().list_employees(offset, limit).await.map_err(|e| {
        error!("Failed to list employees: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(&e.to_string(), "LIST_FAILED")))
    })?;
    let total = state.service.storage().count_employees().await.unwrap_or(0);

    let employees = employees
        .into_iter()
        .map(|e| EmployeeDto {
            employee_id: e.employee_id,
            name: e.name,
            member_code: e.member_code,
            image_path: e.image_path,
            created_at: e.created_at,
            updated_at: e.updated_at,
        })
        .collect();

    Ok(Json(ListEmployeesResponse {
        employees,
        total,
        offset,
        limit,
    }))
}

/// Query parameters for the attendance log
#[derive(Debug, Deserialize)]
pub struct AttendanceQuery {
    pub limit: Option<i64>,
}

/// Recent attendance log rows
async fn recent_attendance_handler<S: AttendanceStorage>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<AttendanceQuery>,
) -> Result<Json<Vec<AttendanceRecordDto>>, (StatusCode, Json<ErrorResponse>)> {
    let limit = query.limit.unwrap_or(50).min(500);

    let entries = state.service.storage().list_attendance(limit).await.map_err(|e| {
        error!("Failed to list attendance: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new(&e.to_string(), "LIST_FAILED")))
    })?;

    Ok(Json(
        entries
            .into_iter()
            .map(|e| AttendanceRecordDto {
                employee_id: e.employee_id,
                name: e.name,
                member_code: e.member_code,
                timestamp: e.timestamp,
            })
            .collect(),
    ))
}

/// Health check
async fn health_handler<S: AttendanceStorage>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let health = state.service.health();

    Json(HealthResponse {
        healthy: health.healthy,
        version: health.version,
        enrolled: health.enrolled,
    })
}

/// Metrics
async fn metrics_handler<S: AttendanceStorage>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<MetricsResponse> {
    let uptime = state.start_time.elapsed().as_secs();
    let total_employees = state.service.storage().count_employees().await.unwrap_or(0);

    Json(MetricsResponse {
        total_employees,
        enrolled_in_gallery: state.service.gallery().len(),
        uptime_seconds: uptime,
    })
}
