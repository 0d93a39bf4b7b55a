use crate::{error::AppError, middleware::auth::AuthedUser, state::AppState};
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

/// GET /sessions/{id}/analytics
/// Full post-hoc report. Instructor dashboards only.
#[get("/sessions/{id}/analytics")]
pub async fn session_report(
    state: web::Data<AppState>,
    session_id: web::Path<Uuid>,
    user: AuthedUser,
) -> Result<HttpResponse, AppError> {
    if !user.0.role.is_privileged() {
        return Err(AppError::Forbidden);
    }
    let report = state.analytics.session_report(session_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(report))
}

/// GET /sessions/{id}/analytics/attendance.csv
#[get("/sessions/{id}/analytics/attendance.csv")]
pub async fn attendance_csv(
    state: web::Data<AppState>,
    session_id: web::Path<Uuid>,
    user: AuthedUser,
) -> Result<HttpResponse, AppError> {
    if !user.0.role.is_privileged() {
        return Err(AppError::Forbidden);
    }
    let csv = state.analytics.attendance_csv(session_id.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            "Content-Disposition",
            "attachment; filename=\"attendance_report.csv\"",
        ))
        .body(csv))
}

#[derive(Deserialize)]
pub struct CompareRequest {
    pub session_ids: Vec<Uuid>,
}

/// POST /analytics/compare
/// Cross-session comparison and trend classification for 2-10 sessions.
#[post("/analytics/compare")]
pub async fn compare_sessions(
    state: web::Data<AppState>,
    body: web::Json<CompareRequest>,
    user: AuthedUser,
) -> Result<HttpResponse, AppError> {
    if !user.0.role.is_privileged() {
        return Err(AppError::Forbidden);
    }
    let report = state.analytics.compare_sessions(&body.session_ids).await?;
    Ok(HttpResponse::Ok().json(report))
}
