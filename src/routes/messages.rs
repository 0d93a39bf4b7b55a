use crate::{
    error::AppError,
    middleware::auth::AuthedUser,
    models::ChatMessage,
    services::ExportFormat,
    state::AppState,
};
use actix_web::{get, web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize)]
pub struct MessagesResponse {
    pub session_id: Uuid,
    pub messages: Vec<ChatMessage>,
}

/// GET /sessions/{id}/messages
/// Messages in creation order, filtered by the caller's visibility.
#[get("/sessions/{id}/messages")]
pub async fn list_messages(
    state: web::Data<AppState>,
    session_id: web::Path<Uuid>,
    user: AuthedUser,
) -> Result<HttpResponse, AppError> {
    let session_id = session_id.into_inner();
    let messages = state.chat.list_messages(session_id, &user.0).await?;
    Ok(HttpResponse::Ok().json(MessagesResponse {
        session_id,
        messages,
    }))
}

#[derive(Deserialize)]
pub struct ExportParams {
    pub format: String,
    #[serde(default)]
    pub include_private: bool,
}

/// GET /sessions/{id}/messages/export?format=records|table|transcript
/// Including private messages requires a privileged role.
#[get("/sessions/{id}/messages/export")]
pub async fn export_messages(
    state: web::Data<AppState>,
    session_id: web::Path<Uuid>,
    params: web::Query<ExportParams>,
    user: AuthedUser,
) -> Result<HttpResponse, AppError> {
    let session_id = session_id.into_inner();
    let format = ExportFormat::parse(&params.format)?;

    if params.include_private && !user.0.role.is_privileged() {
        return Err(AppError::Forbidden);
    }

    let body = state
        .chat
        .export_messages(session_id, format, params.include_private)
        .await?;

    Ok(HttpResponse::Ok()
        .content_type(format.content_type())
        .body(body))
}
