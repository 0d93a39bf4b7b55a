use crate::{
    error::AppError,
    middleware::auth::AuthedUser,
    models::{RaisedHand, SessionUser},
    services::TypingUser,
    state::AppState,
};
use actix_web::{get, web, HttpResponse};
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize)]
pub struct ParticipantsResponse {
    pub session_id: Uuid,
    pub participants: Vec<SessionUser>,
}

/// GET /sessions/{id}/participants
/// Users with a live connection to this session, on this instance.
#[get("/sessions/{id}/participants")]
pub async fn list_participants(
    state: web::Data<AppState>,
    session_id: web::Path<Uuid>,
    _user: AuthedUser,
) -> Result<HttpResponse, AppError> {
    let session_id = session_id.into_inner();
    let participants = state.registry.active_users(session_id).await;
    Ok(HttpResponse::Ok().json(ParticipantsResponse {
        session_id,
        participants,
    }))
}

#[derive(Serialize)]
pub struct TypingResponse {
    pub session_id: Uuid,
    pub typing: Vec<TypingUser>,
}

/// GET /sessions/{id}/typing
/// Users currently flagged as typing (flags self-expire after a few seconds).
#[get("/sessions/{id}/typing")]
pub async fn typing_users(
    state: web::Data<AppState>,
    session_id: web::Path<Uuid>,
    _user: AuthedUser,
) -> Result<HttpResponse, AppError> {
    let session_id = session_id.into_inner();
    let typing = state.chat.typing_users(session_id).await;
    Ok(HttpResponse::Ok().json(TypingResponse { session_id, typing }))
}

#[derive(Serialize)]
pub struct RaisedHandsResponse {
    pub session_id: Uuid,
    pub hands: Vec<RaisedHand>,
}

/// GET /sessions/{id}/hands
/// Active raised hands in raise order.
#[get("/sessions/{id}/hands")]
pub async fn raised_hands(
    state: web::Data<AppState>,
    session_id: web::Path<Uuid>,
    _user: AuthedUser,
) -> Result<HttpResponse, AppError> {
    let session_id = session_id.into_inner();
    let hands = state.chat.raised_hands(session_id).await?;
    Ok(HttpResponse::Ok().json(RaisedHandsResponse { session_id, hands }))
}
