//! WebSocket transport for live sessions.
//!
//! One duplex connection per (session, user), opened with a bearer credential
//! in the query string. Each connection is an actix actor; inbound events are
//! processed to completion with `ctx.wait` before the next frame is read, so
//! handling within one connection is strictly sequential. Domain errors turn
//! into `error` envelopes to the sender only and never close the connection;
//! only authentication failures do.

use crate::error::AppError;
use crate::middleware::auth::{session_user_from_claims, verify_jwt};
use crate::models::SessionUser;
use crate::services::SessionChatService;
use crate::state::AppState;
use crate::websocket::message_types::{WsInboundEvent, WsOutboundEvent};
use crate::websocket::{ConnectionRegistry, SubscriberId};
use actix::{fut, Actor, ActorContext, ActorFutureExt, AsyncContext, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub session_id: Uuid,
    pub token: Option<String>,
}

/// WebSocket actor for one live connection
struct ChatSession {
    session_id: Uuid,
    user: SessionUser,
    subscriber_id: SubscriberId,
    /// Attendance row opened at connect; closed again at disconnect
    attendance_id: Option<Uuid>,
    registry: ConnectionRegistry,
    chat: Arc<SessionChatService>,
    /// Registry receiver, bridged into the actor in `started`
    rx: Option<UnboundedReceiver<String>>,
    hb: Instant,
}

impl ChatSession {
    #[allow(clippy::too_many_arguments)]
    fn new(
        session_id: Uuid,
        user: SessionUser,
        subscriber_id: SubscriberId,
        attendance_id: Option<Uuid>,
        registry: ConnectionRegistry,
        chat: Arc<SessionChatService>,
        rx: UnboundedReceiver<String>,
    ) -> Self {
        Self {
            session_id,
            user,
            subscriber_id,
            attendance_id,
            registry,
            chat,
            rx: Some(rx),
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(
                    user_id = %act.user.user_id,
                    session_id = %act.session_id,
                    "websocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Run a domain action to completion before the next inbound frame.
    ///
    /// `Ok(Some(text))` is a reply to this socket only; broadcasts happen
    /// inside the future. Errors become `error` envelopes to the sender.
    fn run<F>(&self, ctx: &mut ws::WebsocketContext<Self>, action: F)
    where
        F: Future<Output = Result<Option<String>, AppError>> + 'static,
    {
        let wrapped = fut::wrap_future::<_, Self>(action).map(|result, _act, ctx| match result {
            Ok(Some(reply)) => ctx.text(reply),
            Ok(None) => {}
            Err(e) => ctx.text(WsOutboundEvent::error(e.user_message()).to_json()),
        });
        ctx.wait(wrapped);
    }

    fn handle_event(&self, evt: WsInboundEvent, ctx: &mut ws::WebsocketContext<Self>) {
        let chat = self.chat.clone();
        let registry = self.registry.clone();
        let session_id = self.session_id;
        let user = self.user.clone();
        let subscriber_id = self.subscriber_id;

        match evt {
            WsInboundEvent::ChatMessage {
                message,
                is_private,
                recipient_id,
            } => {
                self.run(ctx, async move {
                    let recipient = match (is_private, recipient_id) {
                        (true, Some(recipient_id)) => {
                            // Resolve the display name from the live roster;
                            // an offline recipient keeps the raw id.
                            let name = registry
                                .active_users(session_id)
                                .await
                                .into_iter()
                                .find(|u| u.user_id == recipient_id)
                                .map(|u| u.display_name)
                                .unwrap_or_else(|| recipient_id.to_string());
                            Some((recipient_id, name))
                        }
                        _ => None,
                    };

                    let sent = chat
                        .send_message(session_id, &user, &message, is_private, recipient)
                        .await?;
                    let payload = WsOutboundEvent::ChatMessage {
                        message: sent.message.clone(),
                    }
                    .to_json();

                    let reply = if sent.message.is_private {
                        if let Some(recipient_id) = sent.message.recipient_id {
                            registry.send_to_user(session_id, recipient_id, &payload).await;
                        }
                        // Echo to the sender; no one else sees it
                        Some(payload)
                    } else {
                        registry.broadcast(session_id, &payload, None).await;
                        None
                    };

                    if let Some(mute) = sent.auto_mute {
                        let payload = WsOutboundEvent::UserMuted {
                            user_id: mute.user_id,
                            muted_by: mute.muted_by,
                            expires_at: mute.expires_at,
                            reason: mute.reason,
                        }
                        .to_json();
                        registry.broadcast(session_id, &payload, None).await;
                    }

                    Ok(reply)
                });
            }

            WsInboundEvent::ReactionAdded {
                message_id,
                reaction,
            } => {
                self.run(ctx, async move {
                    let (message, kind) = chat
                        .add_reaction(session_id, &user, message_id, &reaction)
                        .await?;
                    let payload = WsOutboundEvent::ReactionAdded {
                        message_id,
                        reaction: kind,
                        user_id: user.user_id,
                        counts: message.reactions,
                    }
                    .to_json();
                    registry.broadcast(session_id, &payload, None).await;
                    Ok(None)
                });
            }

            WsInboundEvent::HandRaised => {
                self.run(ctx, async move {
                    let hand = chat.raise_hand(session_id, &user).await?;
                    let payload = WsOutboundEvent::HandRaised { hand }.to_json();
                    registry.broadcast(session_id, &payload, None).await;
                    Ok(None)
                });
            }

            WsInboundEvent::HandLowered { user_id } => {
                self.run(ctx, async move {
                    let target = user_id.unwrap_or(user.user_id);
                    let lowered = chat.lower_hand(session_id, &user, target).await?;
                    if lowered > 0 {
                        let payload = WsOutboundEvent::HandLowered {
                            user_id: target,
                            lowered_by: user.user_id,
                        }
                        .to_json();
                        registry.broadcast(session_id, &payload, None).await;
                    }
                    Ok(None)
                });
            }

            WsInboundEvent::TypingStart => {
                self.run(ctx, async move {
                    chat.typing_started(session_id, &user).await;
                    let payload = WsOutboundEvent::TypingStart {
                        user_id: user.user_id,
                        display_name: user.display_name.clone(),
                    }
                    .to_json();
                    registry
                        .broadcast(session_id, &payload, Some(subscriber_id))
                        .await;
                    Ok(None)
                });
            }

            WsInboundEvent::TypingStop => {
                self.run(ctx, async move {
                    chat.typing_stopped(session_id, user.user_id).await;
                    let payload = WsOutboundEvent::TypingStop {
                        user_id: user.user_id,
                    }
                    .to_json();
                    registry
                        .broadcast(session_id, &payload, Some(subscriber_id))
                        .await;
                    Ok(None)
                });
            }

            WsInboundEvent::DeleteMessage { message_id } => {
                self.run(ctx, async move {
                    chat.delete_message(session_id, &user, message_id).await?;
                    let payload = WsOutboundEvent::MessageDeleted {
                        message_id,
                        deleted_by: user.user_id,
                    }
                    .to_json();
                    registry.broadcast(session_id, &payload, None).await;
                    Ok(None)
                });
            }

            WsInboundEvent::MuteUser {
                user_id,
                duration_minutes,
                reason,
            } => {
                self.run(ctx, async move {
                    let mute = chat
                        .mute_user(session_id, &user, user_id, duration_minutes, reason)
                        .await?;
                    let payload = WsOutboundEvent::UserMuted {
                        user_id: mute.user_id,
                        muted_by: mute.muted_by,
                        expires_at: mute.expires_at,
                        reason: mute.reason,
                    }
                    .to_json();
                    registry.broadcast(session_id, &payload, None).await;
                    Ok(None)
                });
            }

            WsInboundEvent::UnmuteUser { user_id } => {
                self.run(ctx, async move {
                    let deactivated = chat.unmute_user(session_id, &user, user_id).await?;
                    if deactivated > 0 {
                        let payload = WsOutboundEvent::UserUnmuted { user_id }.to_json();
                        registry.broadcast(session_id, &payload, None).await;
                    }
                    Ok(None)
                });
            }
        }
    }
}

impl Actor for ChatSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.user.user_id,
            session_id = %self.session_id,
            "websocket session started"
        );

        self.hb(ctx);

        // Bridge registry fan-out into this actor
        if let Some(rx) = self.rx.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }

        let registry = self.registry.clone();
        let session_id = self.session_id;
        let user = self.user.clone();
        actix::spawn(async move {
            let payload = WsOutboundEvent::UserJoined {
                user_id: user.user_id,
                display_name: user.display_name.clone(),
                role: user.role,
            }
            .to_json();
            registry.broadcast(session_id, &payload, None).await;
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            user_id = %self.user.user_id,
            session_id = %self.session_id,
            "websocket session stopped"
        );

        let registry = self.registry.clone();
        let chat = self.chat.clone();
        let session_id = self.session_id;
        let subscriber_id = self.subscriber_id;
        let user_id = self.user.user_id;
        let attendance_id = self.attendance_id;

        actix::spawn(async move {
            registry.remove_subscriber(session_id, subscriber_id).await;
            chat.typing_stopped(session_id, user_id).await;
            if let Some(attendance_id) = attendance_id {
                if let Err(e) = chat.record_leave(attendance_id).await {
                    tracing::warn!(error = %e, "failed to record attendance leave");
                }
            }
            let payload = WsOutboundEvent::UserLeft { user_id }.to_json();
            registry.broadcast(session_id, &payload, None).await;
        });
    }
}

// Registry fan-out messages are forwarded to the socket as-is
impl StreamHandler<String> for ChatSession {
    fn handle(&mut self, payload: String, ctx: &mut Self::Context) {
        ctx.text(payload);
    }
}

// WebSocket protocol frames
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<WsInboundEvent>(&text) {
                Ok(evt) => self.handle_event(evt, ctx),
                Err(e) => {
                    tracing::debug!(error = %e, "unparseable inbound ws event");
                    ctx.text(
                        WsOutboundEvent::error("unknown or malformed message type").to_json(),
                    );
                }
            },
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("binary websocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// Short-lived actor that closes the socket straight after the handshake.
/// Used for credential failures so the client sees a proper close code
/// instead of a dropped connection.
struct RejectSession {
    code: ws::CloseCode,
}

impl Actor for RejectSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.close(Some(self.code.into()));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RejectSession {
    fn handle(&mut self, _msg: Result<ws::Message, ws::ProtocolError>, _ctx: &mut Self::Context) {}
}

fn reject(
    req: &HttpRequest,
    stream: web::Payload,
    code: ws::CloseCode,
) -> Result<HttpResponse, Error> {
    ws::start(RejectSession { code }, req, stream)
}

fn bearer_token(params: &WsParams, req: &HttpRequest) -> Option<String> {
    params.token.clone().or_else(|| {
        req.headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string())
    })
}

#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let params = query.into_inner();

    // Credential is validated before any session state is touched; failure
    // closes with a policy-violation code.
    let claims = match bearer_token(&params, &req) {
        None => {
            tracing::warn!(session_id = %params.session_id, "ws connection rejected: no credential");
            return reject(&req, stream, ws::CloseCode::Policy);
        }
        Some(token) => match verify_jwt(&token, &state.config.jwt_secret) {
            Ok(claims) => claims,
            Err(_) => {
                tracing::warn!(session_id = %params.session_id, "ws connection rejected: invalid credential");
                return reject(&req, stream, ws::CloseCode::Policy);
            }
        },
    };

    // Identity resolution failure is an internal error, not a policy one
    let user = match session_user_from_claims(&claims) {
        Ok(user) => user,
        Err(_) => {
            tracing::error!(sub = %claims.sub, "ws connection rejected: unresolvable identity");
            return reject(&req, stream, ws::CloseCode::Error);
        }
    };

    // Attendance join; a store hiccup here must not block the live session
    let attendance_id = match state.chat.record_join(params.session_id, &user).await {
        Ok(record) => Some(record.id),
        Err(e) => {
            tracing::error!(error = %e, session_id = %params.session_id, "failed to record attendance join");
            None
        }
    };

    let (subscriber_id, rx) = state
        .registry
        .add_subscriber(params.session_id, user.clone())
        .await;

    let session = ChatSession::new(
        params.session_id,
        user,
        subscriber_id,
        attendance_id,
        state.registry.clone(),
        state.chat.clone(),
        rx,
    );

    ws::start(session, &req, stream)
}
