use std::sync::Arc;

use crate::{
    config::Config,
    services::{SessionAnalyticsService, SessionChatService},
    websocket::ConnectionRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: ConnectionRegistry,
    pub chat: Arc<SessionChatService>,
    pub analytics: Arc<SessionAnalyticsService>,
}
