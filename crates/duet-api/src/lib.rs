pub mod chat;
pub mod error;
pub mod messages;
pub mod pagination;
pub mod users;

use std::sync::Arc;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::error;

use duet_types::{Error, Result};

use crate::chat::ChatService;
use crate::error::ApiError;

pub type AppState = Arc<ChatService>;

/// All Duet routes. Middleware (CORS, tracing) is layered on by the server.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(users::create_user))
        .route("/login", post(users::login))
        .route(
            "/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Run a blocking `ChatService` call off the async runtime.
pub(crate) async fn run_blocking<F, T>(state: &AppState, f: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce(&ChatService) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let chat = state.clone();
    tokio::task::spawn_blocking(move || f(&chat))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError(Error::Internal("worker task failed".into()))
        })?
        .map_err(ApiError::from)
}
