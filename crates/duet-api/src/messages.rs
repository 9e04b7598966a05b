use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use duet_types::api::{MessageQuery, SendMessageRequest, SendMessageResponse};
use duet_types::models::Message;

use crate::error::ApiError;
use crate::{AppState, run_blocking};

/// Self-messages are allowed: nothing requires `sender != recipient`.
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let SendMessageRequest {
        sender,
        recipient,
        message_type,
        content,
        metadata,
    } = req;

    let (from, to) = (sender.clone(), recipient.clone());
    let message_id = run_blocking(&state, move |chat| {
        chat.send_message(&from, &to, &message_type, &content, metadata)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            sender,
            recipient,
            message_id,
        }),
    ))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    info!(
        "Received GET at /messages for {} and {}",
        query.sender, query.recipient
    );

    let messages = run_blocking(&state, move |chat| {
        chat.fetch_conversation(
            &query.sender,
            &query.recipient,
            query.messages_per_page,
            query.page_to_load,
        )
    })
    .await?;

    Ok(Json(messages))
}
