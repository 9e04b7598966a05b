use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::info;

use duet_types::Error;
use duet_types::api::{CreateUserRequest, CreateUserResponse, ErrorResponse, LoginRequest, LoginResponse};

use crate::error::ApiError;
use crate::{AppState, run_blocking};

pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    info!("Received POST at /users for user {}", req.username);

    // Argon2 is deliberately slow; keep it off the async runtime.
    let username = req.username.clone();
    let id = run_blocking(&state, move |chat| {
        chat.create_account(&req.username, &req.password)
    })
    .await?;

    info!("User {} created, id {}", username, id);
    Ok((StatusCode::CREATED, Json(CreateUserResponse { username, id })))
}

/// Password check only. A wrong password and an unknown username both come
/// back as 401 so the endpoint does not reveal which accounts exist.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let username = req.username.clone();
    let verified = run_blocking(&state, move |chat| {
        chat.authenticate(&req.username, &req.password)
    })
    .await;

    match verified {
        Ok(true) => Ok(Json(LoginResponse { username }).into_response()),
        Ok(false) | Err(ApiError(Error::NotFound(_))) => Ok((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "invalid username or password".into(),
            }),
        )
            .into_response()),
        Err(e) => Err(e),
    }
}
