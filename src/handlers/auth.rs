use axum::{extract::State, http::StatusCode, response::Json};
use axum_extra::extract::WithRejection;
use serde_json::{Value, json};
use validator::Validate;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, Result},
    models::{AuthResponse, LoginRequest, RegisterRequest},
    services::user_service,
};

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, AppError>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    payload.validate()?;

    let rate_limit_key = format!("register_attempt:{}", payload.email.to_lowercase());
    if !state
        .redis
        .check_rate_limit(&rate_limit_key, 5, 3600)
        .await?
    {
        return Err(AppError::RateLimit);
    }

    let response = user_service::register(&state, &payload).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, AppError>,
) -> Result<Json<AuthResponse>> {
    payload.validate()?;

    let response = user_service::login(&state, &payload).await?;

    Ok(Json(response))
}

pub async fn logout(State(state): State<AppState>, auth_user: AuthUser) -> Result<Json<Value>> {
    user_service::logout(&state, &auth_user.jti).await?;

    Ok(Json(json!({
        "message": "Logged out successfully"
    })))
}
