use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use axum_extra::extract::WithRejection;
use serde_json::{Value, json};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::{AuthUser, OptionalAuthUser},
    error::{AppError, Result},
    models::{
        CreatePostRequest, PostListQuery, PostResponse, UpdatePostRequest, VoteRequest,
        VoteResponse, VoteTarget,
    },
    services::{
        post_service::{self, PostPage},
        vote_service,
    },
};

pub async fn create_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    WithRejection(Json(payload), _): WithRejection<Json<CreatePostRequest>, AppError>,
) -> Result<(StatusCode, Json<PostResponse>)> {
    payload.validate()?;

    let post = post_service::create_post(&state.db, auth_user.user_id, &payload).await?;

    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_posts(
    State(state): State<AppState>,
    WithRejection(Query(params), _): WithRejection<Query<PostListQuery>, AppError>,
) -> Result<Json<PostPage>> {
    let posts = post_service::list_posts(&state.db, &params).await?;

    Ok(Json(posts))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id_or_slug): Path<String>,
    auth_user: OptionalAuthUser,
) -> Result<Json<PostResponse>> {
    let viewer_id = auth_user.0.as_ref().map(|user| user.user_id);

    let post = post_service::get_post(&state.db, &id_or_slug, viewer_id).await?;

    Ok(Json(post))
}

pub async fn update_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdatePostRequest>, AppError>,
) -> Result<Json<PostResponse>> {
    payload.validate()?;

    let post = post_service::update_post(&state.db, post_id, auth_user.user_id, &payload).await?;

    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Value>> {
    post_service::delete_post(&state.db, post_id, auth_user.user_id, auth_user.role).await?;

    Ok(Json(json!({
        "message": "Post deleted successfully"
    })))
}

pub async fn vote_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
    WithRejection(Json(payload), _): WithRejection<Json<VoteRequest>, AppError>,
) -> Result<Json<VoteResponse>> {
    let rate_limit_key = format!("vote:user:{}", auth_user.user_id);
    if !state
        .redis
        .check_rate_limit(&rate_limit_key, 30, 60)
        .await?
    {
        return Err(AppError::RateLimit);
    }

    let response = vote_service::vote(
        &state.db,
        auth_user.user_id,
        VoteTarget::post(post_id),
        payload.vote_type,
    )
    .await?;

    Ok(Json(response))
}
