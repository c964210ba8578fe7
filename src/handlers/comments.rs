use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, Result},
    models::{
        CommentPage, CommentResponse, CommentSort, CommentThread, CreateCommentRequest, PageQuery,
        UpdateCommentRequest, VoteRequest, VoteResponse, VoteTarget,
    },
    services::{comment_service, vote_service},
};

#[derive(Debug, Deserialize)]
pub struct GetCommentsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<CommentSort>,
}

pub async fn create_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
    WithRejection(Json(payload), _): WithRejection<Json<CreateCommentRequest>, AppError>,
) -> Result<(StatusCode, Json<CommentResponse>)> {
    payload.validate()?;

    // Check rate limiting
    let rate_limit_key = format!("comment_create:user:{}", auth_user.user_id);
    if !state
        .redis
        .check_rate_limit(&rate_limit_key, 10, 60)
        .await?
    {
        return Err(AppError::RateLimit);
    }

    let comment =
        comment_service::create_comment(&state.db, post_id, auth_user.user_id, &payload).await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn get_post_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    WithRejection(Query(params), _): WithRejection<Query<GetCommentsQuery>, AppError>,
) -> Result<Json<CommentPage<CommentThread>>> {
    let page = PageQuery {
        page: params.page,
        limit: params.limit,
    };
    let sort = params.sort.unwrap_or_default();

    let comments = comment_service::get_post_comments(&state.db, post_id, page, sort).await?;

    Ok(Json(comments))
}

pub async fn get_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
) -> Result<Json<CommentResponse>> {
    let comment = comment_service::get_comment_by_id(&state.db, comment_id).await?;

    Ok(Json(comment))
}

pub async fn get_comment_replies(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
    WithRejection(Query(page), _): WithRejection<Query<PageQuery>, AppError>,
) -> Result<Json<CommentPage<CommentResponse>>> {
    let replies = comment_service::get_comment_replies(&state.db, comment_id, page).await?;

    Ok(Json(replies))
}

pub async fn update_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateCommentRequest>, AppError>,
) -> Result<Json<CommentResponse>> {
    payload.validate()?;

    let comment =
        comment_service::update_comment(&state.db, comment_id, auth_user.user_id, &payload)
            .await?;

    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
) -> Result<Json<Value>> {
    comment_service::delete_comment(&state.db, comment_id, auth_user.user_id, auth_user.role)
        .await?;

    Ok(Json(json!({
        "message": "Comment deleted successfully"
    })))
}

pub async fn vote_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
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
        VoteTarget::comment(comment_id),
        payload.vote_type,
    )
    .await?;

    Ok(Json(response))
}
