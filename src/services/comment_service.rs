use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        Comment, CommentPage, CommentResponse, CommentSort, CommentThread, CreateCommentRequest,
        EAGER_REPLY_LIMIT, MAX_COMMENT_DEPTH, NewComment, PageQuery, UpdateCommentRequest,
        UserRole,
    },
    store::{CommentStore, PgStore},
};

/// Depth of a reply to a comment at `parent_depth`.
pub fn reply_depth(parent_depth: i32) -> Result<i32> {
    let depth = parent_depth + 1;
    if depth > MAX_COMMENT_DEPTH {
        return Err(AppError::MaxDepthExceeded(MAX_COMMENT_DEPTH));
    }
    Ok(depth)
}

fn comment_not_found() -> AppError {
    AppError::NotFound("Comment not found".to_string())
}

pub async fn add_comment<S: CommentStore>(
    store: &mut S,
    post_id: Uuid,
    author_id: Uuid,
    content: String,
    parent_comment_id: Option<Uuid>,
) -> Result<Comment> {
    if !store.lock_post(post_id).await? {
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    // The parent is read under a row lock so the depth decision cannot be stale.
    let depth = match parent_comment_id {
        Some(parent_id) => {
            let parent = store
                .lock_comment(parent_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Parent comment not found".to_string()))?;

            if parent.post_id != post_id {
                return Err(AppError::Validation(
                    "Parent comment is not on the same post".to_string(),
                ));
            }
            if parent.is_deleted {
                return Err(AppError::Validation(
                    "Cannot reply to a deleted comment".to_string(),
                ));
            }

            reply_depth(parent.depth)?
        }
        None => 0,
    };

    let comment = store
        .insert_comment(NewComment {
            id: Uuid::new_v4(),
            content,
            post_id,
            author_id,
            parent_comment_id,
            depth,
        })
        .await?;

    store.adjust_comment_count(post_id, 1).await?;
    if let Some(parent_id) = parent_comment_id {
        store.adjust_reply_count(parent_id, 1).await?;
    }

    tracing::info!(
        comment_id = %comment.id,
        post_id = %post_id,
        depth,
        "Comment created"
    );

    Ok(comment)
}

pub async fn edit_comment<S: CommentStore>(
    store: &mut S,
    comment_id: Uuid,
    requester_id: Uuid,
    content: String,
) -> Result<CommentResponse> {
    let comment = store
        .lock_comment(comment_id)
        .await?
        .ok_or_else(comment_not_found)?;

    if comment.author_id != requester_id {
        return Err(AppError::Authorization(
            "You can only edit your own comments".to_string(),
        ));
    }
    if comment.is_deleted {
        return Err(AppError::Conflict("Cannot edit a deleted comment".to_string()));
    }

    store.set_content(comment_id, content).await?;

    get_comment(store, comment_id).await
}

pub async fn remove_comment<S: CommentStore>(
    store: &mut S,
    comment_id: Uuid,
    requester_id: Uuid,
    requester_role: UserRole,
) -> Result<()> {
    // Lock the post before the comment, the same order `add_comment` uses.
    let post_id = store
        .comment_with_author(comment_id)
        .await?
        .ok_or_else(comment_not_found)?
        .comment
        .post_id;
    store.lock_post(post_id).await?;

    let comment = store
        .lock_comment(comment_id)
        .await?
        .ok_or_else(comment_not_found)?;

    if comment.author_id != requester_id && requester_role != UserRole::Admin {
        return Err(AppError::Authorization(
            "You cannot delete this comment".to_string(),
        ));
    }
    if comment.is_deleted {
        return Err(AppError::Conflict("Comment already deleted".to_string()));
    }

    store.mark_deleted(comment_id).await?;
    store.adjust_comment_count(comment.post_id, -1).await?;
    if let Some(parent_id) = comment.parent_comment_id {
        store.adjust_reply_count(parent_id, -1).await?;
    }

    tracing::info!(
        comment_id = %comment_id,
        requester_id = %requester_id,
        "Comment deleted"
    );

    Ok(())
}

pub async fn get_comment<S: CommentStore>(store: &mut S, comment_id: Uuid) -> Result<CommentResponse> {
    store
        .comment_with_author(comment_id)
        .await?
        .map(CommentResponse::from)
        .ok_or_else(comment_not_found)
}

pub async fn list_top_level<S: CommentStore>(
    store: &mut S,
    post_id: Uuid,
    page: PageQuery,
    sort: CommentSort,
) -> Result<CommentPage<CommentThread>> {
    if !store.post_exists(post_id).await? {
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    let rows = store
        .top_level(post_id, sort, page.limit(), page.offset())
        .await?;
    let total = store.count_top_level(post_id).await?;

    let mut comments = Vec::with_capacity(rows.len());
    for row in rows {
        let replies = store
            .replies(row.comment.id, EAGER_REPLY_LIMIT, 0)
            .await?
            .into_iter()
            .map(CommentResponse::from)
            .collect();
        let has_more_replies = row.comment.reply_count > EAGER_REPLY_LIMIT as i32;

        comments.push(CommentThread {
            comment: row.into(),
            replies,
            has_more_replies,
        });
    }

    Ok(CommentPage {
        comments,
        pagination: page.describe(total),
    })
}

pub async fn list_replies<S: CommentStore>(
    store: &mut S,
    comment_id: Uuid,
    page: PageQuery,
) -> Result<CommentPage<CommentResponse>> {
    if store.comment_with_author(comment_id).await?.is_none() {
        return Err(comment_not_found());
    }

    let comments = store
        .replies(comment_id, page.limit(), page.offset())
        .await?
        .into_iter()
        .map(CommentResponse::from)
        .collect();
    let total = store.count_replies(comment_id).await?;

    Ok(CommentPage {
        comments,
        pagination: page.describe(total),
    })
}

pub async fn create_comment(
    db: &PgPool,
    post_id: Uuid,
    author_id: Uuid,
    request: &CreateCommentRequest,
) -> Result<CommentResponse> {
    let mut store = PgStore::begin(db).await?;
    let comment = add_comment(
        &mut store,
        post_id,
        author_id,
        request.content.clone(),
        request.parent_comment_id,
    )
    .await?;
    let response = get_comment(&mut store, comment.id).await?;
    store.commit().await?;

    Ok(response)
}

pub async fn update_comment(
    db: &PgPool,
    comment_id: Uuid,
    requester_id: Uuid,
    request: &UpdateCommentRequest,
) -> Result<CommentResponse> {
    let mut store = PgStore::begin(db).await?;
    let response = edit_comment(&mut store, comment_id, requester_id, request.content.clone()).await?;
    store.commit().await?;

    Ok(response)
}

pub async fn delete_comment(
    db: &PgPool,
    comment_id: Uuid,
    requester_id: Uuid,
    requester_role: UserRole,
) -> Result<()> {
    let mut store = PgStore::begin(db).await?;
    remove_comment(&mut store, comment_id, requester_id, requester_role).await?;
    store.commit().await?;

    Ok(())
}

pub async fn get_comment_by_id(db: &PgPool, comment_id: Uuid) -> Result<CommentResponse> {
    let mut store = PgStore::begin(db).await?;
    let response = get_comment(&mut store, comment_id).await?;
    store.commit().await?;

    Ok(response)
}

pub async fn get_post_comments(
    db: &PgPool,
    post_id: Uuid,
    page: PageQuery,
    sort: CommentSort,
) -> Result<CommentPage<CommentThread>> {
    let mut store = PgStore::begin(db).await?;
    let comments = list_top_level(&mut store, post_id, page, sort).await?;
    store.commit().await?;

    Ok(comments)
}

pub async fn get_comment_replies(
    db: &PgPool,
    comment_id: Uuid,
    page: PageQuery,
) -> Result<CommentPage<CommentResponse>> {
    let mut store = PgStore::begin(db).await?;
    let replies = list_replies(&mut store, comment_id, page).await?;
    store.commit().await?;

    Ok(replies)
}
