use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::{VoteCounts, validate_not_blank};

/// Deepest nesting level a reply may sit at; top-level comments are depth 0.
pub const MAX_COMMENT_DEPTH: i32 = 3;

/// Number of oldest replies attached to each top-level comment in listings.
pub const EAGER_REPLY_LIMIT: u32 = 5;

/// Content shown in place of a soft-deleted comment.
pub const DELETED_PLACEHOLDER: &str = "[deleted]";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub content: String,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_comment_id: Option<Uuid>,
    pub depth: i32,
    pub reply_count: i32,
    pub is_deleted: bool,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub upvotes: i32,
    pub downvotes: i32,
    pub score: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn counts(&self) -> VoteCounts {
        VoteCounts {
            upvotes: self.upvotes,
            downvotes: self.downvotes,
            score: self.score,
        }
    }
}

/// Comment row joined with its author's public details.
#[derive(Debug, Clone, FromRow)]
pub struct CommentWithAuthor {
    #[sqlx(flatten)]
    pub comment: Comment,
    pub author_username: String,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub id: Uuid,
    pub content: String,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_comment_id: Option<Uuid>,
    pub depth: i32,
}

// Create comment request
#[derive(Debug, Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    #[validate(
        length(min = 1, max = 10000, message = "must be 1-10000 characters"),
        custom(function = "validate_not_blank")
    )]
    pub content: String,
    pub parent_comment_id: Option<Uuid>,
}

// Update comment request
#[derive(Debug, Validate, Deserialize)]
pub struct UpdateCommentRequest {
    #[validate(
        length(min = 1, max = 10000, message = "must be 1-10000 characters"),
        custom(function = "validate_not_blank")
    )]
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentSort {
    #[default]
    Newest,
    Oldest,
    Popular,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAuthor {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: Uuid,
    pub content: String,
    pub post_id: Uuid,
    pub parent_comment_id: Option<Uuid>,
    pub depth: i32,
    pub reply_count: i32,
    pub is_deleted: bool,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub votes: VoteCounts,
    pub author: CommentAuthor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CommentWithAuthor> for CommentResponse {
    fn from(row: CommentWithAuthor) -> Self {
        let votes = row.comment.counts();
        let comment = row.comment;
        Self {
            id: comment.id,
            content: comment.content,
            post_id: comment.post_id,
            parent_comment_id: comment.parent_comment_id,
            depth: comment.depth,
            reply_count: comment.reply_count,
            is_deleted: comment.is_deleted,
            is_edited: comment.is_edited,
            edited_at: comment.edited_at,
            votes,
            author: CommentAuthor {
                id: comment.author_id,
                username: row.author_username,
            },
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

/// A top-level comment together with the first few of its replies.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: CommentResponse,
    pub replies: Vec<CommentResponse>,
    pub has_more_replies: bool,
}

#[derive(Debug, Serialize)]
pub struct CommentPage<T> {
    pub comments: Vec<T>,
    pub pagination: crate::models::Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_comment_content_is_rejected() {
        let request: CreateCommentRequest =
            serde_json::from_str(r#"{"content":"  \n "}"#).unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("content"));

        let edit = UpdateCommentRequest {
            content: " ".into(),
        };
        assert!(edit.validate().is_err());
    }

    #[test]
    fn reply_request_reads_camel_case_parent() {
        let parent = Uuid::new_v4();
        let request: CreateCommentRequest = serde_json::from_str(&format!(
            r#"{{"content":"hi","parentCommentId":"{parent}"}}"#
        ))
        .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.parent_comment_id, Some(parent));
    }
}
