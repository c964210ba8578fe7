use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::VoteCounts;

pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_LENGTH: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub slug: String,
    pub author_id: Uuid,
    pub upvotes: i32,
    pub downvotes: i32,
    pub score: i32,
    pub comment_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post row joined with its author's username.
#[derive(Debug, Clone, FromRow)]
pub struct PostWithAuthor {
    #[sqlx(flatten)]
    pub post: Post,
    pub author_username: String,
}

/// Rejects values that are empty once surrounding whitespace is removed.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("must not be blank".into()));
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.len() > MAX_TAGS {
        return Err(ValidationError::new("too_many_tags").with_message("at most 10 tags".into()));
    }
    if tags
        .iter()
        .any(|t| t.trim().is_empty() || t.trim().chars().count() > MAX_TAG_LENGTH)
    {
        return Err(
            ValidationError::new("tag_length").with_message("tags must be 1-30 characters".into())
        );
    }
    Ok(())
}

// Create post request
#[derive(Debug, Validate, Deserialize)]
pub struct CreatePostRequest {
    #[validate(
        length(min = 1, max = 300, message = "must be 1-300 characters"),
        custom(function = "validate_not_blank")
    )]
    pub title: String,
    #[validate(
        length(min = 1, max = 50000, message = "must be 1-50000 characters"),
        custom(function = "validate_not_blank")
    )]
    pub content: String,
    #[validate(custom(function = "validate_tags"))]
    #[serde(default)]
    pub tags: Vec<String>,
}

// Update post request
#[derive(Debug, Validate, Deserialize)]
pub struct UpdatePostRequest {
    #[validate(
        length(min = 1, max = 300, message = "must be 1-300 characters"),
        custom(function = "validate_not_blank")
    )]
    pub title: Option<String>,
    #[validate(
        length(min = 1, max = 50000, message = "must be 1-50000 characters"),
        custom(function = "validate_not_blank")
    )]
    pub content: Option<String>,
    #[validate(custom(function = "validate_tags"))]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PostListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub tag: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthor {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub slug: String,
    pub author: PostAuthor,
    pub votes: VoteCounts,
    pub comment_count: i32,
    pub user_vote: Option<crate::models::VoteType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostResponse {
    pub fn new(row: PostWithAuthor, user_vote: Option<crate::models::VoteType>) -> Self {
        let post = row.post;
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            tags: post.tags,
            slug: post.slug,
            author: PostAuthor {
                id: post.author_id,
                username: row.author_username,
            },
            votes: VoteCounts {
                upvotes: post.upvotes,
                downvotes: post.downvotes,
                score: post.score,
            },
            comment_count: post.comment_count,
            user_vote,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}
