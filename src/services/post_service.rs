use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        CreatePostRequest, PageQuery, Pagination, Post, PostListQuery, PostResponse,
        PostWithAuthor, TargetType, UpdatePostRequest, UserRole, VoteTarget,
    },
    services::vote_service,
};

const MAX_SLUG_LENGTH: usize = 80;

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

const POST_WITH_AUTHOR: &str = r#"
    SELECT p.*, u.username AS author_username
    FROM posts p
    JOIN users u ON p.author_id = u.id
"#;

#[derive(Debug, Serialize)]
pub struct PostPage {
    pub posts: Vec<PostResponse>,
    pub pagination: Pagination,
}

/// URL slug for a title: lowercase ASCII alphanumerics joined by `-`.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let slug = NON_SLUG_CHARS.replace_all(&lowered, "-");
    let mut slug: String = slug.trim_matches('-').chars().take(MAX_SLUG_LENGTH).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "post".to_string()
    } else {
        slug
    }
}

/// First of `base`, `base-2`, `base-3`, ... not present in `taken`.
pub fn next_free_slug(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| format!("{}-{}", base, Uuid::new_v4()))
}

/// Trimmed, lower-cased, de-duplicated tags in their original order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

fn map_unique_violation(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict("A post with this slug already exists".to_string())
        }
        other => AppError::Database(other),
    }
}

async fn unique_slug(
    conn: &mut sqlx::PgConnection,
    title: &str,
    exclude_post: Option<Uuid>,
) -> Result<String> {
    let base = slugify(title);
    let taken: Vec<(String,)> = sqlx::query_as(
        "SELECT slug FROM posts WHERE (slug = $1 OR slug LIKE $2) AND id IS DISTINCT FROM $3",
    )
    .bind(&base)
    .bind(format!("{}-%", base))
    .bind(exclude_post)
    .fetch_all(&mut *conn)
    .await?;

    let taken: HashSet<String> = taken.into_iter().map(|(s,)| s).collect();
    Ok(next_free_slug(&base, &taken))
}

async fn fetch_post(db: &PgPool, post_id: Uuid) -> Result<PostWithAuthor> {
    let query = format!("{POST_WITH_AUTHOR} WHERE p.id = $1");

    sqlx::query_as::<_, PostWithAuthor>(&query)
        .bind(post_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
}

pub async fn create_post(
    db: &PgPool,
    author_id: Uuid,
    request: &CreatePostRequest,
) -> Result<PostResponse> {
    let mut tx = db.begin().await?;

    let slug = unique_slug(&mut tx, &request.title, None).await?;
    let post_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO posts (id, title, content, tags, slug, author_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
        "#,
    )
    .bind(post_id)
    .bind(request.title.trim())
    .bind(&request.content)
    .bind(normalize_tags(&request.tags))
    .bind(&slug)
    .bind(author_id)
    .execute(&mut *tx)
    .await
    .map_err(map_unique_violation)?;

    tx.commit().await?;

    tracing::info!(post_id = %post_id, slug = %slug, "Post created");

    let post = fetch_post(db, post_id).await?;
    Ok(PostResponse::new(post, None))
}

/// Look a post up by UUID or, failing that, by slug.
pub async fn get_post(db: &PgPool, id_or_slug: &str, viewer_id: Option<Uuid>) -> Result<PostResponse> {
    let post = match Uuid::parse_str(id_or_slug) {
        Ok(post_id) => fetch_post(db, post_id).await?,
        Err(_) => {
            let query = format!("{POST_WITH_AUTHOR} WHERE p.slug = $1");
            sqlx::query_as::<_, PostWithAuthor>(&query)
                .bind(id_or_slug)
                .fetch_optional(db)
                .await?
                .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?
        }
    };

    let user_vote = match viewer_id {
        Some(user_id) => {
            vote_service::get_user_vote(db, user_id, VoteTarget::post(post.post.id)).await?
        }
        None => None,
    };

    Ok(PostResponse::new(post, user_vote))
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, query: &'a PostListQuery) {
    builder.push(" WHERE TRUE");

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        builder
            .push(" AND (p.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.content ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(tag) = query.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        builder
            .push(" AND ")
            .push_bind(tag.to_lowercase())
            .push(" = ANY(p.tags)");
    }

    if let Some(author) = query.author.as_deref().filter(|a| !a.is_empty()) {
        builder.push(" AND u.username = ").push_bind(author);
    }
}

pub async fn list_posts(db: &PgPool, query: &PostListQuery) -> Result<PostPage> {
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    };

    let mut count = QueryBuilder::<Postgres>::new(
        "SELECT COUNT(*) FROM posts p JOIN users u ON p.author_id = u.id",
    );
    push_filters(&mut count, query);
    let (total,): (i64,) = count.build_query_as().fetch_one(db).await?;

    let mut select = QueryBuilder::<Postgres>::new(POST_WITH_AUTHOR);
    push_filters(&mut select, query);
    select
        .push(" ORDER BY p.created_at DESC LIMIT ")
        .push_bind(page.limit() as i64)
        .push(" OFFSET ")
        .push_bind(page.offset() as i64);

    let posts = select
        .build_query_as::<PostWithAuthor>()
        .fetch_all(db)
        .await?
        .into_iter()
        .map(|row| PostResponse::new(row, None))
        .collect();

    Ok(PostPage {
        posts,
        pagination: page.describe(total),
    })
}

pub async fn update_post(
    db: &PgPool,
    post_id: Uuid,
    user_id: Uuid,
    request: &UpdatePostRequest,
) -> Result<PostResponse> {
    let mut tx = db.begin().await?;

    let existing = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1 FOR UPDATE")
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    if existing.author_id != user_id {
        return Err(AppError::Authorization(
            "You can only edit your own posts".to_string(),
        ));
    }

    let title = request
        .title
        .as_deref()
        .map(str::trim)
        .unwrap_or(&existing.title)
        .to_string();
    let slug = if title != existing.title {
        unique_slug(&mut tx, &title, Some(post_id)).await?
    } else {
        existing.slug.clone()
    };
    let content = request.content.as_ref().unwrap_or(&existing.content);
    let tags = request
        .tags
        .as_deref()
        .map(normalize_tags)
        .unwrap_or_else(|| existing.tags.clone());

    sqlx::query(
        r#"
        UPDATE posts
        SET title = $1, content = $2, tags = $3, slug = $4, updated_at = NOW()
        WHERE id = $5
        "#,
    )
    .bind(&title)
    .bind(content)
    .bind(&tags)
    .bind(&slug)
    .bind(post_id)
    .execute(&mut *tx)
    .await
    .map_err(map_unique_violation)?;

    tx.commit().await?;

    let post = fetch_post(db, post_id).await?;
    let user_vote = vote_service::get_user_vote(db, user_id, VoteTarget::post(post_id)).await?;
    Ok(PostResponse::new(post, user_vote))
}

pub async fn delete_post(
    db: &PgPool,
    post_id: Uuid,
    user_id: Uuid,
    role: UserRole,
) -> Result<()> {
    let mut tx = db.begin().await?;

    let existing = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1 FOR UPDATE")
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    if existing.author_id != user_id && role != UserRole::Admin {
        return Err(AppError::Authorization(
            "You cannot delete this post".to_string(),
        ));
    }

    // Comment votes lock only the comment row; hold those locks so no vote can
    // land between the vote cleanup and the cascading delete.
    sqlx::query("SELECT id FROM comments WHERE post_id = $1 FOR UPDATE")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    // Votes reference their target polymorphically, so they are removed by hand.
    sqlx::query(
        r#"
        DELETE FROM votes
        WHERE (target_type = $1 AND target_id = $2)
           OR (target_type = $3 AND target_id IN (SELECT id FROM comments WHERE post_id = $2))
        "#,
    )
    .bind(TargetType::Post)
    .bind(post_id)
    .bind(TargetType::Comment)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(post_id = %post_id, user_id = %user_id, "Post deleted");

    Ok(())
}
