#![allow(dead_code)]

//! Shared fixtures for the Postgres-backed suites.
//!
//! Every suite is gated on `DATABASE_URL`; the HTTP suite additionally needs a
//! Redis reachable at `REDIS_URL` (default `redis://localhost:6379`). When
//! either is missing the tests return early.

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tower::ServiceExt;
use uuid::Uuid;

use blog_api::{
    AppState,
    auth::Claims,
    config::Config,
    create_app,
    database::{create_pool, run_migrations},
    models::{TargetType, UserRole},
    redis::RedisClient,
};

const TEST_JWT_SECRET: &str = "integration-test-secret";

static MIGRATED: OnceCell<()> = OnceCell::const_new();

fn test_config(database_url: String) -> Config {
    Config {
        database_url,
        redis_url: std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_ttl_hours: 1,
        port: 0,
        host: "127.0.0.1".to_string(),
        allowed_origins: vec!["http://localhost:3000".to_string()],
        db_max_connections: 10,
        db_min_connections: 0,
        max_login_attempts: 5,
        lockout_minutes: 15,
    }
}

fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();
    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => Some(url),
        _ => {
            eprintln!("DATABASE_URL not set; skipping Postgres-backed test");
            None
        }
    }
}

/// Fresh pool on the current runtime, with migrations applied once per binary.
pub async fn db() -> Option<PgPool> {
    let config = test_config(database_url()?);
    let pool = create_pool(&config)
        .await
        .expect("cannot connect to DATABASE_URL");

    MIGRATED
        .get_or_init(|| async {
            run_migrations(&pool).await.expect("migrations failed");
        })
        .await;

    Some(pool)
}

pub struct TestUser {
    pub id: Uuid,
    pub username: String,
    pub role: UserRole,
}

pub async fn create_user(db: &PgPool, role: UserRole) -> TestUser {
    let id = Uuid::new_v4();
    let username = format!("u_{}", &id.simple().to_string()[..16]);

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, role) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(&username)
    .bind(format!("{username}@example.com"))
    .bind("not-a-real-hash")
    .bind(role)
    .execute(db)
    .await
    .expect("insert test user failed");

    TestUser { id, username, role }
}

pub async fn create_post(db: &PgPool, author_id: Uuid) -> Uuid {
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO posts (id, title, content, slug, author_id) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind("Fixture post")
    .bind("Fixture body")
    .bind(format!("fixture-{id}"))
    .bind(author_id)
    .execute(db)
    .await
    .expect("insert test post failed");

    id
}

/// `(upvotes, downvotes, score)` as stored on a post.
pub async fn post_counts(db: &PgPool, post_id: Uuid) -> (i32, i32, i32) {
    sqlx::query_as("SELECT upvotes, downvotes, score FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_one(db)
        .await
        .expect("post counts")
}

pub async fn post_comment_count(db: &PgPool, post_id: Uuid) -> i32 {
    let (count,): (i32,) = sqlx::query_as("SELECT comment_count FROM posts WHERE id = $1")
        .bind(post_id)
        .fetch_one(db)
        .await
        .expect("post comment count");
    count
}

pub async fn reply_count(db: &PgPool, comment_id: Uuid) -> i32 {
    let (count,): (i32,) = sqlx::query_as("SELECT reply_count FROM comments WHERE id = $1")
        .bind(comment_id)
        .fetch_one(db)
        .await
        .expect("reply count");
    count
}

/// Ledger rows for `target_id`, grouped as `(upvotes, downvotes)`.
pub async fn ledger_tally(db: &PgPool, kind: TargetType, target_id: Uuid) -> (i64, i64) {
    sqlx::query_as(
        r#"
        SELECT COUNT(*) FILTER (WHERE vote_type = 'upvote'),
               COUNT(*) FILTER (WHERE vote_type = 'downvote')
        FROM votes WHERE target_type = $1 AND target_id = $2
        "#,
    )
    .bind(kind)
    .bind(target_id)
    .fetch_one(db)
    .await
    .expect("ledger tally")
}

pub async fn ledger_rows_for_user(db: &PgPool, user_id: Uuid, target_id: Uuid) -> i64 {
    let (rows,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM votes WHERE user_id = $1 AND target_id = $2")
            .bind(user_id)
            .bind(target_id)
            .fetch_one(db)
            .await
            .expect("ledger rows");
    rows
}

// ---------------------------------------------------------------------------
// HTTP harness
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    pub fn kind(&self) -> &str {
        self.body["kind"].as_str().unwrap_or("")
    }
}

/// Router over a real pool and Redis, or `None` when either is unavailable.
pub async fn app() -> Option<TestApp> {
    let db = db().await?;
    let config = test_config(database_url()?);

    let redis = match tokio::time::timeout(
        Duration::from_secs(5),
        RedisClient::new(&config.redis_url),
    )
    .await
    {
        Ok(Ok(redis)) => redis,
        _ => {
            eprintln!("Redis not reachable at {}; skipping HTTP test", config.redis_url);
            return None;
        }
    };

    let state = AppState {
        db,
        redis: Arc::new(redis),
        config: Arc::new(config),
    };

    Some(TestApp {
        router: create_app(state.clone()),
        state,
    })
}

impl TestApp {
    pub fn db(&self) -> &PgPool {
        &self.state.db
    }

    /// Issue a token with a live Redis session, the same way login does.
    pub async fn token_for(&self, user: &TestUser) -> String {
        let (token, claims) = Claims::new(
            user.id,
            user.username.clone(),
            user.role,
            &self.state.config.jwt_secret,
            self.state.config.jwt_ttl_hours,
        )
        .expect("sign token");

        self.state
            .redis
            .store_session(&claims.jti, &claims.sub, self.state.config.session_ttl_seconds())
            .await
            .expect("store session");

        token
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Body>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse {
            status,
            body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
        }
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, path, None, token).await
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        self.request(Method::POST, path, Some(Body::from(body.to_string())), token)
            .await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, path, None, token).await
    }
}
