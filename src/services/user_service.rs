use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    AppState,
    auth::{Claims, hash_password, verify_password},
    error::{AppError, Result},
    models::{AuthResponse, LoginRequest, RegisterRequest, User, UserRole},
};

/// Failed-login bookkeeping after one more bad password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLogin {
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

pub fn record_failed_login(
    previous_attempts: i32,
    max_attempts: i32,
    lockout: Duration,
    now: DateTime<Utc>,
) -> FailedLogin {
    let attempts = previous_attempts + 1;
    if attempts >= max_attempts {
        FailedLogin {
            attempts: 0,
            locked_until: Some(now + lockout),
        }
    } else {
        FailedLogin {
            attempts,
            locked_until: None,
        }
    }
}

pub async fn get_user_by_id(db: &PgPool, user_id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?;

    Ok(user)
}

pub async fn get_user_by_login(db: &PgPool, username_or_email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE username = $1 OR LOWER(email) = LOWER($1)",
    )
    .bind(username_or_email)
    .fetch_optional(db)
    .await?;

    Ok(user)
}

async fn issue_session(state: &AppState, user: User) -> Result<AuthResponse> {
    let (token, claims) = Claims::new(
        user.id,
        user.username.clone(),
        user.role,
        &state.config.jwt_secret,
        state.config.jwt_ttl_hours,
    )?;

    state
        .redis
        .store_session(
            &claims.jti,
            &claims.sub,
            state.config.session_ttl_seconds(),
        )
        .await?;

    Ok(AuthResponse {
        token,
        user: user.into(),
    })
}

pub async fn register(state: &AppState, request: &RegisterRequest) -> Result<AuthResponse> {
    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT username FROM users WHERE username = $1 OR LOWER(email) = LOWER($2)",
    )
    .bind(&request.username)
    .bind(&request.email)
    .fetch_optional(&state.db)
    .await?;

    if let Some((username,)) = existing {
        let message = if username == request.username {
            "Username already exists"
        } else {
            "Email already exists"
        };
        return Err(AppError::Conflict(message.to_string()));
    }

    let password_hash = hash_password(&request.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&request.username)
    .bind(&request.email)
    .bind(&password_hash)
    .bind(UserRole::User)
    .fetch_one(&state.db)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict("Username or email already exists".to_string())
        }
        other => AppError::Database(other),
    })?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");

    issue_session(state, user).await
}

pub async fn login(state: &AppState, request: &LoginRequest) -> Result<AuthResponse> {
    let invalid = || AppError::Authentication("Invalid credentials".to_string());

    let user = get_user_by_login(&state.db, &request.username_or_email)
        .await?
        .ok_or_else(invalid)?;

    let now = Utc::now();
    if user.is_locked(now) {
        tracing::warn!(user_id = %user.id, "Login attempt on locked account");
        return Err(AppError::Authentication(
            "Account temporarily locked due to too many failed login attempts".to_string(),
        ));
    }

    if !verify_password(&request.password, &user.password_hash)? {
        let failed = record_failed_login(
            user.failed_login_attempts,
            state.config.max_login_attempts,
            Duration::minutes(state.config.lockout_minutes),
            now,
        );

        sqlx::query(
            "UPDATE users SET failed_login_attempts = $1, locked_until = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(failed.attempts)
        .bind(failed.locked_until)
        .bind(user.id)
        .execute(&state.db)
        .await?;

        if failed.locked_until.is_some() {
            tracing::warn!(user_id = %user.id, "Account locked after repeated failed logins");
        }
        return Err(invalid());
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET failed_login_attempts = 0, locked_until = NULL, last_login_at = NOW(), updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(user_id = %user.id, "User logged in");

    issue_session(state, user).await
}

pub async fn logout(state: &AppState, jti: &str) -> Result<()> {
    state.redis.delete_session(jti).await
}
