use serde::Deserialize;
use std::{env, str::FromStr};

pub const DEFAULT_JWT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    /// Lifetime shared by the JWT `exp` claim and the Redis session; always at least 1.
    pub jwt_ttl_hours: i64,
    pub port: u16,
    pub host: String,
    pub allowed_origins: Vec<String>,

    // Connection pool
    pub db_max_connections: u32,
    pub db_min_connections: u32,

    // Login lockout
    pub max_login_attempts: i32,
    pub lockout_minutes: i64,
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// Token lifetime in hours; unparsable values fall back to the default and
/// anything below one hour is raised to one.
pub fn ttl_hours_from(raw: Option<String>) -> i64 {
    parse_or(raw, DEFAULT_JWT_TTL_HOURS).max(1)
}

/// `(max, min)` pool sizes with `max >= 1` and `min <= max`.
pub fn pool_sizes_from(max: Option<String>, min: Option<String>) -> (u32, u32) {
    let max = parse_or(max, 20u32).max(1);
    let min = parse_or(min, 2u32).min(max);
    (max, min)
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let (db_max_connections, db_min_connections) = pool_sizes_from(
            env::var("DB_MAX_CONNECTIONS").ok(),
            env::var("DB_MIN_CONNECTIONS").ok(),
        );

        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_ttl_hours: ttl_hours_from(env::var("JWT_TTL_HOURS").ok()),
            port: parse_or(env::var("PORT").ok(), 3000),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            db_max_connections,
            db_min_connections,
            max_login_attempts: parse_or(env::var("MAX_LOGIN_ATTEMPTS").ok(), 5),
            lockout_minutes: parse_or(env::var("LOCKOUT_MINUTES").ok(), 15),
        })
    }

    pub fn session_ttl_seconds(&self) -> u64 {
        (self.jwt_ttl_hours as u64) * 3600
    }
}
