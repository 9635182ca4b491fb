use std::{env, fmt::Display, str::FromStr};

use redis::aio::MultiplexedConnection;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use crate::{
    error::{CacheError, ConfigError, QueryError},
    jwt::SessionKeys,
};

const SESSION_LIFETIME_MAX_HOURS: i64 = 24 * 365;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub session_lifetime_hours: i64,
    pub database_max_connections: u32,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            redis_url: try_load(&lookup, "REDIS_URL", "redis://127.0.0.1/")?,
            jwt_secret: required(&lookup, "JWT_SECRET")?,
            session_lifetime_hours: in_range(
                "SESSION_LIFETIME_HOURS",
                try_load(&lookup, "SESSION_LIFETIME_HOURS", "24")?,
                1,
                SESSION_LIFETIME_MAX_HOURS,
            )?,
            database_max_connections: try_load(&lookup, "DATABASE_MAX_CONNECTIONS", "5")?,
        })
    }

    pub fn session_keys(&self) -> Result<SessionKeys, ConfigError> {
        SessionKeys::new(self.jwt_secret.as_bytes(), self.session_lifetime_hours)
    }

    pub async fn connect_database(&self) -> Result<Pool<Postgres>, potion::Error> {
        PgPoolOptions::new()
            .max_connections(self.database_max_connections)
            .connect(&self.database_url)
            .await
            .map_err(|e| QueryError::from(e).into())
    }

    pub async fn connect_cache(&self) -> Result<MultiplexedConnection, potion::Error> {
        let client = redis::Client::open(self.redis_url.as_str())
            .map_err(|e| CacheError::from(e).into())?;

        client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::from(e).into())
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => {
            log::error!("{key} is not set");
            Err(ConfigError::Missing(key))
        }
    }
}

fn in_range(key: &'static str, value: i64, min: i64, max: i64) -> Result<i64, ConfigError> {
    if (min..=max).contains(&value) {
        return Ok(value);
    }

    log::warn!("{key} must be between {min} and {max}, got {value}");
    Err(ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        log::info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e| {
        log::warn!("Invalid {key} value: {e}");
        ConfigError::Invalid { key, value }
    })
}
