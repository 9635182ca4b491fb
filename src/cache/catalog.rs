use std::future::Future;

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{error::CacheError, schema::Uuid};

const CATALOG_GENERATION_KEY: &str = "catalog-generation";
const CATALOG_TTL_SECONDS: u64 = 60 * 60;
/// Longer search prefixes are served straight from the database.
const CACHED_PREFIX_MAX_LENGTH: usize = 8;

// Caching - keys

/// Catalog values worth caching. Tags and ingredients are reference data,
/// so every key is bound to the catalog generation.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheKey {
    Tags,
    Ingredients(String),
    Ingredient(Uuid),
}

impl CacheKey {
    /// `None` for prefixes too long to be worth a key of their own.
    pub fn ingredients(prefix: &str) -> Option<Self> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.chars().count() > CACHED_PREFIX_MAX_LENGTH {
            return None;
        }
        Some(Self::Ingredients(prefix))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Tags => write!(f, "catalog-tags"),
            CacheKey::Ingredients(prefix) => write!(f, "catalog-ingredients-{prefix}"),
            CacheKey::Ingredient(id) => write!(f, "catalog-ingredient-{id}"),
        }
    }
}

// Cache - wrappers

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone, Debug, PartialEq)]
pub struct CacheEnvelope {
    generation: i64,
    payload: String,
}

impl CacheEnvelope {
    pub fn wrap<T: Serialize>(value: &T, generation: i64) -> Result<Self, CacheError> {
        Ok(Self {
            generation,
            payload: serde_json::to_string(value)?,
        })
    }

    pub fn is_fresh(&self, generation: i64) -> bool {
        self.generation == generation
    }

    pub fn unwrap_value<T: DeserializeOwned>(&self) -> Result<T, CacheError> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// Returns the cached value for `key`, or runs `callback` and caches its result.
pub async fn get_or<T, F, Fut>(
    key: CacheKey,
    cache: &mut MultiplexedConnection,
    callback: F,
) -> Result<T, potion::Error>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, potion::Error>>,
{
    let name = key.to_string();
    let generation = catalog_generation(cache).await?;

    let cached = match get_cache_value::<&str, CacheEnvelope>(name.as_str(), cache).await {
        Ok(value) => value,
        Err(_) => {
            log::warn!("> Failed to deserialize cached value. Deleting {name}");
            delete_cache_value(name.as_str(), cache).await?;
            None
        }
    };

    if let Some(envelope) = cached {
        if envelope.is_fresh(generation) {
            match envelope.unwrap_value::<T>() {
                Ok(value) => {
                    log::trace!("> Found {name}");
                    return Ok(value);
                }
                Err(_) => {
                    log::warn!("> Corrupt payload for {name}, refetching");
                }
            }
        } else {
            log::trace!("> Invalidated {name}");
            delete_cache_value(name.as_str(), cache).await?;
        }
    }

    log::trace!("> Fetching {name}");
    let value = callback().await?;

    match CacheEnvelope::wrap(&value, generation) {
        Ok(envelope) => {
            if let Err(e) =
                set_cache_value(name.as_str(), envelope, CATALOG_TTL_SECONDS, cache).await
            {
                log::error!("> Failed to cache {name}: {:?}", e.info);
            }
        }
        Err(_) => log::error!("> Failed to serialize {name}"),
    }

    Ok(value)
}

/// Invalidates every cached catalog value.
pub async fn invalidate_catalog(cache: &mut MultiplexedConnection) -> Result<i64, potion::Error> {
    let generation: i64 = cache
        .incr(CATALOG_GENERATION_KEY, 1)
        .await
        .map_err(|e| CacheError::from(e).into())?;

    log::trace!("> Catalog generation is now {generation}");
    Ok(generation)
}

async fn catalog_generation(cache: &mut MultiplexedConnection) -> Result<i64, potion::Error> {
    let generation = get_cache_value::<&str, i64>(CATALOG_GENERATION_KEY, cache).await?;
    Ok(generation.unwrap_or(0))
}

// Cache - raw handlers

/// Stores `value` for `ttl_seconds`.
pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    ttl_seconds: u64,
    cache: &mut MultiplexedConnection,
) -> Result<(), potion::Error> {
    let _: () = cache
        .set_ex(key, value, ttl_seconds)
        .await
        .map_err(|e| CacheError::from(e).into())?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), potion::Error> {
    let _: () = cache
        .del(key)
        .await
        .map_err(|e| CacheError::from(e).into())?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, potion::Error> {
    let value: Option<V> = cache
        .get(key)
        .await
        .map_err(|e| CacheError::from(e).into())?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use crate::schema::Tag;

    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(CacheKey::Tags.to_string(), "catalog-tags");
        assert_eq!(CacheKey::Ingredient(4).to_string(), "catalog-ingredient-4");
        assert_eq!(
            CacheKey::ingredients("  Fl ").map(|key| key.to_string()),
            Some(String::from("catalog-ingredients-fl"))
        );
    }

    #[test]
    fn long_prefixes_get_no_key() {
        assert!(CacheKey::ingredients("abcdefgh").is_some());
        assert!(CacheKey::ingredients("abcdefghi").is_none());
        assert!(CacheKey::ingredients("мукамука").is_some());
    }

    #[test]
    fn envelope_is_bound_to_generation() {
        let tags = vec![Tag {
            id: 1,
            name: String::from("Breakfast"),
            color: String::from("#E26C2D"),
            slug: String::from("breakfast"),
        }];
        let envelope = CacheEnvelope::wrap(&tags, 3).ok().unwrap();

        assert!(envelope.is_fresh(3));
        assert!(!envelope.is_fresh(4));
        assert_eq!(envelope.unwrap_value::<Vec<Tag>>().ok(), Some(tags));
    }

    #[test]
    fn corrupt_payload_is_an_error() {
        let envelope = CacheEnvelope {
            generation: 0,
            payload: String::from("{not json"),
        };

        assert!(envelope.unwrap_value::<Vec<Tag>>().is_err());
    }
}
