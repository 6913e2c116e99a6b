//! Redis implementation of the lock store contract.

use std::time::Duration;

use fred::prelude::*;
use fred::types::CustomCommand;
use lease_lock_core::error::{LockError, LockResult};
use lease_lock_core::store::LockStore;
use tracing::instrument;

use crate::provider::RedisLockStoreBuilder;

/// Lua script deleting the key only while it still carries our token.
const RELEASE_SCRIPT_LUA: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('del', KEYS[1])
    end
    return 0
"#;

/// Converts a TTL to whole milliseconds, never below one.
fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

fn backend_error(command: &str, e: RedisError) -> LockError {
    LockError::backend(format!("Redis {} failed: {}", command, e))
}

/// A [`LockStore`] backed by a single Redis-compatible server.
///
/// Commands:
/// - acquire: `SET key token NX PX ttl`
/// - release: `EVAL` compare-and-delete script
/// - renew: `PEXPIRE key ttl`, which never creates a key
#[derive(Clone)]
pub struct RedisLockStore {
    client: RedisClient,
}

impl RedisLockStore {
    /// Returns a new builder for configuring the store.
    pub fn builder() -> RedisLockStoreBuilder {
        RedisLockStoreBuilder::new()
    }

    /// Connects to the server at `url`.
    pub async fn new(url: impl Into<String>) -> LockResult<Self> {
        Self::builder().url(url).build().await
    }

    /// Wraps an already connected client.
    pub fn from_client(client: RedisClient) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &RedisClient {
        &self.client
    }
}

impl LockStore for RedisLockStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    #[instrument(skip(self, value), fields(backend = "redis"))]
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        // SET NX returns Some(value) if key was set, None if key already exists
        let result: Option<String> = self
            .client
            .set(
                key,
                value,
                Some(Expiration::PX(ttl_millis(ttl))),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(|e| backend_error("SET NX", e))?;

        Ok(result.is_some())
    }

    #[instrument(skip(self), fields(backend = "redis"))]
    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        self.client
            .get::<Option<String>, _>(key)
            .await
            .map_err(|e| backend_error("GET", e))
    }

    #[instrument(skip(self, token), fields(backend = "redis"))]
    async fn delete_if_equals(&self, key: &str, token: &str) -> LockResult<bool> {
        let args: Vec<RedisValue> = vec![
            RELEASE_SCRIPT_LUA.into(),
            1_i64.into(), // numkeys
            key.to_string().into(),
            token.to_string().into(),
        ];
        let cmd = CustomCommand::new_static("EVAL", None, false);

        let deleted: i64 = self
            .client
            .custom(cmd, args)
            .await
            .map_err(|e| backend_error("EVAL (release)", e))?;

        Ok(deleted == 1)
    }

    #[instrument(skip(self), fields(backend = "redis"))]
    async fn expire_if_exists(&self, key: &str, ttl: Duration) -> LockResult<bool> {
        let args: Vec<RedisValue> = vec![key.to_string().into(), ttl_millis(ttl).into()];
        let cmd = CustomCommand::new_static("PEXPIRE", None, false);

        let updated: i64 = self
            .client
            .custom(cmd, args)
            .await
            .map_err(|e| backend_error("PEXPIRE", e))?;

        Ok(updated == 1)
    }
}
