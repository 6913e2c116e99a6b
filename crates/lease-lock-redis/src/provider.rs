//! Redis store configuration.

use lease_lock_core::error::{LockError, LockResult};

use crate::store::RedisLockStore;
use fred::prelude::*;

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;

/// Builder for [`RedisLockStore`].
///
/// Connection parameters are passed through to the client untouched; no
/// retry policy is applied beyond the client's own.
pub struct RedisLockStoreBuilder {
    url: Option<String>,
    host: Option<String>,
    port: u16,
    password: Option<String>,
    client: Option<RedisClient>,
}

impl RedisLockStoreBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            url: None,
            host: None,
            port: DEFAULT_PORT,
            password: None,
            client: None,
        }
    }

    /// Sets the Redis server URL, e.g. `redis://:secret@localhost:6379`.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the Redis host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the Redis port. Defaults to 6379.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the password used to authenticate.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Uses an existing, already connected Redis client.
    pub fn client(mut self, client: RedisClient) -> Self {
        self.client = Some(client);
        self
    }

    fn config(&self) -> LockResult<RedisConfig> {
        let url = match (&self.url, &self.host) {
            (Some(url), _) => url.clone(),
            (None, Some(host)) => format!("redis://{}:{}", host, self.port),
            (None, None) => {
                return Err(LockError::InvalidConfig(
                    "no Redis client, URL or host provided".to_string(),
                ));
            }
        };

        let mut config = RedisConfig::from_url(&url).map_err(|e| {
            LockError::InvalidConfig(format!("invalid Redis URL: {}", e))
        })?;
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        Ok(config)
    }

    /// Builds the store, connecting if no client was supplied.
    pub async fn build(self) -> LockResult<RedisLockStore> {
        if let Some(client) = self.client {
            return Ok(RedisLockStore::from_client(client));
        }

        let config = self.config()?;
        let client = RedisClient::new(config, None, None, None);
        client.connect();
        client
            .wait_for_connect()
            .await
            .map_err(|e| LockError::connection(format!("failed to connect to Redis: {e}")))?;

        Ok(RedisLockStore::from_client(client))
    }
}

impl Default for RedisLockStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
