//! Best-effort Redis hints for the poll endpoint.
//!
//! When `REDIS_URL` is configured, the report endpoint publishes the step
//! id of newly READY tasks per agent role, and pollers try that hint first
//! through the preferred-task claim path. Every operation here is
//! best-effort: any Redis failure degrades silently to the database path.

use redis::AsyncCommands;

const HINT_TTL_SECONDS: u64 = 300;

/// Optional ready-task hint cache
#[derive(Clone)]
pub struct ReadyTaskCache {
    client: Option<redis::Client>,
}

impl ReadyTaskCache {
    /// Cache that never hints (no Redis configured)
    pub fn disabled() -> Self {
        Self { client: None }
    }

    /// Cache backed by the given Redis URL. A malformed URL disables the
    /// cache rather than failing startup.
    pub fn new(redis_url: Option<&str>) -> Self {
        let client = redis_url.and_then(|url| match redis::Client::open(url) {
            Ok(client) => Some(client),
            Err(error) => {
                tracing::warn!(%error, "Invalid Redis URL; ready-task cache disabled");
                None
            }
        });
        Self { client }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    async fn connection(&self) -> Option<redis::aio::MultiplexedConnection> {
        let client = self.client.as_ref()?;
        match client.get_multiplexed_async_connection().await {
            Ok(connection) => Some(connection),
            Err(error) => {
                tracing::debug!(%error, "Redis unavailable; skipping cache");
                None
            }
        }
    }

    /// First available hint for any of the given capabilities.
    pub async fn ready_hint(&self, capabilities: &[String]) -> Option<String> {
        let mut connection = self.connection().await?;
        for capability in capabilities {
            let hint: Option<String> = connection.get(hint_key(capability)).await.ok().flatten();
            if hint.is_some() {
                return hint;
            }
        }
        None
    }

    /// Publish a newly READY task as the hint for its agent role.
    pub async fn put_ready_hint(&self, capability: &str, step_id: &str) {
        let Some(mut connection) = self.connection().await else {
            return;
        };
        let outcome: redis::RedisResult<()> = connection
            .set_ex(hint_key(capability), step_id, HINT_TTL_SECONDS)
            .await;
        if let Err(error) = outcome {
            tracing::debug!(%error, "Failed to publish ready-task hint");
        }
    }

    /// Drop hints for the given capabilities (a task was just claimed).
    pub async fn invalidate(&self, capabilities: &[String]) {
        let Some(mut connection) = self.connection().await else {
            return;
        };
        for capability in capabilities {
            let outcome: redis::RedisResult<()> = connection.del(hint_key(capability)).await;
            if let Err(error) = outcome {
                tracing::debug!(%error, "Failed to invalidate ready-task hint");
            }
        }
    }
}

fn hint_key(capability: &str) -> String {
    format!("cortex:ready_hint:{capability}")
}
