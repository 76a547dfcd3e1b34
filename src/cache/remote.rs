//! Cache adapter over the coordination service's plain key/value calls.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::Cache;
use crate::coordinator::Coordinator;
use crate::error::{Error, Result};

/// Values are stored as JSON strings.
pub struct RemoteCache<V> {
    coordinator: Arc<dyn Coordinator>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> RemoteCache<V> {
    pub fn new(coordinator: Arc<dyn Coordinator>) -> Self {
        Self {
            coordinator,
            _marker: PhantomData,
        }
    }
}

impl<V> Clone for RemoteCache<V> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.coordinator))
    }
}

#[async_trait]
impl<V> Cache<V> for RemoteCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<V> {
        match self.coordinator.get(key).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(Error::KeyNotFound(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<()> {
        let raw = serde_json::to_string(&value)?;
        let reply = self.coordinator.set(key, &raw, ttl).await?;
        if reply != "OK" {
            return Err(Error::UnexpectedReply(reply));
        }
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Remote cache set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let removed = self.coordinator.delete(key).await?;
        debug!(key = %key, removed, "Remote cache delete");
        Ok(())
    }
}
