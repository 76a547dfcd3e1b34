//! In-process coordinator.
//!
//! Implements the [`Coordinator`] contract inside the current process so the
//! lock and remote-cache code can run without a network service. Every
//! operation runs under one mutex, which gives the same atomicity the remote
//! service provides for conditional writes and scripts.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::cache::CacheEntry;
use crate::coordinator::{Coordinator, Script};
use crate::error::{Error, Result};
use crate::lock::scripts;

type Slots = HashMap<String, CacheEntry<String>>;

/// Single-process stand-in for the remote coordination service.
///
/// Only the lock scripts in [`crate::lock::scripts`] are understood by
/// `eval`; any other script is rejected.
#[derive(Debug, Default)]
pub struct InMemoryCoordinator {
    slots: Mutex<Slots>,
}

impl InMemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        slots.retain(|_, slot| !slot.is_expired_at(now));
        slots
    }

    /// Remaining lifetime of a live `key`; `None` when absent or persistent.
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        self.slots().get(key).and_then(CacheEntry::ttl_remaining)
    }

    /// Current value of `key`, if live.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.slots().get(key).map(|slot| slot.value.clone())
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn holds_token(slots: &Slots, key: &str, token: &str) -> bool {
        slots.get(key).is_some_and(|slot| slot.value == token)
    }

    fn compare_and_delete(slots: &mut Slots, key: &str, token: &str) -> i64 {
        if Self::holds_token(slots, key, token) {
            slots.remove(key);
            1
        } else {
            0
        }
    }

    fn compare_and_extend(slots: &mut Slots, key: &str, token: &str, ttl_ms: u64) -> i64 {
        match slots.get_mut(key) {
            Some(slot) if slot.value == token => {
                slot.deadline = Some(Instant::now() + Duration::from_millis(ttl_ms));
                1
            }
            _ => 0,
        }
    }
}

fn arg<'a>(values: &'a [String], index: usize, script: &Script) -> Result<&'a str> {
    values.get(index).map(String::as_str).ok_or_else(|| {
        Error::Backend(format!(
            "wrong number of arguments for script '{}'",
            script.name()
        ))
    })
}

#[async_trait]
impl Coordinator for InMemoryCoordinator {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut slots = self.slots();
        if slots.contains_key(key) {
            return Ok(false);
        }
        slots.insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(true)
    }

    async fn eval(&self, script: &Script, keys: &[String], args: &[String]) -> Result<i64> {
        let key = arg(keys, 0, script)?;
        let token = arg(args, 0, script)?;
        let mut slots = self.slots();

        if *script == scripts::UNLOCK {
            Ok(Self::compare_and_delete(&mut slots, key, token))
        } else if *script == scripts::REFRESH {
            let ttl_ms = arg(args, 1, script)?
                .parse::<u64>()
                .map_err(|e| Error::Backend(format!("invalid expiration: {e}")))?;
            Ok(Self::compare_and_extend(&mut slots, key, token, ttl_ms))
        } else {
            Err(Error::Backend(format!(
                "unsupported script '{}'",
                script.name()
            )))
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<String> {
        self.slots()
            .insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok("OK".to_string())
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        Ok(u64::from(self.slots().remove(key).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_set_if_absent_only_once() {
        let coordinator = InMemoryCoordinator::new();
        let ttl = Duration::from_secs(60);

        assert!(coordinator.set_if_absent("key1", "a", ttl).await.unwrap());
        assert!(!coordinator.set_if_absent("key1", "b", ttl).await.unwrap());
        assert_eq!(coordinator.peek("key1").as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_slot_can_be_reacquired() {
        let coordinator = InMemoryCoordinator::new();

        assert!(coordinator
            .set_if_absent("key1", "a", Duration::from_secs(1))
            .await
            .unwrap());
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(coordinator
            .set_if_absent("key1", "b", Duration::from_secs(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unlock_script_checks_token() {
        let coordinator = InMemoryCoordinator::new();
        coordinator
            .set("key1", "owner", Duration::from_secs(60))
            .await
            .unwrap();

        let other = coordinator
            .eval(&scripts::UNLOCK, &strings(&["key1"]), &strings(&["intruder"]))
            .await
            .unwrap();
        assert_eq!(other, 0);
        assert_eq!(coordinator.peek("key1").as_deref(), Some("owner"));

        let owner = coordinator
            .eval(&scripts::UNLOCK, &strings(&["key1"]), &strings(&["owner"]))
            .await
            .unwrap();
        assert_eq!(owner, 1);
        assert!(coordinator.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_script_extends_only_owner() {
        let coordinator = InMemoryCoordinator::new();
        coordinator
            .set("key1", "owner", Duration::from_secs(10))
            .await
            .unwrap();

        let args = strings(&["intruder", "60000"]);
        let denied = coordinator
            .eval(&scripts::REFRESH, &strings(&["key1"]), &args)
            .await
            .unwrap();
        assert_eq!(denied, 0);
        assert!(coordinator.remaining_ttl("key1").unwrap() <= Duration::from_secs(10));

        let args = strings(&["owner", "60000"]);
        let extended = coordinator
            .eval(&scripts::REFRESH, &strings(&["key1"]), &args)
            .await
            .unwrap();
        assert_eq!(extended, 1);
        assert!(coordinator.remaining_ttl("key1").unwrap() > Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_eval_rejects_unknown_script() {
        let coordinator = InMemoryCoordinator::new();
        let script = Script::new("incr", "return redis.call('incr', KEYS[1])");

        let result = coordinator
            .eval(&script, &strings(&["key1"]), &strings(&["x"]))
            .await;
        assert!(matches!(result, Err(Error::Backend(_))));
    }

    #[tokio::test]
    async fn test_eval_requires_arguments() {
        let coordinator = InMemoryCoordinator::new();

        let result = coordinator.eval(&scripts::UNLOCK, &[], &[]).await;
        assert!(matches!(result, Err(Error::Backend(_))));
    }

    #[tokio::test]
    async fn test_plain_get_set_delete() {
        let coordinator = InMemoryCoordinator::new();

        assert_eq!(coordinator.get("key1").await.unwrap(), None);
        assert_eq!(
            coordinator.set("key1", "v", Duration::ZERO).await.unwrap(),
            "OK"
        );
        assert_eq!(coordinator.get("key1").await.unwrap().as_deref(), Some("v"));
        assert_eq!(coordinator.delete("key1").await.unwrap(), 1);
        assert_eq!(coordinator.delete("key1").await.unwrap(), 0);
    }
}
