//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the expiring store against a plain HashMap model.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{ExpiringStore, StoreOptions};
use crate::error::Error;
use crate::lock::{FixedIntervalRetry, RetryStrategy};
use crate::policy::HashBloomFilter;

// == Test Configuration ==
const NO_EXPIRY: Duration = Duration::ZERO;

/// Sweep far enough out that tests drive removal themselves.
fn quiet_options() -> StoreOptions {
    StoreOptions::default().with_sweep_interval(Duration::from_secs(3600))
}

// == Strategies ==
/// Small key space so sequences revisit keys
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-e]{1,2}".prop_map(|s| s)
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,64}".prop_map(|s| s)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Without expirations the store behaves exactly like a map, and the
    // hit/miss counters match the reads that were made.
    #[test]
    fn prop_store_matches_map_model(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        tokio_test::block_on(async {
            let store = ExpiringStore::new(quiet_options());
            let mut model: HashMap<String, String> = HashMap::new();
            let mut expected_hits = 0u64;
            let mut expected_misses = 0u64;

            for op in ops {
                match op {
                    CacheOp::Set { key, value } => {
                        store.set(&key, value.clone(), NO_EXPIRY).await.unwrap();
                        model.insert(key, value);
                    }
                    CacheOp::Get { key } => match (store.get(&key).await, model.get(&key)) {
                        (Ok(actual), Some(expected)) => {
                            prop_assert_eq!(&actual, expected);
                            expected_hits += 1;
                        }
                        (Err(Error::KeyNotFound(_)), None) => expected_misses += 1,
                        (actual, expected) => {
                            prop_assert!(false, "store returned {:?}, model had {:?}", actual, expected);
                        }
                    },
                    CacheOp::Delete { key } => {
                        prop_assert!(store.delete(&key).await.is_ok());
                        model.remove(&key);
                    }
                }
            }

            let stats = store.stats().await;
            prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
            prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
            prop_assert_eq!(stats.total_entries, model.len(), "Total entries mismatch");
            Ok(())
        })?;
    }

    // The eviction callback fires once per removal of a present key and
    // never for deletes of absent keys.
    #[test]
    fn prop_callback_fires_once_per_removal(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        tokio_test::block_on(async {
            let fired = Arc::new(AtomicUsize::new(0));
            let store = {
                let fired = fired.clone();
                ExpiringStore::with_eviction_callback(quiet_options(), move |_key: &str, _value: &String| {
                    fired.fetch_add(1, Ordering::SeqCst);
                })
            };
            let mut present: HashMap<String, ()> = HashMap::new();
            let mut expected_removals = 0usize;

            for op in ops {
                match op {
                    CacheOp::Set { key, value } => {
                        store.set(&key, value, NO_EXPIRY).await.unwrap();
                        present.insert(key, ());
                    }
                    CacheOp::Get { key } => {
                        let _ = store.get(&key).await;
                    }
                    CacheOp::Delete { key } => {
                        store.delete(&key).await.unwrap();
                        if present.remove(&key).is_some() {
                            expected_removals += 1;
                        }
                    }
                }
            }

            prop_assert_eq!(fired.load(Ordering::SeqCst), expected_removals);
            Ok(())
        })?;
    }

    // Other than the overwritten key, setting never disturbs existing entries.
    #[test]
    fn prop_overwrite_replaces_value(key in key_strategy(), first in value_strategy(), second in value_strategy()) {
        tokio_test::block_on(async {
            let store = ExpiringStore::new(quiet_options());
            store.set("other", "untouched".to_string(), NO_EXPIRY).await.unwrap();
            store.set(&key, first, NO_EXPIRY).await.unwrap();
            store.set(&key, second.clone(), NO_EXPIRY).await.unwrap();

            prop_assert_eq!(store.get(&key).await.unwrap(), second);
            prop_assert_eq!(store.get("other").await.unwrap(), "untouched");
            prop_assert_eq!(store.len().await, 2);
            Ok(())
        })?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    // A sweep removes min(expired, limit) entries and leaves live ones alone.
    #[test]
    fn prop_sweep_is_bounded(expired in 0usize..60, live in 0usize..20, limit in 1usize..80) {
        tokio_test::block_on(async {
            tokio::time::pause();
            let store = ExpiringStore::new(quiet_options());
            for i in 0..expired {
                store.set(&format!("short:{i}"), i, Duration::from_secs(1)).await.unwrap();
            }
            for i in 0..live {
                store.set(&format!("long:{i}"), i, NO_EXPIRY).await.unwrap();
            }
            tokio::time::advance(Duration::from_secs(2)).await;

            let removed = store.sweep_now(limit).await;

            prop_assert_eq!(removed, expired.min(limit));
            prop_assert_eq!(store.len().await, expired + live - removed);
            for i in 0..live {
                prop_assert_eq!(store.get(&format!("long:{i}")).await, Ok(i));
            }
            Ok(())
        })?;
    }

    // Every key inserted into the Bloom gate is reported as possibly present.
    #[test]
    fn prop_bloom_has_no_false_negatives(keys in prop::collection::hash_set("[a-z0-9:]{1,24}", 1..300)) {
        let filter = HashBloomFilter::new(keys.len(), 0.01);
        for key in &keys {
            filter.insert(key);
        }
        for key in &keys {
            prop_assert!(filter.contains(key), "{} missing from filter", key);
        }
    }

    // A fixed-interval strategy yields exactly its budget of waits.
    #[test]
    fn prop_fixed_retry_budget(max_retries in 0u32..50, interval_ms in 0u64..1000) {
        let interval = Duration::from_millis(interval_ms);
        let mut retry = FixedIntervalRetry::new(interval, max_retries);

        let mut waits = 0u32;
        while let Some(wait) = retry.next() {
            prop_assert_eq!(wait, interval);
            waits += 1;
            prop_assert!(waits <= max_retries);
        }
        prop_assert_eq!(waits, max_retries);
        prop_assert_eq!(retry.next(), None);
    }
}
