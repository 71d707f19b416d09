//! Expiring key/value cache kept alongside the collections.
//!
//! Entries are journaled like records. An expired entry reads as absent and
//! is purged by the read that finds it.

use super::Engine;
use crate::error::CoreResult;
use crate::journal::JournalOp;
use crate::types::now_millis;
use serde_json::Value;
use std::time::Duration;

/// A cached value and its expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Stored value.
    pub value: Value,
    /// Expiry in Unix milliseconds; `None` never expires.
    pub expires_at: Option<i64>,
}

impl CacheEntry {
    /// Returns true once `now` has reached the expiry.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl Engine {
    /// Stores `value` under `key`, expiring after `ttl` (never if `None`).
    pub fn set_cache(&self, key: &str, value: Value, ttl: Option<Duration>) -> CoreResult<()> {
        let expires_at = ttl.map(|ttl| {
            let ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            now_millis().saturating_add(ms)
        });
        self.write(|state| {
            state.commit(JournalOp::CacheSet {
                key: key.to_string(),
                value,
                expires_at,
            })?;
            tracing::debug!(key, ?expires_at, "cache entry set");
            Ok(())
        })
    }

    /// Returns the live value under `key`.
    ///
    /// An expired entry is removed and reported as absent.
    pub fn get_cache(&self, key: &str) -> CoreResult<Option<Value>> {
        let now = now_millis();
        let lookup = self.read(|state| match state.cache.get(key) {
            Some(entry) if !entry.is_expired(now) => Ok(Some(Some(entry.value.clone()))),
            Some(_) => Ok(None),
            None => Ok(Some(None)),
        })?;

        match lookup {
            Some(found) => {
                self.metrics.record_cache(found.is_some());
                Ok(found)
            }
            None => {
                self.metrics.record_cache(false);
                self.write(|state| {
                    let still_expired = state
                        .cache
                        .get(key)
                        .is_some_and(|entry| entry.is_expired(now));
                    if still_expired {
                        state.commit(JournalOp::CacheRemove {
                            key: key.to_string(),
                        })?;
                        tracing::debug!(key, "expired cache entry purged");
                    }
                    Ok(None)
                })
            }
        }
    }

    /// Removes `key`. Returns whether an entry was present.
    pub fn remove_cache(&self, key: &str) -> CoreResult<bool> {
        self.write(|state| {
            if !state.cache.contains_key(key) {
                return Ok(false);
            }
            state.commit(JournalOp::CacheRemove {
                key: key.to_string(),
            })?;
            Ok(true)
        })
    }

    /// Returns the live keys starting with `prefix`, sorted.
    pub fn cache_keys(&self, prefix: &str) -> CoreResult<Vec<String>> {
        let now = now_millis();
        self.read(|state| {
            Ok(state
                .cache
                .range(prefix.to_string()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .filter(|(_, entry)| !entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect())
        })
    }

    /// Removes every expired entry. Returns how many were removed.
    pub fn purge_expired_cache(&self) -> CoreResult<usize> {
        let now = now_millis();
        self.write(|state| {
            let ops: Vec<JournalOp> = state
                .cache
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| JournalOp::CacheRemove { key: key.clone() })
                .collect();
            let purged = ops.len();
            if purged > 0 {
                state.commit(JournalOp::Batch { ops })?;
                tracing::debug!(purged, "expired cache entries purged");
            }
            Ok(purged)
        })
    }
}
