//! Distributed lock
//!
//! Redis-SETNX mutual exclusion with a per-acquisition ownership token. The
//! TTL is the only backstop against a crashed holder, so release must prove
//! ownership: a plain DEL could drop a lock that expired and was re-acquired
//! by someone else, hence the atomic compare-and-delete script.

use async_trait::async_trait;
use base64::Engine;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use std::sync::Arc;
use std::time::Duration;

use crate::pool::{RedisPool, RedisPoolError};

/// Attempts before `lock` gives up
const MAX_RETRIES: u32 = 10;
/// Jitter range slept between attempts, in milliseconds
const RETRY_JITTER_MS: std::ops::Range<u64> = 50..350;
/// Random bytes behind each ownership token
const TOKEN_BYTES: usize = 16;

/// Atomic check-and-delete: delete the key only when its value still equals
/// the caller's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end"#;

/// Lock errors
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Token generation failed")]
    TokenGeneration,

    #[error("Lock not acquired after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Redis pool error: {0}")]
    Pool(#[from] RedisPoolError),

    #[error("Redis command error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// The store operations the lock needs; production is Redis, tests use an
/// in-memory map.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// `SET key value NX PX ttl`; true iff the key was absent.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, LockError>;

    /// Atomically delete the key iff its value equals `value`; true when
    /// deleted.
    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<bool, LockError>;
}

/// Redis-backed [`LockStore`]
pub struct RedisLockStore {
    pool: RedisPool,
}

impl RedisLockStore {
    #[must_use]
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut conn = self.pool.get().await.map_err(RedisPoolError::from)?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<bool, LockError> {
        let mut conn = self.pool.get().await.map_err(RedisPoolError::from)?;
        let deleted: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}

/// Acquired lock; ownership is proven only by the token, never by key
/// presence.
pub struct LockGuard {
    key: String,
    token: String,
    store: Arc<dyn LockStore>,
}

impl LockGuard {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock. A no-op when someone else holds the key by now
    /// (our TTL expired and it was re-acquired); returns whether the key was
    /// actually deleted.
    pub async fn release(self) -> Result<bool, LockError> {
        let released = self.store.compare_and_delete(&self.key, &self.token).await?;
        if !released {
            tracing::warn!(key = %self.key, "Lock was no longer ours at release");
        }
        Ok(released)
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Token stays out of logs.
        f.debug_struct("LockGuard").field("key", &self.key).finish()
    }
}

/// Distributed mutual exclusion over a [`LockStore`]
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Single acquisition attempt: succeeds iff the key was absent.
    pub async fn try_lock(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, LockError> {
        let token = generate_token()?;
        if self.store.set_if_absent(key, &token, ttl).await? {
            Ok(Some(LockGuard {
                key: key.to_string(),
                token,
                store: self.store.clone(),
            }))
        } else {
            Ok(None)
        }
    }

    /// Acquire with retry: up to [`MAX_RETRIES`] attempts with a random
    /// 50–350 ms sleep between them, then gives up with `Timeout`.
    pub async fn lock(&self, key: &str, ttl: Duration) -> Result<LockGuard, LockError> {
        for attempt in 1..=MAX_RETRIES {
            if let Some(guard) = self.try_lock(key, ttl).await? {
                return Ok(guard);
            }
            if attempt < MAX_RETRIES {
                let jitter = rand::thread_rng().gen_range(RETRY_JITTER_MS);
                tokio::time::sleep(Duration::from_millis(jitter)).await;
            }
        }
        Err(LockError::Timeout {
            attempts: MAX_RETRIES,
        })
    }
}

/// Fresh random token. Fails closed: an RNG failure aborts the acquisition
/// rather than locking with a degenerate token.
fn generate_token() -> Result<String, LockError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| LockError::TokenGeneration)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;
    use tokio::time::Instant;

    /// In-memory [`LockStore`] with TTL expiry on the tokio clock
    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<String, (String, Instant)>>,
        set_attempts: AtomicUsize,
    }

    #[async_trait]
    impl LockStore for MemoryStore {
        async fn set_if_absent(
            &self,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> Result<bool, LockError> {
            self.set_attempts.fetch_add(1, Ordering::SeqCst);
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            if let Some((_, expiry)) = entries.get(key) {
                if *expiry > now {
                    return Ok(false);
                }
            }
            entries.insert(key.to_string(), (value.to_string(), now + ttl));
            Ok(true)
        }

        async fn compare_and_delete(&self, key: &str, value: &str) -> Result<bool, LockError> {
            let mut entries = self.entries.lock().await;
            match entries.get(key) {
                Some((stored, expiry)) if stored == value && *expiry > Instant::now() => {
                    entries.remove(key);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }

    fn manager() -> (LockManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (LockManager::new(store.clone()), store)
    }

    #[test]
    fn test_tokens_are_fresh_per_acquisition() {
        let a = generate_token().unwrap();
        let b = generate_token().unwrap();
        assert_ne!(a, b);
        // 16 bytes -> 24 base64 chars
        assert_eq!(a.len(), 24);
    }

    #[tokio::test]
    async fn test_try_lock_succeeds_once() {
        let (manager, _) = manager();
        let ttl = Duration::from_secs(10);

        let guard = manager.try_lock("locks:room:1", ttl).await.unwrap();
        assert!(guard.is_some());
        let second = manager.try_lock("locks:room:1", ttl).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_acquirers_never_both_succeed() {
        let (manager, _) = manager();
        let ttl = Duration::from_secs(10);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager.try_lock("locks:shared", ttl).await.unwrap()
            }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_release_then_reacquire() {
        let (manager, _) = manager();
        let ttl = Duration::from_secs(10);

        let guard = manager.try_lock("locks:k", ttl).await.unwrap().unwrap();
        assert!(guard.release().await.unwrap());

        assert!(manager.try_lock("locks:k", ttl).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_release_is_noop_after_reacquisition() {
        let (manager, store) = manager();
        let ttl = Duration::from_secs(2);

        let stale = manager.try_lock("locks:k", ttl).await.unwrap().unwrap();

        // TTL expires; a different holder takes the lock.
        tokio::time::advance(Duration::from_secs(3)).await;
        let current = manager.try_lock("locks:k", ttl).await.unwrap().unwrap();

        // The first holder's release must not free the new holder's lock.
        assert!(!stale.release().await.unwrap());
        assert!(store.entries.lock().await.contains_key("locks:k"));

        assert!(current.release().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_gives_up_after_ten_attempts() {
        let (manager, store) = manager();
        let ttl = Duration::from_secs(60);

        // Occupy the key for the whole test.
        let _held = manager.try_lock("locks:busy", ttl).await.unwrap().unwrap();
        store.set_attempts.store(0, Ordering::SeqCst);

        let err = manager.lock("locks:busy", ttl).await.unwrap_err();
        assert!(matches!(err, LockError::Timeout { attempts: 10 }));
        assert_eq!(store.set_attempts.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_lock_retry_succeeds_once_released() {
        let (manager, _) = manager();
        let ttl = Duration::from_secs(60);

        let held = manager.try_lock("locks:k", ttl).await.unwrap().unwrap();
        let contender = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.lock("locks:k", ttl).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        held.release().await.unwrap();

        let guard = contender.await.unwrap().unwrap();
        assert_eq!(guard.key(), "locks:k");
    }
}
