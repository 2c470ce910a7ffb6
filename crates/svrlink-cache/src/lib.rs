//! # svrlink-cache
//!
//! The key/value store collaborator: a managed Redis connection pool plus
//! the Redis-backed distributed lock used to serialize cross-process
//! operations.

pub mod lock;
pub mod pool;

pub use lock::{LockError, LockGuard, LockManager, LockStore, RedisLockStore};
pub use pool::{RedisPool, RedisPoolConfig, RedisPoolError, RedisResult, SharedRedisPool};
