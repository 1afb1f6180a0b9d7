/// Token revocation store
///
/// Records tokens invalidated before their natural expiry, keyed by `jti`.
///
/// ## Backends
///
/// - **Redis**: `SET NX EX` per revoked token; the key expires with the token
/// - **In-memory**: `DashMap`, pruned periodically by a background task
///
/// Both backends also keep an optional per-user marker: every token for that
/// user whose `iat` falls in or before the marker's second counts as revoked.
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{AuthError, Result};

const KEY_PREFIX: &str = "session:revoked";
const MIN_ENTRY_TTL_SECS: i64 = 60;

/// Tokens validate with zero leeway through the whole second of their `exp`,
/// so an entry must survive until that second has passed.
fn still_validates(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at.timestamp() >= now.timestamp()
}

/// Redis TTL that outlasts every second in which the token still validates
fn entry_ttl_secs(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at.timestamp() - now.timestamp() + 2).max(MIN_ENTRY_TTL_SECS)
}

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record `jti` as revoked until `expires_at`.
    ///
    /// Returns `true` if this call created the entry, `false` if the token was
    /// already revoked. Safe under concurrent calls for the same `jti`.
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<bool>;

    async fn is_revoked(&self, jti: &str) -> Result<bool>;

    /// Revoke every token of `user_id` issued in or before the second of `at`
    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    async fn user_revoked_at(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>>;

    /// Drop entries whose token has expired. Returns the number removed.
    async fn prune_expired(&self) -> Result<usize>;
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct RevocationEntry {
    revoked_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Process-local store for single-instance deployments and tests
#[derive(Debug)]
pub struct InMemoryRevocationStore {
    tokens: DashMap<String, RevocationEntry>,
    users: DashMap<Uuid, DateTime<Utc>>,
    /// A user marker older than this cannot predate any live token
    token_ttl: chrono::Duration,
}

impl InMemoryRevocationStore {
    pub fn new(token_ttl_secs: i64) -> Self {
        Self {
            tokens: DashMap::new(),
            users: DashMap::new(),
            token_ttl: chrono::Duration::seconds(token_ttl_secs),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn revoked_at(&self, jti: &str) -> Option<DateTime<Utc>> {
        self.tokens.get(jti).map(|e| e.revoked_at)
    }

    /// Drop every entry that no longer covers a validating token as of `now`
    pub fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.tokens.len() + self.users.len();

        self.tokens
            .retain(|_, entry| still_validates(entry.expires_at, now));
        let ttl = self.token_ttl;
        self.users.retain(|_, at| still_validates(*at + ttl, now));

        before.saturating_sub(self.tokens.len() + self.users.len())
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        match self.tokens.entry(jti.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(RevocationEntry {
                    revoked_at: Utc::now(),
                    expires_at,
                });
                Ok(true)
            }
        }
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        Ok(self.tokens.contains_key(jti))
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.users
            .entry(user_id)
            .and_modify(|existing| {
                if at > *existing {
                    *existing = at;
                }
            })
            .or_insert(at);
        Ok(())
    }

    async fn user_revoked_at(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        Ok(self.users.get(&user_id).map(|at| *at))
    }

    async fn prune_expired(&self) -> Result<usize> {
        Ok(self.prune_at(Utc::now()))
    }
}

// ============================================================================
// Redis backend
// ============================================================================

/// Shared store backed by Redis; entries expire through key TTLs
#[derive(Clone)]
pub struct RedisRevocationStore {
    conn: ConnectionManager,
    token_ttl_secs: i64,
    timeout: Duration,
}

impl RedisRevocationStore {
    pub fn new(conn: ConnectionManager, token_ttl_secs: i64, timeout: Duration) -> Self {
        Self {
            conn,
            token_ttl_secs,
            timeout,
        }
    }

    /// Open a managed connection to `url`
    pub async fn connect(url: &str, token_ttl_secs: i64, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| AuthError::Redis("connection timed out".to_string()))??;
        Ok(Self::new(conn, token_ttl_secs, timeout))
    }

    fn token_key(jti: &str) -> String {
        format!("{KEY_PREFIX}:jti:{jti}")
    }

    fn user_key(user_id: Uuid) -> String {
        format!("{KEY_PREFIX}:user:{user_id}:ts")
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(AuthError::Redis("operation timed out".to_string())),
        }
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let key = Self::token_key(jti);
        let now = Utc::now();
        let ttl = entry_ttl_secs(expires_at, now);

        let mut conn = self.conn.clone();
        let created: Option<String> = self
            .with_timeout(async {
                redis::cmd("SET")
                    .arg(&key)
                    .arg(now.timestamp())
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl)
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        Ok(created.is_some())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool> {
        let key = Self::token_key(jti);
        let mut conn = self.conn.clone();
        self.with_timeout(async { redis::cmd("EXISTS").arg(&key).query_async(&mut conn).await })
            .await
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let key = Self::user_key(user_id);
        let mut conn = self.conn.clone();
        self.with_timeout(async {
            redis::cmd("SET")
                .arg(&key)
                .arg(at.timestamp())
                .arg("EX")
                .arg(entry_ttl_secs(
                    at + chrono::Duration::seconds(self.token_ttl_secs),
                    Utc::now(),
                ))
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await?;

        tracing::warn!(user_id = %user_id, "All tokens revoked for user");
        Ok(())
    }

    async fn user_revoked_at(&self, user_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let key = Self::user_key(user_id);
        let mut conn = self.conn.clone();
        let raw: Option<String> = self
            .with_timeout(async { redis::cmd("GET").arg(&key).query_async(&mut conn).await })
            .await?;

        match raw {
            None => Ok(None),
            Some(ts) => {
                let secs: i64 = ts
                    .parse()
                    .map_err(|_| AuthError::Redis("invalid revocation timestamp".to_string()))?;
                Ok(Utc.timestamp_opt(secs, 0).single())
            }
        }
    }

    async fn prune_expired(&self) -> Result<usize> {
        Ok(0)
    }
}
