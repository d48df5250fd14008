use std::{hash::Hash, sync::Arc, time::Duration};

use aclgate_error::RuleError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use super::{Capabilities, Rule, RuleExitResult};
use crate::context::{LoggedUser, RequestContext, CURRENT_GROUP_HEADER};

/// Concurrent map whose entries expire a fixed time after being written.
///
/// An expired entry is dropped when it is looked up. Inserts also sweep the
/// whole map once per TTL, so keys that are never asked for again do not
/// pile up.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    ttl: Duration,
    entries: DashMap<K, (V, Instant)>,
    last_sweep: Mutex<Instant>,
}

/// Extracts the cache key from a request, or `None` when the request
/// carries nothing to key on.
pub type KeyFn = fn(&RequestContext) -> Option<String>;

#[derive(Debug, Clone)]
struct CachedVerdict {
    matched: bool,
    user: Option<LoggedUser>,
}

/// Memoizes the verdict of a slow rule for a TTL.
///
/// A cached positive verdict also restores the logged user the wrapped rule
/// had established. Concurrent misses on one key each call the wrapped rule.
pub struct CachedRule {
    inner: Arc<dyn Rule>,
    key_fn: KeyFn,
    cache: TtlCache<String, CachedVerdict>,
}

////////////////////////////////////////////////////////////////////////////////
// Own methods
////////////////////////////////////////////////////////////////////////////////

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => {
                let (value, written) = &*entry;
                if written.elapsed() < self.ttl {
                    return Some(value.clone());
                }
                true
            }
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(
        &self,
        key: K,
        value: V,
    ) {
        self.sweep_if_due();
        self.entries.insert(key, (value, Instant::now()));
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (_, written)| written.elapsed() < ttl);
    }

    fn sweep_if_due(&self) {
        {
            let mut last = self.last_sweep.lock();
            if last.elapsed() < self.ttl {
                return;
            }
            *last = Instant::now();
        }
        let before = self.entries.len();
        self.purge_expired();
        debug!(evicted = before.saturating_sub(self.entries.len()), "cache swept");
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CachedRule {
    pub fn new(
        inner: Arc<dyn Rule>,
        key_fn: KeyFn,
        ttl: Duration,
    ) -> Self {
        Self {
            inner,
            key_fn,
            cache: TtlCache::new(ttl),
        }
    }

    /// Caches on the presented Basic credentials.
    pub fn authentication(
        inner: Arc<dyn Rule>,
        ttl: Duration,
    ) -> Self {
        Self::new(inner, credentials_key, ttl)
    }

    /// Caches on the logged user, its groups and the requested group.
    pub fn authorization(
        inner: Arc<dyn Rule>,
        ttl: Duration,
    ) -> Self {
        Self::new(inner, user_key, ttl)
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

/// Wraps `rule` in a cache unless `ttl` is zero.
///
/// The cache key depends on what the rule does: authentication rules are
/// keyed on credentials, authorization rules on the logged user. Other rules
/// are returned unchanged.
pub fn wrap_in_cache_if_enabled(
    rule: Arc<dyn Rule>,
    ttl: Duration,
) -> Arc<dyn Rule> {
    if ttl.is_zero() {
        return rule;
    }
    let capabilities = rule.capabilities();
    if capabilities.contains(Capabilities::AUTHENTICATION) {
        Arc::new(CachedRule::authentication(rule, ttl))
    } else if capabilities.contains(Capabilities::AUTHORIZATION) {
        Arc::new(CachedRule::authorization(rule, ttl))
    } else {
        rule
    }
}

/// `user` plus a digest of the password, so no plain secret is kept.
fn credentials_key(ctx: &RequestContext) -> Option<String> {
    let auth = ctx.basic_auth()?;
    let digest = Sha256::digest(auth.password.as_bytes());
    Some(format!("{}:{}", auth.user, hex::encode(digest)))
}

/// The requested group comes from the request header: authorization rules
/// pick the current group themselves, so the logged user has none yet.
fn user_key(ctx: &RequestContext) -> Option<String> {
    let user = ctx.logged_user()?;
    let groups: Vec<&str> = user.available_groups.iter().map(String::as_str).collect();
    let requested = ctx
        .header(CURRENT_GROUP_HEADER)
        .or(user.current_group.as_deref())
        .unwrap_or_default();
    Some(format!("{}|{}|{}", user.id, groups.join(","), requested))
}

////////////////////////////////////////////////////////////////////////////////
// Trait implementations for CachedRule
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl Rule for CachedRule {
    fn key(&self) -> &str {
        self.inner.key()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    async fn check(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<RuleExitResult, RuleError> {
        let Some(cache_key) = (self.key_fn)(ctx) else {
            return self.inner.check(ctx).await;
        };

        if let Some(verdict) = self.cache.get(&cache_key) {
            debug!(rule = self.key(), matched = verdict.matched, "cache hit");
            if let (true, Some(user)) = (verdict.matched, verdict.user) {
                ctx.set_logged_user(user);
            }
            return Ok(RuleExitResult::new(self.key(), verdict.matched));
        }

        let result = self.inner.check(ctx).await?;
        let user = if result.matched {
            ctx.logged_user()
        } else {
            None
        };
        self.cache.insert(
            cache_key,
            CachedVerdict {
                matched: result.matched,
                user,
            },
        );
        Ok(result)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
