//! Fixed-window request counter keyed by (identity, route).
//!
//! The window boundary is `floor(now / window_seconds)`; a new window
//! resets the count. Exactly `limit` requests pass per window; every
//! further request is rejected with a machine-readable retry delay.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use vela_core::clock::Clock;
use vela_core::error::{VelaError, VelaResult};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone)]
pub struct Decision {
    pub allowed: bool,
    /// Requests left in the current window (0 when denied).
    pub remaining: u64,
    /// When the current window ends and the count resets.
    pub reset_at: DateTime<Utc>,
}

impl Decision {
    /// Seconds until the caller may retry. At most `window_seconds`.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        (self.reset_at - now).num_seconds().max(0) as u64
    }
}

/// A limit over a fixed window.
#[derive(Debug, Clone, Copy)]
pub struct LimitRule {
    pub limit: u64,
    pub window_secs: i64,
}

/// What a route's counter is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateScope {
    Ip,
    Account,
    Tenant,
}

/// Per-route default limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Login,
    Registration,
    Refresh,
    PasswordChange,
    /// AI drafting and OCR extraction calls.
    AiGeneration,
    Webhook,
    General,
}

impl RouteClass {
    pub fn name(&self) -> &'static str {
        match self {
            RouteClass::Login => "login",
            RouteClass::Registration => "registration",
            RouteClass::Refresh => "refresh",
            RouteClass::PasswordChange => "password_change",
            RouteClass::AiGeneration => "ai_generation",
            RouteClass::Webhook => "webhook",
            RouteClass::General => "general",
        }
    }

    pub fn rule(&self) -> LimitRule {
        match self {
            RouteClass::Login => LimitRule {
                limit: 5,
                window_secs: 60,
            },
            RouteClass::Registration => LimitRule {
                limit: 3,
                window_secs: 60,
            },
            RouteClass::Refresh => LimitRule {
                limit: 30,
                window_secs: 60,
            },
            RouteClass::PasswordChange => LimitRule {
                limit: 3,
                window_secs: 3600,
            },
            RouteClass::AiGeneration => LimitRule {
                limit: 20,
                window_secs: 3600,
            },
            RouteClass::Webhook => LimitRule {
                limit: 60,
                window_secs: 60,
            },
            RouteClass::General => LimitRule {
                limit: 1000,
                window_secs: 60,
            },
        }
    }

    pub fn scope(&self) -> RateScope {
        match self {
            RouteClass::Login | RouteClass::Registration | RouteClass::Webhook => RateScope::Ip,
            RouteClass::Refresh | RouteClass::PasswordChange => RateScope::Account,
            RouteClass::AiGeneration | RouteClass::General => RateScope::Tenant,
        }
    }

    /// Counter key for a concrete caller, e.g. `login:ip:203.0.113.7`.
    pub fn key(&self, scope_key: &str) -> String {
        let scope = match self.scope() {
            RateScope::Ip => "ip",
            RateScope::Account => "account",
            RateScope::Tenant => "tenant",
        };
        format!("{}:{}:{}", self.name(), scope, scope_key)
    }
}

/// Shared, atomically incrementable counter store.
///
/// Correctness of rate limiting under distributed deployment requires
/// these counters to live in a shared store once scaled beyond one
/// instance; this trait is that seam.
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key` in the window starting at
    /// `window_start` (Unix seconds), resetting any stale window, and
    /// return the post-increment count.
    fn increment(
        &self,
        key: &str,
        window_start: i64,
    ) -> impl Future<Output = VelaResult<u64>> + Send;
}

/// Process-local counter store. Reset on process start.
#[derive(Default)]
pub struct InMemoryCounterStore {
    buckets: Mutex<HashMap<String, (i64, u64)>>,
}

impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, window_start: i64) -> VelaResult<u64> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| VelaError::Internal("rate-limit store poisoned".into()))?;
        let bucket = bucket_entry(&mut buckets, key, window_start);
        bucket.1 += 1;
        Ok(bucket.1)
    }
}

fn bucket_entry<'m>(
    buckets: &'m mut HashMap<String, (i64, u64)>,
    key: &str,
    window_start: i64,
) -> &'m mut (i64, u64) {
    let bucket = buckets
        .entry(key.to_string())
        .or_insert((window_start, 0));
    if bucket.0 != window_start {
        *bucket = (window_start, 0);
    }
    bucket
}

/// Fixed-window rate limiter over a [`CounterStore`].
pub struct RateLimiter<S: CounterStore> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: CounterStore> RateLimiter<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Count this request against `key` and decide.
    pub async fn check(&self, key: &str, rule: LimitRule) -> VelaResult<Decision> {
        let now = self.clock.now();
        let now_secs = now.timestamp();
        let window_start = now_secs - now_secs.rem_euclid(rule.window_secs);
        let reset_at = Utc
            .timestamp_opt(window_start + rule.window_secs, 0)
            .single()
            .ok_or_else(|| VelaError::Internal("window end out of range".into()))?;

        let count = self.store.increment(key, window_start).await?;

        Ok(Decision {
            allowed: count <= rule.limit,
            remaining: rule.limit.saturating_sub(count),
            reset_at,
        })
    }

    /// Like [`check`](Self::check), but a denial becomes
    /// [`VelaError::RateLimited`] carrying the retry delay.
    pub async fn require(&self, key: &str, rule: LimitRule) -> VelaResult<Decision> {
        let decision = self.check(key, rule).await?;
        if !decision.allowed {
            return Err(VelaError::RateLimited {
                retry_after_secs: decision.retry_after_secs(self.clock.now()),
            });
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use vela_core::clock::ManualClock;

    use super::*;

    fn limiter() -> (RateLimiter<InMemoryCounterStore>, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
        let limiter = RateLimiter::new(InMemoryCounterStore::default(), Arc::new(clock.clone()));
        (limiter, clock)
    }

    #[tokio::test]
    async fn allows_exactly_limit_per_window() {
        let (limiter, clock) = limiter();
        let rule = RouteClass::Login.rule();
        let key = RouteClass::Login.key("203.0.113.7");

        for _ in 0..rule.limit {
            let d = limiter.check(&key, rule).await.unwrap();
            assert!(d.allowed);
        }
        let denied = limiter.check(&key, rule).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after_secs(clock.now()) <= rule.window_secs as u64);
    }

    #[tokio::test]
    async fn window_elapse_resets_the_count() {
        let (limiter, clock) = limiter();
        let rule = RouteClass::Login.rule();
        let key = RouteClass::Login.key("203.0.113.7");

        for _ in 0..=rule.limit {
            limiter.check(&key, rule).await.unwrap();
        }
        assert!(!limiter.check(&key, rule).await.unwrap().allowed);

        clock.advance(Duration::seconds(rule.window_secs));
        assert!(limiter.check(&key, rule).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (limiter, _clock) = limiter();
        let rule = RouteClass::Login.rule();

        for _ in 0..=rule.limit {
            limiter
                .check(&RouteClass::Login.key("203.0.113.7"), rule)
                .await
                .unwrap();
        }
        let other = limiter
            .check(&RouteClass::Login.key("198.51.100.9"), rule)
            .await
            .unwrap();
        assert!(other.allowed);
    }

    #[tokio::test]
    async fn require_surfaces_retry_after() {
        let (limiter, _clock) = limiter();
        let rule = RouteClass::PasswordChange.rule();
        let key = RouteClass::PasswordChange.key("account-1");

        for _ in 0..rule.limit {
            limiter.require(&key, rule).await.unwrap();
        }
        let err = limiter.require(&key, rule).await.unwrap_err();
        match err {
            VelaError::RateLimited { retry_after_secs } => {
                assert!(retry_after_secs <= rule.window_secs as u64);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }
}
