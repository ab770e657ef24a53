//! Failed-login tracking and lockout enforcement.
//!
//! Failures are counted per identity (threshold 5) and per source IP
//! (threshold 10) over a rolling window. Reaching either threshold
//! locks that key for the configured duration; all further attempts
//! fail fast with the remaining lockout surfaced to the caller.

use std::sync::Arc;

use chrono::Duration;

use vela_core::clock::Clock;
use vela_core::error::VelaResult;
use vela_core::models::lockout::{AttemptKey, FailedLoginCounter};
use vela_core::repository::FailedLoginRepository;

use crate::error::AuthError;

pub struct LockoutGuard<F: FailedLoginRepository> {
    repo: F,
    clock: Arc<dyn Clock>,
    window: Duration,
    lockout: Duration,
}

impl<F: FailedLoginRepository> LockoutGuard<F> {
    pub fn new(repo: F, clock: Arc<dyn Clock>, window_secs: u64, lockout_secs: u64) -> Self {
        Self {
            repo,
            clock,
            window: Duration::seconds(window_secs as i64),
            lockout: Duration::seconds(lockout_secs as i64),
        }
    }

    /// Fail fast if `key` has an active lockout.
    pub async fn check(&self, key: &AttemptKey) -> VelaResult<()> {
        let now = self.clock.now();
        if let Some(counter) = self.repo.get(key).await?
            && let Some(locked_until) = counter.locked_until
            && locked_until > now
        {
            return Err(AuthError::AccountLocked {
                retry_after_secs: (locked_until - now).num_seconds().max(0) as u64,
            }
            .into());
        }
        Ok(())
    }

    /// Count one failure against `key`; lock it once `threshold` is
    /// reached within the window. Returns the attempts left before
    /// lockout (0 when the lockout just engaged).
    pub async fn record_failure(&self, key: &AttemptKey, threshold: u32) -> VelaResult<u32> {
        let now = self.clock.now();

        let mut counter = match self.repo.get(key).await? {
            // A stale window starts over.
            Some(c) if c.window_start + self.window > now => c,
            _ => FailedLoginCounter {
                key: key.clone(),
                count: 0,
                window_start: now,
                locked_until: None,
            },
        };

        counter.count += 1;
        if counter.count >= threshold {
            counter.locked_until = Some(now + self.lockout);
        }
        let remaining = threshold.saturating_sub(counter.count);

        self.repo.put(counter).await?;
        Ok(remaining)
    }

    /// Reset `key` after a successful login.
    pub async fn clear(&self, key: &AttemptKey) -> VelaResult<()> {
        self.repo.clear(key).await
    }
}
