//! Circuit breaker — one small state machine per external dependency.
//!
//! `Closed` passes calls through and counts consecutive failures;
//! `Open` rejects immediately until the cooldown elapses; `HalfOpen`
//! lets exactly one probe through and decides from its outcome.
//! Breakers live in an injected registry shared across requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use vela_core::clock::Clock;
use vela_core::error::{VelaError, VelaResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long an open circuit rejects before allowing a probe.
    pub cooldown_secs: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 30,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

/// Per-dependency breaker. All transitions happen under the mutex via
/// [`CircuitBreaker::try_acquire`] and the permit outcome calls.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Decide whether a call may proceed.
    ///
    /// `Open` circuits reject without any I/O attempt; once the
    /// cooldown has elapsed the circuit moves to `HalfOpen` and this
    /// caller becomes the probe. Calls arriving while a probe is in
    /// flight are rejected as if the circuit were open.
    ///
    /// The returned permit must be resolved with
    /// [`CallPermit::success`] or [`CallPermit::failure`]; a permit
    /// dropped unresolved (e.g. the call future was cancelled on
    /// timeout) counts as a failure, so cancellation cannot wedge the
    /// breaker.
    pub fn try_acquire(&self) -> VelaResult<CallPermit<'_>> {
        let mut inner = self.lock();
        let now = self.clock.now();

        match inner.state {
            CircuitState::Closed => Ok(self.permit(false)),
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                let elapsed = now - opened_at;
                if elapsed >= Duration::seconds(self.config.cooldown_secs) {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    info!(dependency = %self.name, "circuit half-open, probing");
                    Ok(self.permit(true))
                } else {
                    let retry_after = self.config.cooldown_secs - elapsed.num_seconds();
                    Err(VelaError::CircuitOpen {
                        dependency: self.name.clone(),
                        retry_after_secs: retry_after.max(1) as u64,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(VelaError::CircuitOpen {
                        dependency: self.name.clone(),
                        retry_after_secs: 1,
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(self.permit(true))
                }
            }
        }
    }

    fn permit(&self, probe: bool) -> CallPermit<'_> {
        CallPermit {
            breaker: self,
            probe,
            resolved: false,
        }
    }

    fn record_outcome(&self, probe: bool, success: bool) {
        let mut inner = self.lock();
        let now = self.clock.now();

        if probe {
            inner.probe_in_flight = false;
            if success {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                info!(dependency = %self.name, "circuit closed after successful probe");
            } else {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                warn!(dependency = %self.name, "probe failed, circuit re-opened");
            }
            return;
        }

        if success {
            inner.consecutive_failures = 0;
            return;
        }

        inner.consecutive_failures += 1;
        if inner.state == CircuitState::Closed
            && inner.consecutive_failures >= self.config.failure_threshold
        {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(now);
            warn!(
                dependency = %self.name,
                failures = inner.consecutive_failures,
                "circuit opened"
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Inner holds no user code; a poisoned lock only means a
        // panic mid-transition, where the stored state is still sound.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Permission for one call attempt against a dependency.
pub struct CallPermit<'b> {
    breaker: &'b CircuitBreaker,
    probe: bool,
    resolved: bool,
}

impl std::fmt::Debug for CallPermit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallPermit")
            .field("probe", &self.probe)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}

impl CallPermit<'_> {
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.record_outcome(self.probe, true);
    }

    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.record_outcome(self.probe, false);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.record_outcome(self.probe, false);
        }
    }
}

/// Shared set of breakers, one per dependency name.
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    name,
                    self.config,
                    Arc::clone(&self.clock),
                ))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use vela_core::clock::ManualClock;

    use super::*;

    fn breaker() -> (Arc<CircuitBreaker>, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        let breaker = Arc::new(CircuitBreaker::new(
            "bank_aggregator",
            BreakerConfig::default(),
            Arc::new(clock.clone()),
        ));
        (breaker, clock)
    }

    fn fail_times(breaker: &Arc<CircuitBreaker>, n: u32) {
        for _ in 0..n {
            breaker.try_acquire().unwrap().failure();
        }
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let (breaker, _clock) = breaker();
        fail_times(&breaker, 4);
        assert_eq!(breaker.state(), CircuitState::Closed);

        fail_times(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Open);

        // Rejected without any I/O attempt.
        let err = breaker.try_acquire().unwrap_err();
        assert!(matches!(err, VelaError::CircuitOpen { .. }));
    }

    #[test]
    fn success_resets_the_failure_count() {
        let (breaker, _clock) = breaker();
        fail_times(&breaker, 4);
        breaker.try_acquire().unwrap().success();
        fail_times(&breaker, 4);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn cooldown_allows_exactly_one_probe() {
        let (breaker, clock) = breaker();
        fail_times(&breaker, 5);

        clock.advance(Duration::seconds(30));
        let probe = breaker.try_acquire().unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // A second caller while the probe is in flight is rejected.
        assert!(breaker.try_acquire().is_err());

        probe.success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        // Counters reset: four fresh failures do not re-open.
        fail_times(&breaker, 4);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn failed_probe_reopens_with_fresh_cooldown() {
        let (breaker, clock) = breaker();
        fail_times(&breaker, 5);

        clock.advance(Duration::seconds(30));
        breaker.try_acquire().unwrap().failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // The cooldown restarted at the probe failure.
        clock.advance(Duration::seconds(29));
        assert!(breaker.try_acquire().is_err());
        clock.advance(Duration::seconds(1));
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn still_open_before_cooldown_elapses() {
        let (breaker, clock) = breaker();
        fail_times(&breaker, 5);

        clock.advance(Duration::seconds(29));
        let err = breaker.try_acquire().unwrap_err();
        match err {
            VelaError::CircuitOpen {
                retry_after_secs, ..
            } => assert!(retry_after_secs <= 30),
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }

    #[test]
    fn dropped_permit_counts_as_failure() {
        let (breaker, _clock) = breaker();
        for _ in 0..5 {
            // Simulates a call future cancelled by timeout.
            drop(breaker.try_acquire().unwrap());
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn registry_hands_out_one_breaker_per_dependency() {
        let registry =
            CircuitBreakerRegistry::new(BreakerConfig::default(), Arc::new(ManualClock::new(Utc::now())));
        let a = registry.breaker("gemini_api");
        let b = registry.breaker("gemini_api");
        let c = registry.breaker("customs_gateway");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
