//! Resilient client — the single path for outbound calls to external
//! dependencies (bank aggregator, customs gateway, AI provider).
//!
//! Policies compose in a fixed order: hard timeout around each
//! attempt, circuit breaker per dependency, then retry with backoff
//! for transient failures only. The client never deduplicates side
//! effects across retries; idempotency is the call site's concern.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use vela_core::error::VelaError;

use crate::breaker::CircuitBreakerRegistry;
use crate::retry::RetryPolicy;

/// Failure reported by an upstream call.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("call timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("upstream returned status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl UpstreamError {
    /// Transient failures are worth retrying: timeouts, connection
    /// errors, and 5xx. 4xx application errors are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Timeout { .. } | UpstreamError::Connection(_) => true,
            UpstreamError::Status { code, .. } => *code >= 500,
            UpstreamError::Protocol(_) => false,
        }
    }
}

/// What a resilient call can fail with, after policies are exhausted.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("circuit open for {dependency}, retry in {retry_after_secs}s")]
    CircuitOpen {
        dependency: String,
        retry_after_secs: u64,
    },

    #[error("{dependency} failed after {attempts} attempt(s): {source}")]
    Upstream {
        dependency: String,
        attempts: u32,
        #[source]
        source: UpstreamError,
    },
}

impl From<CallError> for VelaError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::CircuitOpen {
                dependency,
                retry_after_secs,
            } => VelaError::CircuitOpen {
                dependency,
                retry_after_secs,
            },
            other @ CallError::Upstream { .. } => VelaError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// Hard cap on each individual attempt.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
        }
    }
}

/// Wraps every outbound call with timeout, circuit breaking, and
/// retry. One instance is shared across requests; breaker state lives
/// in the injected registry.
pub struct ResilientClient {
    breakers: Arc<CircuitBreakerRegistry>,
    config: ClientConfig,
}

impl ResilientClient {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>, config: ClientConfig) -> Self {
        Self { breakers, config }
    }

    /// Run `op` against `dependency` under the composed policies.
    ///
    /// `op` is invoked once per attempt. A timeout counts as a failure
    /// for circuit-breaking purposes; a non-transient upstream error
    /// returns immediately without retrying (the dependency responded,
    /// so it does not count against the circuit either).
    pub async fn call<T, F, Fut>(&self, dependency: &str, mut op: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let breaker = self.breakers.breaker(dependency);
        let mut attempt = 1u32;

        loop {
            let permit = breaker.try_acquire().map_err(|err| match err {
                VelaError::CircuitOpen {
                    dependency,
                    retry_after_secs,
                } => CallError::CircuitOpen {
                    dependency,
                    retry_after_secs,
                },
                other => CallError::Upstream {
                    dependency: dependency.to_string(),
                    attempts: attempt,
                    source: UpstreamError::Protocol(other.to_string()),
                },
            })?;

            let failure = match tokio::time::timeout(self.config.timeout, op()).await {
                Ok(Ok(value)) => {
                    permit.success();
                    return Ok(value);
                }
                Ok(Err(err)) => {
                    if err.is_transient() {
                        permit.failure();
                    } else {
                        // The dependency answered; the request itself
                        // was bad. Not a liveness signal.
                        permit.success();
                        return Err(CallError::Upstream {
                            dependency: dependency.to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    err
                }
                Err(_) => {
                    permit.failure();
                    UpstreamError::Timeout {
                        after: self.config.timeout,
                    }
                }
            };

            if attempt >= self.config.retry.max_attempts {
                return Err(CallError::Upstream {
                    dependency: dependency.to_string(),
                    attempts: attempt,
                    source: failure,
                });
            }

            let backoff = self.config.retry.backoff(attempt);
            warn!(
                dependency,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %failure,
                "transient upstream failure, retrying"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use vela_core::clock::{ManualClock, SystemClock};

    use super::*;
    use crate::breaker::{BreakerConfig, CircuitState};

    fn client() -> ResilientClient {
        ResilientClient::new(
            Arc::new(CircuitBreakerRegistry::new(
                BreakerConfig::default(),
                Arc::new(SystemClock),
            )),
            ClientConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_up_to_max_attempts() {
        let client = client();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = client
            .call("bank_aggregator", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(UpstreamError::Status {
                        code: 503,
                        message: "unavailable".into(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            CallError::Upstream { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn application_errors_are_never_retried() {
        let client = client();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = client
            .call("customs_gateway", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(UpstreamError::Status {
                        code: 422,
                        message: "bad declaration".into(),
                    })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.unwrap_err(),
            CallError::Upstream { attempts: 1, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn later_attempt_can_succeed() {
        let client = client();
        let calls = AtomicU32::new(0);

        let value = client
            .call("bank_aggregator", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(UpstreamError::Connection("reset".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure_and_opens_the_circuit() {
        let clock = ManualClock::new(chrono::Utc::now());
        let registry = Arc::new(CircuitBreakerRegistry::new(
            BreakerConfig::default(),
            Arc::new(clock.clone()),
        ));
        let client = ResilientClient::new(
            Arc::clone(&registry),
            ClientConfig {
                timeout: Duration::from_millis(100),
                ..ClientConfig::default()
            },
        );

        // Each call makes 3 timed-out attempts; two calls reach the
        // threshold of 5 consecutive failures.
        for _ in 0..2 {
            let result: Result<(), _> = client
                .call("gemini_api", || async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                })
                .await;
            assert!(result.is_err());
        }

        assert_eq!(
            registry.breaker("gemini_api").state(),
            CircuitState::Open
        );

        // Rejected immediately, no I/O attempt.
        let calls = AtomicU32::new(0);
        let rejected: Result<(), _> = client
            .call("gemini_api", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(
            rejected.unwrap_err(),
            CallError::CircuitOpen { .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
