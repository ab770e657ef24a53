//! VELA Resilience — shielding the system and its downstream
//! dependencies from overload.
//!
//! Three building blocks, composed by [`client::ResilientClient`] in a
//! fixed order: hard timeout, then circuit breaker, then retry with
//! capped exponential backoff. The rate limiter guards the inbound
//! side of the same problem.
//!
//! All state is explicitly injected and shared (`Arc`), never hidden
//! process-global singletons; the counter store behind the rate
//! limiter is a trait so a distributed store can replace the
//! in-process one when scaling beyond one instance.

pub mod breaker;
pub mod client;
pub mod rate_limit;
pub mod retry;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use client::{CallError, ClientConfig, ResilientClient, UpstreamError};
pub use rate_limit::{CounterStore, Decision, InMemoryCounterStore, LimitRule, RateLimiter, RouteClass};
pub use retry::RetryPolicy;
