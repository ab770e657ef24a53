//! VELA Server — request gate and sensitive-route handlers.
//!
//! Every sensitive route runs the same pipeline: rate limiter →
//! token validation → ownership guard → business handler → (outbound
//! calls via the resilient client) → audit entry on exit. The REST
//! surface itself is provided by the platform layer; this crate
//! exposes the pipeline pieces it mounts.

pub mod config;
pub mod gate;
pub mod handlers;
