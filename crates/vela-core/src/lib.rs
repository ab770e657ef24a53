//! VELA Core — domain models, repository contracts, and the shared
//! error taxonomy of the trust & resilience core.
//!
//! Everything here is I/O-free: storage implementations live in
//! `vela-db`, policy enforcement in `vela-auth`, `vela-audit` and
//! `vela-resilience`.

pub mod clock;
pub mod error;
pub mod guard;
pub mod models;
pub mod repository;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{VelaError, VelaResult};
pub use models::principal::Principal;
