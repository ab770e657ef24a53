//! VELA Audit — hash-chained, append-only audit log.
//!
//! Every sensitive operation (login, logout, failed login, password
//! change, token refresh, token-reuse detection, PII-unmasking reads,
//! OFAC/credit lookups, consent updates, versioned mutations) produces
//! exactly one entry. Each entry's hash covers the previous entry's
//! hash, so altering any historical field is detectable by
//! [`AuditChain::verify_chain`].
//!
//! Appends are the one place in the core where true serialization is
//! mandatory: the chain holds an async mutex around the cached head so
//! concurrent appends line up into a single hash chain.

mod chain;

pub use chain::{AuditChain, GENESIS_HASH, canonical_serialization, chain_hash};
