//! Authentication configuration.

/// Configuration for the token lifecycle manager.
///
/// The Ed25519 key pair is the process-wide signing material; rotate
/// it by restarting with new PEMs (outstanding access tokens age out
/// within 15 minutes).
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// PEM-encoded Ed25519 private key for JWT signing.
    pub jwt_private_key_pem: String,
    /// PEM-encoded Ed25519 public key for JWT verification.
    pub jwt_public_key_pem: String,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
    /// Refresh token lifetime in seconds (default: 2_592_000 = 30 days).
    pub refresh_token_lifetime_secs: u64,
    /// Optional pepper prepended to passwords before Argon2id hashing.
    pub pepper: Option<String>,
    /// Minimum password length for policy enforcement.
    pub min_password_length: usize,
    /// Failed logins per identity before lockout (default: 5).
    pub identity_lockout_threshold: u32,
    /// Failed logins per source IP before lockout (default: 10).
    pub ip_lockout_threshold: u32,
    /// Rolling window over which failures are counted, in seconds
    /// (default: 900 = 15 minutes).
    pub attempt_window_secs: u64,
    /// Lockout duration in seconds (default: 900 = 15 minutes).
    pub lockout_duration_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_private_key_pem: String::new(),
            jwt_public_key_pem: String::new(),
            jwt_issuer: "vela".into(),
            access_token_lifetime_secs: 900,
            refresh_token_lifetime_secs: 2_592_000,
            pepper: None,
            min_password_length: 12,
            identity_lockout_threshold: 5,
            ip_lockout_threshold: 10,
            attempt_window_secs: 900,
            lockout_duration_secs: 900,
        }
    }
}
