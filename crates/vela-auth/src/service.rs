//! Authentication service — login, validation, refresh rotation, and
//! revocation orchestration.

use std::sync::Arc;

use chrono::Duration;
use tracing::warn;
use uuid::Uuid;

use vela_audit::AuditChain;
use vela_core::clock::Clock;
use vela_core::error::{VelaError, VelaResult};
use vela_core::models::audit::CreateAuditEntry;
use vela_core::models::blacklist::{BlacklistEntry, BlacklistReason};
use vela_core::models::lockout::AttemptKey;
use vela_core::models::principal::{AccountStatus, Principal};
use vela_core::models::session::{CreateSession, RevokeReason, Session, SessionInfo, SessionState};
use vela_core::repository::{
    AccountRepository, AuditLogRepository, BlacklistRepository, FailedLoginRepository,
    SessionRepository,
};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::lockout::LockoutGuard;
use crate::password;
use crate::token;

/// Input for the login flow.
#[derive(Debug)]
pub struct LoginInput {
    pub tenant_id: Uuid,
    pub email: String,
    pub password: String,
    pub ip_address: String,
    pub user_agent: String,
}

/// Input for the refresh token rotation flow.
#[derive(Debug)]
pub struct RefreshInput {
    pub tenant_id: Uuid,
    pub raw_refresh_token: String,
    pub ip_address: String,
    pub user_agent: String,
}

/// A freshly issued access/refresh token pair.
#[derive(Debug)]
pub struct CredentialPair {
    /// Signed JWT access token.
    pub access_token: String,
    /// Raw opaque refresh token (returned to the client, never stored).
    pub refresh_token: String,
    /// Session backing the refresh token.
    pub session_id: Uuid,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Which sessions a revocation targets.
#[derive(Debug, Clone, Copy)]
pub enum SessionSelector {
    /// Logout of a single device.
    One(Uuid),
    /// "Logout everywhere else" — spares the caller's session.
    AllExceptCurrent(Uuid),
    /// Logout everywhere.
    All,
}

/// Token lifecycle manager.
///
/// Generic over repository implementations so the auth layer has no
/// dependency on the database crate. The audit chain is shared: every
/// sensitive operation here writes exactly one entry and fails closed
/// if the entry cannot be written.
pub struct AuthService<A, S, B, F, L>
where
    A: AccountRepository,
    S: SessionRepository,
    B: BlacklistRepository,
    F: FailedLoginRepository,
    L: AuditLogRepository,
{
    accounts: A,
    sessions: S,
    blacklist: B,
    lockouts: LockoutGuard<F>,
    audit: Arc<AuditChain<L>>,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl<A, S, B, F, L> AuthService<A, S, B, F, L>
where
    A: AccountRepository,
    S: SessionRepository,
    B: BlacklistRepository,
    F: FailedLoginRepository,
    L: AuditLogRepository,
{
    pub fn new(
        accounts: A,
        sessions: S,
        blacklist: B,
        failed_logins: F,
        audit: Arc<AuditChain<L>>,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
    ) -> Self {
        let lockouts = LockoutGuard::new(
            failed_logins,
            Arc::clone(&clock),
            config.attempt_window_secs,
            config.lockout_duration_secs,
        );
        Self {
            accounts,
            sessions,
            blacklist,
            lockouts,
            audit,
            clock,
            config,
        }
    }

    /// Authenticate with email + password and issue a credential pair.
    pub async fn login(&self, input: LoginInput) -> VelaResult<CredentialPair> {
        let identity_key = AttemptKey::Identity(input.email.clone());
        let ip_key = AttemptKey::Ip(input.ip_address.clone());

        // 1. Active lockouts fail fast, before any credential work.
        self.lockouts.check(&identity_key).await?;
        self.lockouts.check(&ip_key).await?;

        // 2. Look up the account. Unknown identities burn the same
        //    failure path as bad passwords — no enumeration.
        let account = match self
            .accounts
            .get_by_email(input.tenant_id, &input.email)
            .await
        {
            Ok(account) => account,
            Err(VelaError::NotFound { .. }) => {
                return Err(self
                    .record_login_failure(input.tenant_id, None, &identity_key, &ip_key)
                    .await?);
            }
            Err(e) => return Err(e),
        };

        // 3. Verify the password.
        let valid = password::verify_password(
            &input.password,
            &account.password_hash,
            self.config.pepper.as_deref(),
        )?;
        if !valid {
            return Err(self
                .record_login_failure(input.tenant_id, Some(account.id), &identity_key, &ip_key)
                .await?);
        }

        // 4. Suspended accounts hold valid passwords but no access.
        if account.status != AccountStatus::Active {
            return Err(AuthError::Revoked.into());
        }

        // 5. Success resets both counters.
        self.lockouts.clear(&identity_key).await?;
        self.lockouts.clear(&ip_key).await?;

        // 6. One session per device: a login from a device with an
        //    active session replaces it.
        let fingerprint = token::device_fingerprint(&input.ip_address, &input.user_agent);
        if let Some(old) = self
            .sessions
            .find_active_by_fingerprint(input.tenant_id, account.id, &fingerprint)
            .await?
        {
            self.sessions
                .revoke(input.tenant_id, old.id, RevokeReason::Replaced)
                .await?;
            self.blacklist_session(&old, BlacklistReason::Rotated).await?;
        }

        // 7. Create the session and issue the pair.
        let pair = self
            .issue_pair(&account, fingerprint, input.ip_address, input.user_agent)
            .await?;

        // 8. Audited exit — the login fails closed if the entry
        //    cannot be written.
        self.audit_entry(account.id, account.tenant_id, "login", "account", Some(account.id), true)
            .await?;

        Ok(pair)
    }

    /// Verify an access token and produce the request [`Principal`].
    pub async fn validate(&self, access_token: &str) -> VelaResult<Principal> {
        self.validate_session(access_token)
            .await
            .map(|(principal, _)| principal)
    }

    /// Like [`validate`](Self::validate), but also returns the session
    /// the token was issued under — the device-management endpoints
    /// need it to tell "this device" from the others.
    pub async fn validate_session(&self, access_token: &str) -> VelaResult<(Principal, Uuid)> {
        // 1. Signature, expiry, issuer, token kind — stateless.
        let claims = token::decode_access_token(access_token, &self.config)?;

        // 2. Blacklist membership by token hash.
        if self
            .blacklist
            .contains(&token::hash_token(access_token))
            .await?
        {
            return Err(AuthError::Revoked.into());
        }

        let tenant_id = parse_claim_uuid(&claims.tenant_id)?;
        let account_id = parse_claim_uuid(&claims.sub)?;

        // 3. The account must still exist, be active, and be on the
        //    same token_version the token was issued under.
        let account = self
            .accounts
            .get_by_id(tenant_id, account_id)
            .await
            .map_err(|e| match e {
                VelaError::NotFound { .. } => AuthError::Revoked.into(),
                other => other,
            })?;

        if account.token_version != claims.ver || account.status != AccountStatus::Active {
            return Err(AuthError::Revoked.into());
        }

        let session_id = parse_claim_uuid(&claims.sid)?;

        Ok((
            Principal {
                id: account.id,
                tenant_id: account.tenant_id,
                role: account.role,
                email: account.email,
            },
            session_id,
        ))
    }

    /// Rotate a refresh token: consume the old one, issue a new pair.
    ///
    /// Each refresh token is single-use. A token presented *after* it
    /// was rotated is treated as stolen: every session of the account
    /// is revoked and the event is written to the audit log.
    pub async fn refresh(&self, input: RefreshInput) -> VelaResult<CredentialPair> {
        let now = self.clock.now();
        let presented_hash = token::hash_token(&input.raw_refresh_token);

        // 1. Look up the session in any state — a hit on a superseded
        //    session is the theft signal, not a miss.
        let session = match self
            .sessions
            .get_by_token_hash(input.tenant_id, &presented_hash)
            .await
        {
            Ok(session) => session,
            Err(VelaError::NotFound { .. }) => return Err(AuthError::InvalidRefresh.into()),
            Err(e) => return Err(e),
        };

        match session.state {
            SessionState::Superseded => return Err(self.respond_to_reuse(&session).await?),
            SessionState::Revoked => return Err(AuthError::InvalidRefresh.into()),
            SessionState::Active => {}
        }

        if session.expires_at <= now {
            self.sessions
                .revoke(input.tenant_id, session.id, RevokeReason::Expired)
                .await?;
            return Err(AuthError::InvalidRefresh.into());
        }

        let account = self
            .accounts
            .get_by_id(input.tenant_id, session.account_id)
            .await?;
        if account.status != AccountStatus::Active {
            return Err(AuthError::Revoked.into());
        }

        // 2. Consume the old session. The conditional
        //    Active -> Superseded transition makes a concurrent double
        //    rotation lose; the loser took someone's rotated token.
        self.sessions
            .touch(input.tenant_id, session.id, now)
            .await?;
        match self.sessions.mark_superseded(input.tenant_id, session.id).await {
            Ok(()) => {}
            Err(VelaError::Conflict { .. }) => {
                return Err(self.respond_to_reuse(&session).await?);
            }
            Err(e) => return Err(e),
        }

        // 3. The consumed token must never validate again.
        self.blacklist
            .insert(BlacklistEntry {
                token_hash: presented_hash,
                reason: BlacklistReason::Rotated,
                expires_at: session.expires_at,
            })
            .await?;

        // 4. New session for the same device, fresh expiry.
        let fingerprint = token::device_fingerprint(&input.ip_address, &input.user_agent);
        let pair = self
            .issue_pair(&account, fingerprint, input.ip_address, input.user_agent)
            .await?;

        // 5. Audited exit.
        self.audit_entry(
            account.id,
            account.tenant_id,
            "token_refresh",
            "session",
            Some(pair.session_id),
            true,
        )
        .await?;

        Ok(pair)
    }

    /// Logout of the current device.
    ///
    /// Revokes the session and additionally blacklists the presented
    /// access token, so it stops validating now rather than at its
    /// natural expiry.
    pub async fn logout(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        session_id: Uuid,
        access_token: &str,
    ) -> VelaResult<u64> {
        if let Ok(claims) = token::decode_access_token(access_token, &self.config) {
            let expires_at = chrono::DateTime::from_timestamp(claims.exp, 0)
                .unwrap_or_else(|| self.clock.now());
            self.blacklist
                .insert(BlacklistEntry {
                    token_hash: token::hash_token(access_token),
                    reason: BlacklistReason::Logout,
                    expires_at,
                })
                .await?;
        }
        self.revoke(tenant_id, account_id, SessionSelector::One(session_id))
            .await
    }

    /// Revoke session(s) and blacklist their outstanding refresh
    /// tokens. Used by logout, logout-all-devices, and internally by
    /// password change.
    pub async fn revoke(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        selector: SessionSelector,
    ) -> VelaResult<u64> {
        match selector {
            SessionSelector::One(session_id) => {
                let session = self.sessions.get_by_id(tenant_id, session_id).await?;
                // Hide other accounts' sessions the same way other
                // tenants' resources are hidden.
                if session.account_id != account_id {
                    return Err(VelaError::NotFound {
                        entity: "session".into(),
                        id: session_id.to_string(),
                    });
                }
                self.sessions
                    .revoke(tenant_id, session_id, RevokeReason::Logout)
                    .await?;
                self.blacklist_session(&session, BlacklistReason::Logout)
                    .await?;
                self.audit_entry(account_id, tenant_id, "logout", "session", Some(session_id), true)
                    .await?;
                Ok(1)
            }
            SessionSelector::AllExceptCurrent(current) => {
                self.revoke_many(tenant_id, account_id, Some(current)).await
            }
            SessionSelector::All => self.revoke_many(tenant_id, account_id, None).await,
        }
    }

    /// Verify the current password, store a new hash, and invalidate
    /// every outstanding credential.
    ///
    /// Bumping the account's `token_version` rejects all previously
    /// issued access tokens immediately — not just the refresh tokens.
    pub async fn change_password(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> VelaResult<()> {
        if new_password.len() < self.config.min_password_length {
            return Err(VelaError::Validation {
                message: format!(
                    "password must be at least {} characters",
                    self.config.min_password_length
                ),
            });
        }

        let account = self.accounts.get_by_id(tenant_id, account_id).await?;
        let valid = password::verify_password(
            current_password,
            &account.password_hash,
            self.config.pepper.as_deref(),
        )?;
        if !valid {
            return Err(AuthError::InvalidCredentials {
                remaining_attempts: None,
            }
            .into());
        }

        let new_hash = password::hash_password(new_password, self.config.pepper.as_deref())?;
        self.accounts
            .update_password(tenant_id, account_id, new_hash)
            .await?;

        let revoked = self
            .sessions
            .revoke_all(tenant_id, account_id, RevokeReason::PasswordChange, None)
            .await?;
        for session in &revoked {
            self.blacklist_session(session, BlacklistReason::PasswordChange)
                .await?;
        }

        self.audit_entry(
            account_id,
            tenant_id,
            "password_change",
            "account",
            Some(account_id),
            true,
        )
        .await?;

        Ok(())
    }

    /// Active sessions of an account, for the device-management
    /// endpoints.
    pub async fn list_sessions(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        current_session: Uuid,
    ) -> VelaResult<Vec<SessionInfo>> {
        let sessions = self.sessions.list_active(tenant_id, account_id).await?;
        Ok(sessions
            .into_iter()
            .map(|s| SessionInfo {
                id: s.id,
                ip_address: s.ip_address,
                user_agent: s.user_agent,
                created_at: s.created_at,
                last_used_at: s.last_used_at,
                current: s.id == current_session,
            })
            .collect())
    }

    /// Maintenance sweep: drop expired sessions and blacklist entries.
    pub async fn purge_expired(&self, tenant_id: Uuid) -> VelaResult<(u64, u64)> {
        let sessions = self.sessions.cleanup_expired(tenant_id).await?;
        let blacklisted = self.blacklist.purge_expired().await?;
        Ok((sessions, blacklisted))
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    async fn issue_pair(
        &self,
        account: &vela_core::models::principal::Account,
        device_fingerprint: String,
        ip_address: String,
        user_agent: String,
    ) -> VelaResult<CredentialPair> {
        let now = self.clock.now();
        let raw_refresh = token::generate_refresh_token();
        let token_hash = token::hash_token(&raw_refresh);
        let expires_at =
            now + Duration::seconds(self.config.refresh_token_lifetime_secs as i64);

        let session = self
            .sessions
            .create(CreateSession {
                tenant_id: account.tenant_id,
                account_id: account.id,
                token_hash,
                device_fingerprint,
                ip_address,
                user_agent,
                expires_at,
            })
            .await?;

        let access_token = token::issue_access_token(account, session.id, now, &self.config)?;

        Ok(CredentialPair {
            access_token,
            refresh_token: raw_refresh,
            session_id: session.id,
            expires_in: self.config.access_token_lifetime_secs,
        })
    }

    /// Count the failure, audit it, and produce the caller-facing
    /// error. Returned as a value so call sites read
    /// `return Err(self.record_login_failure(..).await?)`.
    async fn record_login_failure(
        &self,
        tenant_id: Uuid,
        account_id: Option<Uuid>,
        identity_key: &AttemptKey,
        ip_key: &AttemptKey,
    ) -> VelaResult<VelaError> {
        let remaining = self
            .lockouts
            .record_failure(identity_key, self.config.identity_lockout_threshold)
            .await?;
        self.lockouts
            .record_failure(ip_key, self.config.ip_lockout_threshold)
            .await?;

        self.audit_entry(
            account_id.unwrap_or_else(Uuid::nil),
            tenant_id,
            "login",
            "account",
            account_id,
            false,
        )
        .await?;

        Ok(AuthError::InvalidCredentials {
            remaining_attempts: Some(remaining),
        }
        .into())
    }

    /// Theft response: a rotated refresh token came back. Revoke every
    /// session of the account, blacklist their refresh tokens, and
    /// record the event.
    async fn respond_to_reuse(&self, session: &Session) -> VelaResult<VelaError> {
        warn!(
            account_id = %session.account_id,
            session_id = %session.id,
            "rotated refresh token presented again; revoking all sessions"
        );

        let revoked = self
            .sessions
            .revoke_all(
                session.tenant_id,
                session.account_id,
                RevokeReason::TheftSuspected,
                None,
            )
            .await?;
        for s in &revoked {
            self.blacklist_session(s, BlacklistReason::TheftSuspected)
                .await?;
        }

        self.audit_entry(
            session.account_id,
            session.tenant_id,
            "token_reuse_detected",
            "session",
            Some(session.id),
            false,
        )
        .await?;

        Ok(AuthError::InvalidRefresh.into())
    }

    async fn blacklist_session(
        &self,
        session: &Session,
        reason: BlacklistReason,
    ) -> VelaResult<()> {
        self.blacklist
            .insert(BlacklistEntry {
                token_hash: session.token_hash.clone(),
                reason,
                expires_at: session.expires_at,
            })
            .await
    }

    async fn revoke_many(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        except: Option<Uuid>,
    ) -> VelaResult<u64> {
        let revoked = self
            .sessions
            .revoke_all(tenant_id, account_id, RevokeReason::LogoutAll, except)
            .await?;
        for session in &revoked {
            self.blacklist_session(session, BlacklistReason::LogoutAll)
                .await?;
        }
        self.audit_entry(account_id, tenant_id, "logout_all", "account", Some(account_id), true)
            .await?;
        Ok(revoked.len() as u64)
    }

    async fn audit_entry(
        &self,
        actor_id: Uuid,
        tenant_id: Uuid,
        action: &str,
        resource_type: &str,
        resource_id: Option<Uuid>,
        success: bool,
    ) -> VelaResult<()> {
        self.audit
            .append(CreateAuditEntry {
                actor_id,
                tenant_id,
                action: action.into(),
                resource_type: resource_type.into(),
                resource_id,
                success,
            })
            .await?;
        Ok(())
    }
}

fn parse_claim_uuid(value: &str) -> VelaResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| AuthError::Invalid("malformed claim".into()).into())
}
