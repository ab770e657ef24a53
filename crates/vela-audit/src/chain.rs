//! Hash-chain computation and the serialized append path.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::error;
use uuid::Uuid;

use vela_core::clock::Clock;
use vela_core::error::{VelaError, VelaResult};
use vela_core::models::audit::{AuditEntry, CreateAuditEntry};
use vela_core::repository::AuditLogRepository;

/// `prev_hash` of the first entry in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Canonical serialization of the hashed entry fields.
///
/// Field order and separators are part of the chain format and must
/// never change for existing logs: `seq|timestamp|actor|tenant|action|
/// resource_type|resource_id|success`, timestamp in RFC 3339 with
/// fixed microsecond precision.
pub fn canonical_serialization(entry: &AuditEntry) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}|{}|{}",
        entry.seq,
        entry
            .timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        entry.actor_id,
        entry.tenant_id,
        entry.action,
        entry.resource_type,
        entry
            .resource_id
            .map(|id| id.to_string())
            .unwrap_or_default(),
        entry.success,
    )
}

/// `SHA-256(prev_hash ‖ canonical)`, hex-encoded.
pub fn chain_hash(prev_hash: &str, canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// The append side of the audit log.
///
/// One instance per log. The mutex serializes appends and carries the
/// cached head `(seq, entry_hash)`, lazily loaded from storage on the
/// first append after process start.
pub struct AuditChain<R: AuditLogRepository> {
    repo: R,
    clock: Arc<dyn Clock>,
    head: Mutex<Option<(u64, String)>>,
}

impl<R: AuditLogRepository> AuditChain<R> {
    pub fn new(repo: R, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            clock,
            head: Mutex::new(None),
        }
    }

    /// Append one entry.
    ///
    /// Storage failures propagate to the caller: an operation that
    /// cannot be audited must not proceed, so callers fail closed by
    /// bubbling this error with `?`.
    pub async fn append(&self, input: CreateAuditEntry) -> VelaResult<AuditEntry> {
        let mut head = self.head.lock().await;

        let (seq, prev_hash) = match head.as_ref() {
            Some((seq, hash)) => (*seq, hash.clone()),
            None => match self.repo.head().await? {
                Some(entry) => (entry.seq, entry.entry_hash),
                None => (0, GENESIS_HASH.to_string()),
            },
        };

        let mut entry = AuditEntry {
            id: Uuid::new_v4(),
            seq: seq + 1,
            timestamp: self.clock.now(),
            actor_id: input.actor_id,
            tenant_id: input.tenant_id,
            action: input.action,
            resource_type: input.resource_type,
            resource_id: input.resource_id,
            success: input.success,
            prev_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = chain_hash(&entry.prev_hash, &canonical_serialization(&entry));

        self.repo.append(entry.clone()).await?;
        *head = Some((entry.seq, entry.entry_hash.clone()));

        Ok(entry)
    }

    /// Recompute hashes over `[from_seq, to_seq]` and confirm every
    /// `prev_hash` matches its predecessor's `entry_hash`.
    ///
    /// Any mismatch is tampering: logged at `error!` and surfaced as
    /// [`VelaError::AuditChainBroken`].
    pub async fn verify_chain(&self, from_seq: u64, to_seq: u64) -> VelaResult<()> {
        if from_seq == 0 || to_seq < from_seq {
            return Err(VelaError::Validation {
                message: format!("invalid verification range [{from_seq}, {to_seq}]"),
            });
        }

        // Anchor on the predecessor's stored hash, or genesis.
        let mut expected_prev = if from_seq == 1 {
            GENESIS_HASH.to_string()
        } else {
            let anchor = self.repo.range(from_seq - 1, from_seq - 1).await?;
            match anchor.into_iter().next() {
                Some(entry) => entry.entry_hash,
                None => return Err(broken(from_seq - 1)),
            }
        };

        let entries = self.repo.range(from_seq, to_seq).await?;
        let mut expected_seq = from_seq;

        for entry in &entries {
            if entry.seq != expected_seq || entry.prev_hash != expected_prev {
                return Err(broken(entry.seq));
            }
            let recomputed = chain_hash(&entry.prev_hash, &canonical_serialization(entry));
            if recomputed != entry.entry_hash {
                return Err(broken(entry.seq));
            }
            expected_prev = entry.entry_hash.clone();
            expected_seq += 1;
        }

        if expected_seq != to_seq + 1 {
            // A gap means entries were deleted.
            return Err(broken(expected_seq));
        }

        Ok(())
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }
}

fn broken(seq: u64) -> VelaError {
    error!(seq, "audit chain verification failed");
    VelaError::AuditChainBroken { seq }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use chrono::Utc;
    use vela_core::clock::SystemClock;
    use vela_core::repository::{AuditLogFilter, PaginatedResult, Pagination};

    use super::*;

    /// Minimal in-memory log for chain tests.
    #[derive(Default)]
    struct MemoryAuditLog {
        entries: StdMutex<Vec<AuditEntry>>,
    }

    impl AuditLogRepository for MemoryAuditLog {
        async fn append(&self, entry: AuditEntry) -> VelaResult<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }

        async fn head(&self) -> VelaResult<Option<AuditEntry>> {
            Ok(self.entries.lock().unwrap().last().cloned())
        }

        async fn range(&self, from_seq: u64, to_seq: u64) -> VelaResult<Vec<AuditEntry>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.seq >= from_seq && e.seq <= to_seq)
                .cloned()
                .collect())
        }

        async fn list(
            &self,
            tenant_id: Uuid,
            _filter: AuditLogFilter,
            pagination: Pagination,
        ) -> VelaResult<PaginatedResult<AuditEntry>> {
            let items: Vec<_> = self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.tenant_id == tenant_id)
                .cloned()
                .collect();
            let total = items.len() as u64;
            Ok(PaginatedResult {
                items,
                total,
                offset: pagination.offset,
                limit: pagination.limit,
            })
        }
    }

    fn entry_input(action: &str) -> CreateAuditEntry {
        CreateAuditEntry {
            actor_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            action: action.into(),
            resource_type: "session".into(),
            resource_id: Some(Uuid::new_v4()),
            success: true,
        }
    }

    fn chain() -> AuditChain<MemoryAuditLog> {
        AuditChain::new(MemoryAuditLog::default(), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn first_entry_links_to_genesis() {
        let chain = chain();
        let entry = chain.append(entry_input("login")).await.unwrap();
        assert_eq!(entry.seq, 1);
        assert_eq!(entry.prev_hash, GENESIS_HASH);
    }

    #[tokio::test]
    async fn entries_link_and_verify() {
        let chain = chain();
        for action in ["login", "token_refresh", "logout"] {
            chain.append(entry_input(action)).await.unwrap();
        }
        chain.verify_chain(1, 3).await.unwrap();
        // Partial ranges anchor on the predecessor's stored hash.
        chain.verify_chain(2, 3).await.unwrap();
    }

    #[tokio::test]
    async fn altering_a_field_breaks_the_chain() {
        let chain = chain();
        for action in ["login", "logout", "login"] {
            chain.append(entry_input(action)).await.unwrap();
        }

        chain.repo().entries.lock().unwrap()[1].action = "password_change".into();

        let err = chain.verify_chain(1, 3).await.unwrap_err();
        assert!(matches!(err, VelaError::AuditChainBroken { seq: 2 }));
    }

    #[tokio::test]
    async fn deleting_an_entry_breaks_the_chain() {
        let chain = chain();
        for action in ["login", "logout", "login"] {
            chain.append(entry_input(action)).await.unwrap();
        }

        chain.repo().entries.lock().unwrap().remove(1);

        assert!(chain.verify_chain(1, 3).await.is_err());
    }

    #[tokio::test]
    async fn head_is_reloaded_from_storage() {
        let repo = MemoryAuditLog::default();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let first = AuditChain::new(repo, clock.clone());
        first.append(entry_input("login")).await.unwrap();
        let entries = std::mem::take(&mut *first.repo().entries.lock().unwrap());

        // A fresh chain instance over the same storage continues the
        // sequence instead of restarting at genesis.
        let restarted = AuditChain::new(MemoryAuditLog::default(), clock);
        *restarted.repo().entries.lock().unwrap() = entries;
        let next = restarted.append(entry_input("logout")).await.unwrap();
        assert_eq!(next.seq, 2);
        restarted.verify_chain(1, 2).await.unwrap();
    }

    #[test]
    fn canonical_serialization_is_stable() {
        let ts = Utc::now();
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            seq: 7,
            timestamp: ts,
            actor_id: Uuid::nil(),
            tenant_id: Uuid::nil(),
            action: "login".into(),
            resource_type: "account".into(),
            resource_id: None,
            success: false,
            prev_hash: GENESIS_HASH.into(),
            entry_hash: String::new(),
        };
        let a = canonical_serialization(&entry);
        let b = canonical_serialization(&entry);
        assert_eq!(a, b);
        assert!(a.starts_with("7|"));
        assert!(a.ends_with("|false"));
    }
}
