//! License validation and administrative lifecycle.
//!
//! [`Authority::validate`] runs the binding state machine on every call:
//!
//! 1. no record → [`ValidationOutcome::Invalid`]
//! 2. unbound → conditional bind; the loser of a race continues with the
//!    winner's record
//! 3. bound to another machine → [`ValidationOutcome::MachineMismatch`]
//! 4. `now >= expires_at` → [`ValidationOutcome::Expired`]
//! 5. otherwise [`ValidationOutcome::Ok`] with the stored expiry
//!
//! Admin operations are only reachable through [`Authority::authorize`],
//! which checks the presented credential before anything else happens.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::credential::AdminSecret;
use crate::errors::{LicenseError, LicenseResult};
use crate::events::{log_license_binding_event, log_license_event, LicenseEvent};
use crate::license::{expiry_after_days, License};
use crate::store::{BindOutcome, LicenseStore};
use crate::validation::validate_identifier;

/// Result of validating a license for a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The request itself was missing or malformed.
    Error,
    /// No such license. Deliberately uninformative.
    Invalid,
    /// The license is pinned to a different machine.
    MachineMismatch,
    /// The license belongs to this machine but has run out.
    Expired,
    /// The license is valid for this machine until `expires_at`.
    Ok { expires_at: DateTime<Utc> },
}

impl ValidationOutcome {
    /// Wire status string.
    pub fn status(&self) -> &'static str {
        match self {
            ValidationOutcome::Error => "error",
            ValidationOutcome::Invalid => "invalid",
            ValidationOutcome::MachineMismatch => "machine_mismatch",
            ValidationOutcome::Expired => "expired",
            ValidationOutcome::Ok { .. } => "ok",
        }
    }
}

/// Result of issuing (or re-issuing) a license.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    InvalidKey,
    InvalidDays,
    Added { expires_at: DateTime<Utc> },
}

impl IssueOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            IssueOutcome::InvalidKey => "invalid_key",
            IssueOutcome::InvalidDays => "invalid_days",
            IssueOutcome::Added { .. } => "added",
        }
    }
}

/// Result of revoking a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Deleted,
    NotFound,
}

impl RevokeOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            RevokeOutcome::Deleted => "deleted",
            RevokeOutcome::NotFound => "not_found",
        }
    }
}

/// Outcome of presenting an admin credential.
#[derive(Debug)]
pub enum AdminAccess<'a> {
    Granted(Admin<'a>),
    Forbidden,
}

/// Validation and lifecycle service over a [`LicenseStore`].
pub struct Authority {
    store: Arc<dyn LicenseStore>,
    clock: Arc<dyn Clock>,
    admin_secret: Option<AdminSecret>,
}

impl std::fmt::Debug for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authority")
            .field("store", &self.store.backend())
            .field("admin_secret", &self.admin_secret)
            .finish()
    }
}

impl Authority {
    /// Build an authority using wall-clock time.
    ///
    /// Without an `admin_secret` every admin operation fails with a
    /// configuration error.
    pub fn new(store: Arc<dyn LicenseStore>, admin_secret: Option<AdminSecret>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            admin_secret,
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn LicenseStore> {
        &self.store
    }

    /// Decide whether `license_key` is currently valid on `machine_id`,
    /// binding it to that machine if nobody holds it yet.
    ///
    /// Store faults propagate as `Err`; every business outcome is `Ok`.
    pub async fn validate(
        &self,
        license_key: Option<&str>,
        machine_id: Option<&str>,
    ) -> LicenseResult<ValidationOutcome> {
        let fields = validate_identifier(license_key, "license_key")
            .and_then(|key| validate_identifier(machine_id, "machine_id").map(|m| (key, m)));
        let (key, machine) = match fields {
            Ok(fields) => fields,
            Err(e) => {
                debug!("Rejected validation request: {e}");
                return Ok(ValidationOutcome::Error);
            }
        };

        let Some(license) = self.store.get(key).await? else {
            log_license_event(LicenseEvent::ValidationFailed, key, Some("unknown license"));
            return Ok(ValidationOutcome::Invalid);
        };

        let license = if license.is_bound() {
            license
        } else {
            match self.store.bind_machine(key, machine).await? {
                BindOutcome::Bound(bound) => {
                    log_license_binding_event(LicenseEvent::Bound, key, machine);
                    bound
                }
                // Lost the race: judge against whoever won.
                BindOutcome::AlreadyBound(current) => current,
                BindOutcome::Missing => {
                    log_license_event(
                        LicenseEvent::ValidationFailed,
                        key,
                        Some("license removed during validation"),
                    );
                    return Ok(ValidationOutcome::Invalid);
                }
            }
        };

        if license.machine_id.as_deref() != Some(machine) {
            log_license_event(LicenseEvent::ValidationFailed, key, Some("machine mismatch"));
            return Ok(ValidationOutcome::MachineMismatch);
        }

        if license.is_expired_at(self.clock.now_utc()) {
            log_license_event(LicenseEvent::ValidationFailed, key, Some("expired"));
            return Ok(ValidationOutcome::Expired);
        }

        log_license_event(LicenseEvent::Validated, key, None);
        Ok(ValidationOutcome::Ok {
            expires_at: license.expires_at,
        })
    }

    /// Check an admin credential.
    ///
    /// A missing server secret is a configuration fault, distinct from a
    /// caller presenting the wrong credential.
    pub fn authorize(&self, credential: Option<&str>) -> LicenseResult<AdminAccess<'_>> {
        let secret = self.admin_secret.as_ref().ok_or_else(|| {
            LicenseError::ConfigError("admin secret is not configured".to_string())
        })?;

        match credential {
            Some(presented) if secret.verify(presented) => Ok(AdminAccess::Granted(Admin {
                authority: self,
            })),
            _ => {
                log_license_event(LicenseEvent::AccessDenied, "", Some("bad admin credential"));
                Ok(AdminAccess::Forbidden)
            }
        }
    }
}

/// Administrative handle, obtainable only with a valid credential.
#[derive(Debug)]
pub struct Admin<'a> {
    authority: &'a Authority,
}

impl Admin<'_> {
    /// Create or fully replace `key`, unbound, expiring `days` from now.
    pub async fn issue(&self, key: Option<&str>, days: Option<i64>) -> LicenseResult<IssueOutcome> {
        let key = match validate_identifier(key, "key") {
            Ok(key) => key,
            Err(e) => {
                debug!("Rejected issue request: {e}");
                return Ok(IssueOutcome::InvalidKey);
            }
        };

        let now = self.authority.clock.now_utc();
        let Some(expires_at) = days.and_then(|days| expiry_after_days(now, days)) else {
            debug!("Rejected issue request: days={days:?}");
            return Ok(IssueOutcome::InvalidDays);
        };

        let stored = self.authority.store.upsert(key, None, expires_at).await?;

        log_license_event(
            LicenseEvent::Issued,
            key,
            Some(&format!("expires_at={}", stored.expires_at)),
        );

        Ok(IssueOutcome::Added {
            expires_at: stored.expires_at,
        })
    }

    /// Remove `key`.
    pub async fn revoke(&self, key: &str) -> LicenseResult<RevokeOutcome> {
        if self.authority.store.delete(key).await? {
            log_license_event(LicenseEvent::Revoked, key, None);
            Ok(RevokeOutcome::Deleted)
        } else {
            warn!("Revoke requested for unknown license_key={key}");
            Ok(RevokeOutcome::NotFound)
        }
    }

    /// Every license, latest expiry first.
    pub async fn list_all(&self) -> LicenseResult<Vec<License>> {
        let licenses = self.authority.store.list().await?;
        log_license_event(
            LicenseEvent::Listed,
            "",
            Some(&format!("count={}", licenses.len())),
        );
        Ok(licenses)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeDelta;

    use super::*;
    use crate::clock::MockClock;
    use crate::store::MemoryStore;

    const SECRET: &str = "admin-secret-for-tests";

    fn setup() -> (Authority, Arc<MemoryStore>, Arc<MockClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(MockClock::from_rfc3339("2026-10-19T09:30:00Z"));
        let authority = Authority::new(store.clone(), AdminSecret::new(SECRET))
            .with_clock(clock.clone());
        (authority, store, clock)
    }

    fn admin(authority: &Authority) -> Admin<'_> {
        match authority.authorize(Some(SECRET)).unwrap() {
            AdminAccess::Granted(admin) => admin,
            AdminAccess::Forbidden => panic!("valid credential was refused"),
        }
    }

    async fn issue(authority: &Authority, key: &str, days: i64) -> DateTime<Utc> {
        match admin(authority).issue(Some(key), Some(days)).await.unwrap() {
            IssueOutcome::Added { expires_at } => expires_at,
            other => panic!("issue failed: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_fields_are_request_errors() {
        let (authority, _, _) = setup();
        issue(&authority, "KEY-1", 30).await;

        assert_eq!(
            authority.validate(None, Some("m")).await.unwrap(),
            ValidationOutcome::Error
        );
        assert_eq!(
            authority.validate(Some("KEY-1"), None).await.unwrap(),
            ValidationOutcome::Error
        );
        assert_eq!(
            authority.validate(Some(""), Some("m")).await.unwrap(),
            ValidationOutcome::Error
        );
    }

    #[tokio::test]
    async fn request_errors_never_touch_the_store() {
        let authority = Authority::new(Arc::new(FailingStore), None);
        assert_eq!(
            authority.validate(Some("KEY"), Some("")).await.unwrap(),
            ValidationOutcome::Error
        );
    }

    #[tokio::test]
    async fn unknown_key_is_invalid() {
        let (authority, _, _) = setup();
        assert_eq!(
            authority.validate(Some("NOPE"), Some("m")).await.unwrap(),
            ValidationOutcome::Invalid
        );
    }

    #[tokio::test]
    async fn first_validation_binds_and_pins() {
        let (authority, store, _) = setup();
        let expires_at = issue(&authority, "KEY-1", 30).await;

        assert_eq!(
            authority.validate(Some("KEY-1"), Some("machine-a")).await.unwrap(),
            ValidationOutcome::Ok { expires_at }
        );
        assert_eq!(
            authority.validate(Some("KEY-1"), Some("machine-b")).await.unwrap(),
            ValidationOutcome::MachineMismatch
        );
        assert_eq!(
            authority.validate(Some("KEY-1"), Some("machine-a")).await.unwrap(),
            ValidationOutcome::Ok { expires_at }
        );

        let stored = store.get("KEY-1").await.unwrap().unwrap();
        assert_eq!(stored.machine_id.as_deref(), Some("machine-a"));
    }

    #[tokio::test]
    async fn issued_expiry_is_thirty_days_out() {
        let (authority, _, clock) = setup();
        let expires_at = issue(&authority, "KEY-1", 30).await;
        assert_eq!(expires_at, clock.now_utc() + TimeDelta::days(30));
    }

    #[tokio::test]
    async fn expiry_applies_from_the_expiry_instant() {
        let (authority, _, clock) = setup();
        let expires_at = issue(&authority, "KEY-1", 1).await;

        clock.set(expires_at - TimeDelta::seconds(1));
        assert_eq!(
            authority.validate(Some("KEY-1"), Some("machine-a")).await.unwrap(),
            ValidationOutcome::Ok { expires_at }
        );

        clock.set(expires_at);
        assert_eq!(
            authority.validate(Some("KEY-1"), Some("machine-a")).await.unwrap(),
            ValidationOutcome::Expired
        );
    }

    #[tokio::test]
    async fn mismatch_is_reported_before_expiry() {
        let (authority, _, clock) = setup();
        issue(&authority, "KEY-1", 1).await;
        authority.validate(Some("KEY-1"), Some("machine-a")).await.unwrap();

        clock.advance(TimeDelta::days(5));
        assert_eq!(
            authority.validate(Some("KEY-1"), Some("machine-b")).await.unwrap(),
            ValidationOutcome::MachineMismatch
        );
        assert_eq!(
            authority.validate(Some("KEY-1"), Some("machine-a")).await.unwrap(),
            ValidationOutcome::Expired
        );
    }

    #[tokio::test]
    async fn expired_unbound_license_still_binds() {
        let (authority, store, clock) = setup();
        issue(&authority, "KEY-1", 1).await;
        clock.advance(TimeDelta::days(2));

        assert_eq!(
            authority.validate(Some("KEY-1"), Some("machine-a")).await.unwrap(),
            ValidationOutcome::Expired
        );
        let stored = store.get("KEY-1").await.unwrap().unwrap();
        assert_eq!(stored.machine_id.as_deref(), Some("machine-a"));
    }

    #[tokio::test]
    async fn reissue_frees_the_license() {
        let (authority, _, _) = setup();
        issue(&authority, "KEY-1", 30).await;
        authority.validate(Some("KEY-1"), Some("machine-a")).await.unwrap();

        let expires_at = issue(&authority, "KEY-1", 60).await;
        assert_eq!(
            authority.validate(Some("KEY-1"), Some("machine-b")).await.unwrap(),
            ValidationOutcome::Ok { expires_at }
        );
        assert_eq!(
            authority.validate(Some("KEY-1"), Some("machine-a")).await.unwrap(),
            ValidationOutcome::MachineMismatch
        );
    }

    #[tokio::test]
    async fn issue_rejects_bad_fields() {
        let (authority, store, _) = setup();
        let admin = admin(&authority);

        assert_eq!(admin.issue(None, Some(30)).await.unwrap(), IssueOutcome::InvalidKey);
        assert_eq!(admin.issue(Some(" "), Some(30)).await.unwrap(), IssueOutcome::InvalidKey);
        assert_eq!(admin.issue(Some("K"), None).await.unwrap(), IssueOutcome::InvalidDays);
        assert_eq!(admin.issue(Some("K"), Some(0)).await.unwrap(), IssueOutcome::InvalidDays);
        assert_eq!(admin.issue(Some("K"), Some(-3)).await.unwrap(), IssueOutcome::InvalidDays);
        assert_eq!(
            admin.issue(Some("K"), Some(i64::MAX)).await.unwrap(),
            IssueOutcome::InvalidDays
        );
        assert_eq!(
            admin.issue(Some("K"), Some(3_000_000)).await.unwrap(),
            IssueOutcome::InvalidDays
        );

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn revoke_removes_and_reports_not_found() {
        let (authority, _, _) = setup();
        issue(&authority, "KEY-1", 30).await;
        issue(&authority, "KEY-2", 30).await;
        let admin = admin(&authority);

        assert_eq!(admin.revoke("KEY-1").await.unwrap(), RevokeOutcome::Deleted);
        assert_eq!(
            authority.validate(Some("KEY-1"), Some("m")).await.unwrap(),
            ValidationOutcome::Invalid
        );

        assert_eq!(admin.revoke("KEY-1").await.unwrap(), RevokeOutcome::NotFound);
        assert_eq!(admin.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_all_is_latest_expiry_first() {
        let (authority, _, _) = setup();
        issue(&authority, "SHORT", 7).await;
        issue(&authority, "LONG", 365).await;
        authority.validate(Some("LONG"), Some("machine-a")).await.unwrap();

        let listed = admin(&authority).list_all().await.unwrap();
        assert_eq!(listed[0].key, "LONG");
        assert_eq!(listed[0].machine_id.as_deref(), Some("machine-a"));
        assert_eq!(listed[1].key, "SHORT");
        assert!(listed[1].machine_id.is_none());
    }

    #[tokio::test]
    async fn wrong_or_missing_credential_is_forbidden() {
        let (authority, _, _) = setup();
        assert!(matches!(
            authority.authorize(None).unwrap(),
            AdminAccess::Forbidden
        ));
        assert!(matches!(
            authority.authorize(Some("not-the-secret")).unwrap(),
            AdminAccess::Forbidden
        ));
    }

    #[tokio::test]
    async fn missing_server_secret_is_a_fault() {
        let authority = Authority::new(Arc::new(MemoryStore::new()), None);
        let err = authority.authorize(Some(SECRET)).unwrap_err();
        assert!(matches!(err, LicenseError::ConfigError(_)));
    }

    #[tokio::test]
    async fn store_faults_propagate() {
        let authority = Authority::new(Arc::new(FailingStore), AdminSecret::new(SECRET));
        let err = authority.validate(Some("KEY"), Some("m")).await.unwrap_err();
        assert!(matches!(err, LicenseError::StorageError(_)));

        let err = admin(&authority).issue(Some("KEY"), Some(3)).await.unwrap_err();
        assert!(matches!(err, LicenseError::StorageError(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_first_bind_has_exactly_one_winner() {
        let (authority, store, _) = setup();
        issue(&authority, "KEY-1", 30).await;
        let authority = Arc::new(authority);

        let mut handles = Vec::new();
        for i in 0..32 {
            let authority = Arc::clone(&authority);
            handles.push(tokio::spawn(async move {
                let machine = format!("machine-{i}");
                let outcome = authority
                    .validate(Some("KEY-1"), Some(&machine))
                    .await
                    .unwrap();
                (machine, outcome)
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            let (machine, outcome) = handle.await.unwrap();
            match outcome {
                ValidationOutcome::Ok { .. } => winners.push(machine),
                ValidationOutcome::MachineMismatch => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        assert_eq!(winners.len(), 1);
        let stored = store.get("KEY-1").await.unwrap().unwrap();
        assert_eq!(stored.machine_id.as_deref(), Some(winners[0].as_str()));
    }

    /// A store whose every call fails, for fault-propagation checks.
    struct FailingStore;

    #[async_trait]
    impl LicenseStore for FailingStore {
        async fn get(&self, _key: &str) -> LicenseResult<Option<License>> {
            Err(LicenseError::StorageError("unreachable".into()))
        }

        async fn upsert(
            &self,
            _key: &str,
            _machine_id: Option<&str>,
            _expires_at: DateTime<Utc>,
        ) -> LicenseResult<License> {
            Err(LicenseError::StorageError("unreachable".into()))
        }

        async fn bind_machine(&self, _key: &str, _machine_id: &str) -> LicenseResult<BindOutcome> {
            Err(LicenseError::StorageError("unreachable".into()))
        }

        async fn delete(&self, _key: &str) -> LicenseResult<bool> {
            Err(LicenseError::StorageError("unreachable".into()))
        }

        async fn list(&self) -> LicenseResult<Vec<License>> {
            Err(LicenseError::StorageError("unreachable".into()))
        }

        fn backend(&self) -> &'static str {
            "failing"
        }
    }
}
