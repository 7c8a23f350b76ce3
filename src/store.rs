//! Durable storage of license records.
//!
//! Implementations:
//! - `server::database::Database` → SQLite / PostgreSQL via sqlx (requires `server`)
//! - [`memory::MemoryStore`] → in-process map, for tests
//!
//! Every operation applies fully or fails; nothing is buffered.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::{LicenseError, LicenseResult};
use crate::license::License;

pub mod memory;

pub use memory::MemoryStore;

/// How many times a conditional bind is retried when the record keeps
/// flipping back to unbound under it (concurrent re-issue).
pub const BIND_ATTEMPTS: usize = 3;

/// Result of a conditional first-bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// This call set the machine; carries the record as written.
    Bound(License),
    /// Another machine was already recorded; carries the current record.
    AlreadyBound(License),
    /// The record does not exist (never issued, or revoked meanwhile).
    Missing,
}

#[async_trait]
pub trait LicenseStore: Send + Sync {
    /// Fetch a license by key.
    async fn get(&self, key: &str) -> LicenseResult<Option<License>>;

    /// Insert a license or replace it wholesale, binding included.
    async fn upsert(
        &self,
        key: &str,
        machine_id: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> LicenseResult<License>;

    /// Set `machine_id` only if the record is currently unbound.
    ///
    /// This is a single atomic conditional write; at most one of several
    /// concurrent callers gets [`BindOutcome::Bound`].
    async fn bind_machine(&self, key: &str, machine_id: &str) -> LicenseResult<BindOutcome>;

    /// Remove a license. `Ok(false)` means there was nothing to remove.
    async fn delete(&self, key: &str) -> LicenseResult<bool>;

    /// All licenses, latest `expires_at` first.
    async fn list(&self) -> LicenseResult<Vec<License>>;

    /// Connectivity probe for health reporting.
    async fn ping(&self) -> LicenseResult<()> {
        Ok(())
    }

    /// Short backend name for diagnostics.
    fn backend(&self) -> &'static str;
}

/// Drive a conditional first-bind to a settled [`BindOutcome`].
///
/// `bind` performs the conditional write and yields the record only when it
/// claimed it. On a miss, `reread` decides: gone → `Missing`, bound →
/// `AlreadyBound`. A record found unbound again was re-issued under us, so
/// the write is retried, up to [`BIND_ATTEMPTS`] times.
pub async fn settle_bind<B, BF, R, RF>(
    key: &str,
    mut bind: B,
    mut reread: R,
) -> LicenseResult<BindOutcome>
where
    B: FnMut() -> BF,
    BF: Future<Output = LicenseResult<Option<License>>>,
    R: FnMut() -> RF,
    RF: Future<Output = LicenseResult<Option<License>>>,
{
    for _ in 0..BIND_ATTEMPTS {
        if let Some(bound) = bind().await? {
            return Ok(BindOutcome::Bound(bound));
        }

        match reread().await? {
            None => return Ok(BindOutcome::Missing),
            Some(current) if current.is_bound() => return Ok(BindOutcome::AlreadyBound(current)),
            Some(_) => debug!("license_key={key} unbound again after a lost bind, retrying"),
        }
    }

    Err(LicenseError::StorageError(format!(
        "could not settle binding for license_key={key} after {BIND_ATTEMPTS} attempts"
    )))
}
