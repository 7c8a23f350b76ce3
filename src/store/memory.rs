use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::{LicenseError, LicenseResult};
use crate::license::License;
use crate::store::{BindOutcome, LicenseStore};

/// In-memory license store.
///
/// Meant as a test double: nothing survives the process. The bind is a
/// compare-and-set under the write lock, so it honours the same contract as
/// the SQL store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    licenses: RwLock<HashMap<String, License>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> LicenseError {
    LicenseError::StorageError("memory store lock poisoned".into())
}

#[async_trait]
impl LicenseStore for MemoryStore {
    async fn get(&self, key: &str) -> LicenseResult<Option<License>> {
        let licenses = self.licenses.read().map_err(|_| poisoned())?;
        Ok(licenses.get(key).cloned())
    }

    async fn upsert(
        &self,
        key: &str,
        machine_id: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> LicenseResult<License> {
        let license = License {
            key: key.to_string(),
            machine_id: machine_id.map(String::from),
            expires_at,
        };

        let mut licenses = self.licenses.write().map_err(|_| poisoned())?;
        licenses.insert(key.to_string(), license.clone());
        Ok(license)
    }

    async fn bind_machine(&self, key: &str, machine_id: &str) -> LicenseResult<BindOutcome> {
        let mut licenses = self.licenses.write().map_err(|_| poisoned())?;

        let outcome = match licenses.get_mut(key) {
            None => BindOutcome::Missing,
            Some(license) if license.machine_id.is_some() => {
                BindOutcome::AlreadyBound(license.clone())
            }
            Some(license) => {
                license.machine_id = Some(machine_id.to_string());
                BindOutcome::Bound(license.clone())
            }
        };

        Ok(outcome)
    }

    async fn delete(&self, key: &str) -> LicenseResult<bool> {
        let mut licenses = self.licenses.write().map_err(|_| poisoned())?;
        Ok(licenses.remove(key).is_some())
    }

    async fn list(&self) -> LicenseResult<Vec<License>> {
        let licenses = self.licenses.read().map_err(|_| poisoned())?;
        let mut all: Vec<License> = licenses.values().cloned().collect();
        all.sort_by(|a, b| b.expires_at.cmp(&a.expires_at).then_with(|| a.key.cmp(&b.key)));
        Ok(all)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
