//! Last-known balances per identity (no history).

use super::{read_document, write_document};
use crate::error::StorageError;
use chrono::Utc;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct BalanceEntry {
    pub symbol: String,
    /// Minimal-unit amount as a decimal string.
    pub raw: String,
    /// Human-decimal amount.
    pub formatted: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub address: String,
    pub updated_at: String,
    pub updated_at_local: String,
    pub tokens: BTreeMap<String, String>,
    pub raw: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct BalanceSnapshotStore {
    path: PathBuf,
    display_zone: Tz,
    write_lock: Mutex<()>,
}

impl BalanceSnapshotStore {
    pub fn new(path: impl Into<PathBuf>, display_zone: Tz) -> Self {
        Self {
            path: path.into(),
            display_zone,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn save(
        &self,
        identity: &str,
        address: &str,
        entries: &[BalanceEntry],
    ) -> Result<(), StorageError> {
        let now = Utc::now();
        let snapshot = BalanceSnapshot {
            address: address.to_string(),
            updated_at: now.to_rfc3339(),
            updated_at_local: now
                .with_timezone(&self.display_zone)
                .format("%Y-%m-%d %H:%M:%S %Z")
                .to_string(),
            tokens: entries
                .iter()
                .map(|e| (e.symbol.clone(), e.formatted.clone()))
                .collect(),
            raw: entries
                .iter()
                .map(|e| (e.symbol.clone(), e.raw.clone()))
                .collect(),
        };

        let _guard = self.write_lock.lock().await;
        let mut db: BTreeMap<String, BalanceSnapshot> = read_document(&self.path).await?;
        db.insert(identity.to_string(), snapshot);
        write_document(&self.path, &db).await
    }

    pub async fn get(&self, identity: &str) -> Result<Option<BalanceSnapshot>, StorageError> {
        let _guard = self.write_lock.lock().await;
        let db: BTreeMap<String, BalanceSnapshot> = read_document(&self.path).await?;
        Ok(db.get(identity).cloned())
    }
}
