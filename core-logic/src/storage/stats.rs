//! Durable per-identity swap quotas and counters.

use super::{read_document, write_document};
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// `{ "total": n, "<router>": n, ... }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    #[serde(default)]
    pub total: u64,
    #[serde(flatten)]
    pub per_router: BTreeMap<String, u64>,
}

impl Counters {
    pub fn get(&self, router: &str) -> u64 {
        self.per_router.get(router).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub last_updated_at: DateTime<Utc>,
    #[serde(default)]
    pub swaps: Counters,
    /// Reserved, nothing adds liquidity yet.
    #[serde(default)]
    pub liquidity_adds: Counters,
    #[serde(default)]
    pub transfers: u64,
    #[serde(default)]
    pub targets: BTreeMap<String, u64>,
}

impl Default for AccountRecord {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AccountRecord {
    fn new(address: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            address,
            created_at: now,
            last_updated_at: now,
            swaps: Counters::default(),
            liquidity_adds: Counters::default(),
            transfers: 0,
            targets: BTreeMap::new(),
        }
    }

    fn touch(&mut self) {
        self.last_updated_at = Utc::now();
    }

    pub fn target(&self, router: &str) -> u64 {
        self.targets.get(router).copied().unwrap_or(0)
    }

    /// `target - achieved`, floored at zero.
    pub fn deficit(&self, router: &str) -> u64 {
        self.target(router).saturating_sub(self.swaps.get(router))
    }

    pub fn targets_met<S: AsRef<str>>(&self, routers: &[S]) -> bool {
        routers
            .iter()
            .all(|r| self.swaps.get(r.as_ref()) >= self.target(r.as_ref()))
    }
}

type StatsDocument = BTreeMap<String, AccountRecord>;

/// JSON-backed stats keyed by identity.
///
/// Every mutation re-reads the whole document, merges, and rewrites it while
/// holding `write_lock`, so concurrent workers never lose increments.
#[derive(Debug)]
pub struct StatsStore {
    path: PathBuf,
    routers: Vec<String>,
    write_lock: Mutex<()>,
}

impl StatsStore {
    pub fn new(path: impl Into<PathBuf>, routers: Vec<String>) -> Self {
        Self {
            path: path.into(),
            routers,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn routers(&self) -> &[String] {
        &self.routers
    }

    fn canonical_router(&self, name: &str) -> Option<&str> {
        self.routers
            .iter()
            .find(|r| r.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    fn normalize(&self, record: &mut AccountRecord) {
        for router in &self.routers {
            record.swaps.per_router.entry(router.clone()).or_insert(0);
            record
                .liquidity_adds
                .per_router
                .entry(router.clone())
                .or_insert(0);
            record.targets.entry(router.clone()).or_insert(0);
        }
    }

    /// Read-merge-write one record. `f` reports whether it changed anything;
    /// unchanged records are not written back.
    async fn update<R, F>(&self, identity: &str, f: F) -> Result<R, StorageError>
    where
        F: FnOnce(&mut AccountRecord) -> (R, bool),
    {
        let _guard = self.write_lock.lock().await;

        let mut db: StatsDocument = read_document(&self.path).await?;
        let created = !db.contains_key(identity);
        let record = db
            .entry(identity.to_string())
            .or_insert_with(|| AccountRecord::new(None));
        self.normalize(record);

        let (result, changed) = f(record);
        if created || changed {
            write_document(&self.path, &db).await?;
        }
        Ok(result)
    }

    /// Create the record if absent and fill in a missing address.
    pub async fn init(&self, identity: &str, address: &str) -> Result<(), StorageError> {
        self.update(identity, |record| {
            if record.address.is_none() {
                record.address = Some(address.to_string());
                return ((), true);
            }
            ((), false)
        })
        .await
    }

    /// Assign random per-router targets in `[min, max]` unless some target is
    /// already set; returns the targets now on record.
    pub async fn ensure_targets(
        &self,
        identity: &str,
        min: u64,
        max: u64,
    ) -> Result<BTreeMap<String, u64>, StorageError> {
        let routers = self.routers.clone();
        self.update(identity, move |record| {
            let unset = routers.iter().all(|r| record.target(r) == 0);
            if !unset {
                return (record.targets.clone(), false);
            }

            let mut rng = rand::thread_rng();
            for router in &routers {
                record
                    .targets
                    .insert(router.clone(), rng.gen_range(min..=max));
            }
            record.touch();
            debug!("Assigned targets {:?}", record.targets);
            (record.targets.clone(), true)
        })
        .await
    }

    pub async fn get_stats(&self, identity: &str) -> Result<Option<AccountRecord>, StorageError> {
        let _guard = self.write_lock.lock().await;
        let db: StatsDocument = read_document(&self.path).await?;
        Ok(db.get(identity).cloned().map(|mut record| {
            self.normalize(&mut record);
            record
        }))
    }

    /// Count one swap. Router names match case-insensitively; an unknown
    /// router only bumps the total.
    pub async fn record_swap(&self, identity: &str, router: &str) -> Result<AccountRecord, StorageError> {
        let router = self.canonical_router(router).map(str::to_string);
        self.update(identity, move |record| {
            record.swaps.total += 1;
            if let Some(router) = router {
                *record.swaps.per_router.entry(router).or_insert(0) += 1;
            }
            record.touch();
            (record.clone(), true)
        })
        .await
    }

    pub async fn record_liquidity_add(&self, identity: &str, router: &str) -> Result<(), StorageError> {
        let router = self.canonical_router(router).map(str::to_string);
        self.update(identity, move |record| {
            record.liquidity_adds.total += 1;
            if let Some(router) = router {
                *record.liquidity_adds.per_router.entry(router).or_insert(0) += 1;
            }
            record.touch();
            ((), true)
        })
        .await
    }

    pub async fn record_transfer(&self, identity: &str) -> Result<(), StorageError> {
        self.update(identity, |record| {
            record.transfers += 1;
            record.touch();
            ((), true)
        })
        .await
    }
}
