//! # Core Logic - Shared Runtime for Quota Swappers
//!
//! Chain-agnostic pieces every swapper binary is assembled from.
//!
//! ## Modules
//!
//! - [`config`] - Pacing, wave and quiet-hours configuration
//! - [`error`] - Typed error handling with thiserror
//! - [`metrics`] - Process-wide counters and JSON export
//! - [`storage`] - JSON-backed stats and balance snapshots
//! - [`traits`] - Worker, factory and identity-source seams
//! - [`utils`] - Global pacing gate, retries, quiet hours, wave scheduler

pub mod config;
pub mod error;
pub mod metrics;
pub mod storage;
pub mod traits;
pub mod utils;

pub use config::{GapMode, PacingConfig, QuietHours, WaveConfig};
pub use error::{ConfigError, CoreError, NetworkError, StorageError, WalletError};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use storage::balances::{BalanceEntry, BalanceSnapshot, BalanceSnapshotStore};
pub use storage::stats::{AccountRecord, Counters, StatsStore};
pub use traits::{IdentitySource, WaveWorker, WorkerExit, WorkerFactory};

pub use utils::{
    is_quiet_hours, plan_wave, setup_logger, GateRelease, Identity, PacingGate, WalletManager,
    WavePlan, WaveReport, WaveScheduler,
};

pub use utils::retry::{
    classify_error, is_transient_error, wait_for_receipt, with_retry, with_retry_classified,
    ErrorClass, RetryConfig,
};
