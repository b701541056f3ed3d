use crate::assets::AssetBook;
use crate::config::{Settings, SwapMode, WorkerSettings};
use crate::execution::TxExecutor;
use crate::router::RouterSelector;
use crate::sizing::SizingConfig;
use core_logic::{BalanceSnapshotStore, PacingGate, StatsStore};
use std::sync::Arc;

/// Everything a worker shares with its siblings. Built once from [`Settings`]
/// and handed out behind an `Arc`.
pub struct SwapperContext {
    pub assets: AssetBook,
    pub sizing: SizingConfig,
    pub mode: SwapMode,
    pub worker: WorkerSettings,
    pub gate: Arc<PacingGate>,
    pub selector: RouterSelector,
    pub stats: StatsStore,
    pub snapshots: Option<BalanceSnapshotStore>,
    pub executor: TxExecutor,
}

impl SwapperContext {
    pub fn from_settings(settings: &Settings) -> Self {
        let gate = Arc::new(PacingGate::new(settings.pacing.clone()));
        let selector = RouterSelector::new(settings.routers.clone(), settings.ban, gate.clone());
        let stats = StatsStore::new(&settings.stats_file, selector.router_names());
        let assets = &settings.assets;

        Self {
            assets: AssetBook::new(
                assets.native.clone(),
                assets.wrapped.clone(),
                assets.tokens.clone(),
                assets.stables.clone(),
                assets.decimals.clone(),
            ),
            sizing: settings.sizing.clone(),
            mode: settings.mode,
            worker: settings.worker.clone(),
            gate,
            selector,
            stats,
            snapshots: settings
                .balances_file
                .as_ref()
                .map(|path| BalanceSnapshotStore::new(path, settings.display_zone)),
            executor: TxExecutor::new(
                settings.rpc_retry,
                settings.receipt_retry,
                settings.explorer_base.clone(),
            ),
        }
    }
}
