//! Per-account loop run inside a wave.

use crate::actions::{fetch_balances, SwapAction, SwapOutcome};
use crate::chain::{ChainClient, ChainConnector};
use crate::context::SwapperContext;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use core_logic::{AccountRecord, Identity, WaveWorker, WorkerExit, WorkerFactory};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Backoff after a failed balance read.
const BALANCE_BACKOFF_MS: (u64, u64) = (3_000, 7_000);
/// Backoff after an action raised.
const ACTION_BACKOFF_MS: (u64, u64) = (3_000, 8_000);

/// Router with the largest remaining deficit; ties are broken at random and
/// no router is preferred once every deficit is zero.
pub fn preferred_router<'a, R: Rng + ?Sized>(
    record: &AccountRecord,
    routers: &'a [String],
    rng: &mut R,
) -> Option<&'a str> {
    let best = routers.iter().map(|r| record.deficit(r)).max()?;
    if best == 0 {
        return None;
    }
    let leaders: Vec<&String> = routers.iter().filter(|r| record.deficit(r) == best).collect();
    leaders.choose(rng).map(|r| r.as_str())
}

fn random_ms((min, max): (u64, u64)) -> Duration {
    if max > min {
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    } else {
        Duration::from_millis(min)
    }
}

/// Sleep for `duration`, never past `deadline`. `Some` when cancelled.
async fn pause(duration: Duration, deadline: Instant, cancel: &CancellationToken) -> Option<WorkerExit> {
    let wake = (Instant::now() + duration).min(deadline);
    tokio::select! {
        _ = cancel.cancelled() => Some(WorkerExit::Cancelled),
        _ = tokio::time::sleep_until(wake) => None,
    }
}

pub struct SwapWorker {
    ctx: Arc<SwapperContext>,
    client: Arc<dyn ChainClient>,
    identity: Identity,
}

impl SwapWorker {
    pub fn new(ctx: Arc<SwapperContext>, client: Arc<dyn ChainClient>, identity: Identity) -> Self {
        Self {
            ctx,
            client,
            identity,
        }
    }

    async fn startup(&self) -> Result<()> {
        let key = self.identity.secret();
        let address = format!("{:?}", self.client.address());
        let settings = &self.ctx.worker;

        self.ctx.stats.init(key, &address).await?;
        let targets = self
            .ctx
            .stats
            .ensure_targets(key, settings.swaps_min, settings.swaps_max)
            .await?;
        info!("Wallet {} targets {:?}", address, targets);

        self.ctx
            .assets
            .resolve_decimals(self.client.as_ref(), self.ctx.executor.rpc_retry())
            .await;
        Ok(())
    }

    /// One ACTIVE_LOOP pass after the stop checks. `Err` means back off.
    async fn iterate(&self, record: &AccountRecord) -> Result<SwapOutcome, Backoff> {
        let ctx = &self.ctx;
        let preferred = preferred_router(record, ctx.stats.routers(), &mut rand::thread_rng());
        debug!("Preferred router {:?}", preferred);

        let balances = fetch_balances(self.client.as_ref(), &ctx.assets, ctx.executor.rpc_retry())
            .await
            .map_err(|e| {
                warn!("Balance fetch failed: {:#}", e);
                Backoff::Balances
            })?;

        if let Some(snapshots) = &ctx.snapshots {
            let address = format!("{:?}", self.client.address());
            if let Err(e) = snapshots
                .save(self.identity.secret(), &address, &balances.entries(&ctx.assets))
                .await
            {
                warn!("Balance snapshot not saved: {:#}", e);
            }
        }

        SwapAction::new(ctx, self.client.as_ref(), self.identity.secret(), preferred)
            .run(&balances)
            .await
            .map_err(|e| {
                warn!(target: "task_result", "FAILED swap action: {:#}", e);
                Backoff::Action
            })
    }
}

#[derive(Debug, Clone, Copy)]
enum Backoff {
    Balances,
    Action,
}

#[async_trait]
impl WaveWorker for SwapWorker {
    async fn run(self: Box<Self>, deadline: Instant, cancel: CancellationToken) -> Result<WorkerExit> {
        let settings = self.ctx.worker.clone();

        if let Some(exit) = pause(random_ms(settings.start_jitter_ms), deadline, &cancel).await {
            return Ok(exit);
        }
        self.startup().await?;

        loop {
            if cancel.is_cancelled() {
                return Ok(WorkerExit::Cancelled);
            }

            if settings.quiet_hours.contains(Utc::now()) {
                info!("Quiet hours, sleeping {:?}", settings.night_recheck);
                if let Some(exit) = pause(settings.night_recheck, deadline, &cancel).await {
                    return Ok(exit);
                }
                if Instant::now() < deadline {
                    continue;
                }
            }

            if Instant::now() >= deadline {
                info!("Wave deadline reached");
                return Ok(WorkerExit::DeadlineReached);
            }

            let record = match self.ctx.stats.get_stats(self.identity.secret()).await {
                Ok(Some(record)) => record,
                res => {
                    match res {
                        Err(e) => warn!("Stats read failed: {:#}", e),
                        _ => warn!("Stats record missing"),
                    }
                    if let Some(exit) = pause(random_ms(BALANCE_BACKOFF_MS), deadline, &cancel).await {
                        return Ok(exit);
                    }
                    continue;
                }
            };
            if record.targets_met(self.ctx.stats.routers()) {
                info!(target: "task_result", "SUCCESS targets met ({} swaps)", record.swaps.total);
                return Ok(WorkerExit::TargetsMet);
            }

            let wait = match self.iterate(&record).await {
                Ok(_) => random_ms(settings.iteration_pause_ms),
                Err(Backoff::Balances) => random_ms(BALANCE_BACKOFF_MS),
                Err(Backoff::Action) => random_ms(ACTION_BACKOFF_MS),
            };
            if let Some(exit) = pause(wait, deadline, &cancel).await {
                return Ok(exit);
            }
        }
    }
}

/// Connects a chain client per identity and hands out [`SwapWorker`]s.
pub struct SwapWorkerFactory {
    ctx: Arc<SwapperContext>,
    connector: Arc<dyn ChainConnector>,
}

impl SwapWorkerFactory {
    pub fn new(ctx: Arc<SwapperContext>, connector: Arc<dyn ChainConnector>) -> Self {
        Self { ctx, connector }
    }
}

#[async_trait]
impl WorkerFactory for SwapWorkerFactory {
    async fn build(&self, identity: Identity, worker_id: usize) -> Result<Box<dyn WaveWorker>> {
        let client = self.connector.connect(&identity).await?;
        debug!("Worker {} bound to {:?}", worker_id, client.address());
        Ok(Box::new(SwapWorker::new(self.ctx.clone(), client, identity)))
    }
}
