use crate::config::WaveConfig;
use crate::error::ConfigError;
use crate::metrics::MetricsCollector;
use crate::traits::{IdentitySource, WorkerExit, WorkerFactory};
use crate::utils::wallet_manager::Identity;
use anyhow::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

/// Membership and timing of one wave.
#[derive(Debug)]
pub struct WavePlan {
    pub wave: u64,
    pub members: Vec<Identity>,
    pub duration: Duration,
    pub cooldown: Duration,
}

/// Draw batch size, membership, duration and cooldown for a wave.
pub fn plan_wave<R: Rng + ?Sized>(
    wave: u64,
    mut identities: Vec<Identity>,
    config: &WaveConfig,
    rng: &mut R,
) -> WavePlan {
    let drawn = rng.gen_range(config.batch_min..=config.batch_max);
    let batch = drawn
        .min(config.concurrency)
        .min(identities.len())
        .max(1);

    identities.shuffle(rng);
    identities.truncate(batch);

    let minutes = rng.gen_range(config.duration_min_minutes..=config.duration_max_minutes);

    WavePlan {
        wave,
        members: identities,
        duration: Duration::from_secs_f64(minutes * 60.0),
        cooldown: draw_cooldown(config, rng),
    }
}

fn draw_cooldown<R: Rng + ?Sized>(config: &WaveConfig, rng: &mut R) -> Duration {
    let minutes = rng.gen_range(config.cooldown_min_minutes..=config.cooldown_max_minutes);
    Duration::from_secs(minutes * 60)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WaveReport {
    pub wave: u64,
    pub members: usize,
    pub targets_met: usize,
    pub deadline_reached: usize,
    pub cancelled: usize,
    pub failed: usize,
}

/// Runs waves of workers forever: reload identities, pick a random batch,
/// run it against a shared deadline, cool down, repeat.
pub struct WaveScheduler {
    config: WaveConfig,
    identities: Arc<dyn IdentitySource>,
    factory: Arc<dyn WorkerFactory>,
    cancel: CancellationToken,
}

impl WaveScheduler {
    pub fn new(
        config: WaveConfig,
        identities: Arc<dyn IdentitySource>,
        factory: Arc<dyn WorkerFactory>,
    ) -> Self {
        Self {
            config,
            identities,
            factory,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Only returns on cancellation or when the first wave finds no usable
    /// identity.
    pub async fn run_forever(&self) -> Result<()> {
        let token = self.cancel.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("🛑 Received Ctrl+C. Initiating graceful shutdown...");
                    token.cancel();
                }
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                }
            }
        });

        info!("Starting WAVES mode (random batches, random durations)…");

        let mut wave: u64 = 1;
        while !self.cancel.is_cancelled() {
            let identities = match self.identities.load_identities().await {
                Ok(list) => list,
                Err(e) if wave == 1 => return Err(e),
                Err(e) => {
                    warn!("Wave #{}: failed to reload identities: {:#}", wave, e);
                    Vec::new()
                }
            };

            let cooldown = if identities.is_empty() {
                if wave == 1 {
                    return Err(ConfigError::NoIdentities {
                        reason: "identity source returned an empty list".to_string(),
                    }
                    .into());
                }
                warn!("Wave #{}: no identities available, skipping", wave);
                draw_cooldown(&self.config, &mut rand::thread_rng())
            } else {
                let plan = plan_wave(wave, identities, &self.config, &mut rand::thread_rng());
                let cooldown = plan.cooldown;
                let report = self.run_wave(plan).await;
                info!(
                    "Wave #{} done: {} member(s), {} reached targets, {} hit deadline, {} failed",
                    report.wave,
                    report.members,
                    report.targets_met,
                    report.deadline_reached,
                    report.failed
                );
                cooldown
            };

            info!("Wave #{} cooldown {} min…", wave, cooldown.as_secs() / 60);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(cooldown) => {}
            }
            wave += 1;
        }

        info!("🛑 Shutdown Complete.");
        Ok(())
    }

    /// Run every member of `plan` concurrently and wait for all of them.
    /// A failing or panicking worker is logged and never affects siblings.
    pub async fn run_wave(&self, plan: WavePlan) -> WaveReport {
        let deadline = Instant::now() + plan.duration;
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut report = WaveReport {
            wave: plan.wave,
            members: plan.members.len(),
            ..WaveReport::default()
        };

        info!(
            "Wave #{}: running {} wallet(s) for {:.1} min",
            plan.wave,
            plan.members.len(),
            plan.duration.as_secs_f64() / 60.0
        );
        MetricsCollector::global().record_wave();

        let mut set = JoinSet::new();
        for (i, identity) in plan.members.into_iter().enumerate() {
            let id = i + 1;
            let span = tracing::info_span!("worker", id = %format!("W{}", id));
            let semaphore = semaphore.clone();
            let factory = self.factory.clone();
            let cancel = self.cancel.child_token();

            set.spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await?;
                    let worker = factory.build(identity, id).await?;
                    worker.run(deadline, cancel).await
                }
                .instrument(span),
            );
        }

        while let Some(res) = set.join_next().await {
            let exit = match res {
                Ok(Ok(exit)) => Some(exit),
                Ok(Err(e)) => {
                    error!("Worker failed: {:#}", e);
                    None
                }
                Err(e) => {
                    error!("A worker task panicked or failed to join: {:?}", e);
                    None
                }
            };

            match exit {
                Some(WorkerExit::TargetsMet) => report.targets_met += 1,
                Some(WorkerExit::DeadlineReached) => report.deadline_reached += 1,
                Some(WorkerExit::Cancelled) => report.cancelled += 1,
                None => report.failed += 1,
            }
            MetricsCollector::global().record_worker_exit(exit);
        }

        report
    }
}
