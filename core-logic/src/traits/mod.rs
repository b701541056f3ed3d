use crate::utils::wallet_manager::Identity;
use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a worker left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    DeadlineReached,
    TargetsMet,
    Cancelled,
}

/// One account's work for the duration of a wave.
#[async_trait]
pub trait WaveWorker: Send {
    /// Run until `deadline`, until the account's quota is reached, or until
    /// `cancel` fires. Checked cooperatively; in-flight calls finish first.
    async fn run(self: Box<Self>, deadline: Instant, cancel: CancellationToken) -> Result<WorkerExit>;
}

/// Builds a worker for a wave member.
#[async_trait]
pub trait WorkerFactory: Send + Sync {
    async fn build(&self, identity: Identity, worker_id: usize) -> Result<Box<dyn WaveWorker>>;
}

/// Ordered list of account identities, re-read at the start of every wave.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn load_identities(&self) -> Result<Vec<Identity>>;
}
