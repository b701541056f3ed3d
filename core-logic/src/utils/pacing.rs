//! # Core Logic - Global Pacing
//!
//! One gate shared by every worker in the process. Each mutating call
//! acquires it first, which turns the whole fleet into a single globally
//! spaced, locally jittered stream of transactions.

use crate::config::{GapMode, PacingConfig};
use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::info;

/// Outcome of one gate acquisition.
#[derive(Debug, Clone, Copy)]
pub struct GateRelease {
    /// When the caller was let through.
    pub released_at: Instant,
    /// Minimum spacing before the next release.
    pub next_gap: Duration,
    /// Total time spent waiting, including personal jitter.
    pub waited: Duration,
}

#[derive(Debug)]
pub struct PacingGate {
    config: PacingConfig,
    next_allowed: Mutex<Option<Instant>>,
}

impl PacingGate {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            next_allowed: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    /// Wait for the global slot plus personal jitter, then re-arm the gate.
    ///
    /// The lock is held across the sleep so that every waiter measures its
    /// wait against the timestamp left by the previous release.
    pub async fn acquire(&self) -> GateRelease {
        let mut next_allowed = self.next_allowed.lock().await;

        let now = Instant::now();
        let base_wait = next_allowed
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or_default();
        let jitter = self.personal_jitter();
        let waited = base_wait + jitter;

        if !waited.is_zero() {
            info!(
                "Global gap: waiting {}s before next tx",
                waited.as_secs_f64().ceil() as u64
            );
            sleep(waited).await;
        }

        let next_gap = self.draw_gap();
        let released_at = Instant::now();
        *next_allowed = Some(released_at + next_gap);

        GateRelease {
            released_at,
            next_gap,
            waited,
        }
    }

    fn personal_jitter(&self) -> Duration {
        let mut rng = rand::thread_rng();
        let secs = rng.gen_range(self.config.extra_min_secs..=self.config.extra_max_secs);
        let noise_ms = if self.config.noise_max_ms > 0 {
            rng.gen_range(0..=self.config.noise_max_ms)
        } else {
            0
        };
        Duration::from_secs(secs) + Duration::from_millis(noise_ms)
    }

    pub fn draw_gap(&self) -> Duration {
        sample_gap(&self.config, &mut rand::thread_rng())
    }
}

/// Draw the spacing to enforce after a release.
pub fn sample_gap<R: Rng + ?Sized>(config: &PacingConfig, rng: &mut R) -> Duration {
    match config.mode {
        GapMode::Uniform => {
            Duration::from_secs(rng.gen_range(config.gap_min_secs..=config.gap_max_secs))
        }
        GapMode::Poisson => {
            let u: f64 = rng.gen_range(0.0..1.0);
            let secs = (-(1.0 - u).ln() * config.gap_mean_secs).round() as u64;
            Duration::from_secs(secs.max(config.gap_floor_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn uniform_gap_stays_in_range() {
        let config = PacingConfig {
            gap_min_secs: 3,
            gap_max_secs: 7,
            ..PacingConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let gap = sample_gap(&config, &mut rng);
            assert!(gap >= Duration::from_secs(3) && gap <= Duration::from_secs(7));
        }
    }

    #[test]
    fn poisson_gap_respects_floor() {
        let config = PacingConfig {
            mode: GapMode::Poisson,
            gap_mean_secs: 1.0,
            ..PacingConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            assert!(sample_gap(&config, &mut rng) >= Duration::from_secs(5));
        }
    }
}
