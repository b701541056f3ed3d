//! # Utilities Module
//!
//! Pacing, retries, quiet hours, identities and the wave runner.

pub mod logger;
pub mod pacing;
pub mod quiet_hours;
pub mod retry;
pub mod runner;
pub mod wallet_manager;

pub use logger::setup_logger;
pub use pacing::{sample_gap, GateRelease, PacingGate};
pub use quiet_hours::is_quiet_hours;
pub use runner::{plan_wave, WavePlan, WaveReport, WaveScheduler};
pub use wallet_manager::{Identity, WalletManager};
