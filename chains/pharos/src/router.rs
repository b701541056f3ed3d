//! Router and fee-tier selection with per-pair adaptive bans.

use crate::assets::SwapPair;
use core_logic::{MetricsCollector, PacingGate};
use ethers::types::Address;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Fee tiers tried per router, in order (hundredths of a bip).
pub const FEE_TIERS: [u32; 2] = [500, 3000];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Router {
    pub name: String,
    pub address: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanPolicy {
    /// Consecutive cycles in which every fee tier failed before a ban.
    pub threshold: u32,
    /// `None` keeps the ban for the rest of the process.
    pub ttl: Option<Duration>,
}

impl Default for BanPolicy {
    fn default() -> Self {
        Self {
            threshold: 1,
            ttl: None,
        }
    }
}

#[derive(Debug, Default)]
struct BanEntry {
    failed_cycles: u32,
    banned_at: Option<Instant>,
}

#[derive(Debug)]
pub struct RouteSuccess<T> {
    pub router: Router,
    pub fee: u32,
    pub value: T,
}

type BanTable = HashMap<SwapPair, HashMap<String, BanEntry>>;

pub struct RouterSelector {
    routers: Vec<Router>,
    policy: BanPolicy,
    gate: Arc<PacingGate>,
    bans: Mutex<BanTable>,
}

impl RouterSelector {
    pub fn new(routers: Vec<Router>, policy: BanPolicy, gate: Arc<PacingGate>) -> Self {
        Self {
            routers,
            policy,
            gate,
            bans: Mutex::new(HashMap::new()),
        }
    }

    pub fn routers(&self) -> &[Router] {
        &self.routers
    }

    pub fn router_names(&self) -> Vec<String> {
        self.routers.iter().map(|r| r.name.clone()).collect()
    }

    fn table(&self) -> MutexGuard<'_, BanTable> {
        self.bans.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Expired bans are cleared on lookup.
    pub fn is_banned(&self, pair: &SwapPair, router: &str) -> bool {
        let mut table = self.table();
        let Some(entry) = table.get_mut(pair).and_then(|routers| routers.get_mut(router)) else {
            return false;
        };

        match (entry.banned_at, self.policy.ttl) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(at), Some(ttl)) if at.elapsed() < ttl => true,
            (Some(_), Some(_)) => {
                *entry = BanEntry::default();
                info!("Ban on {} for {} expired", router, pair);
                false
            }
        }
    }

    /// Preferred router first, then the others in configured order; routers
    /// banned for `pair` are left out.
    pub fn attempt_order(&self, pair: &SwapPair, preferred: Option<&str>) -> Vec<Router> {
        let preferred_idx =
            preferred.and_then(|name| self.routers.iter().position(|r| r.name.eq_ignore_ascii_case(name)));

        let mut order: Vec<&Router> = Vec::with_capacity(self.routers.len());
        if let Some(idx) = preferred_idx {
            order.push(&self.routers[idx]);
        }
        order.extend(
            self.routers
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != preferred_idx)
                .map(|(_, r)| r),
        );

        order
            .into_iter()
            .filter(|r| {
                let banned = self.is_banned(pair, &r.name);
                if banned {
                    info!("Skip {} for {} (banned)", r.name, pair);
                }
                !banned
            })
            .cloned()
            .collect()
    }

    /// Try each router × fee tier until one `attempt` succeeds. Every attempt
    /// first passes the pacing gate. `None` means no route worked this cycle.
    pub async fn swap<T, F, Fut>(
        &self,
        pair: &SwapPair,
        preferred: Option<&str>,
        mut attempt: F,
    ) -> Option<RouteSuccess<T>>
    where
        F: FnMut(Router, u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if self.routers.is_empty() {
            warn!("No routers configured");
            return None;
        }

        for router in self.attempt_order(pair, preferred) {
            // another worker may have banned it meanwhile
            if self.is_banned(pair, &router.name) {
                continue;
            }

            for fee in FEE_TIERS {
                self.gate.acquire().await;
                match attempt(router.clone(), fee).await {
                    Ok(value) => {
                        self.record_success(pair, &router.name);
                        return Some(RouteSuccess { router, fee, value });
                    }
                    Err(e) => warn!("Swap failed ({}, fee {}): {:#}", router.name, fee, e),
                }
            }

            self.record_failed_cycle(pair, &router.name);
        }

        None
    }

    fn record_success(&self, pair: &SwapPair, router: &str) {
        if let Some(routers) = self.table().get_mut(pair) {
            routers.remove(router);
        }
    }

    fn record_failed_cycle(&self, pair: &SwapPair, router: &str) {
        let mut table = self.table();
        let entry = table
            .entry(pair.clone())
            .or_default()
            .entry(router.to_string())
            .or_default();
        entry.failed_cycles += 1;

        if entry.banned_at.is_none() && entry.failed_cycles >= self.policy.threshold {
            entry.banned_at = Some(Instant::now());
            info!(
                "Ban {} for pair {} (both fee tiers failed, {} cycle(s))",
                router, pair, entry.failed_cycles
            );
            MetricsCollector::global().record_ban();
        } else {
            info!(
                "{} failed both fee tiers for {} ({}/{})",
                router, pair, entry.failed_cycles, self.policy.threshold
            );
        }
    }
}
