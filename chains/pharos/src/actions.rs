//! One swap action: pick a candidate pair, size it, and carry it out through
//! the router selector, with the implicit wrap/unwrap legs around native.

use crate::assets::{AssetBook, SwapPair};
use crate::chain::{ChainClient, SwapRequest, TxOp, TxOutcome};
use crate::config::SwapMode;
use crate::context::SwapperContext;
use crate::router::RouteSuccess;
use crate::sizing::{pick_swap_amount, SizeClass};
use anyhow::{anyhow, Context, Result};
use core_logic::{with_retry, BalanceEntry, MetricsCollector, RetryConfig};
use ethers::types::U256;
use futures::future::try_join_all;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Raw balances keyed by symbol, native included.
#[derive(Debug, Clone, Default)]
pub struct Balances {
    raw: HashMap<String, U256>,
}

impl Balances {
    pub fn from_raw(raw: HashMap<String, U256>) -> Self {
        Self { raw }
    }

    pub fn raw(&self, symbol: &str) -> U256 {
        self.raw.get(symbol).copied().unwrap_or_default()
    }

    pub fn human(&self, assets: &AssetBook, symbol: &str) -> f64 {
        assets.to_units(symbol, self.raw(symbol))
    }

    /// Snapshot rows, sorted by symbol.
    pub fn entries(&self, assets: &AssetBook) -> Vec<BalanceEntry> {
        let mut entries: Vec<BalanceEntry> = self
            .raw
            .iter()
            .map(|(symbol, raw)| BalanceEntry {
                symbol: symbol.clone(),
                raw: raw.to_string(),
                formatted: ethers::utils::format_units(*raw, assets.decimals(symbol) as u32)
                    .unwrap_or_else(|_| raw.to_string()),
            })
            .collect();
        entries.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        entries
    }
}

/// Native balance plus every configured token, each read retried.
pub async fn fetch_balances(
    client: &dyn ChainClient,
    assets: &AssetBook,
    retry: &RetryConfig,
) -> Result<Balances> {
    let native = with_retry(retry, "getBalance", || client.native_balance()).await?;

    let reads = assets.tokens().map(|(symbol, address)| async move {
        let label = format!("balanceOf({})", symbol);
        with_retry(retry, &label, || client.token_balance(address))
            .await
            .map(|raw| (symbol.to_string(), raw))
    });
    let mut raw: HashMap<String, U256> = try_join_all(reads).await?.into_iter().collect();
    raw.insert(assets.native().to_string(), native);

    Ok(Balances { raw })
}

/// Pairs whose input balance clears the class minimum.
pub fn candidates<'a>(assets: &'a AssetBook, balances: &Balances) -> Vec<&'a SwapPair> {
    assets
        .pairs()
        .iter()
        .filter(|pair| {
            let class = SizeClass::of(assets.class(&pair.from), assets.decimals(&pair.from));
            balances.human(assets, &pair.from) > class.min_balance()
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    NoCandidate,
    TooSmall { pair: SwapPair },
    /// Balance below the amount the first leg spends; nothing was sent.
    Insufficient { pair: SwapPair },
    RoutesExhausted { pair: SwapPair },
    Swapped { pair: SwapPair, router: String },
}

/// One worker's view of a single action.
pub struct SwapAction<'a> {
    ctx: &'a SwapperContext,
    client: &'a dyn ChainClient,
    identity: &'a str,
    preferred: Option<&'a str>,
}

impl<'a> SwapAction<'a> {
    pub fn new(
        ctx: &'a SwapperContext,
        client: &'a dyn ChainClient,
        identity: &'a str,
        preferred: Option<&'a str>,
    ) -> Self {
        Self {
            ctx,
            client,
            identity,
            preferred,
        }
    }

    /// Candidate and amount, or the no-op outcome when there is nothing to do.
    fn pick(&self, balances: &Balances) -> std::result::Result<(SwapPair, f64), SwapOutcome> {
        let assets = &self.ctx.assets;
        let mut rng = rand::thread_rng();

        let Some(pair) = candidates(assets, balances)
            .choose(&mut rng)
            .map(|p| (*p).clone())
        else {
            info!("No swap candidates with enough balance");
            return Err(SwapOutcome::NoCandidate);
        };

        let class = SizeClass::of(assets.class(&pair.from), assets.decimals(&pair.from));
        let balance = balances.human(assets, &pair.from);
        match pick_swap_amount(&self.ctx.sizing, class, balance, &mut rng) {
            Some(amount) => Ok((pair, amount)),
            None => {
                info!("Skip {}: amount below floor (balance {})", pair, balance);
                Err(SwapOutcome::TooSmall { pair })
            }
        }
    }

    pub async fn run(&self, balances: &Balances) -> Result<SwapOutcome> {
        let assets = &self.ctx.assets;
        let (pair, amount) = match self.pick(balances) {
            Ok(picked) => picked,
            Err(outcome) => {
                MetricsCollector::global().record_skip();
                return Ok(outcome);
            }
        };
        let decimals = assets.decimals(&pair.from);
        let amount_raw = to_raw(amount, decimals)?;
        debug!("{} amount {} ({} raw)", pair, amount, amount_raw);

        let native = assets.native();
        if pair.from == native {
            self.native_to_token(&pair, amount_raw, balances).await
        } else if pair.to == native {
            self.token_to_native(&pair, amount_raw).await
        } else {
            self.route(&pair, &pair, amount_raw).await
        }
    }

    /// Wrap `amount` first, then route wrapped→token. Without the wrap leg
    /// the wrapped balance is spent directly.
    async fn native_to_token(&self, pair: &SwapPair, amount: U256, balances: &Balances) -> Result<SwapOutcome> {
        let assets = &self.ctx.assets;
        let wrapped = assets
            .wrapped_address()
            .ok_or_else(|| anyhow!("{} has no address", assets.wrapped()))?;
        let routed = SwapPair::new(assets.wrapped(), pair.to.as_str());

        if self.ctx.mode == SwapMode::StablesOnly {
            if balances.raw(assets.wrapped()) < amount {
                warn!("Skip {}: {} balance below swap amount", pair, assets.wrapped());
                MetricsCollector::global().record_skip();
                return Ok(SwapOutcome::Insufficient { pair: pair.clone() });
            }
            return self.route(pair, &routed, amount).await;
        }

        if balances.raw(assets.native()) < amount {
            warn!("Skip {}: {} balance below wrap amount", pair, assets.native());
            MetricsCollector::global().record_skip();
            return Ok(SwapOutcome::Insufficient { pair: pair.clone() });
        }

        self.ctx.gate.acquire().await;
        let tx = self
            .ctx
            .executor
            .submit(self.client, &TxOp::Wrap { wrapped, amount })
            .await
            .context("wrap failed")?;
        info!(
            "Wrapped {} {}: {}",
            assets.to_units(assets.native(), amount),
            assets.native(),
            self.ctx.executor.tx_link(tx.tx_hash)
        );

        self.route(pair, &routed, amount).await
    }

    /// Route token→wrapped, then unwrap what actually arrived. Once the swap
    /// has landed nothing here fails the action.
    async fn token_to_native(&self, pair: &SwapPair, amount: U256) -> Result<SwapOutcome> {
        let assets = &self.ctx.assets;
        let retry = self.ctx.executor.rpc_retry();
        let wrapped = assets
            .wrapped_address()
            .ok_or_else(|| anyhow!("{} has no address", assets.wrapped()))?;
        let routed = SwapPair::new(pair.from.as_str(), assets.wrapped());

        if self.ctx.mode == SwapMode::StablesOnly {
            return self.route(pair, &routed, amount).await;
        }

        let before = with_retry(retry, "balanceOf(wrapped)", || self.client.token_balance(wrapped)).await?;
        let outcome = self.route(pair, &routed, amount).await?;
        if !matches!(outcome, SwapOutcome::Swapped { .. }) {
            return Ok(outcome);
        }

        let after = match with_retry(retry, "balanceOf(wrapped)", || self.client.token_balance(wrapped)).await {
            Ok(after) => after,
            Err(e) => {
                warn!("{} balance unreadable after swap, skipping unwrap: {:#}", assets.wrapped(), e);
                return Ok(outcome);
            }
        };
        let delta = after.saturating_sub(before);
        if delta.is_zero() {
            warn!("No {} received from {}, nothing to unwrap", assets.wrapped(), routed);
            return Ok(outcome);
        }

        self.ctx.gate.acquire().await;
        match self
            .ctx
            .executor
            .submit(self.client, &TxOp::Unwrap { wrapped, amount: delta })
            .await
        {
            Ok(tx) => info!(
                "Unwrapped {} {}: {}",
                assets.to_units(assets.wrapped(), delta),
                assets.wrapped(),
                self.ctx.executor.tx_link(tx.tx_hash)
            ),
            Err(e) => warn!("Unwrap of {} failed: {:#}", delta, e),
        }
        Ok(outcome)
    }

    /// Router × fee-tier attempts for `routed`, which is `pair` with native
    /// replaced by the wrapped token. A landed swap is recorded before this
    /// returns.
    async fn route(&self, pair: &SwapPair, routed: &SwapPair, amount_in: U256) -> Result<SwapOutcome> {
        let assets = &self.ctx.assets;
        let token_in = assets
            .address(&routed.from)
            .ok_or_else(|| anyhow!("{} has no address", routed.from))?;
        let token_out = assets
            .address(&routed.to)
            .ok_or_else(|| anyhow!("{} has no address", routed.to))?;

        let ctx = self.ctx;
        let client = self.client;
        let started = Instant::now();
        let result: Option<RouteSuccess<TxOutcome>> = ctx
            .selector
            .swap(routed, self.preferred, |router, fee| async move {
                ctx.executor
                    .ensure_allowance(client, token_in, router.address, amount_in)
                    .await?;

                let op = TxOp::Swap(SwapRequest {
                    router: router.address,
                    token_in,
                    token_out,
                    fee,
                    amount_in,
                });
                ctx.executor.submit(client, &op).await
            })
            .await;

        match result {
            Some(success) => {
                MetricsCollector::global().record_swap(started.elapsed(), true);
                info!(
                    "Swap {} via {} (fee {}): {}",
                    routed,
                    success.router.name,
                    success.fee,
                    ctx.executor.tx_link(success.value.tx_hash)
                );

                let router = success.router.name.as_str();
                let record = ctx.stats.record_swap(self.identity, router).await?;
                info!(
                    target: "task_result",
                    "SUCCESS swap {} {} via {} (total {}, {} {}/{})",
                    assets.to_units(&routed.from, amount_in),
                    pair,
                    router,
                    record.swaps.total,
                    router,
                    record.swaps.get(router),
                    record.target(router)
                );
                Ok(SwapOutcome::Swapped {
                    pair: pair.clone(),
                    router: success.router.name,
                })
            }
            None => {
                MetricsCollector::global().record_swap(started.elapsed(), false);
                warn!(target: "task_result", "FAILED swap {}: every router and fee tier failed", routed);
                Ok(SwapOutcome::RoutesExhausted { pair: pair.clone() })
            }
        }
    }
}

/// Human units → minimal units, never more digits than the token has.
fn to_raw(amount: f64, decimals: u8) -> Result<U256> {
    let places = (decimals as usize).min(6);
    let text = format!("{:.*}", places, amount);
    let parsed = ethers::utils::parse_units(&text, decimals as u32)
        .with_context(|| format!("cannot convert {} to units", text))?;
    Ok(parsed.into())
}
