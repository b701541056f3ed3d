#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use core_logic::Identity;
use ethers::types::{Address, H256, U256};
use pharos_swapper::chain::{ChainClient, ChainConnector, FeeEstimate, TxOp, TxOutcome};
use pharos_swapper::config::SwapperConfig;
use pharos_swapper::context::SwapperContext;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const WPHRS: u64 = 0x1;
pub const USDC: u64 = 0x2;
pub const USDT: u64 = 0x3;
pub const ZENITH: u64 = 0xa;
pub const FAROSWAP: u64 = 0xb;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn identity(n: u64) -> Identity {
    Identity::parse(&format!("0x{:064x}", n)).unwrap()
}

pub fn ether(n: u64) -> U256 {
    U256::exp10(18) * U256::from(n)
}

/// Fast settings: no pacing waits, no start jitter, short retries.
pub fn config_toml(dir: &Path, ban_threshold: u32) -> String {
    format!(
        r#"
rpc_urls = "http://127.0.0.1:8545"
stats_file = "{stats}"
stables = ["USDC", "USDT"]
swaps_min = 5
swaps_max = 5
global_gap_min_sec = 0
global_gap_max_sec = 0
extra_gap_min_sec = 0
extra_gap_max_sec = 0
gap_noise_max_ms = 0
start_jitter_min_ms = 0
start_jitter_max_ms = 0
iteration_pause_min_ms = 0
iteration_pause_max_ms = 0
rpc_max_retries = 1
rpc_base_delay_ms = 1
receipt_max_retries = 2
receipt_base_delay_ms = 1
router_ban_threshold = {ban_threshold}

[[tokens]]
symbol = "WPHRS"
address = "0x0000000000000000000000000000000000000001"

[[tokens]]
symbol = "USDC"
address = "0x0000000000000000000000000000000000000002"
decimals = 6

[[tokens]]
symbol = "USDT"
address = "0x0000000000000000000000000000000000000003"
decimals = 6

[[routers]]
name = "Zenith"
address = "0x000000000000000000000000000000000000000a"

[[routers]]
name = "Faroswap"
address = "0x000000000000000000000000000000000000000b"
"#,
        stats = dir.join("stats.json").display(),
        ban_threshold = ban_threshold,
    )
}

pub fn context(dir: &Path, ban_threshold: u32) -> Arc<SwapperContext> {
    context_from(&config_toml(dir, ban_threshold))
}

pub fn context_from(toml: &str) -> Arc<SwapperContext> {
    let settings = SwapperConfig::from_toml(toml).unwrap().into_settings().unwrap();
    Arc::new(SwapperContext::from_settings(&settings))
}

#[derive(Default)]
struct State {
    native: U256,
    tokens: HashMap<Address, U256>,
    allowances: HashSet<(Address, Address)>,
    sent: Vec<TxOp>,
    receipts: HashMap<H256, bool>,
}

/// In-memory chain. Swaps through a router in `failing_routers` revert at
/// estimation; everything else lands and moves balances 1:1.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<State>,
    failing_routers: Mutex<HashSet<Address>>,
    failing_unwraps: AtomicBool,
    failing_native_reads: AtomicBool,
    next_hash: AtomicU64,
    pub balance_reads: AtomicUsize,
    pub swap_estimates: Mutex<Vec<(Address, u32)>>,
}

impl MockChain {
    pub fn with_native(amount: U256) -> Self {
        let chain = Self::default();
        chain.state.lock().unwrap().native = amount;
        chain
    }

    pub fn set_token(&self, token: u64, amount: U256) {
        self.state.lock().unwrap().tokens.insert(addr(token), amount);
    }

    pub fn token(&self, token: u64) -> U256 {
        self.state.lock().unwrap().tokens.get(&addr(token)).copied().unwrap_or_default()
    }

    pub fn native(&self) -> U256 {
        self.state.lock().unwrap().native
    }

    pub fn fail_router(&self, router: u64) {
        self.failing_routers.lock().unwrap().insert(addr(router));
    }

    pub fn fail_unwraps(&self) {
        self.failing_unwraps.store(true, Ordering::SeqCst);
    }

    pub fn fail_native_reads(&self) {
        self.failing_native_reads.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<TxOp> {
        self.state.lock().unwrap().sent.clone()
    }

    fn apply(state: &mut State, op: &TxOp) {
        match op {
            TxOp::Wrap { wrapped, amount } => {
                state.native = state.native.saturating_sub(*amount);
                *state.tokens.entry(*wrapped).or_default() += *amount;
            }
            TxOp::Unwrap { wrapped, amount } => {
                let balance = state.tokens.entry(*wrapped).or_default();
                *balance = balance.saturating_sub(*amount);
                state.native += *amount;
            }
            TxOp::Approve { token, spender } => {
                state.allowances.insert((*token, *spender));
            }
            TxOp::Swap(req) => {
                let input = state.tokens.entry(req.token_in).or_default();
                *input = input.saturating_sub(req.amount_in);
                *state.tokens.entry(req.token_out).or_default() += req.amount_in;
            }
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn address(&self) -> Address {
        addr(0xfeed)
    }

    async fn native_balance(&self) -> Result<U256> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        if self.failing_native_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset by peer"));
        }
        Ok(self.native())
    }

    async fn token_balance(&self, token: Address) -> Result<U256> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().tokens.get(&token).copied().unwrap_or_default())
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        Ok(if token == addr(WPHRS) { 18 } else { 6 })
    }

    async fn allowance(&self, token: Address, spender: Address) -> Result<U256> {
        let approved = self.state.lock().unwrap().allowances.contains(&(token, spender));
        Ok(if approved { U256::MAX } else { U256::zero() })
    }

    async fn estimate_gas(&self, op: &TxOp) -> Result<U256> {
        match op {
            TxOp::Swap(req) => {
                self.swap_estimates.lock().unwrap().push((req.router, req.fee));
                if self.failing_routers.lock().unwrap().contains(&req.router) {
                    return Err(anyhow!("execution reverted: STF"));
                }
            }
            TxOp::Unwrap { .. } if self.failing_unwraps.load(Ordering::SeqCst) => {
                return Err(anyhow!("execution reverted: withdraw"));
            }
            _ => {}
        }
        Ok(U256::from(100_000u64))
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate> {
        Ok(FeeEstimate::Legacy {
            gas_price: U256::from(1_000_000_000u64),
        })
    }

    async fn send(&self, op: &TxOp, _gas_limit: U256, _fees: FeeEstimate) -> Result<H256> {
        let hash = H256::from_low_u64_be(self.next_hash.fetch_add(1, Ordering::SeqCst) + 1);
        let mut state = self.state.lock().unwrap();
        Self::apply(&mut state, op);
        state.sent.push(op.clone());
        state.receipts.insert(hash, true);
        Ok(hash)
    }

    async fn receipt(&self, tx_hash: H256) -> Result<Option<TxOutcome>> {
        let state = self.state.lock().unwrap();
        Ok(state.receipts.get(&tx_hash).map(|success| TxOutcome {
            tx_hash,
            success: *success,
            gas_used: Some(U256::from(90_000u64)),
        }))
    }
}

/// Hands the same mock to every identity.
pub struct MockConnector(pub Arc<MockChain>);

#[async_trait]
impl ChainConnector for MockConnector {
    async fn connect(&self, _identity: &Identity) -> Result<Arc<dyn ChainClient>> {
        Ok(self.0.clone())
    }
}

/// Wraps a [`MockChain`] and fails wrapped-token balance reads once a swap
/// has been sent after [`FlakyWrappedReads::arm`].
pub struct FlakyWrappedReads {
    pub inner: Arc<MockChain>,
    armed_at: AtomicUsize,
}

impl FlakyWrappedReads {
    pub fn new(inner: Arc<MockChain>) -> Self {
        Self {
            inner,
            armed_at: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn arm(&self) {
        self.armed_at.store(self.inner.sent().len(), Ordering::SeqCst);
    }

    fn swapped_since_armed(&self) -> bool {
        let from = self.armed_at.load(Ordering::SeqCst);
        self.inner
            .sent()
            .iter()
            .skip(from)
            .any(|op| matches!(op, TxOp::Swap(_)))
    }
}

#[async_trait]
impl ChainClient for FlakyWrappedReads {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn native_balance(&self) -> Result<U256> {
        self.inner.native_balance().await
    }

    async fn token_balance(&self, token: Address) -> Result<U256> {
        if token == addr(WPHRS) && self.swapped_since_armed() {
            return Err(anyhow!("connection reset by peer"));
        }
        self.inner.token_balance(token).await
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        self.inner.token_decimals(token).await
    }

    async fn allowance(&self, token: Address, spender: Address) -> Result<U256> {
        self.inner.allowance(token, spender).await
    }

    async fn estimate_gas(&self, op: &TxOp) -> Result<U256> {
        self.inner.estimate_gas(op).await
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate> {
        self.inner.fee_estimate().await
    }

    async fn send(&self, op: &TxOp, gas_limit: U256, fees: FeeEstimate) -> Result<H256> {
        self.inner.send(op, gas_limit, fees).await
    }

    async fn receipt(&self, tx_hash: H256) -> Result<Option<TxOutcome>> {
        self.inner.receipt(tx_hash).await
    }
}
