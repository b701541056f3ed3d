//! Configured asset set: symbols, addresses, classes, decimals cache and the
//! static list of swap pair candidates.

use crate::chain::ChainClient;
use core_logic::with_retry;
use core_logic::RetryConfig;
use ethers::types::{Address, U256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::RwLock;
use tracing::warn;

pub const DEFAULT_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    Native,
    Wrapped,
    Stable,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwapPair {
    pub from: String,
    pub to: String,
}

impl SwapPair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for SwapPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

#[derive(Debug)]
pub struct AssetBook {
    native: String,
    wrapped: String,
    tokens: BTreeMap<String, Address>,
    stables: BTreeSet<String>,
    decimals: RwLock<HashMap<String, u8>>,
    pairs: Vec<SwapPair>,
}

impl AssetBook {
    /// `tokens` must contain `wrapped`; stables missing from `tokens` are
    /// ignored. `known_decimals` pre-seeds the cache.
    pub fn new(
        native: impl Into<String>,
        wrapped: impl Into<String>,
        tokens: BTreeMap<String, Address>,
        stables: impl IntoIterator<Item = String>,
        known_decimals: HashMap<String, u8>,
    ) -> Self {
        let native = native.into();
        let wrapped = wrapped.into();
        let stables: BTreeSet<String> = stables
            .into_iter()
            .filter(|s| tokens.contains_key(s))
            .collect();
        let pairs = build_pairs(&native, &wrapped, &tokens);

        Self {
            native,
            wrapped,
            tokens,
            stables,
            decimals: RwLock::new(known_decimals),
            pairs,
        }
    }

    pub fn native(&self) -> &str {
        &self.native
    }

    pub fn wrapped(&self) -> &str {
        &self.wrapped
    }

    pub fn address(&self, symbol: &str) -> Option<Address> {
        self.tokens.get(symbol).copied()
    }

    pub fn wrapped_address(&self) -> Option<Address> {
        self.address(&self.wrapped)
    }

    /// Every ERC-20 symbol with its address, native excluded.
    pub fn tokens(&self) -> impl Iterator<Item = (&str, Address)> {
        self.tokens.iter().map(|(s, a)| (s.as_str(), *a))
    }

    pub fn class(&self, symbol: &str) -> AssetClass {
        if symbol == self.native {
            AssetClass::Native
        } else if symbol == self.wrapped {
            AssetClass::Wrapped
        } else if self.stables.contains(symbol) {
            AssetClass::Stable
        } else {
            AssetClass::Other
        }
    }

    pub fn pairs(&self) -> &[SwapPair] {
        &self.pairs
    }

    /// Cached decimals, [`DEFAULT_DECIMALS`] when unknown. The native asset
    /// shares the wrapped token's precision.
    pub fn decimals(&self, symbol: &str) -> u8 {
        let key = if symbol == self.native {
            self.wrapped.as_str()
        } else {
            symbol
        };
        self.decimals
            .read()
            .map(|cache| cache.get(key).copied())
            .unwrap_or(None)
            .unwrap_or(DEFAULT_DECIMALS)
    }

    fn is_cached(&self, symbol: &str) -> bool {
        self.decimals
            .read()
            .map(|cache| cache.contains_key(symbol))
            .unwrap_or(false)
    }

    fn cache(&self, symbol: &str, decimals: u8) {
        if let Ok(mut cache) = self.decimals.write() {
            cache.entry(symbol.to_string()).or_insert(decimals);
        }
    }

    /// Look up decimals for every token not cached yet. A failed lookup caches
    /// the default so it is never repeated.
    pub async fn resolve_decimals(&self, client: &dyn ChainClient, retry: &RetryConfig) {
        for (symbol, address) in &self.tokens {
            if self.is_cached(symbol) {
                continue;
            }
            let label = format!("decimals({})", symbol);
            let decimals = match with_retry(retry, &label, || client.token_decimals(*address)).await {
                Ok(d) => d,
                Err(e) => {
                    warn!("decimals() failed for {}, defaulting {}: {:#}", symbol, DEFAULT_DECIMALS, e);
                    DEFAULT_DECIMALS
                }
            };
            self.cache(symbol, decimals);
        }
    }

    /// Minimal units → human units.
    pub fn to_units(&self, symbol: &str, raw: U256) -> f64 {
        to_units(raw, self.decimals(symbol))
    }
}

pub fn to_units(raw: U256, decimals: u8) -> f64 {
    ethers::utils::format_units(raw, decimals as u32)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// native↔secondary, wrapped↔secondary and secondary↔secondary in both
/// directions. native↔wrapped is never a candidate.
fn build_pairs(native: &str, wrapped: &str, tokens: &BTreeMap<String, Address>) -> Vec<SwapPair> {
    let secondaries: Vec<&String> = tokens
        .keys()
        .filter(|s| s.as_str() != native && s.as_str() != wrapped)
        .collect();

    let mut pairs = Vec::new();
    for s in &secondaries {
        pairs.push(SwapPair::new(native, s.as_str()));
        pairs.push(SwapPair::new(s.as_str(), native));
    }
    if tokens.contains_key(wrapped) {
        for s in &secondaries {
            pairs.push(SwapPair::new(wrapped, s.as_str()));
            pairs.push(SwapPair::new(s.as_str(), wrapped));
        }
    }
    for (i, a) in secondaries.iter().enumerate() {
        for b in &secondaries[i + 1..] {
            pairs.push(SwapPair::new(a.as_str(), b.as_str()));
            pairs.push(SwapPair::new(b.as_str(), a.as_str()));
        }
    }
    pairs
}
