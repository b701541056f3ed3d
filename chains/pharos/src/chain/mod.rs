//! Chain collaborator seam. Workers only talk to the chain through
//! [`ChainClient`]; [`evm::EvmChain`] is the ethers-backed implementation.

pub mod evm;

use anyhow::Result;
use async_trait::async_trait;
use core_logic::Identity;
use ethers::types::{Address, H256, U256};
use std::fmt;
use std::sync::Arc;

/// exactInputSingle through a multicall router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub router: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub fee: u32,
    pub amount_in: U256,
}

/// A mutating call. Reads go through the dedicated [`ChainClient`] methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOp {
    Wrap { wrapped: Address, amount: U256 },
    Unwrap { wrapped: Address, amount: U256 },
    /// Unlimited allowance for `spender`.
    Approve { token: Address, spender: Address },
    Swap(SwapRequest),
}

impl fmt::Display for TxOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxOp::Wrap { .. } => write!(f, "wrap(deposit)"),
            TxOp::Unwrap { .. } => write!(f, "unwrap(withdraw)"),
            TxOp::Approve { .. } => write!(f, "approve"),
            TxOp::Swap(_) => write!(f, "multicall"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeEstimate {
    Eip1559 { max_fee: U256, priority_fee: U256 },
    Legacy { gas_price: U256 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: H256,
    pub success: bool,
    pub gas_used: Option<U256>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    fn address(&self) -> Address;

    async fn native_balance(&self) -> Result<U256>;

    async fn token_balance(&self, token: Address) -> Result<U256>;

    async fn token_decimals(&self, token: Address) -> Result<u8>;

    async fn allowance(&self, token: Address, spender: Address) -> Result<U256>;

    async fn estimate_gas(&self, op: &TxOp) -> Result<U256>;

    async fn fee_estimate(&self) -> Result<FeeEstimate>;

    /// Sign and broadcast. Returns as soon as the node accepted the tx.
    async fn send(&self, op: &TxOp, gas_limit: U256, fees: FeeEstimate) -> Result<H256>;

    /// `None` while the tx is still pending.
    async fn receipt(&self, tx_hash: H256) -> Result<Option<TxOutcome>>;
}

/// Opens a [`ChainClient`] for one identity.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(&self, identity: &Identity) -> Result<Arc<dyn ChainClient>>;
}
