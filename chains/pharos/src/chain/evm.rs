use super::{ChainClient, ChainConnector, FeeEstimate, SwapRequest, TxOp, TxOutcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use core_logic::Identity;
use ethers::abi::{self, Abi, Token};
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Selector of `exactInputSingle((address,address,uint24,address,uint256,uint256,uint160))`.
const EXACT_INPUT_SINGLE: [u8; 4] = [0x04, 0xe4, 0x5a, 0xaf];

/// Router calls expire ten minutes after encoding.
const SWAP_DEADLINE_SECS: u64 = 600;

const ERC20_ABI: &str = r#"[
    {"constant":true,"inputs":[{"name":"_owner","type":"address"}],"name":"balanceOf","outputs":[{"name":"balance","type":"uint256"}],"type":"function"},
    {"constant":true,"inputs":[],"name":"decimals","outputs":[{"name":"","type":"uint8"}],"type":"function"},
    {"constant":false,"inputs":[{"name":"_spender","type":"address"},{"name":"_value","type":"uint256"}],"name":"approve","outputs":[{"name":"","type":"bool"}],"type":"function"},
    {"constant":true,"inputs":[{"name":"_owner","type":"address"},{"name":"_spender","type":"address"}],"name":"allowance","outputs":[{"name":"","type":"uint256"}],"type":"function"}
]"#;

const WETH_ABI: &str = r#"[
    {"type":"function","name":"deposit","stateMutability":"payable","inputs":[],"outputs":[]},
    {"type":"function","name":"withdraw","stateMutability":"nonpayable","inputs":[{"name":"wad","type":"uint256"}],"outputs":[]}
]"#;

const ROUTER_ABI: &str = r#"[
    {"type":"function","name":"multicall","stateMutability":"payable","inputs":[{"name":"deadline","type":"uint256"},{"name":"data","type":"bytes[]"}],"outputs":[{"name":"","type":"bytes[]"}]}
]"#;

/// ethers-backed [`ChainClient`] for one signer.
pub struct EvmChain {
    client: Arc<Client>,
    chain_id: u64,
    erc20: Abi,
    weth: BaseContract,
    router: BaseContract,
}

impl EvmChain {
    pub fn connect(rpc_url: &str, chain_id: u64, secret: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .with_context(|| format!("Invalid RPC url {}", rpc_url))?
            .interval(Duration::from_millis(500));
        let wallet = secret
            .parse::<LocalWallet>()
            .context("Invalid private key")?
            .with_chain_id(chain_id);

        let weth: Abi = serde_json::from_str(WETH_ABI)?;
        let router: Abi = serde_json::from_str(ROUTER_ABI)?;

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            chain_id,
            erc20: serde_json::from_str(ERC20_ABI)?,
            weth: BaseContract::from(weth),
            router: BaseContract::from(router),
        })
    }

    fn token(&self, token: Address) -> Contract<Client> {
        Contract::new(token, self.erc20.clone(), self.client.clone())
    }

    fn swap_calldata(&self, req: &SwapRequest) -> Result<Bytes> {
        let params = abi::encode(&[
            Token::Address(req.token_in),
            Token::Address(req.token_out),
            Token::Uint(U256::from(req.fee)),
            Token::Address(self.address()),
            Token::Uint(req.amount_in),
            Token::Uint(U256::zero()),
            Token::Uint(U256::zero()),
        ]);
        let mut inner = EXACT_INPUT_SINGLE.to_vec();
        inner.extend(params);

        let deadline = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() + SWAP_DEADLINE_SECS;
        let data = self
            .router
            .encode("multicall", (U256::from(deadline), vec![Bytes::from(inner)]))?;
        Ok(data)
    }

    /// `(to, calldata, value)` for a mutating op.
    fn call_parts(&self, op: &TxOp) -> Result<(Address, Bytes, U256)> {
        match op {
            TxOp::Wrap { wrapped, amount } => {
                Ok((*wrapped, self.weth.encode("deposit", ())?, *amount))
            }
            TxOp::Unwrap { wrapped, amount } => {
                Ok((*wrapped, self.weth.encode("withdraw", *amount)?, U256::zero()))
            }
            TxOp::Approve { token, spender } => {
                let base = BaseContract::from(self.erc20.clone());
                let data = base.encode("approve", (*spender, U256::MAX))?;
                Ok((*token, data, U256::zero()))
            }
            TxOp::Swap(req) => Ok((req.router, self.swap_calldata(req)?, U256::zero())),
        }
    }
}

#[async_trait]
impl ChainClient for EvmChain {
    fn address(&self) -> Address {
        self.client.address()
    }

    async fn native_balance(&self) -> Result<U256> {
        Ok(self.client.get_balance(self.address(), None).await?)
    }

    async fn token_balance(&self, token: Address) -> Result<U256> {
        let balance: U256 = self
            .token(token)
            .method("balanceOf", self.address())?
            .call()
            .await?;
        Ok(balance)
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        let decimals: u8 = self.token(token).method("decimals", ())?.call().await?;
        Ok(decimals)
    }

    async fn allowance(&self, token: Address, spender: Address) -> Result<U256> {
        let allowance: U256 = self
            .token(token)
            .method("allowance", (self.address(), spender))?
            .call()
            .await?;
        Ok(allowance)
    }

    async fn estimate_gas(&self, op: &TxOp) -> Result<U256> {
        let (to, data, value) = self.call_parts(op)?;
        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .from(self.address())
            .to(to)
            .data(data)
            .value(value)
            .into();
        Ok(self.client.estimate_gas(&tx, None).await?)
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate> {
        match self.client.estimate_eip1559_fees(None).await {
            Ok((max_fee, priority_fee)) => Ok(FeeEstimate::Eip1559 {
                max_fee,
                priority_fee,
            }),
            Err(e) => {
                debug!("EIP-1559 fee estimate unavailable ({}), using gas price", e);
                let gas_price = self.client.get_gas_price().await?;
                Ok(FeeEstimate::Legacy { gas_price })
            }
        }
    }

    async fn send(&self, op: &TxOp, gas_limit: U256, fees: FeeEstimate) -> Result<H256> {
        let (to, data, value) = self.call_parts(op)?;
        let tx: TypedTransaction = match fees {
            FeeEstimate::Eip1559 {
                max_fee,
                priority_fee,
            } => Eip1559TransactionRequest::new()
                .from(self.address())
                .to(to)
                .data(data)
                .value(value)
                .gas(gas_limit)
                .max_fee_per_gas(max_fee)
                .max_priority_fee_per_gas(priority_fee)
                .chain_id(self.chain_id)
                .into(),
            FeeEstimate::Legacy { gas_price } => TransactionRequest::new()
                .from(self.address())
                .to(to)
                .data(data)
                .value(value)
                .gas(gas_limit)
                .gas_price(gas_price)
                .chain_id(self.chain_id)
                .into(),
        };

        let pending = self.client.send_transaction(tx, None).await?;
        Ok(pending.tx_hash())
    }

    async fn receipt(&self, tx_hash: H256) -> Result<Option<TxOutcome>> {
        let receipt = self.client.get_transaction_receipt(tx_hash).await?;
        Ok(receipt.map(|r| TxOutcome {
            tx_hash: r.transaction_hash,
            success: r.status == Some(U64::from(1)),
            gas_used: r.gas_used,
        }))
    }
}

/// Connects every identity to one of the configured RPC endpoints.
pub struct EvmConnector {
    rpc_urls: Vec<String>,
    chain_id: u64,
}

impl EvmConnector {
    pub fn new(rpc_urls: Vec<String>, chain_id: u64) -> Self {
        Self { rpc_urls, chain_id }
    }
}

#[async_trait]
impl ChainConnector for EvmConnector {
    async fn connect(&self, identity: &Identity) -> Result<Arc<dyn ChainClient>> {
        let url = self
            .rpc_urls
            .choose(&mut rand::thread_rng())
            .context("No RPC url configured")?;
        let chain = EvmChain::connect(url, self.chain_id, identity.secret())?;
        debug!("Connected {:?} via {}", chain.address(), url);
        Ok(Arc::new(chain))
    }
}
