use crate::chain::{ChainClient, TxOp, TxOutcome};
use anyhow::Result;
use core_logic::{wait_for_receipt, with_retry, NetworkError, RetryConfig};
use ethers::types::{Address, H256, U256};
use tracing::{debug, info};

/// Estimate → fee data → send → receipt, with every read retried and the
/// send itself attempted exactly once.
#[derive(Debug, Clone)]
pub struct TxExecutor {
    rpc_retry: RetryConfig,
    receipt_retry: RetryConfig,
    explorer_base: String,
}

impl TxExecutor {
    pub fn new(rpc_retry: RetryConfig, receipt_retry: RetryConfig, explorer_base: impl Into<String>) -> Self {
        Self {
            rpc_retry,
            receipt_retry,
            explorer_base: explorer_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn rpc_retry(&self) -> &RetryConfig {
        &self.rpc_retry
    }

    pub fn tx_link(&self, tx_hash: H256) -> String {
        format!("{}/tx/{:?}", self.explorer_base, tx_hash)
    }

    /// Submit `op` and wait for a successful receipt. A status-0 receipt is
    /// reported as [`NetworkError::Reverted`].
    pub async fn submit(&self, client: &dyn ChainClient, op: &TxOp) -> Result<TxOutcome> {
        let estimate = with_retry(&self.rpc_retry, &format!("estimateGas:{}", op), || {
            client.estimate_gas(op)
        })
        .await?;
        let gas_limit = estimate * U256::from(12) / U256::from(10);

        let fees = with_retry(&self.rpc_retry, "getFeeData", || client.fee_estimate()).await?;

        let tx_hash = client.send(op, gas_limit, fees).await?;
        let hash_label = format!("{:?}", tx_hash);
        debug!("{} sent: {} (gas limit {})", op, hash_label, gas_limit);

        let outcome = wait_for_receipt(&self.receipt_retry, &hash_label, || client.receipt(tx_hash)).await?;
        if !outcome.success {
            return Err(NetworkError::Reverted { tx_hash: hash_label }.into());
        }
        Ok(outcome)
    }

    /// Approve `spender` for the maximum amount when the current allowance
    /// does not cover `needed`.
    pub async fn ensure_allowance(
        &self,
        client: &dyn ChainClient,
        token: Address,
        spender: Address,
        needed: U256,
    ) -> Result<Option<TxOutcome>> {
        let current = with_retry(&self.rpc_retry, "allowance", || client.allowance(token, spender)).await?;
        if current >= needed {
            return Ok(None);
        }

        let outcome = self.submit(client, &TxOp::Approve { token, spender }).await?;
        info!("Approve tx: {}", self.tx_link(outcome.tx_hash));
        Ok(Some(outcome))
    }
}
