use crate::error::NetworkError;
use anyhow::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    /// Upper bound of the additive uniform jitter, in milliseconds.
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 800,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
            jitter_ms: 500,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: base_delay_ms.saturating_mul(100),
            ..Default::default()
        }
    }

    /// Schedule used while waiting for a transaction receipt.
    pub fn receipt_polling() -> Self {
        Self {
            max_retries: 12,
            base_delay_ms: 1000,
            max_delay_ms: 120_000,
            exponential_base: 2.0,
            jitter_ms: 400,
        }
    }

    pub fn with_max_delay(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter_ms = 0;
        self
    }

    /// `base * exponential_base^attempt`, clamped, plus `U[0, jitter_ms]`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.base_delay_ms as f64 * self.exponential_base.powi(attempt as i32);
        let delay_ms = delay_ms.min(self.max_delay_ms as f64) as u64;

        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };

        Duration::from_millis(delay_ms + jitter)
    }
}

/// How a failed remote call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Busy node, timeouts, dropped connections, rate limits. Worth retrying.
    Transient,
    /// Insufficient funds, reverted execution, bad parameters. Never retried.
    Permanent,
}

const PERMANENT_PATTERNS: &[&str] = &[
    "insufficient funds",
    "execution reverted",
    "reverted",
    "invalid argument",
    "invalid params",
    "bad parameters",
    "unknown token symbol",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "-32008",
    "server_error",
    "server error",
    "service was busy",
    "busy",
    "system error",
    "econnreset",
    "etimedout",
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "network error",
    "error sending request",
    "fetch",
    "temporary failure",
    "service unavailable",
    "502",
    "503",
    "rate limit",
    "rate limited",
    "429",
    "too many requests",
    "nonce too low",
    "already known",
    "replacement transaction underpriced",
];

/// Classify an error by its message chain. Permanent signatures win over
/// transient ones; anything unrecognized is permanent.
pub fn classify_error(error: &anyhow::Error) -> ErrorClass {
    let error_msg = format!("{:#}", error).to_lowercase();

    if PERMANENT_PATTERNS.iter().any(|p| error_msg.contains(p)) {
        return ErrorClass::Permanent;
    }
    if TRANSIENT_PATTERNS.iter().any(|p| error_msg.contains(p)) {
        return ErrorClass::Transient;
    }
    ErrorClass::Permanent
}

pub fn is_transient_error(error: &anyhow::Error) -> bool {
    classify_error(error) == ErrorClass::Transient
}

/// Run `operation`, retrying transient failures with exponential backoff.
/// Permanent failures are returned on the first occurrence.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_classified(config, operation_name, classify_error, operation).await
}

/// Same as [`with_retry`] with a caller-supplied classifier.
pub async fn with_retry_classified<T, F, Fut, C>(
    config: &RetryConfig,
    operation_name: &str,
    classify: C,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    C: Fn(&anyhow::Error) -> ErrorClass,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{} succeeded on attempt {}", operation_name, attempt + 1);
                }
                return Ok(result);
            }
            Err(e) => {
                if classify(&e) == ErrorClass::Permanent {
                    debug!("{} failed permanently: {:#}", operation_name, e);
                    return Err(e);
                }

                if attempt >= config.max_retries {
                    let last_error = format!("{:#}", e);
                    return Err(e.context(NetworkError::RetriesExhausted {
                        operation: operation_name.to_string(),
                        attempts: attempt + 1,
                        last_error,
                    }));
                }

                let delay = config.calculate_delay(attempt);
                warn!(
                    "[rpc-retry] {}: {:#} (attempt {}/{}), retry in {:?}",
                    operation_name,
                    e,
                    attempt + 1,
                    config.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Poll `fetch` until it yields a receipt. Transient fetch errors count as
/// an empty poll; permanent ones propagate. Exhausting the schedule raises
/// [`NetworkError::ReceiptTimeout`].
pub async fn wait_for_receipt<T, F, Fut>(config: &RetryConfig, tx_hash: &str, mut fetch: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for attempt in 0..=config.max_retries {
        match fetch().await {
            Ok(Some(receipt)) => return Ok(receipt),
            Ok(None) => {}
            Err(e) => {
                if classify_error(&e) == ErrorClass::Permanent {
                    return Err(e);
                }
                debug!("receipt poll for {} failed: {:#}", tx_hash, e);
            }
        }

        if attempt < config.max_retries {
            tokio::time::sleep(config.calculate_delay(attempt)).await;
        }
    }

    Err(NetworkError::ReceiptTimeout {
        tx_hash: tx_hash.to_string(),
        attempts: config.max_retries + 1,
    }
    .into())
}
