use crate::error::{ConfigError, WalletError};
use crate::traits::IdentitySource;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A validated account secret (`0x` + 64 hex chars). Doubles as the stats key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Identity {
    secret: String,
}

impl Identity {
    pub fn parse(raw: &str) -> Result<Self, WalletError> {
        let trimmed = raw.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .ok_or(WalletError::InvalidKeyFormat)?;
        if hex_part.len() != 64 {
            return Err(WalletError::InvalidKeyLength {
                length: hex_part.len(),
            });
        }
        hex::decode(hex_part).map_err(|_| WalletError::InvalidKeyFormat)?;

        Ok(Self {
            secret: trimmed.to_string(),
        })
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("secret", &"***REDACTED***")
            .finish()
    }
}

/// Loads identities from a key file (one per line, `#` comments), falling
/// back to the `PRIVATE_KEY` / `PRIVATE_KEYS` environment variables.
pub struct WalletManager {
    key_file: PathBuf,
}

impl WalletManager {
    pub fn new(key_file: impl Into<PathBuf>) -> Self {
        Self {
            key_file: key_file.into(),
        }
    }

    async fn raw_keys(&self) -> Result<Vec<String>> {
        match tokio::fs::read_to_string(&self.key_file).await {
            Ok(content) => {
                let keys: Vec<String> = content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string)
                    .collect();
                info!(
                    "Loaded {} private key(s) from {}",
                    keys.len(),
                    self.key_file.display()
                );
                Ok(keys)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::env_keys()),
            Err(e) => Err(WalletError::IoError {
                path: self.key_file.display().to_string(),
                msg: e.to_string(),
            }
            .into()),
        }
    }

    fn env_keys() -> Vec<String> {
        let mut keys = Vec::new();
        if let Ok(single) = std::env::var("PRIVATE_KEY") {
            if !single.trim().is_empty() {
                keys.push(single.trim().to_string());
            }
        }
        if let Ok(list) = std::env::var("PRIVATE_KEYS") {
            keys.extend(
                list.split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|k| !k.is_empty())
                    .map(str::to_string),
            );
        }
        keys
    }
}

#[async_trait]
impl IdentitySource for WalletManager {
    async fn load_identities(&self) -> Result<Vec<Identity>> {
        let raw = self.raw_keys().await?;
        if raw.is_empty() {
            return Err(ConfigError::NoIdentities {
                reason: format!(
                    "provide {} or env PRIVATE_KEY(S)",
                    self.key_file.display()
                ),
            }
            .into());
        }

        let total = raw.len();
        let mut identities = Vec::with_capacity(total);
        for (line, key) in raw.iter().enumerate() {
            match Identity::parse(key) {
                Ok(identity) => identities.push(identity),
                Err(e) => warn!("Skipping key #{}: {}", line + 1, e),
            }
        }

        info!("Using {}/{} valid key(s) after validation", identities.len(), total);
        Ok(identities)
    }
}
