use crate::router::{BanPolicy, Router};
use crate::sizing::SizingConfig;
use anyhow::Result;
use chrono_tz::Tz;
use config::{Config, Environment, File, FileFormat};
use core_logic::config::{check_range, parse_zone};
use core_logic::{ConfigError, GapMode, PacingConfig, QuietHours, RetryConfig, WaveConfig};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

/// Listed as `[[tokens]]` rather than a table: keys are case-folded on load,
/// values are not.
#[derive(Debug, Deserialize, Clone)]
pub struct TokenEntry {
    pub symbol: String,
    pub address: String,
    /// Skips the on-chain `decimals()` lookup.
    pub decimals: Option<u8>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterEntry {
    pub name: String,
    pub address: String,
}

/// Flat, fully defaulted parameters. File values are overridden by
/// environment variables of the same name in upper case (`BATCH_MIN`, ...).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SwapperConfig {
    pub rpc_url: Option<String>,
    /// Comma or whitespace separated.
    pub rpc_urls: Option<String>,
    pub chain_id: u64,
    pub explorer_base: String,
    pub private_key_file: String,
    pub stats_file: String,
    pub balances_file: Option<String>,

    pub native_symbol: String,
    pub wrapped_symbol: String,
    pub stables: Vec<String>,
    pub tokens: Vec<TokenEntry>,
    pub routers: Vec<RouterEntry>,
    /// 1 = wrap/unwrap legs around native swaps, 2 = swap only, no legs.
    pub mode: u8,

    pub concurrency: usize,
    pub swaps_min: u64,
    pub swaps_max: u64,

    pub rand_min: f64,
    pub rand_max: f64,
    pub stable_min: f64,
    pub stable_max: f64,
    pub stable_frac_min: f64,
    pub stable_frac_max: f64,
    pub swap_cap_pct: f64,
    pub abs_cap_enabled: bool,
    pub abs_cap_native: f64,
    pub abs_cap_stable: f64,
    pub abs_cap_other: f64,

    pub global_gap_mode: String,
    pub global_gap_min_sec: u64,
    pub global_gap_max_sec: u64,
    pub global_gap_mean_sec: f64,
    pub extra_gap_min_sec: u64,
    pub extra_gap_max_sec: u64,
    pub gap_noise_max_ms: u64,

    pub start_jitter_min_ms: u64,
    pub start_jitter_max_ms: u64,
    pub iteration_pause_min_ms: u64,
    pub iteration_pause_max_ms: u64,

    pub night_silence: bool,
    pub night_start: u32,
    pub night_end: u32,
    pub time_zone: String,

    pub batch_min: usize,
    /// Defaults to `max(2, concurrency)`.
    pub batch_max: Option<usize>,
    pub wave_min_min: f64,
    pub wave_max_min: f64,
    pub wave_cooldown_min_min: u64,
    pub wave_cooldown_max_min: u64,

    pub router_ban_threshold: u32,
    /// 0 keeps bans for the process lifetime.
    pub router_ban_ttl_secs: u64,

    pub rpc_max_retries: u32,
    pub rpc_base_delay_ms: u64,
    pub receipt_max_retries: u32,
    pub receipt_base_delay_ms: u64,
}

impl Default for SwapperConfig {
    fn default() -> Self {
        let sizing = SizingConfig::default();
        let pacing = PacingConfig::default();
        let wave = WaveConfig::default();
        Self {
            rpc_url: None,
            rpc_urls: None,
            chain_id: 688688,
            explorer_base: "https://testnet.pharosscan.xyz".to_string(),
            private_key_file: "wallets.txt".to_string(),
            stats_file: "data/wallet-stats.json".to_string(),
            balances_file: None,

            native_symbol: "PHRS".to_string(),
            wrapped_symbol: "WPHRS".to_string(),
            stables: ["USD_coin", "tether_usd", "USDC", "USDT"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            tokens: Vec::new(),
            routers: Vec::new(),
            mode: 1,

            concurrency: wave.concurrency,
            swaps_min: 80,
            swaps_max: 137,

            rand_min: sizing.rand_min,
            rand_max: sizing.rand_max,
            stable_min: sizing.stable_min,
            stable_max: sizing.stable_max,
            stable_frac_min: sizing.stable_frac_min,
            stable_frac_max: sizing.stable_frac_max,
            swap_cap_pct: sizing.swap_cap_pct,
            abs_cap_enabled: sizing.abs_cap_enabled,
            abs_cap_native: sizing.abs_cap_native,
            abs_cap_stable: sizing.abs_cap_stable,
            abs_cap_other: sizing.abs_cap_other,

            global_gap_mode: "uniform".to_string(),
            global_gap_min_sec: pacing.gap_min_secs,
            global_gap_max_sec: pacing.gap_max_secs,
            global_gap_mean_sec: pacing.gap_mean_secs,
            extra_gap_min_sec: pacing.extra_min_secs,
            extra_gap_max_sec: pacing.extra_max_secs,
            gap_noise_max_ms: pacing.noise_max_ms,

            start_jitter_min_ms: 0,
            start_jitter_max_ms: 15_000,
            iteration_pause_min_ms: 1_000,
            iteration_pause_max_ms: 3_000,

            night_silence: false,
            night_start: 0,
            night_end: 6,
            time_zone: "Europe/Kyiv".to_string(),

            batch_min: wave.batch_min,
            batch_max: None,
            wave_min_min: wave.duration_min_minutes,
            wave_max_min: wave.duration_max_minutes,
            wave_cooldown_min_min: wave.cooldown_min_minutes,
            wave_cooldown_max_min: wave.cooldown_max_minutes,

            router_ban_threshold: 1,
            router_ban_ttl_secs: 0,

            rpc_max_retries: 5,
            rpc_base_delay_ms: 800,
            receipt_max_retries: 12,
            receipt_base_delay_ms: 1_000,
        }
    }
}

impl SwapperConfig {
    /// Optional TOML file at `path`, then the process environment.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        settings.try_deserialize().map_err(|e| anyhow::anyhow!(e))
    }

    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        settings.try_deserialize().map_err(|e| anyhow::anyhow!(e))
    }

    fn rpc_url_list(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .rpc_urls
            .as_deref()
            .unwrap_or_default()
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect();
        if urls.is_empty() {
            if let Some(url) = self.rpc_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
                urls.push(url.to_string());
            }
        }
        urls
    }

    /// Validate everything once and freeze it into [`Settings`].
    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        let rpc_urls = self.rpc_url_list();
        if rpc_urls.is_empty() {
            return Err(ConfigError::MissingField {
                field: "rpc_urls".to_string(),
            });
        }
        for url in &rpc_urls {
            url::Url::parse(url).map_err(|e| invalid("rpc_urls", format!("{}: {}", url, e)))?;
        }

        let mut tokens = BTreeMap::new();
        let mut decimals = HashMap::new();
        for entry in &self.tokens {
            let address = parse_address(&format!("tokens.{}", entry.symbol), &entry.address)?;
            if tokens.insert(entry.symbol.clone(), address).is_some() {
                return Err(invalid("tokens", format!("duplicate token {}", entry.symbol)));
            }
            if let Some(d) = entry.decimals {
                decimals.insert(entry.symbol.clone(), d);
            }
        }
        if !tokens.contains_key(&self.wrapped_symbol) {
            return Err(ConfigError::MissingField {
                field: format!("tokens.{}", self.wrapped_symbol),
            });
        }
        if tokens.contains_key(&self.native_symbol) {
            return Err(invalid(
                "tokens",
                format!("native {} must not be listed as a token", self.native_symbol),
            ));
        }

        if self.routers.is_empty() {
            return Err(ConfigError::MissingField {
                field: "routers".to_string(),
            });
        }
        let mut routers: Vec<Router> = Vec::with_capacity(self.routers.len());
        for entry in &self.routers {
            if routers.iter().any(|r| r.name.eq_ignore_ascii_case(&entry.name)) {
                return Err(invalid("routers", format!("duplicate router name {}", entry.name)));
            }
            routers.push(Router {
                name: entry.name.clone(),
                address: parse_address(&format!("routers.{}", entry.name), &entry.address)?,
            });
        }

        let mode = match self.mode {
            1 => SwapMode::Standard,
            2 => SwapMode::StablesOnly,
            other => return Err(invalid("mode", format!("expected 1 or 2, got {}", other))),
        };

        if self.swaps_min == 0 {
            return Err(invalid("swaps_min", "must be at least 1"));
        }
        check_range("swaps", self.swaps_min as f64, self.swaps_max as f64)?;
        check_range("rand", self.rand_min, self.rand_max)?;
        check_range("stable", self.stable_min, self.stable_max)?;
        check_range("stable_frac", self.stable_frac_min, self.stable_frac_max)?;
        if !(self.swap_cap_pct > 0.0 && self.swap_cap_pct <= 1.0) {
            return Err(invalid("swap_cap_pct", "must be in (0, 1]"));
        }
        check_range(
            "start_jitter_ms",
            self.start_jitter_min_ms as f64,
            self.start_jitter_max_ms as f64,
        )?;
        check_range(
            "iteration_pause_ms",
            self.iteration_pause_min_ms as f64,
            self.iteration_pause_max_ms as f64,
        )?;
        if self.router_ban_threshold == 0 {
            return Err(invalid("router_ban_threshold", "must be at least 1"));
        }

        let pacing = PacingConfig {
            mode: self.global_gap_mode.parse::<GapMode>()?,
            gap_min_secs: self.global_gap_min_sec,
            gap_max_secs: self.global_gap_max_sec,
            gap_mean_secs: self.global_gap_mean_sec,
            extra_min_secs: self.extra_gap_min_sec,
            extra_max_secs: self.extra_gap_max_sec,
            noise_max_ms: self.gap_noise_max_ms,
            ..PacingConfig::default()
        };
        pacing.validate()?;

        let wave = WaveConfig {
            concurrency: self.concurrency,
            batch_min: self.batch_min,
            batch_max: self.batch_max.unwrap_or_else(|| self.concurrency.max(2)),
            duration_min_minutes: self.wave_min_min,
            duration_max_minutes: self.wave_max_min,
            cooldown_min_minutes: self.wave_cooldown_min_min,
            cooldown_max_minutes: self.wave_cooldown_max_min,
        };
        wave.validate()?;

        let display_zone = parse_zone(&self.time_zone)?;
        let quiet_hours = QuietHours::new(
            self.night_silence,
            self.night_start,
            self.night_end,
            &self.time_zone,
        )?;

        let sizing = SizingConfig {
            rand_min: self.rand_min,
            rand_max: self.rand_max,
            stable_min: self.stable_min,
            stable_max: self.stable_max,
            stable_frac_min: self.stable_frac_min,
            stable_frac_max: self.stable_frac_max,
            swap_cap_pct: self.swap_cap_pct,
            abs_cap_enabled: self.abs_cap_enabled,
            abs_cap_native: self.abs_cap_native,
            abs_cap_stable: self.abs_cap_stable,
            abs_cap_other: self.abs_cap_other,
        };

        Ok(Settings {
            chain_id: self.chain_id,
            rpc_urls,
            explorer_base: self.explorer_base,
            key_file: PathBuf::from(self.private_key_file),
            stats_file: PathBuf::from(self.stats_file),
            balances_file: self.balances_file.map(PathBuf::from),
            assets: AssetSettings {
                native: self.native_symbol,
                wrapped: self.wrapped_symbol,
                stables: self.stables,
                tokens,
                decimals,
            },
            routers,
            mode,
            pacing,
            wave,
            sizing,
            worker: WorkerSettings {
                swaps_min: self.swaps_min,
                swaps_max: self.swaps_max,
                start_jitter_ms: (self.start_jitter_min_ms, self.start_jitter_max_ms),
                iteration_pause_ms: (self.iteration_pause_min_ms, self.iteration_pause_max_ms),
                quiet_hours,
                night_recheck: Duration::from_secs(5 * 60),
            },
            display_zone,
            ban: BanPolicy {
                threshold: self.router_ban_threshold,
                ttl: (self.router_ban_ttl_secs > 0)
                    .then(|| Duration::from_secs(self.router_ban_ttl_secs)),
            },
            rpc_retry: RetryConfig::new(self.rpc_max_retries, self.rpc_base_delay_ms),
            receipt_retry: RetryConfig {
                max_retries: self.receipt_max_retries,
                base_delay_ms: self.receipt_base_delay_ms,
                ..RetryConfig::receipt_polling()
            },
        })
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn parse_address(field: &str, raw: &str) -> Result<Address, ConfigError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| invalid(field, format!("{}: {}", raw, e)))
}

/// How native-asset swaps are carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapMode {
    /// Wrap before native→token swaps, unwrap the received amount after
    /// token→native swaps.
    Standard,
    /// Router swaps only: native legs trade the wrapped balance directly and
    /// the output stays wrapped.
    StablesOnly,
}

#[derive(Debug, Clone)]
pub struct AssetSettings {
    pub native: String,
    pub wrapped: String,
    pub stables: Vec<String>,
    pub tokens: BTreeMap<String, Address>,
    pub decimals: HashMap<String, u8>,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub swaps_min: u64,
    pub swaps_max: u64,
    pub start_jitter_ms: (u64, u64),
    pub iteration_pause_ms: (u64, u64),
    pub quiet_hours: QuietHours,
    pub night_recheck: Duration,
}

/// Validated, immutable runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
    pub explorer_base: String,
    pub key_file: PathBuf,
    pub stats_file: PathBuf,
    pub balances_file: Option<PathBuf>,
    pub assets: AssetSettings,
    pub routers: Vec<Router>,
    pub mode: SwapMode,
    pub pacing: PacingConfig,
    pub wave: WaveConfig,
    pub sizing: SizingConfig,
    pub worker: WorkerSettings,
    pub display_zone: Tz,
    pub ban: BanPolicy,
    pub rpc_retry: RetryConfig,
    pub receipt_retry: RetryConfig,
}
