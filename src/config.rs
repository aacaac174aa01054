//! Configuration loading from TOML with credential resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every option has a default, so a file containing only an
//! `[[accounts]]` entry is a complete configuration. Tokens may be given
//! inline, by env-var name, or by file path, and are resolved at startup
//! into `SecretString`s.

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::time::Duration;

use crate::types::{AnglerError, FishingRange};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub fishing: FishingConfig,
    #[serde(default)]
    pub economy: EconomyConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Optional file with one token per line; each becomes an account.
    #[serde(default)]
    pub accounts_file: Option<String>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub ws_url: String,
    /// Sent as `Origin`/`Referer` on HTTP calls.
    pub origin: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.fishingfrenzy.co".to_string(),
            ws_url: "wss://api.fishingfrenzy.co".to_string(),
            origin: "https://fishingfrenzy.co".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// How the scheduler picks a range among the affordable ones.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RangeStrategy {
    /// Uniformly at random.
    #[default]
    Random,
    /// The configured preferred range whenever it is affordable.
    Preferred,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FishingConfig {
    pub range_strategy: RangeStrategy,
    pub preferred_range: FishingRange,
    pub is_5x: bool,
    pub delay_between_fishing_ms: u64,
    pub retry_delay_ms: u64,
    /// Consecutive failures tolerated before backoff escalates.
    pub max_retries: u32,
    pub error_retry_delay_ms: u64,
    pub error_escalated_delay_ms: u64,
    pub energy_refresh_hours: u64,
    pub range_costs: RangeCosts,
}

impl Default for FishingConfig {
    fn default() -> Self {
        Self {
            range_strategy: RangeStrategy::Random,
            preferred_range: FishingRange::Mid,
            is_5x: false,
            delay_between_fishing_ms: 5_000,
            retry_delay_ms: 30_000,
            max_retries: 5,
            error_retry_delay_ms: 10_000,
            error_escalated_delay_ms: 60_000,
            energy_refresh_hours: 24,
            range_costs: RangeCosts::default(),
        }
    }
}

impl FishingConfig {
    pub fn delay_between_fishing(&self) -> Duration {
        Duration::from_millis(self.delay_between_fishing_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn energy_refresh_period(&self) -> chrono::Duration {
        chrono::Duration::hours(self.energy_refresh_hours as i64)
    }
}

/// Energy cost of each range.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RangeCosts {
    pub short_range: u32,
    pub mid_range: u32,
    pub long_range: u32,
}

impl Default for RangeCosts {
    fn default() -> Self {
        Self {
            short_range: 1,
            mid_range: 2,
            long_range: 3,
        }
    }
}

impl RangeCosts {
    pub fn cost(&self, range: FishingRange) -> u32 {
        match range {
            FishingRange::Short => self.short_range,
            FishingRange::Mid => self.mid_range,
            FishingRange::Long => self.long_range,
        }
    }

    /// The range with the lowest configured cost.
    pub fn cheapest(&self) -> FishingRange {
        FishingRange::ALL
            .iter()
            .copied()
            .min_by_key(|r| self.cost(*r))
            .unwrap_or(FishingRange::Short)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EconomyConfig {
    pub enable_daily_claim: bool,
    pub enable_auto_sell: bool,
    /// Fish below this quality are sold.
    pub min_fish_quality_to_keep: u8,
    /// Catches between sell-offs.
    pub sell_fish_interval: u32,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            enable_daily_claim: true,
            enable_auto_sell: true,
            min_fish_quality_to_keep: 3,
            sell_fish_interval: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            reconnect_delay_ms: 5_000,
            max_reconnect_attempts: 3,
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Pause between starting consecutive account schedulers.
    pub start_stagger_ms: u64,
    /// Pause before restarting everything after a top-level failure.
    pub restart_delay_ms: u64,
    /// Pause before restarting a single crashed account.
    pub account_restart_delay_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            start_stagger_ms: 5_000,
            restart_delay_ms: 60_000,
            account_restart_delay_ms: 60_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// debug | info | warn | error
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// One `[[accounts]]` entry.
#[derive(Deserialize, Clone)]
pub struct AccountConfig {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub overrides: AccountOverrides,
}

fn default_true() -> bool {
    true
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("label", &self.label)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("token_env", &self.token_env)
            .field("token_file", &self.token_file)
            .field("enabled", &self.enabled)
            .field("overrides", &self.overrides)
            .finish()
    }
}

/// Per-account settings that replace the global defaults when present.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AccountOverrides {
    pub preferred_range: Option<FishingRange>,
    pub range_strategy: Option<RangeStrategy>,
    pub is_5x: Option<bool>,
    pub enable_auto_sell: Option<bool>,
    pub enable_daily_claim: Option<bool>,
    pub min_fish_quality_to_keep: Option<u8>,
    pub sell_fish_interval: Option<u32>,
    pub delay_between_fishing_ms: Option<u64>,
    pub retry_delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub session_timeout_ms: Option<u64>,
}

/// The settings one account actually runs with.
#[derive(Debug, Clone, Default)]
pub struct AccountSettings {
    pub fishing: FishingConfig,
    pub economy: EconomyConfig,
    pub session: SessionConfig,
}

impl AccountOverrides {
    /// Layer these overrides on top of `base`.
    pub fn apply(&self, base: &AccountSettings) -> AccountSettings {
        let mut s = base.clone();
        if let Some(v) = self.preferred_range {
            s.fishing.preferred_range = v;
        }
        if let Some(v) = self.range_strategy {
            s.fishing.range_strategy = v;
        }
        if let Some(v) = self.is_5x {
            s.fishing.is_5x = v;
        }
        if let Some(v) = self.delay_between_fishing_ms {
            s.fishing.delay_between_fishing_ms = v;
        }
        if let Some(v) = self.retry_delay_ms {
            s.fishing.retry_delay_ms = v;
        }
        if let Some(v) = self.max_retries {
            s.fishing.max_retries = v;
        }
        if let Some(v) = self.enable_auto_sell {
            s.economy.enable_auto_sell = v;
        }
        if let Some(v) = self.enable_daily_claim {
            s.economy.enable_daily_claim = v;
        }
        if let Some(v) = self.min_fish_quality_to_keep {
            s.economy.min_fish_quality_to_keep = v;
        }
        if let Some(v) = self.sell_fish_interval {
            s.economy.sell_fish_interval = v;
        }
        if let Some(v) = self.session_timeout_ms {
            s.session.timeout_ms = v;
        }
        s
    }
}

/// A fully resolved, enabled account ready to be scheduled.
pub struct AccountProfile {
    pub label: String,
    pub token: SecretString,
    pub settings: AccountSettings,
}

impl Clone for AccountProfile {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            token: SecretString::new(self.token.expose_secret().clone()),
            settings: self.settings.clone(),
        }
    }
}

impl fmt::Debug for AccountProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountProfile")
            .field("label", &self.label)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Global defaults every account starts from.
    pub fn base_settings(&self) -> AccountSettings {
        AccountSettings {
            fishing: self.fishing.clone(),
            economy: self.economy.clone(),
            session: self.session.clone(),
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() || self.api.ws_url.trim().is_empty() {
            return Err(AnglerError::Config("api.base_url and api.ws_url must be set".into()).into());
        }
        validate_settings("global", &self.base_settings())?;
        for (i, account) in self.accounts.iter().enumerate() {
            let label = account_label(account, i);
            validate_settings(&label, &account.overrides.apply(&self.base_settings()))?;
        }
        Ok(())
    }

    /// Resolve every enabled account into a profile with its token.
    ///
    /// Fails if any enabled account has no resolvable token, or if no
    /// enabled account exists at all.
    pub fn resolve_accounts(&self) -> Result<Vec<AccountProfile>> {
        let base = self.base_settings();
        let mut profiles = Vec::new();

        for (i, account) in self.accounts.iter().enumerate() {
            if !account.enabled {
                continue;
            }
            let label = account_label(account, i);
            let token = resolve_token(account, &label)?;
            profiles.push(AccountProfile {
                label,
                token,
                settings: account.overrides.apply(&base),
            });
        }

        if let Some(path) = &self.accounts_file {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read accounts file: {path}"))?;
            let offset = profiles.len();
            for (i, token) in parse_token_lines(&contents).into_iter().enumerate() {
                profiles.push(AccountProfile {
                    label: format!("account-{}", offset + i + 1),
                    token: SecretString::new(token),
                    settings: base.clone(),
                });
            }
        }

        if profiles.is_empty() {
            return Err(AnglerError::Config("no enabled accounts configured".into()).into());
        }
        Ok(profiles)
    }
}

fn account_label(account: &AccountConfig, index: usize) -> String {
    account
        .label
        .clone()
        .unwrap_or_else(|| format!("account-{}", index + 1))
}

/// Upper bound for `energy_refresh_hours` (one week).
const MAX_ENERGY_REFRESH_HOURS: u64 = 168;

fn validate_settings(scope: &str, s: &AccountSettings) -> Result<()> {
    let q = s.economy.min_fish_quality_to_keep;
    if !(1..=5).contains(&q) {
        return Err(AnglerError::Config(format!(
            "{scope}: min_fish_quality_to_keep must be 1..=5, got {q}"
        ))
        .into());
    }
    if s.economy.sell_fish_interval == 0 {
        return Err(AnglerError::Config(format!("{scope}: sell_fish_interval must be >= 1")).into());
    }
    let hours = s.fishing.energy_refresh_hours;
    if !(1..=MAX_ENERGY_REFRESH_HOURS).contains(&hours) {
        return Err(AnglerError::Config(format!(
            "{scope}: energy_refresh_hours must be 1..={MAX_ENERGY_REFRESH_HOURS}, got {hours}"
        ))
        .into());
    }
    if s.session.timeout_ms == 0 {
        return Err(AnglerError::Config(format!("{scope}: session timeout_ms must be >= 1")).into());
    }
    let costs = s.fishing.range_costs;
    if FishingRange::ALL.iter().any(|r| costs.cost(*r) == 0) {
        return Err(AnglerError::Config(format!("{scope}: range costs must be >= 1")).into());
    }
    Ok(())
}

fn resolve_token(account: &AccountConfig, label: &str) -> Result<SecretString> {
    let credential_err = |message: String| AnglerError::Credential {
        account: label.to_string(),
        message,
    };

    let raw = if let Some(token) = &account.token {
        token.clone()
    } else if let Some(env) = &account.token_env {
        std::env::var(env)
            .map_err(|_| credential_err(format!("environment variable not set: {env}")))?
    } else if let Some(path) = &account.token_file {
        fs::read_to_string(path)
            .map_err(|e| credential_err(format!("cannot read token file {path}: {e}")))?
    } else {
        return Err(credential_err("no token, token_env or token_file given".into()).into());
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(credential_err("token is empty".into()).into());
    }
    Ok(SecretString::new(trimmed.to_string()))
}

/// One token per non-empty line; lines starting with `#` are comments.
fn parse_token_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}
