use anyhow::{bail, Context, Result};
use attest_rewards::{default_rank_rewards, RewardConfig, RewardContext};
use attest_types::{Address, DeviceAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

/// Oracle posting the `timestamp` data feed on the main network.
pub const DEFAULT_TIMESTAMP_ORACLE: &str = "I2ADHGP4HL6J37NQAD73J7E5SKFIXJOT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub data_dir: PathBuf,
    pub name: String,
    /// JSON ledger fixture loaded into the in-process ledger at startup.
    #[serde(default)]
    pub ledger_fixture: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    pub max_referral_depth: u32,
    pub signing_reward_share: f64,
    pub reward_contract_share: f64,
    pub referral_reward_contract_share: f64,
    pub native_units_per_usd: f64,
    pub contract_term_years: u32,
    pub contract_unclaimed_term_years: u32,
    pub timestamp_oracle_address: String,
    pub retry_batch_size: usize,
    pub profile_salt: String,
    #[serde(default = "default_rank_rewards")]
    pub rank_rewards_usd: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub retry_interval_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub attestor_address: String,
    #[serde(default)]
    pub distribution_address: Option<String>,
    pub bot_device_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
    #[serde(default)]
    pub file_output: Option<PathBuf>,
    #[serde(default)]
    pub module_filters: BTreeMap<String, String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: 60,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: None,
            module_filters: BTreeMap::new(),
        }
    }
}

impl IdentityConfig {
    /// Deterministic identity for a local node without a real wallet.
    pub fn dev(name: &str) -> Self {
        Self {
            attestor_address: Address::derive(format!("{}/attestor", name).as_bytes()).to_string(),
            distribution_address: Some(
                Address::derive(format!("{}/distribution", name).as_bytes()).to_string(),
            ),
            bot_device_address: DeviceAddress::derive(name.as_bytes()).to_string(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        let name = "attest-node".to_string();
        Self {
            node: NodeSettings {
                data_dir: PathBuf::from("./data"),
                name: name.clone(),
                ledger_fixture: None,
            },
            rewards: RewardsConfig {
                max_referral_depth: 5,
                signing_reward_share: 1.0,
                reward_contract_share: 0.5,
                referral_reward_contract_share: 0.75,
                native_units_per_usd: 50_000_000.0,
                contract_term_years: 1,
                contract_unclaimed_term_years: 2,
                timestamp_oracle_address: DEFAULT_TIMESTAMP_ORACLE.to_string(),
                retry_batch_size: 5,
                profile_salt: String::new(),
                rank_rewards_usd: default_rank_rewards(),
            },
            scheduler: SchedulerConfig::default(),
            identity: IdentityConfig::dev(&name),
            logging: LoggingConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults, then `path` if given, then `ATTEST_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Some(data_dir) = non_empty_env("ATTEST_DATA_DIR") {
            self.node.data_dir = PathBuf::from(data_dir);
        }
        if let Some(name) = non_empty_env("ATTEST_NODE_NAME") {
            self.node.name = name;
        }
        if let Some(fixture) = non_empty_env("ATTEST_LEDGER_FIXTURE") {
            self.node.ledger_fixture = Some(PathBuf::from(fixture));
        }

        // Reward policy
        if let Some(depth) = parse_env("ATTEST_MAX_REFERRAL_DEPTH") {
            self.rewards.max_referral_depth = depth;
        }
        if let Some(price) = parse_env("ATTEST_NATIVE_UNITS_PER_USD") {
            self.rewards.native_units_per_usd = price;
        }
        if let Some(share) = parse_env("ATTEST_SIGNING_REWARD_SHARE") {
            self.rewards.signing_reward_share = share;
        }
        if let Some(salt) = non_empty_env("ATTEST_PROFILE_SALT") {
            self.rewards.profile_salt = salt;
        }
        if let Some(oracle) = non_empty_env("ATTEST_TIMESTAMP_ORACLE_ADDRESS") {
            self.rewards.timestamp_oracle_address = oracle;
        }

        // Scheduler
        if let Some(secs) = parse_env("ATTEST_RETRY_INTERVAL_SECS") {
            self.scheduler.retry_interval_secs = secs;
        }
        if let Some(secs) = parse_env("ATTEST_SWEEP_INTERVAL_SECS") {
            self.scheduler.sweep_interval_secs = secs;
        }

        // Identity
        if let Some(address) = non_empty_env("ATTEST_ATTESTOR_ADDRESS") {
            self.identity.attestor_address = address;
        }
        if let Some(address) = non_empty_env("ATTEST_DISTRIBUTION_ADDRESS") {
            self.identity.distribution_address = Some(address);
        }
        if let Some(device) = non_empty_env("ATTEST_BOT_DEVICE_ADDRESS") {
            self.identity.bot_device_address = device;
        }

        if let Some(level) = non_empty_env("ATTEST_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.to_reward_config()?
            .validate()
            .context("invalid [rewards] section")?;
        self.parse_identity()?;
        if self.scheduler.retry_interval_secs == 0 || self.scheduler.sweep_interval_secs == 0 {
            bail!("scheduler intervals must be at least one second");
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "compact" | "json") {
            bail!("unknown log format {}", self.logging.format);
        }
        Ok(())
    }

    pub fn to_reward_config(&self) -> Result<RewardConfig> {
        let rewards = &self.rewards;
        let oracle = Address::parse(&rewards.timestamp_oracle_address)
            .context("invalid rewards.timestamp_oracle_address")?;

        let mut config = RewardConfig::new(oracle);
        config.max_referral_depth = rewards.max_referral_depth;
        config.rank_rewards_usd = rewards.rank_rewards_usd.clone();
        config.signing_reward_share = rewards.signing_reward_share;
        config.reward_contract_share = rewards.reward_contract_share;
        config.referral_reward_contract_share = rewards.referral_reward_contract_share;
        config.native_units_per_usd = rewards.native_units_per_usd;
        config.contract_term_years = rewards.contract_term_years;
        config.contract_unclaimed_term_years = rewards.contract_unclaimed_term_years;
        config.retry_batch_size = rewards.retry_batch_size;
        config.profile_salt = rewards.profile_salt.clone();
        Ok(config)
    }

    fn parse_identity(&self) -> Result<(Address, Option<Address>, DeviceAddress)> {
        let identity = &self.identity;
        let attestor = Address::parse(&identity.attestor_address)
            .context("invalid identity.attestor_address")?;
        let distribution = identity
            .distribution_address
            .as_deref()
            .map(Address::parse)
            .transpose()
            .context("invalid identity.distribution_address")?;
        let device = DeviceAddress::parse(&identity.bot_device_address)
            .context("invalid identity.bot_device_address")?;
        Ok((attestor, distribution, device))
    }

    pub fn to_context(&self) -> Result<RewardContext> {
        let (attestor, distribution, device) = self.parse_identity()?;
        Ok(RewardContext::new(
            self.to_reward_config()?,
            attestor,
            distribution,
            device,
        )?)
    }

    pub fn storage_path(&self) -> PathBuf {
        self.node.data_dir.join("rewards.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = NodeConfig::default();
        config.validate().unwrap();

        let context = config.to_context().unwrap();
        assert_eq!(context.config.max_referral_depth, 5);
        assert_eq!(context.config.retry_batch_size, 5);
        assert!(context.distribution_address.is_some());
        assert_eq!(
            context.config.timestamp_oracle_address.as_str(),
            DEFAULT_TIMESTAMP_ORACLE
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = NodeConfig::default();
        config.rewards.reward_contract_share = 1.5;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.identity.attestor_address = "not-an-address".to_string();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.rewards.max_referral_depth = 0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.scheduler.sweep_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("ATTEST_MAX_REFERRAL_DEPTH", "9");
        env::set_var("ATTEST_RETRY_INTERVAL_SECS", "15");
        env::set_var("ATTEST_PROFILE_SALT", "pepper");

        let mut config = NodeConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.rewards.max_referral_depth, 9);
        assert_eq!(config.scheduler.retry_interval_secs, 15);
        assert_eq!(config.rewards.profile_salt, "pepper");

        env::remove_var("ATTEST_MAX_REFERRAL_DEPTH");
        env::remove_var("ATTEST_RETRY_INTERVAL_SECS");
        env::remove_var("ATTEST_PROFILE_SALT");
    }
}
