use attest_node::cli::run_init;
use attest_node::config::IdentityConfig;
use attest_node::NodeConfig;
use tempfile::TempDir;

#[test]
fn test_init_writes_loadable_config() {
    let dir = TempDir::new().unwrap();
    let path = run_init(dir.path(), Some("forum-bot".to_string())).unwrap();
    assert!(path.exists());

    let config = NodeConfig::from_file(&path).expect("Should load written config");
    config.validate().unwrap();
    assert_eq!(config.node.name, "forum-bot");
    assert_eq!(
        config.identity.attestor_address,
        IdentityConfig::dev("forum-bot").attestor_address
    );

    // Rank names with spaces and dots survive the TOML round trip
    assert_eq!(config.rewards.rank_rewards_usd.get("Sr. Member"), Some(&0.15));
    assert_eq!(config.rewards.rank_rewards_usd.len(), 15);
}

#[test]
fn test_partial_file_uses_section_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("attest-config.toml");
    std::fs::write(
        &path,
        r#"
[node]
data_dir = "/var/lib/attest"
name = "bot"

[rewards]
max_referral_depth = 3
signing_reward_share = 0.8
reward_contract_share = 0.5
referral_reward_contract_share = 0.75
native_units_per_usd = 40000000.0
contract_term_years = 1
contract_unclaimed_term_years = 2
timestamp_oracle_address = "I2ADHGP4HL6J37NQAD73J7E5SKFIXJOT"
retry_batch_size = 5
profile_salt = "salt"

[identity]
attestor_address = "I2ADHGP4HL6J37NQAD73J7E5SKFIXJOT"
bot_device_address = "0I2ADHGP4HL6J37NQAD73J7E5SKFIXJOT"
"#,
    )
    .unwrap();

    let loaded = NodeConfig::from_file(&path).unwrap();
    loaded.validate().unwrap();
    assert_eq!(loaded.rewards.max_referral_depth, 3);
    assert_eq!(loaded.rewards.rank_rewards_usd.get("Hero Member"), Some(&0.175));
    assert_eq!(loaded.scheduler.retry_interval_secs, 60);
    assert_eq!(loaded.logging.format, "pretty");
    assert!(loaded.identity.distribution_address.is_none());
    assert!(loaded.node.ledger_fixture.is_none());
}

#[test]
fn test_reward_config_conversion() {
    let mut config = NodeConfig::default();
    config.rewards.referral_reward_contract_share = 0.6;
    config.rewards.profile_salt = "salt".to_string();
    config.identity.distribution_address = None;

    let context = config.to_context().unwrap();
    assert_eq!(context.config.referral_reward_contract_share, 0.6);
    assert_eq!(context.config.profile_salt, "salt");
    assert!(context.distribution_address.is_none());
}

#[test]
fn test_bad_oracle_rejected() {
    let mut config = NodeConfig::default();
    config.rewards.timestamp_oracle_address = "oracle".to_string();
    assert!(config.validate().is_err());
    assert!(config.to_reward_config().is_err());
}
