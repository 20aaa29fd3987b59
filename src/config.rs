//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the fixture API key) are referenced by env-var name in the
//! config and resolved at startup via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub pool: PoolConfig,
    pub database: DatabaseConfig,
    pub fixture_source: FixtureSourceConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    pub name: String,
    /// Display name of the administrator seeded on first start.
    pub admin_name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FixtureSourceConfig {
    pub base_url: String,
    /// Competition code, e.g. `PL`.
    pub competition: String,
    pub api_key_env: String,
    /// Upper bound on one upstream request; expiry counts as unavailable.
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
}

impl FixtureSourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Delays used by the adaptive sync scheduler.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep when no round is current.
    pub no_round_secs: u64,
    /// Assumed kickoff-to-final-whistle length.
    pub match_length_mins: i64,
    /// Poll interval while a fixture is in play and far from its end.
    pub in_play_poll_secs: u64,
    /// Never sleep less than this.
    pub min_sleep_secs: u64,
    /// Wake this long after the next kickoff.
    pub post_kickoff_mins: i64,
    /// Retry when an upcoming fixture should already have kicked off.
    pub overdue_retry_secs: u64,
    /// Sleep when the current round has nothing left to play.
    pub dormant_secs: u64,
    /// Backoff after a failed sync cycle.
    pub error_backoff_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            no_round_secs: 3600,
            match_length_mins: 100,
            in_play_poll_secs: 600,
            min_sleep_secs: 30,
            post_kickoff_mins: 10,
            overdue_retry_secs: 300,
            dormant_secs: 14_400,
            error_backoff_secs: 300,
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_source_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [pool]
        name = "Office LMS"
        admin_name = "Admin"

        [database]
        url = "sqlite://lms.db"

        [fixture_source]
        base_url = "https://api.football-data.org/v4"
        competition = "PL"
        api_key_env = "FOOTBALL_DATA_API_KEY"
    "#;

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let cfg = AppConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.pool.name, "Office LMS");
        assert_eq!(cfg.database.max_connections, 5);
        assert_eq!(cfg.fixture_source.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.scheduler, SchedulerConfig::default());
        assert_eq!(cfg.scheduler.dormant_secs, 14_400);
    }

    #[test]
    fn test_parse_scheduler_override() {
        let toml = format!("{SAMPLE}\n[scheduler]\nin_play_poll_secs = 120\n");
        let cfg = AppConfig::parse(&toml).unwrap();
        assert_eq!(cfg.scheduler.in_play_poll_secs, 120);
        assert_eq!(cfg.scheduler.no_round_secs, 3600);
    }

    #[test]
    fn test_load_config() {
        // Only runs meaningfully when config.toml is in the working directory.
        if let Ok(cfg) = AppConfig::load("config.toml") {
            assert!(!cfg.fixture_source.competition.is_empty());
            assert!(cfg.scheduler.min_sleep_secs > 0);
        }
    }

    #[test]
    fn test_missing_section_is_error() {
        assert!(AppConfig::parse("[pool]\nname = \"x\"\nadmin_name = \"y\"\n").is_err());
    }
}
