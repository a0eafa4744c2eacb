//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{GatewayError, Result};
use crate::networks::NetworkRegistry;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) the pool listing snapshot is rebuilt
    pub refresh_interval_secs: u64,
    /// Networks to aggregate; built-in testnets unless NETWORKS_FILE is set
    pub networks: NetworkRegistry,
    /// Retry policy applied to every JSON-RPC request
    pub rpc_retry: RetryPolicy,
    /// Hex suffix appended to prepared transaction calldata
    pub referral_tag: Option<Vec<u8>>,
    pub verification: VerificationConfig,
}

#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// Third-party proof verifier endpoint. Verification is disabled without it.
    pub verifier_url: Option<String>,
    pub scope: String,
    pub minimum_age: u32,
    pub ofac_check: bool,
    /// ISO 3166 alpha-3 / alpha-2 codes, compared verbatim.
    pub excluded_countries: Vec<String>,
    pub ttl_days: i64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            verifier_url: None,
            scope: "contriboost".to_string(),
            minimum_age: 15,
            ofac_check: false,
            excluded_countries: Vec::new(),
            ttl_days: 90,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let networks = match std::env::var("NETWORKS_FILE") {
            Ok(path) => NetworkRegistry::from_file(&PathBuf::from(path))?,
            Err(_) => NetworkRegistry::builtin(),
        };

        let referral_tag = match std::env::var("REFERRAL_TAG") {
            Ok(tag) if !tag.trim().is_empty() => Some(
                hex::decode(tag.trim().trim_start_matches("0x"))
                    .map_err(|_| GatewayError::Config("Invalid REFERRAL_TAG".to_string()))?,
            ),
            _ => None,
        };

        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./contriboost.db".to_string()),
            api_port: parse_env("API_PORT", "3001")?,
            refresh_interval_secs: parse_env("REFRESH_INTERVAL_SECS", "30")?,
            networks,
            rpc_retry: RetryPolicy {
                max_attempts: parse_env("RPC_MAX_ATTEMPTS", "3")?,
                initial_delay: Duration::from_millis(parse_env("RPC_INITIAL_BACKOFF_MS", "500")?),
                max_delay: Duration::from_secs(10),
            },
            referral_tag,
            verification: VerificationConfig {
                verifier_url: env_var("VERIFIER_URL").ok(),
                scope: env_var("SELF_SCOPE").unwrap_or_else(|_| "contriboost".to_string()),
                minimum_age: parse_env("MINIMUM_AGE", "15")?,
                ofac_check: parse_env("OFAC_CHECK", "false")?,
                excluded_countries: env_var("EXCLUDED_COUNTRIES")
                    .map(|v| parse_list(&v))
                    .unwrap_or_default(),
                ttl_days: parse_env("VERIFICATION_TTL_DAYS", "90")?,
            },
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| GatewayError::Config(format!("Missing env var: {key}")))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str) -> Result<T> {
    env_var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| GatewayError::Config(format!("Invalid {key}")))
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}
