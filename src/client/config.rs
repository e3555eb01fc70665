//! Client configuration.
//!
//! [`ClientConfig`] is plain serde data so it can be embedded in a larger
//! application config file, or read from the environment with
//! [`ClientConfig::from_env`].

use serde::{Deserialize, Serialize};

use crate::budget::BudgetConfig;

/// Env var holding the per-request price ceiling in satoshis.
pub const ENV_MAX_PER_REQUEST: &str = "L402_MAX_PER_REQUEST";
/// Env var holding the cumulative spend limit in satoshis.
pub const ENV_BUDGET_TOTAL: &str = "L402_BUDGET_TOTAL";
/// Env var holding the budget reset period in milliseconds.
pub const ENV_BUDGET_PERIOD_MS: &str = "L402_BUDGET_PERIOD_MS";
/// Env var selecting the credential cache (`memory` or `disabled`).
pub const ENV_CACHE: &str = "L402_CACHE";

/// Where paid credentials are kept between requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Keep credentials in a process-lifetime map.
    #[default]
    Memory,
    /// Do not cache; every paywalled request pays.
    Disabled,
}

impl std::str::FromStr for CacheMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheMode::Memory),
            "disabled" | "none" | "off" => Ok(CacheMode::Disabled),
            _ => Err(()),
        }
    }
}

/// Settings for [`L402Client`](super::L402Client).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Largest price a single request may pay. `None` means no ceiling.
    #[serde(default)]
    pub max_per_request: Option<u64>,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub cache: CacheMode,
}

impl ClientConfig {
    /// Reads settings from `L402_*` environment variables.
    ///
    /// Unset variables keep their defaults. A variable that is set but does
    /// not parse is an error rather than silently ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let number = |name: &'static str| -> Result<Option<u64>, ConfigError> {
            match lookup(name) {
                None => Ok(None),
                Some(value) => value
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidValue { name, value }),
            }
        };

        let cache = match lookup(ENV_CACHE) {
            None => CacheMode::default(),
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                name: ENV_CACHE,
                value,
            })?,
        };

        Ok(Self {
            max_per_request: number(ENV_MAX_PER_REQUEST)?,
            budget: BudgetConfig {
                total_limit: number(ENV_BUDGET_TOTAL)?,
                period_ms: number(ENV_BUDGET_PERIOD_MS)?,
            },
            cache,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}
