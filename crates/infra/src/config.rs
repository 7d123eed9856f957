//! Runtime configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const ENV_KPI_WINDOW_DAYS: &str = "STOREPULSE_KPI_WINDOW_DAYS";
pub const ENV_TOP_PRODUCTS_LIMIT: &str = "STOREPULSE_TOP_PRODUCTS_LIMIT";
pub const ENV_SUMMARY_TTL_SECS: &str = "STOREPULSE_SUMMARY_TTL_SECS";
pub const ENV_REVENUE_TTL_SECS: &str = "STOREPULSE_REVENUE_TTL_SECS";
pub const ENV_TOP_PRODUCTS_TTL_SECS: &str = "STOREPULSE_TOP_PRODUCTS_TTL_SECS";
pub const ENV_DEFAULT_TTL_SECS: &str = "STOREPULSE_DEFAULT_TTL_SECS";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be greater than zero")]
    MustBePositive { name: &'static str },
}

/// Time-to-live per KPI family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Composite summary (`calculate_all`).
    pub summary: Duration,
    /// Revenue metrics and the single revenue total.
    pub revenue: Duration,
    pub top_products: Duration,
    /// Everything else.
    pub default: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            summary: Duration::from_secs(300),
            revenue: Duration::from_secs(180),
            top_products: Duration::from_secs(600),
            default: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsConfig {
    /// Trailing window (days) recomputed after each mutation.
    pub kpi_window_days: u32,
    /// Ranking size in the composite summary.
    pub top_products_limit: usize,
    pub ttls: CacheTtls,
    /// Postgres connection string; in-memory storage when unset.
    pub database_url: Option<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            kpi_window_days: 30,
            top_products_limit: 5,
            ttls: CacheTtls::default(),
            database_url: None,
        }
    }
}

impl AnalyticsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unparsable values are logged
    /// and replaced by their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let secs = |name: &str, fallback: Duration| {
            Duration::from_secs(parse_or(&lookup, name, fallback.as_secs()))
        };

        let config = Self {
            kpi_window_days: parse_or(&lookup, ENV_KPI_WINDOW_DAYS, defaults.kpi_window_days),
            top_products_limit: parse_or(
                &lookup,
                ENV_TOP_PRODUCTS_LIMIT,
                defaults.top_products_limit,
            ),
            ttls: CacheTtls {
                summary: secs(ENV_SUMMARY_TTL_SECS, defaults.ttls.summary),
                revenue: secs(ENV_REVENUE_TTL_SECS, defaults.ttls.revenue),
                top_products: secs(ENV_TOP_PRODUCTS_TTL_SECS, defaults.ttls.top_products),
                default: secs(ENV_DEFAULT_TTL_SECS, defaults.ttls.default),
            },
            database_url: lookup(ENV_DATABASE_URL).filter(|url| !url.trim().is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kpi_window_days == 0 {
            return Err(ConfigError::MustBePositive {
                name: ENV_KPI_WINDOW_DAYS,
            });
        }
        if self.top_products_limit == 0 {
            return Err(ConfigError::MustBePositive {
                name: ENV_TOP_PRODUCTS_LIMIT,
            });
        }
        Ok(())
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr + Copy + core::fmt::Display,
{
    match lookup(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("{name}={raw:?} is not valid; using default {default}");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = AnalyticsConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AnalyticsConfig::default());
        assert_eq!(config.ttls.top_products, Duration::from_secs(600));
    }

    #[test]
    fn overrides_are_applied() {
        let config = AnalyticsConfig::from_lookup(lookup(&[
            (ENV_KPI_WINDOW_DAYS, "7"),
            (ENV_REVENUE_TTL_SECS, " 60 "),
            (ENV_DATABASE_URL, "postgres://localhost/storepulse"),
        ]))
        .unwrap();
        assert_eq!(config.kpi_window_days, 7);
        assert_eq!(config.ttls.revenue, Duration::from_secs(60));
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/storepulse"));
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let config =
            AnalyticsConfig::from_lookup(lookup(&[(ENV_TOP_PRODUCTS_LIMIT, "lots")])).unwrap();
        assert_eq!(config.top_products_limit, 5);
    }

    #[test]
    fn zero_window_is_rejected() {
        let err = AnalyticsConfig::from_lookup(lookup(&[(ENV_KPI_WINDOW_DAYS, "0")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MustBePositive {
                name: ENV_KPI_WINDOW_DAYS
            }
        );
    }
}
