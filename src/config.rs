use std::env;
use std::str::FromStr;

use crate::models::BlendWeights;

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telemetry: TelemetryConfig,
    pub calculator: CalculatorConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct CalculatorConfig {
    pub max_concurrency: usize,
    pub weights: BlendWeights,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let max_connections: u32 = parse_or(&lookup, "OBE_DB_MAX_CONNECTIONS", 5)?;
        if max_connections == 0 {
            return Err(ConfigError::Zero {
                key: "OBE_DB_MAX_CONNECTIONS",
            });
        }
        let max_concurrency: usize = parse_or(&lookup, "OBE_MAX_CONCURRENCY", 4)?;
        if max_concurrency == 0 {
            return Err(ConfigError::Zero {
                key: "OBE_MAX_CONCURRENCY",
            });
        }

        let defaults = BlendWeights::default();
        let weights = BlendWeights {
            direct: parse_or(&lookup, "OBE_DIRECT_WEIGHT", defaults.direct)?,
            indirect: parse_or(&lookup, "OBE_INDIRECT_WEIGHT", defaults.indirect)?,
        };

        Ok(Self {
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
                max_connections,
            },
            telemetry: TelemetryConfig {
                log_level: lookup("OBE_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            },
            calculator: CalculatorConfig {
                max_concurrency,
                weights,
            },
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AppConfig::from_lookup(|key| values.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).expect("defaults");
        assert!(config.database.url.is_none());
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.calculator.max_concurrency, 4);
        assert_eq!(config.calculator.weights, BlendWeights::default());
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/obe"),
            ("OBE_DB_MAX_CONNECTIONS", "12"),
            ("OBE_LOG_LEVEL", "debug"),
            ("OBE_DIRECT_WEIGHT", "80"),
            ("OBE_INDIRECT_WEIGHT", " 20 "),
        ])
        .expect("config");
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://localhost/obe")
        );
        assert_eq!(config.database.max_connections, 12);
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.calculator.weights.direct, 80.0);
        assert_eq!(config.calculator.weights.indirect, 20.0);
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let err = config_from(&[("OBE_MAX_CONCURRENCY", "many")]).expect_err("invalid");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "OBE_MAX_CONCURRENCY",
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_pool_size() {
        let err = config_from(&[("OBE_DB_MAX_CONNECTIONS", "0")]).expect_err("zero");
        assert!(matches!(err, ConfigError::Zero { .. }));
    }

    #[test]
    fn blank_database_url_is_unset() {
        let config = config_from(&[("DATABASE_URL", "  ")]).expect("config");
        assert!(config.database.url.is_none());
    }
}
