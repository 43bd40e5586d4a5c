use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub daily_batch_interval_secs: u64,
    pub hourly_batch_interval_secs: u64,
    pub scheduler_enabled: bool,
    pub position_timeout_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn parse_var<T: std::str::FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), expected.to_string()))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_var(&env_map, "PORT", "8080", "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let daily_batch_interval_secs = parse_var(
            &env_map,
            "DAILY_BATCH_INTERVAL_SECS",
            "3600",
            "must be a valid u64",
        )?;
        let hourly_batch_interval_secs = parse_var(
            &env_map,
            "HOURLY_BATCH_INTERVAL_SECS",
            "300",
            "must be a valid u64",
        )?;
        if daily_batch_interval_secs == 0 || hourly_batch_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "DAILY_BATCH_INTERVAL_SECS/HOURLY_BATCH_INTERVAL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let scheduler_enabled = match env_map
            .get("SCHEDULER_ENABLED")
            .map(|s| s.as_str())
            .unwrap_or("true")
        {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "SCHEDULER_ENABLED".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let position_timeout_ms = parse_var(
            &env_map,
            "POSITION_TIMEOUT_MS",
            "5000",
            "must be a valid u64",
        )?;

        Ok(Config {
            port,
            database_path,
            daily_batch_interval_secs,
            hourly_batch_interval_secs,
            scheduler_enabled,
            position_timeout_ms,
        })
    }
}
