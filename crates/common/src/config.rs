use std::fs;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on rows per output batch for materializing operators.
    pub batch_size_rows: usize,
    /// Database created at startup and selected by new sessions.
    pub default_database: String,
    /// Joins whose smaller input has at most this many rows get a nested-loop hint.
    pub nested_loop_join_max_rows: u64,
    /// Distinct-count statistics are computed only for tables up to this many rows.
    pub distinct_stats_max_rows: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size_rows: 8192,
            default_database: "default".to_string(),
            nested_loop_join_max_rows: 64,
            distinct_stats_max_rows: 100_000,
        }
    }
}

impl EngineConfig {
    pub fn load_from_json(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: EngineConfig =
            serde_json::from_str(&s).map_err(|e| TesseraError::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies `TESSERA_*` environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_parse::<usize>("TESSERA_BATCH_SIZE_ROWS")? {
            self.batch_size_rows = v;
        }
        if let Ok(v) = std::env::var("TESSERA_DEFAULT_DATABASE") {
            self.default_database = v;
        }
        if let Some(v) = env_parse::<u64>("TESSERA_NESTED_LOOP_JOIN_MAX_ROWS")? {
            self.nested_loop_join_max_rows = v;
        }
        if let Some(v) = env_parse::<u64>("TESSERA_DISTINCT_STATS_MAX_ROWS")? {
            self.distinct_stats_max_rows = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size_rows == 0 {
            return Err(TesseraError::InvalidConfig(
                "batch_size_rows must be greater than zero".to_string(),
            ));
        }
        if self.default_database.trim().is_empty() {
            return Err(TesseraError::InvalidConfig(
                "default_database must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| TesseraError::InvalidConfig(format!("{key} has invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().expect("valid default");
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"batch_size_rows": 16}"#).expect("parse config");
        assert_eq!(cfg.batch_size_rows, 16);
        assert_eq!(cfg.default_database, "default");
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let cfg = EngineConfig {
            batch_size_rows: 0,
            ..EngineConfig::default()
        };
        let err = cfg.validate().expect_err("zero batch size");
        assert!(err.to_string().contains("batch_size_rows"));
    }
}
