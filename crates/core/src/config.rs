use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration, loaded from `tally.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    pub matching: MatchingConfig,
    pub fx: FxConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum fuzzy score for a pattern to be accepted.
    pub fuzzy_threshold: f32,
    /// How many scored candidates an unmatched diagnostic keeps.
    pub diagnostic_candidates: usize,
    /// Concurrent storage writes while learning patterns.
    pub learn_batch_width: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.85,
            diagnostic_candidates: 5,
            learn_batch_width: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    /// A stored rate older than this (relative to the requested date) triggers a live fetch.
    pub max_rate_age_days: i64,
    /// How many days the central-bank archive is walked back over non-trading days.
    pub archive_max_steps: u32,
    /// In-flight lookups allowed during a bulk conversion.
    pub conversion_concurrency: usize,
    pub request_timeout_secs: u64,
    pub frankfurter_url: String,
    pub cbr_archive_url: String,
    /// Currency every archive value is quoted against.
    pub reference_currency: String,
    /// Currencies routed to the central-bank archive first.
    pub cis_currencies: Vec<String>,
    /// Base currency for the daily refresh job.
    pub refresh_base_currency: String,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            max_rate_age_days: 6,
            archive_max_steps: 14,
            conversion_concurrency: 3,
            request_timeout_secs: 10,
            frankfurter_url: "https://api.frankfurter.app".to_string(),
            cbr_archive_url: "https://www.cbr-xml-daily.ru/archive".to_string(),
            reference_currency: "RUB".to_string(),
            cis_currencies: ["RUB", "KZT", "BYN", "UAH", "AMD", "AZN", "KGS", "UZS", "TJS", "MDL", "GEL"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            refresh_base_currency: "USD".to_string(),
        }
    }
}

impl FxConfig {
    pub fn is_cis(&self, code: &str) -> bool {
        self.cis_currencies.iter().any(|c| c.eq_ignore_ascii_case(code))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("tally.db"),
        }
    }
}

impl TallyConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: TallyConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` if it exists, otherwise returns the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.matching.fuzzy_threshold) {
            return Err(ConfigError::Invalid(format!(
                "matching.fuzzy_threshold must be within [0, 1], got {}",
                self.matching.fuzzy_threshold
            )));
        }
        if self.matching.learn_batch_width == 0 || self.fx.conversion_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "batch widths must be at least 1".to_string(),
            ));
        }
        if self.fx.archive_max_steps == 0 {
            return Err(ConfigError::Invalid(
                "fx.archive_max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = TallyConfig::from_toml("").unwrap();
        assert_eq!(config, TallyConfig::default());
        assert_eq!(config.matching.fuzzy_threshold, 0.85);
        assert_eq!(config.fx.max_rate_age_days, 6);
        assert_eq!(config.fx.archive_max_steps, 14);
    }

    #[test]
    fn partial_override() {
        let config = TallyConfig::from_toml(
            r#"
            [matching]
            fuzzy_threshold = 0.9

            [fx]
            cis_currencies = ["RUB", "KZT"]
            "#,
        )
        .unwrap();
        assert_eq!(config.matching.fuzzy_threshold, 0.9);
        assert_eq!(config.matching.diagnostic_candidates, 5);
        assert!(config.fx.is_cis("kzt"));
        assert!(!config.fx.is_cis("GEL"));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = TallyConfig::from_toml("[matching]\nfuzzy_threshold = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TallyConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, TallyConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tally.toml");
        std::fs::write(&path, "[storage]\ndatabase = \"/tmp/x.db\"\n").unwrap();
        let config = TallyConfig::load(&path).unwrap();
        assert_eq!(config.storage.database, PathBuf::from("/tmp/x.db"));
    }
}
