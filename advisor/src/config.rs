//! Analysis configuration.
//!
//! Every heuristic threshold the engine consumes is a configuration value
//! with the documented default, so the rule set stays table-driven and
//! independently testable. Loading order: optional `advisor.toml`, then
//! `ADVISOR_*` environment overrides, then validation.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{AdvisorError, AdvisorResult};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    pub report: ReportConfig,
    pub cardinality: CardinalityConfig,
    pub heuristics: HeuristicsConfig,
    pub coverage: CoverageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Size of the ranked operator lists.
    pub top_operators: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CardinalityConfig {
    /// Flag operators whose estimate-vs-actual ratio reaches this value.
    pub mismatch_ratio: f64,
    /// Ignore operators where both row counts stay under this floor.
    pub min_rows: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeuristicsConfig {
    /// Nested-loop joins producing at least this many rows.
    pub nested_loop_rows: u64,
    /// Hash-match operators producing at least this many rows.
    pub hash_join_rows: u64,
    /// Minimum total rows before worker skew is considered.
    pub skew_min_rows: u64,
    /// Max/avg worker-row ratio that counts as skew.
    pub skew_ratio: f64,
    /// Sorts handling at least this many rows.
    pub big_sort_rows: u64,
    /// Hash operators handling at least this many rows.
    pub big_hash_rows: u64,
    /// Table spools re-executed at least this many times.
    pub spool_executions: u64,
    /// Key/RID lookups executed at least this many times.
    pub lookup_executions: u64,
    /// Keywords counted over the raw document text.
    pub spill_keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Modification-to-row ratio that marks statistics stale.
    pub stale_modification_ratio: f64,
    /// Minimum modifications for the ratio check to apply.
    pub stale_min_modifications: u64,
    /// Age in days that marks statistics stale.
    pub stale_age_days: i64,
    /// Minimum modifications for the age check to apply.
    pub stale_age_min_modifications: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { top_operators: 5 }
    }
}

impl Default for CardinalityConfig {
    fn default() -> Self {
        Self { mismatch_ratio: 10.0, min_rows: 10.0 }
    }
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            nested_loop_rows: 10_000,
            hash_join_rows: 200_000,
            skew_min_rows: 5_000,
            skew_ratio: 5.0,
            big_sort_rows: 100_000,
            big_hash_rows: 200_000,
            spool_executions: 1_000,
            lookup_executions: 10_000,
            spill_keywords: vec![
                "Spill".to_string(),
                "SpillToTempDb".to_string(),
                "SpillOccurred".to_string(),
            ],
        }
    }
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            stale_modification_ratio: 0.20,
            stale_min_modifications: 500,
            stale_age_days: 30,
            stale_age_min_modifications: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,sqlplan_advisor=debug".to_string() }
    }
}

impl AnalysisConfig {
    /// Load configuration with environment variable override support.
    ///
    /// Loading order:
    /// 1. Load from an `advisor.toml` file (explicit path or discovery)
    /// 2. Override with `ADVISOR_*` environment variables
    /// 3. Validate the final configuration
    pub fn load(path: Option<&str>) -> AdvisorResult<Self> {
        let mut config = match path.map(str::to_string).or_else(Self::find_config_file) {
            Some(config_path) => Self::from_toml(&config_path)?,
            None => {
                tracing::debug!("no configuration file found, using defaults");
                AnalysisConfig::default()
            },
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - ADVISOR_TOP_OPERATORS: ranked list size
    /// - ADVISOR_MISMATCH_RATIO: cardinality mismatch ratio threshold
    /// - ADVISOR_MIN_ROWS: cardinality minimum-rows floor
    /// - ADVISOR_LOOKUP_EXECUTIONS: expensive-lookup execution threshold
    /// - ADVISOR_LOG_LEVEL: logging filter (e.g. "info,sqlplan_advisor=debug")
    fn apply_env_overrides(&mut self) {
        if let Ok(top) = std::env::var("ADVISOR_TOP_OPERATORS") {
            match top.parse() {
                Ok(val) => {
                    self.report.top_operators = val;
                    tracing::info!("override report.top_operators from env: {}", val);
                },
                Err(_) => tracing::warn!("invalid ADVISOR_TOP_OPERATORS '{}', keeping {}", top, self.report.top_operators),
            }
        }

        if let Ok(ratio) = std::env::var("ADVISOR_MISMATCH_RATIO") {
            match ratio.parse() {
                Ok(val) => {
                    self.cardinality.mismatch_ratio = val;
                    tracing::info!("override cardinality.mismatch_ratio from env: {}", val);
                },
                Err(_) => tracing::warn!("invalid ADVISOR_MISMATCH_RATIO '{}', keeping {}", ratio, self.cardinality.mismatch_ratio),
            }
        }

        if let Ok(rows) = std::env::var("ADVISOR_MIN_ROWS") {
            match rows.parse() {
                Ok(val) => {
                    self.cardinality.min_rows = val;
                    tracing::info!("override cardinality.min_rows from env: {}", val);
                },
                Err(_) => tracing::warn!("invalid ADVISOR_MIN_ROWS '{}', keeping {}", rows, self.cardinality.min_rows),
            }
        }

        if let Ok(execs) = std::env::var("ADVISOR_LOOKUP_EXECUTIONS") {
            match execs.parse() {
                Ok(val) => {
                    self.heuristics.lookup_executions = val;
                    tracing::info!("override heuristics.lookup_executions from env: {}", val);
                },
                Err(_) => tracing::warn!("invalid ADVISOR_LOOKUP_EXECUTIONS '{}', keeping {}", execs, self.heuristics.lookup_executions),
            }
        }

        if let Ok(level) = std::env::var("ADVISOR_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate configuration.
    fn validate(&self) -> AdvisorResult<()> {
        if self.report.top_operators == 0 {
            return Err(AdvisorError::config("report.top_operators must be > 0"));
        }
        if self.cardinality.mismatch_ratio < 1.0 {
            return Err(AdvisorError::config("cardinality.mismatch_ratio must be >= 1"));
        }
        if self.heuristics.skew_ratio < 1.0 {
            return Err(AdvisorError::config("heuristics.skew_ratio must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.coverage.stale_modification_ratio) {
            return Err(AdvisorError::config("coverage.stale_modification_ratio must be in [0, 1]"));
        }
        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths = ["conf/advisor.toml", "advisor.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> AdvisorResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: AnalysisConfig =
            toml::from_str(&content).map_err(|e| AdvisorError::config(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_documented_thresholds() {
        let config = AnalysisConfig::default();
        assert_eq!(config.cardinality.mismatch_ratio, 10.0);
        assert_eq!(config.cardinality.min_rows, 10.0);
        assert_eq!(config.heuristics.lookup_executions, 10_000);
        assert_eq!(config.heuristics.nested_loop_rows, 10_000);
        assert_eq!(config.heuristics.skew_ratio, 5.0);
        assert_eq!(config.coverage.stale_modification_ratio, 0.20);
    }

    #[test]
    fn validate_rejects_zero_top_n() {
        let mut config = AnalysisConfig::default();
        config.report.top_operators = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_sections_deserialize_with_partial_content() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            [cardinality]
            mismatch_ratio = 25.0
            "#,
        )
        .unwrap();
        assert_eq!(config.cardinality.mismatch_ratio, 25.0);
        assert_eq!(config.cardinality.min_rows, 10.0);
        assert_eq!(config.report.top_operators, 5);
    }
}
