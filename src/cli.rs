//! Command-line interface definitions and argument parsing

use crate::config::AnalysisConfig;
use crate::logging::{LogConfig, LogFormat};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

/// Behavioral segmentation of facility customers with JTBD hypotheses
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory holding visits.csv, members.csv, transactions.csv and checkins.csv
    #[arg(short, long, default_value = "data", env = "SEGMENTFORGE_DATA_DIR")]
    pub data_dir: PathBuf,

    /// TOML file with thresholds and clustering parameters
    #[arg(short, long, env = "SEGMENTFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Smallest candidate cluster count
    #[arg(long)]
    pub k_min: Option<usize>,

    /// Largest candidate cluster count
    #[arg(long)]
    pub k_max: Option<usize>,

    /// Seed for K-Means initialization
    #[arg(long)]
    pub seed: Option<u64>,

    /// Minimum visits before a customer is checked for context switching
    #[arg(long)]
    pub min_visits: Option<usize>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Configuration from `--config` (or defaults) with flag overrides applied
    pub fn analysis_config(&self) -> crate::Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_toml_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => AnalysisConfig::default(),
        };
        self.apply_overrides(&mut config);
        config.validate().context("invalid configuration after overrides")?;
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut AnalysisConfig) {
        if let Some(k_min) = self.k_min {
            config.segmentation.k_min = k_min;
        }
        if let Some(k_max) = self.k_max {
            config.segmentation.k_max = k_max;
        }
        if let Some(seed) = self.seed {
            config.segmentation.seed = seed;
        }
        if let Some(min_visits) = self.min_visits {
            config.context.min_visits = min_visits;
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: if self.verbose { "info" } else { "warn" }.to_string(),
            format: self.log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_applied() {
        let args = Args::parse_from([
            "segmentforge",
            "--data-dir",
            "fixtures",
            "--k-min",
            "2",
            "--k-max",
            "4",
            "--seed",
            "7",
            "--min-visits",
            "3",
            "--log-format",
            "json",
        ]);
        assert_eq!(args.data_dir, PathBuf::from("fixtures"));

        let config = args.analysis_config().unwrap();
        assert_eq!(config.segmentation.k_min, 2);
        assert_eq!(config.segmentation.k_max, 4);
        assert_eq!(config.segmentation.seed, 7);
        assert_eq!(config.context.min_visits, 3);
        assert_eq!(args.log_config().format, LogFormat::Json);
        assert_eq!(args.log_config().level, "warn");
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = Args::parse_from(["segmentforge", "--k-min", "6", "--k-max", "3"]);
        assert!(args.analysis_config().is_err());

        let args = Args::parse_from(["segmentforge", "--verbose"]);
        assert_eq!(args.analysis_config().unwrap(), AnalysisConfig::default());
        assert_eq!(args.log_config().level, "info");
    }
}
