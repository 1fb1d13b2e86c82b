//! Run configuration and business thresholds
//!
//! Every heuristic cut-off used by the classifier and the context-switch
//! detector lives here so a facility can tune them without touching logic.
//! Configuration is read from an optional TOML file; missing keys fall back
//! to the defaults below.

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for one analysis run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub segmentation: SegmentationConfig,
    pub classifier: ClassifierThresholds,
    pub divergence: DivergenceThresholds,
    pub context: ContextConfig,
}

/// Parameters of the clustering search and its diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Smallest candidate cluster count (inclusive)
    pub k_min: usize,
    /// Largest candidate cluster count (inclusive)
    pub k_max: usize,
    /// Seed for K-Means initialization
    pub seed: u64,
    /// Independent K-Means restarts per candidate k
    pub n_restarts: usize,
    pub max_iters: u64,
    pub tolerance: f64,
    /// DBSCAN neighborhood radius in standardized feature space
    pub dbscan_eps: f64,
    /// DBSCAN minimum neighborhood size
    pub dbscan_min_points: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            k_min: 3,
            k_max: 7,
            seed: 42,
            n_restarts: 10,
            max_iters: 300,
            tolerance: 1e-4,
            dbscan_eps: 0.5,
            dbscan_min_points: 5,
        }
    }
}

/// Cut-offs that turn segment means into classifier predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    pub morning_share: f64,
    pub evening_share: f64,
    pub weekday_share: f64,
    pub partner_variety_rate: f64,
    pub event_participation_rate: f64,
    pub drill_events: f64,
    pub social_events: f64,
    pub bookings_per_month: f64,
    pub spend_per_booking: f64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            morning_share: 0.5,
            evening_share: 0.5,
            weekday_share: 0.6,
            partner_variety_rate: 0.3,
            event_participation_rate: 0.3,
            drill_events: 2.0,
            social_events: 2.0,
            bookings_per_month: 8.0,
            spend_per_booking: 20.0,
        }
    }
}

/// Differences beyond which two context summaries count as divergent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceThresholds {
    pub party_size: f64,
    pub unique_partners: usize,
    pub event_rate: f64,
}

impl Default for DivergenceThresholds {
    fn default() -> Self {
        Self {
            party_size: 1.0,
            unique_partners: 3,
            event_rate: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Customers with fewer visits are never considered switchers
    pub min_visits: usize,
    /// Visits needed on each side of an axis before comparing
    pub min_visits_per_side: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            min_visits: 5,
            min_visits_per_side: 2,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> PipelineResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations the pipeline cannot run with
    pub fn validate(&self) -> PipelineResult<()> {
        let seg = &self.segmentation;
        if seg.k_min < 2 {
            return Err(PipelineError::Config(format!(
                "k_min must be at least 2, got {}",
                seg.k_min
            )));
        }
        if seg.k_min > seg.k_max {
            return Err(PipelineError::Config(format!(
                "k_min ({}) must not exceed k_max ({})",
                seg.k_min, seg.k_max
            )));
        }
        if seg.n_restarts == 0 {
            return Err(PipelineError::Config("n_restarts must be at least 1".into()));
        }
        if seg.dbscan_eps <= 0.0 {
            return Err(PipelineError::Config("dbscan_eps must be positive".into()));
        }
        // A neighborhood of one point is rejected by DBSCAN itself
        if seg.dbscan_min_points < 2 {
            return Err(PipelineError::Config(format!(
                "dbscan_min_points must be at least 2, got {}",
                seg.dbscan_min_points
            )));
        }
        if self.context.min_visits_per_side == 0 {
            return Err(PipelineError::Config("min_visits_per_side must be at least 1".into()));
        }
        Ok(())
    }
}
