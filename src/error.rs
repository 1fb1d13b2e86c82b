//! Error types for the segmentation pipeline

use thiserror::Error;

/// Pipeline stage names used in error context and log fields
pub mod stage {
    pub const LOAD: &str = "load";
    pub const FEATURES: &str = "feature_extraction";
    pub const SEGMENTATION: &str = "segmentation";
    pub const DENSITY: &str = "density_diagnostic";
    pub const HIERARCHICAL: &str = "hierarchical_diagnostic";
    pub const PROFILING: &str = "profiling";
    pub const CONTEXT: &str = "context_switch";
}

/// Fatal and recoverable failures raised by the pipeline.
///
/// Per-record parse failures never surface here: the loader substitutes a
/// null sentinel and keeps going.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required column is absent from an input table.
    #[error("table `{table}` is missing required column `{column}`")]
    MissingColumn { table: String, column: String },

    /// Too few customers, or no candidate cluster count could be scored.
    #[error("insufficient data in stage `{stage}`: {detail}")]
    InsufficientData { stage: &'static str, detail: String },

    /// A candidate k collapsed into fewer clusters than can be scored.
    #[error("k={k} produced {distinct} distinct cluster(s), cannot be scored")]
    DegenerateClustering { k: usize, distinct: usize },

    /// The underlying clustering library rejected its input or parameters.
    #[error("clustering failed in stage `{stage}`: {message}")]
    Clustering { stage: &'static str, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read table `{table}`: {source}")]
    Csv {
        table: String,
        #[source]
        source: polars::error::PolarsError,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub(crate) fn missing_column(table: &str, column: &str) -> Self {
        Self::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub(crate) fn insufficient(stage: &'static str, detail: impl Into<String>) -> Self {
        Self::InsufficientData {
            stage,
            detail: detail.into(),
        }
    }

    pub(crate) fn clustering(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Clustering {
            stage,
            message: err.to_string(),
        }
    }

    /// Whether this error only disqualifies a single candidate k.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::DegenerateClustering { .. })
    }
}

/// Typed result alias for library stages
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_message_names_table_and_column() {
        let err = PipelineError::missing_column("visits", "start_time");
        let message = err.to_string();
        assert!(message.contains("visits"));
        assert!(message.contains("start_time"));
    }

    #[test]
    fn test_only_degenerate_clustering_is_skippable() {
        assert!(PipelineError::DegenerateClustering { k: 4, distinct: 1 }.is_skippable());
        assert!(!PipelineError::insufficient(stage::SEGMENTATION, "no k").is_skippable());
    }
}
