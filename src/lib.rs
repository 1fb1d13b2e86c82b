//! SegmentForge: behavioral customer segmentation for sports facilities
//!
//! Turns per-visit activity records into fixed-width behavioral feature
//! vectors, clusters customers with automatic cluster-count selection, labels
//! each segment with a Jobs-to-be-Done hypothesis, and flags customers whose
//! behavior changes with context (time of day, weekday versus weekend).

pub mod cli;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod features;
pub mod jtbd;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod partners;
pub mod pipeline;
pub mod profile;

// Re-export public items for easier access
pub use cli::Args;
pub use config::AnalysisConfig;
pub use context::{detect_context_switchers, ContextSwitcher};
pub use data::{load_record_store, RecordStore};
pub use error::{PipelineError, PipelineResult};
pub use features::{build_feature_table, FeatureTable, FeatureVector};
pub use jtbd::{classify, Archetype, JtbdHypothesis};
pub use model::{segment_customers, SegmentationResult};
pub use pipeline::{run_analysis, AnalysisOutcome, SegmentReport};
pub use profile::{profile_segments, SegmentProfile};

/// Common result type used by the binary and CLI helpers
pub type Result<T> = anyhow::Result<T>;
