//! Staged analysis pipeline
//!
//! Record Store → Feature Extractor → Segmentation Engine → Segment Profiler
//! → JTBD Classifier, with the Context-Switch Detector reading the record
//! store and the extracted customer list. Each stage consumes the previous
//! stage's output by reference and returns a new value.

use crate::config::AnalysisConfig;
use crate::context::{detect_context_switchers, ContextSwitcher};
use crate::data::{DataCoverage, RecordStore};
use crate::error::{stage, PipelineError, PipelineResult};
use crate::features::{build_feature_table, FeatureTable};
use crate::jtbd::{classify, JtbdHypothesis};
use crate::model::{segment_customers, SegmentationResult};
use crate::profile::{profile_segments, SegmentProfile};
use serde::Serialize;
use tracing::info;

/// A segment profile with the hypothesis attached to it
#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub profile: SegmentProfile,
    pub hypothesis: JtbdHypothesis,
}

/// All in-memory outputs of one run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub coverage: DataCoverage,
    pub features: FeatureTable,
    pub segmentation: SegmentationResult,
    /// One per segment, ascending by segment id
    pub segments: Vec<SegmentReport>,
    pub switchers: Vec<ContextSwitcher>,
}

/// Run every stage over a loaded record store
pub fn run_analysis(store: &RecordStore, config: &AnalysisConfig) -> PipelineResult<AnalysisOutcome> {
    config.validate()?;

    let coverage = store.coverage();
    info!(
        stage = stage::LOAD,
        visits = coverage.visits,
        members = coverage.members,
        transactions = coverage.transactions,
        checkins = coverage.checkins,
        "records available"
    );

    let features = build_feature_table(store);
    if features.is_empty() {
        return Err(PipelineError::insufficient(
            stage::FEATURES,
            "no customer has a visit record",
        ));
    }

    let segmentation = segment_customers(&features, &config.segmentation)?;

    let segments: Vec<SegmentReport> = profile_segments(&features, &segmentation.assignment)
        .into_iter()
        .map(|profile| {
            let hypothesis = classify(&profile.signature, &config.classifier);
            info!(
                stage = stage::PROFILING,
                segment = profile.segment_id,
                size = profile.size,
                archetype = hypothesis.name,
                "segment classified"
            );
            SegmentReport {
                profile,
                hypothesis,
            }
        })
        .collect();

    let switchers = detect_context_switchers(store, &features, config);
    info!(stage = stage::CONTEXT, switchers = switchers.len(), "pipeline complete");

    Ok(AnalysisOutcome {
        coverage,
        features,
        segmentation,
        segments,
        switchers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SegmentationConfig;

    #[test]
    fn test_empty_store_is_insufficient() {
        let store = RecordStore::new(vec![], vec![], vec![], vec![]);
        let err = run_analysis(&store, &AnalysisConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData {
                stage: stage::FEATURES,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_config_rejected_before_work() {
        let store = RecordStore::new(vec![], vec![], vec![], vec![]);
        let config = AnalysisConfig {
            segmentation: SegmentationConfig {
                k_min: 5,
                k_max: 3,
                ..SegmentationConfig::default()
            },
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            run_analysis(&store, &config),
            Err(PipelineError::Config(_))
        ));
    }
}
