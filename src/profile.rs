//! Segment Profiler: per-segment behavioral signatures

use crate::features::{FeatureTable, FeatureVector};
use crate::model::ClusterAssignment;
use serde::Serialize;
use std::collections::BTreeMap;

/// Member ids kept per profile as a sample
pub const MEMBER_SAMPLE_SIZE: usize = 10;

/// Interpretable features summarized in every signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureFeature {
    PctMorning,
    PctAfternoon,
    PctEvening,
    PctWeekday,
    PctWeekend,
    PartnerVarietyRate,
    EventParticipationRate,
    BookingsPerMonth,
    SpendPerBooking,
    MembershipTier,
    SkillRating,
    OrganizedBookingsRate,
    DrillEvents,
    SocialEvents,
}

impl SignatureFeature {
    pub const ALL: [SignatureFeature; 14] = [
        Self::PctMorning,
        Self::PctAfternoon,
        Self::PctEvening,
        Self::PctWeekday,
        Self::PctWeekend,
        Self::PartnerVarietyRate,
        Self::EventParticipationRate,
        Self::BookingsPerMonth,
        Self::SpendPerBooking,
        Self::MembershipTier,
        Self::SkillRating,
        Self::OrganizedBookingsRate,
        Self::DrillEvents,
        Self::SocialEvents,
    ];

    pub fn value(self, fv: &FeatureVector) -> f64 {
        match self {
            Self::PctMorning => fv.pct_morning,
            Self::PctAfternoon => fv.pct_afternoon,
            Self::PctEvening => fv.pct_evening,
            Self::PctWeekday => fv.pct_weekday,
            Self::PctWeekend => fv.pct_weekend,
            Self::PartnerVarietyRate => fv.partner_variety_rate,
            Self::EventParticipationRate => fv.event_participation_rate,
            Self::BookingsPerMonth => fv.bookings_per_month,
            Self::SpendPerBooking => fv.spend_per_booking,
            Self::MembershipTier => fv.membership_tier,
            Self::SkillRating => fv.skill_rating,
            Self::OrganizedBookingsRate => fv.organized_bookings_rate,
            Self::DrillEvents => fv.drill_events,
            Self::SocialEvents => fv.social_events,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FeatureStats {
    pub mean: f64,
    /// Sample standard deviation; 0 for a single member
    pub std: f64,
    pub median: f64,
}

impl FeatureStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = if values.len() < 2 {
            0.0
        } else {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        };

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Self { mean, std, median }
    }
}

/// Mean/std/median of the signature features over one segment
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BehavioralSignature {
    pub features: BTreeMap<SignatureFeature, FeatureStats>,
}

impl BehavioralSignature {
    pub fn from_members(members: &[&FeatureVector]) -> Self {
        let features = SignatureFeature::ALL
            .iter()
            .map(|&feature| {
                let values: Vec<f64> = members.iter().map(|fv| feature.value(fv)).collect();
                (feature, FeatureStats::from_values(&values))
            })
            .collect();
        Self { features }
    }

    /// Segment mean of a feature, 0 when absent
    pub fn mean(&self, feature: SignatureFeature) -> f64 {
        self.features.get(&feature).map_or(0.0, |s| s.mean)
    }

    /// Signature whose means are given directly, for synthetic classification
    pub fn from_means(means: &[(SignatureFeature, f64)]) -> Self {
        let features = means
            .iter()
            .map(|&(feature, mean)| {
                (
                    feature,
                    FeatureStats {
                        mean,
                        std: 0.0,
                        median: mean,
                    },
                )
            })
            .collect();
        Self { features }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentProfile {
    pub segment_id: usize,
    pub size: usize,
    /// Fraction of all clustered customers, 0..=1
    pub share: f64,
    /// First members by discovery order, at most [`MEMBER_SAMPLE_SIZE`]
    pub member_ids: Vec<String>,
    pub signature: BehavioralSignature,
}

/// One profile per distinct segment label, ascending by label
pub fn profile_segments(table: &FeatureTable, assignment: &ClusterAssignment) -> Vec<SegmentProfile> {
    let mut labels: Vec<usize> = assignment.segment.clone();
    labels.sort_unstable();
    labels.dedup();

    let total = assignment.segment.len();
    labels
        .into_iter()
        .map(|segment_id| profile_segment(table, assignment, segment_id, total))
        .collect()
}

fn profile_segment(
    table: &FeatureTable,
    assignment: &ClusterAssignment,
    segment_id: usize,
    total: usize,
) -> SegmentProfile {
    let rows = assignment.rows_in_segment(segment_id);
    let members: Vec<&FeatureVector> = rows.iter().filter_map(|&i| table.rows.get(i)).collect();

    SegmentProfile {
        segment_id,
        size: rows.len(),
        share: if total == 0 {
            0.0
        } else {
            rows.len() as f64 / total as f64
        },
        member_ids: members
            .iter()
            .take(MEMBER_SAMPLE_SIZE)
            .map(|fv| fv.customer_id.clone())
            .collect(),
        signature: BehavioralSignature::from_members(&members),
    }
}
