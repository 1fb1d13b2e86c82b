//! Context-Switch Detector
//!
//! Splits one customer's dated visits along a situational axis and compares
//! the two sides. A customer is a switcher when at least one axis shows a
//! divergent summary.

use crate::config::{AnalysisConfig, DivergenceThresholds};
use crate::data::{RecordStore, Visit};
use crate::features::{
    average_party_size, in_band, is_weekday, FeatureTable, EVENING_HOURS, MORNING_HOURS,
};
use crate::partners::unique_partner_ids;
use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextAxis {
    /// Morning (06-11) against evening (17-21); afternoon visits sit on neither side
    TimeOfDay,
    /// Monday-Friday against Saturday-Sunday
    DayOfWeek,
}

impl ContextAxis {
    pub const ALL: [ContextAxis; 2] = [Self::TimeOfDay, Self::DayOfWeek];

    pub fn name(self) -> &'static str {
        match self {
            Self::TimeOfDay => "time_of_day",
            Self::DayOfWeek => "day_of_week",
        }
    }

    /// Labels of side a and side b
    pub fn labels(self) -> (&'static str, &'static str) {
        match self {
            Self::TimeOfDay => ("morning", "evening"),
            Self::DayOfWeek => ("weekday", "weekend"),
        }
    }

    fn side_a(self, t: &NaiveDateTime) -> bool {
        match self {
            Self::TimeOfDay => in_band(t.hour(), MORNING_HOURS),
            Self::DayOfWeek => is_weekday(t),
        }
    }

    fn side_b(self, t: &NaiveDateTime) -> bool {
        match self {
            Self::TimeOfDay => in_band(t.hour(), EVENING_HOURS),
            Self::DayOfWeek => !is_weekday(t),
        }
    }

    /// Dated visits on each side of the axis
    pub fn partition<'a>(self, visits: &[&'a Visit]) -> (Vec<&'a Visit>, Vec<&'a Visit>) {
        let mut a = Vec::new();
        let mut b = Vec::new();
        for &visit in visits {
            let Some(start) = visit.start else { continue };
            if self.side_a(&start) {
                a.push(visit);
            } else if self.side_b(&start) {
                b.push(visit);
            }
        }
        (a, b)
    }
}

/// Behavior on one side of an axis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSummary {
    pub visits: usize,
    pub avg_party_size: f64,
    pub has_guests: bool,
    pub unique_partners: usize,
    pub event_rate: f64,
}

impl ContextSummary {
    pub fn from_visits(visits: &[&Visit], customer_id: &str) -> Self {
        let n = visits.len();
        let events = visits.iter().filter(|v| v.is_event).count();
        Self {
            visits: n,
            avg_party_size: average_party_size(visits),
            has_guests: visits.iter().any(|v| v.has_guests),
            unique_partners: unique_partner_ids(visits.iter().map(|v| v.partners.as_str()), customer_id)
                .len(),
            event_rate: if n == 0 { 0.0 } else { events as f64 / n as f64 },
        }
    }
}

/// Symmetric: `summaries_diverge(a, b, t) == summaries_diverge(b, a, t)`
pub fn summaries_diverge(a: &ContextSummary, b: &ContextSummary, thresholds: &DivergenceThresholds) -> bool {
    (a.avg_party_size - b.avg_party_size).abs() > thresholds.party_size
        || a.unique_partners.abs_diff(b.unique_partners) > thresholds.unique_partners
        || (a.event_rate - b.event_rate).abs() > thresholds.event_rate
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSwitchEvidence {
    pub axis: ContextAxis,
    pub context_a: &'static str,
    pub context_b: &'static str,
    pub summary_a: ContextSummary,
    pub summary_b: ContextSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSwitcher {
    pub customer_id: String,
    pub total_visits: usize,
    /// Divergent axes only; never empty
    pub axes: Vec<ContextSwitchEvidence>,
}

/// Compare one customer's behavior along every axis.
///
/// Axes where either side has fewer than `min_visits_per_side` visits are
/// skipped. Returns `None` when no axis diverges.
pub fn detect_customer(
    customer_id: &str,
    visits: &[&Visit],
    config: &AnalysisConfig,
) -> Option<ContextSwitcher> {
    let min_side = config.context.min_visits_per_side;
    let axes: Vec<ContextSwitchEvidence> = ContextAxis::ALL
        .iter()
        .filter_map(|&axis| {
            let (a, b) = axis.partition(visits);
            if a.len() < min_side || b.len() < min_side {
                debug!(customer_id, axis = axis.name(), a = a.len(), b = b.len(), "axis skipped");
                return None;
            }
            let summary_a = ContextSummary::from_visits(&a, customer_id);
            let summary_b = ContextSummary::from_visits(&b, customer_id);
            if !summaries_diverge(&summary_a, &summary_b, &config.divergence) {
                return None;
            }
            let (context_a, context_b) = axis.labels();
            Some(ContextSwitchEvidence {
                axis,
                context_a,
                context_b,
                summary_a,
                summary_b,
            })
        })
        .collect();

    if axes.is_empty() {
        None
    } else {
        Some(ContextSwitcher {
            customer_id: customer_id.to_string(),
            total_visits: visits.len(),
            axes,
        })
    }
}

/// Switchers among the customers of `table` with at least
/// `context.min_visits` bookings, in feature-table order
pub fn detect_context_switchers(
    store: &RecordStore,
    table: &FeatureTable,
    config: &AnalysisConfig,
) -> Vec<ContextSwitcher> {
    let index = store.index();
    let min_visits = config.context.min_visits as f64;

    let mut candidates = 0usize;
    let switchers: Vec<ContextSwitcher> = table
        .rows
        .iter()
        .filter(|fv| fv.total_bookings >= min_visits)
        .filter_map(|fv| {
            candidates += 1;
            let records = index.records_for(fv.customer_id.as_str());
            detect_customer(&fv.customer_id, &records.visits, config)
        })
        .collect();

    info!(candidates, switchers = switchers.len(), "context-switch detection complete");
    switchers
}
