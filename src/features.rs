//! Feature Extractor: one fixed-width behavioral vector per customer
//!
//! Features fall into temporal, social, engagement, check-in, monetary,
//! membership/skill and booking-type groups. Every field is a finite number;
//! anything missing resolves to 0.

use crate::data::{CustomerRecords, RecordStore, Visit};
use crate::error::stage;
use crate::partners::unique_partner_ids;
use chrono::{Datelike, NaiveDateTime, Timelike};
use ndarray::Array2;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::info;

pub const FEATURE_COUNT: usize = 30;

/// Column names of [`FeatureVector::values`], in order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "pct_morning",
    "pct_afternoon",
    "pct_evening",
    "pct_weekday",
    "pct_weekend",
    "time_consistency",
    "day_consistency",
    "unique_partners",
    "partner_variety_rate",
    "avg_party_size",
    "solo_rate",
    "guest_booking_rate",
    "event_participation_rate",
    "total_events",
    "drill_events",
    "social_events",
    "competitive_events",
    "bookings_per_month",
    "total_bookings",
    "check_in_rate",
    "has_checkin_data",
    "total_spend",
    "avg_transaction",
    "spend_per_booking",
    "membership_tier",
    "total_paid",
    "skill_rating",
    "organized_bookings_rate",
    "dropin_rate",
    "payment_rate",
];

/// Hour bands, inclusive
pub const MORNING_HOURS: (u32, u32) = (6, 11);
pub const AFTERNOON_HOURS: (u32, u32) = (12, 16);
pub const EVENING_HOURS: (u32, u32) = (17, 21);

/// Weekday and weekend share when no visit carries a timestamp
pub const UNDATED_DAY_SHARE: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureVector {
    pub customer_id: String,

    // Temporal
    pub pct_morning: f64,
    pub pct_afternoon: f64,
    pub pct_evening: f64,
    pub pct_weekday: f64,
    pub pct_weekend: f64,
    pub time_consistency: f64,
    pub day_consistency: f64,

    // Social
    pub unique_partners: f64,
    pub partner_variety_rate: f64,
    pub avg_party_size: f64,
    pub solo_rate: f64,
    pub guest_booking_rate: f64,

    // Engagement
    pub event_participation_rate: f64,
    pub total_events: f64,
    pub drill_events: f64,
    pub social_events: f64,
    pub competitive_events: f64,
    pub bookings_per_month: f64,
    pub total_bookings: f64,

    // Check-in engagement
    pub check_in_rate: f64,
    pub has_checkin_data: f64,

    // Monetary
    pub total_spend: f64,
    pub avg_transaction: f64,
    pub spend_per_booking: f64,

    // Membership and skill
    pub membership_tier: f64,
    pub total_paid: f64,
    pub skill_rating: f64,

    // Booking type
    pub organized_bookings_rate: f64,
    pub dropin_rate: f64,
    pub payment_rate: f64,
}

impl FeatureVector {
    /// Numeric fields in [`FEATURE_NAMES`] order
    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.pct_morning,
            self.pct_afternoon,
            self.pct_evening,
            self.pct_weekday,
            self.pct_weekend,
            self.time_consistency,
            self.day_consistency,
            self.unique_partners,
            self.partner_variety_rate,
            self.avg_party_size,
            self.solo_rate,
            self.guest_booking_rate,
            self.event_participation_rate,
            self.total_events,
            self.drill_events,
            self.social_events,
            self.competitive_events,
            self.bookings_per_month,
            self.total_bookings,
            self.check_in_rate,
            self.has_checkin_data,
            self.total_spend,
            self.avg_transaction,
            self.spend_per_booking,
            self.membership_tier,
            self.total_paid,
            self.skill_rating,
            self.organized_bookings_rate,
            self.dropin_rate,
            self.payment_rate,
        ]
    }

    /// Look up a numeric field by its column name
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values()[i])
    }
}

/// Feature vectors for every customer with at least one visit
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeatureTable {
    pub rows: Vec<FeatureVector>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn customer_ids(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.customer_id.as_str()).collect()
    }

    /// Dense (customers x features) matrix without the identifier column
    pub fn to_matrix(&self) -> Array2<f64> {
        let mut matrix = Array2::zeros((self.rows.len(), FEATURE_COUNT));
        for (mut row, vector) in matrix.outer_iter_mut().zip(&self.rows) {
            for (cell, value) in row.iter_mut().zip(vector.values()) {
                *cell = if value.is_finite() { value } else { 0.0 };
            }
        }
        matrix
    }

    pub fn get(&self, customer_id: &str) -> Option<&FeatureVector> {
        self.rows.iter().find(|r| r.customer_id == customer_id)
    }
}

/// Build the feature table, one row per customer in visit discovery order
pub fn build_feature_table(store: &RecordStore) -> FeatureTable {
    let index = store.index();
    let rows: Vec<FeatureVector> = index
        .customer_ids()
        .iter()
        .filter_map(|id| extract_features(&index.records_for(id)))
        .collect();

    info!(
        stage = stage::FEATURES,
        customers = rows.len(),
        features = FEATURE_COUNT,
        "feature extraction complete"
    );
    FeatureTable { rows }
}

/// Reduce one customer's records to a feature vector.
///
/// Returns `None` when the customer has no visit records.
pub fn extract_features(records: &CustomerRecords<'_>) -> Option<FeatureVector> {
    let visits = &records.visits;
    if visits.is_empty() {
        return None;
    }
    let n = visits.len() as f64;
    let mut fv = FeatureVector {
        customer_id: records.customer_id.to_string(),
        ..FeatureVector::default()
    };

    // Temporal
    let starts: Vec<NaiveDateTime> = visits.iter().filter_map(|v| v.start).collect();
    if !starts.is_empty() {
        let dated = starts.len() as f64;
        let hours: Vec<f64> = starts.iter().map(|t| f64::from(t.hour())).collect();
        let weekdays: Vec<f64> = starts
            .iter()
            .map(|t| f64::from(t.weekday().num_days_from_monday()))
            .collect();

        fv.pct_morning = count_in_band(&starts, MORNING_HOURS) as f64 / dated;
        fv.pct_afternoon = count_in_band(&starts, AFTERNOON_HOURS) as f64 / dated;
        fv.pct_evening = count_in_band(&starts, EVENING_HOURS) as f64 / dated;
        fv.pct_weekday = starts.iter().filter(|t| is_weekday(t)).count() as f64 / dated;
        fv.pct_weekend = 1.0 - fv.pct_weekday;
        fv.time_consistency = consistency(&hours);
        fv.day_consistency = consistency(&weekdays);
    } else {
        // No visit has a known day; split evenly so the shares still sum to 1
        fv.pct_weekday = UNDATED_DAY_SHARE;
        fv.pct_weekend = UNDATED_DAY_SHARE;
    }

    // Social
    let partners = unique_partner_ids(
        visits.iter().map(|v| v.partners.as_str()),
        records.customer_id,
    );
    fv.unique_partners = partners.len() as f64;
    fv.partner_variety_rate = fv.unique_partners / n;
    fv.avg_party_size = average_party_size(visits);
    fv.solo_rate = visits.iter().filter(|v| v.party_size == Some(1.0)).count() as f64 / n;
    fv.guest_booking_rate = visits.iter().filter(|v| v.has_guests).count() as f64 / n;

    // Engagement
    let events: Vec<&&Visit> = visits.iter().filter(|v| v.is_event).collect();
    fv.total_events = events.len() as f64;
    fv.event_participation_rate = fv.total_events / n;
    for event in &events {
        let kinds = EventKinds::of(&event.event_name);
        fv.drill_events += f64::from(u8::from(kinds.drill));
        fv.social_events += f64::from(u8::from(kinds.social));
        fv.competitive_events += f64::from(u8::from(kinds.competitive));
    }
    fv.bookings_per_month = n / span_days(&starts) * 30.0;
    fv.total_bookings = n;

    // Check-ins
    if !records.checkins.is_empty() {
        let checked_in = records.checkins.iter().filter(|c| c.is_checked_in()).count();
        fv.check_in_rate = checked_in as f64 / records.checkins.len() as f64;
        fv.has_checkin_data = 1.0;
    }

    // Monetary
    if !records.transactions.is_empty() {
        let amounts: Vec<f64> = records.transactions.iter().filter_map(|t| t.amount).collect();
        fv.total_spend = amounts.iter().sum();
        if !amounts.is_empty() {
            fv.avg_transaction = fv.total_spend / amounts.len() as f64;
        }
        fv.spend_per_booking = fv.total_spend / n;
    }

    // Membership and skill
    if let Some(member) = records.member {
        fv.membership_tier = f64::from(encode_membership_tier(member.membership.as_deref()));
        fv.total_paid = member.total_paid.unwrap_or(0.0);
        fv.skill_rating =
            parse_skill_rating(member.skill_singles.as_deref(), member.skill_doubles.as_deref());
    }

    // Booking type
    fv.organized_bookings_rate =
        visits.iter().filter(|v| is_organized(&v.booking_type)).count() as f64 / n;
    fv.dropin_rate = visits.iter().filter(|v| is_dropin(&v.booking_type)).count() as f64 / n;
    fv.payment_rate = visits
        .iter()
        .filter(|v| matches!(v.payment_status.as_str(), "Paid" | "Partially Paid"))
        .count() as f64
        / n;

    Some(fv)
}

pub fn in_band(hour: u32, band: (u32, u32)) -> bool {
    (band.0..=band.1).contains(&hour)
}

fn count_in_band(starts: &[NaiveDateTime], band: (u32, u32)) -> usize {
    starts.iter().filter(|t| in_band(t.hour(), band)).count()
}

/// Monday through Friday
pub fn is_weekday(t: &NaiveDateTime) -> bool {
    t.weekday().num_days_from_monday() < 5
}

/// `1 / (sample_std + 1)`, or 0 with fewer than two observations
pub fn consistency(values: &[f64]) -> f64 {
    match sample_std(values) {
        Some(std) => 1.0 / (std + 1.0),
        None => 0.0,
    }
}

/// Sample standard deviation (n - 1 denominator)
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

/// Mean of the recorded party sizes; visits without one are ignored
pub fn average_party_size(visits: &[&Visit]) -> f64 {
    let sizes: Vec<f64> = visits.iter().filter_map(|v| v.party_size).collect();
    if sizes.is_empty() {
        0.0
    } else {
        sizes.iter().sum::<f64>() / sizes.len() as f64
    }
}

/// Observed date span in days, first to last visit inclusive
fn span_days(starts: &[NaiveDateTime]) -> f64 {
    let first = starts.iter().min();
    let last = starts.iter().max();
    match (first, last) {
        (Some(first), Some(last)) => ((*last - *first).num_days() + 1).max(1) as f64,
        _ => 1.0,
    }
}

const DRILL_KEYWORDS: [&str; 2] = ["drill", "skill"];
const SOCIAL_KEYWORDS: [&str; 3] = ["social", "mixer", "open play"];
const COMPETITIVE_KEYWORDS: [&str; 3] = ["tournament", "advanced", "expert"];

/// Event-type tags from a case-insensitive keyword match on the event name.
/// One event may carry several tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventKinds {
    pub drill: bool,
    pub social: bool,
    pub competitive: bool,
}

impl EventKinds {
    pub fn of(name: &str) -> Self {
        let name = name.to_lowercase();
        let any = |keywords: &[&str]| keywords.iter().any(|k| name.contains(k));
        Self {
            drill: any(&DRILL_KEYWORDS),
            social: any(&SOCIAL_KEYWORDS),
            competitive: any(&COMPETITIVE_KEYWORDS),
        }
    }
}

fn organized_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)doubles.*add players now")
            .unwrap_or_else(|e| panic!("booking pattern must compile: {e}"))
    })
}

pub fn is_organized(booking_type: &str) -> bool {
    organized_pattern().is_match(booking_type)
}

pub fn is_dropin(booking_type: &str) -> bool {
    booking_type.to_lowercase().contains("drop")
}

/// Ordered keyword table; the first entry whose keyword appears wins
const MEMBERSHIP_TIERS: [(&str, u8); 9] = [
    ("founder", 5),
    ("fanatic", 4),
    ("annual", 4),
    ("fight club", 3),
    ("family", 3),
    ("individual", 2),
    ("membership", 2),
    ("coach", 2),
    ("employee", 2),
];

/// Ordinal tier 1-5; no membership record at all is 0, unknown text is 1
pub fn encode_membership_tier(membership: Option<&str>) -> u8 {
    let Some(text) = membership else {
        return 0;
    };
    let text = text.to_lowercase();
    MEMBERSHIP_TIERS
        .iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map_or(1, |(_, tier)| *tier)
}

/// Doubles rating when present, else singles; failures yield 0.0
pub fn parse_skill_rating(singles: Option<&str>, doubles: Option<&str>) -> f64 {
    fn present(v: Option<&str>) -> Option<&str> {
        v.map(str::trim).filter(|s| !s.is_empty())
    }
    present(doubles)
        .or_else(|| present(singles))
        .and_then(|text| text.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CheckIn, Member, Transaction};
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> Option<NaiveDateTime> {
        // 2025-10-06 is a Monday
        NaiveDate::from_ymd_opt(2025, 10, day).and_then(|d| d.and_hms_opt(hour, 0, 0))
    }

    fn visit(start: Option<NaiveDateTime>) -> Visit {
        Visit {
            customer_id: "1".into(),
            start,
            party_size: Some(2.0),
            ..Visit::default()
        }
    }

    fn records<'a>(visits: &'a [Visit]) -> CustomerRecords<'a> {
        CustomerRecords {
            customer_id: "1",
            visits: visits.iter().collect(),
            ..CustomerRecords::default()
        }
    }

    #[test]
    fn test_no_visits_no_vector() {
        assert!(extract_features(&records(&[])).is_none());
    }

    #[test]
    fn test_temporal_shares_partition_visits() {
        let visits = vec![
            visit(at(6, 7)),  // Mon morning
            visit(at(7, 13)), // Tue afternoon
            visit(at(11, 18)), // Sat evening
            visit(at(12, 9)), // Sun morning
        ];
        let fv = extract_features(&records(&visits)).unwrap();
        assert_eq!(fv.pct_morning, 0.5);
        assert_eq!(fv.pct_afternoon, 0.25);
        assert_eq!(fv.pct_evening, 0.25);
        assert_eq!(fv.pct_weekday, 0.5);
        assert_eq!(fv.pct_weekday + fv.pct_weekend, 1.0);
        assert!(fv.time_consistency > 0.0 && fv.time_consistency < 1.0);
    }

    #[test]
    fn test_single_visit_has_zero_consistency() {
        let visits = vec![visit(at(6, 7))];
        let fv = extract_features(&records(&visits)).unwrap();
        assert_eq!(fv.time_consistency, 0.0);
        assert_eq!(fv.day_consistency, 0.0);
        assert_eq!(fv.pct_weekday + fv.pct_weekend, 1.0);
        // Single-day span counts as one day
        assert_eq!(fv.bookings_per_month, 30.0);
    }

    #[test]
    fn test_identical_hours_are_perfectly_consistent() {
        let visits = vec![visit(at(6, 7)), visit(at(7, 7)), visit(at(8, 7))];
        let fv = extract_features(&records(&visits)).unwrap();
        assert_eq!(fv.time_consistency, 1.0);
        // Three weekdays in a row: span of 3 days
        assert_eq!(fv.bookings_per_month, 30.0);
    }

    #[test]
    fn test_social_and_event_features() {
        let mut visits = vec![visit(at(6, 7)), visit(at(7, 7)), visit(at(8, 19))];
        visits[0].partners = "Me (#1), Jane (#2)".into();
        visits[1].partners = "Jane (#2), Bob (#3), Al (#4)".into();
        visits[1].party_size = Some(1.0);
        visits[2].is_event = true;
        visits[2].event_name = "Thursday Skill Drill".into();
        visits[2].has_guests = true;

        let fv = extract_features(&records(&visits)).unwrap();
        assert_eq!(fv.unique_partners, 3.0);
        assert_eq!(fv.partner_variety_rate, 1.0);
        assert!((fv.avg_party_size - 5.0 / 3.0).abs() < 1e-12);
        assert!((fv.solo_rate - 1.0 / 3.0).abs() < 1e-12);
        assert!((fv.guest_booking_rate - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(fv.total_events, 1.0);
        assert_eq!(fv.drill_events, 1.0);
        assert_eq!(fv.social_events, 0.0);
    }

    #[test]
    fn test_missing_fields_resolve_to_zero() {
        let visits = vec![Visit {
            customer_id: "1".into(),
            ..Visit::default()
        }];
        let fv = extract_features(&records(&visits)).unwrap();
        assert!(fv.values().iter().all(|v| v.is_finite()));
        assert_eq!(fv.pct_weekday, UNDATED_DAY_SHARE);
        assert_eq!(fv.pct_weekday + fv.pct_weekend, 1.0);
        assert_eq!(fv.pct_morning, 0.0);
        assert_eq!(fv.avg_party_size, 0.0);
        assert_eq!(fv.membership_tier, 0.0);
        assert_eq!(fv.payment_rate, 0.0);
        assert_eq!(fv.total_bookings, 1.0);
    }

    #[test]
    fn test_monetary_checkin_and_membership() {
        let mut visits = vec![visit(at(6, 7)), visit(at(8, 7))];
        visits[0].booking_type = "Doubles - Add Players Now".into();
        visits[1].booking_type = "Open Play Drop-In".into();
        visits[0].payment_status = "Paid".into();
        visits[1].payment_status = "Partially Paid".into();

        let transactions = [
            Transaction {
                customer_id: "1".into(),
                amount: Some(30.0),
                date: None,
            },
            Transaction {
                customer_id: "1".into(),
                amount: None,
                date: None,
            },
        ];
        let checkins = [
            CheckIn {
                customer_id: "1".into(),
                time: None,
                status: "Checked-In".into(),
            },
            CheckIn {
                customer_id: "1".into(),
                time: None,
                status: "No-Show".into(),
            },
        ];
        let member = Member {
            customer_id: "1".into(),
            membership: Some("Fight Club Monthly".into()),
            total_paid: Some(150.0),
            skill_singles: Some("3.1".into()),
            skill_doubles: Some("3.6".into()),
        };

        let recs = CustomerRecords {
            customer_id: "1",
            visits: visits.iter().collect(),
            transactions: transactions.iter().collect(),
            checkins: checkins.iter().collect(),
            member: Some(&member),
        };
        let fv = extract_features(&recs).unwrap();
        assert_eq!(fv.total_spend, 30.0);
        assert_eq!(fv.avg_transaction, 30.0);
        assert_eq!(fv.spend_per_booking, 15.0);
        assert_eq!(fv.check_in_rate, 0.5);
        assert_eq!(fv.has_checkin_data, 1.0);
        assert_eq!(fv.membership_tier, 3.0);
        assert_eq!(fv.total_paid, 150.0);
        assert_eq!(fv.skill_rating, 3.6);
        assert_eq!(fv.organized_bookings_rate, 0.5);
        assert_eq!(fv.dropin_rate, 0.5);
        assert_eq!(fv.payment_rate, 1.0);
    }

    #[test]
    fn test_membership_tier_encoding() {
        assert_eq!(encode_membership_tier(None), 0);
        assert_eq!(encode_membership_tier(Some("Founders Club")), 5);
        assert_eq!(encode_membership_tier(Some("Annual Pass")), 4);
        assert_eq!(encode_membership_tier(Some("Family Plan")), 3);
        assert_eq!(encode_membership_tier(Some("Employee")), 2);
        assert_eq!(encode_membership_tier(Some("Visitor")), 1);
    }

    #[test]
    fn test_skill_rating_preference_and_failures() {
        assert_eq!(parse_skill_rating(Some("3.0"), Some("4.25")), 4.25);
        assert_eq!(parse_skill_rating(Some("3.0"), None), 3.0);
        assert_eq!(parse_skill_rating(Some("3.0"), Some("  ")), 3.0);
        assert_eq!(parse_skill_rating(None, Some("NR")), 0.0);
        assert_eq!(parse_skill_rating(None, None), 0.0);
    }

    #[test]
    fn test_event_keywords_case_insensitive() {
        assert!(EventKinds::of("SKILLS Clinic").drill);
        assert!(EventKinds::of("Friday Mixer").social);
        assert!(EventKinds::of("Advanced Ladder").competitive);
        assert_eq!(EventKinds::of("Yoga"), EventKinds::default());

        let both = EventKinds::of("Social Drill Night");
        assert!(both.drill && both.social && !both.competitive);
    }

    #[test]
    fn test_table_matrix_and_lookup() {
        let store = RecordStore::new(
            vec![visit(at(6, 7)), {
                let mut v = visit(at(7, 18));
                v.customer_id = "2".into();
                v
            }],
            vec![],
            vec![],
            vec![],
        );
        let table = build_feature_table(&store);
        assert_eq!(table.customer_ids(), vec!["1", "2"]);
        let matrix = table.to_matrix();
        assert_eq!(matrix.shape(), &[2, FEATURE_COUNT]);
        assert_eq!(table.get("2").and_then(|f| f.get("pct_evening")), Some(1.0));
    }
}
