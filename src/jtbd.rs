//! JTBD Classifier: maps a segment signature to a Jobs-to-be-Done hypothesis
//!
//! Classification is an ordered decision table of (predicate, archetype)
//! rows evaluated top to bottom; the first matching row wins and Casual
//! Explorer is the fallback. The table order is the tie-break order.

use crate::config::ClassifierThresholds;
use crate::profile::BehavioralSignature;
use serde::Serialize;
use std::fmt;

/// Boolean behavioral traits derived from segment means
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Predicates {
    pub morning: bool,
    pub evening: bool,
    pub weekday: bool,
    pub high_partner_variety: bool,
    pub high_events: bool,
    pub high_drills: bool,
    pub high_social: bool,
    pub high_frequency: bool,
    pub high_spend: bool,
}

impl Predicates {
    pub fn from_signature(sig: &BehavioralSignature, t: &ClassifierThresholds) -> Self {
        use crate::profile::SignatureFeature as F;
        Self {
            morning: sig.mean(F::PctMorning) > t.morning_share,
            evening: sig.mean(F::PctEvening) > t.evening_share,
            weekday: sig.mean(F::PctWeekday) > t.weekday_share,
            high_partner_variety: sig.mean(F::PartnerVarietyRate) > t.partner_variety_rate,
            high_events: sig.mean(F::EventParticipationRate) > t.event_participation_rate,
            high_drills: sig.mean(F::DrillEvents) > t.drill_events,
            high_social: sig.mean(F::SocialEvents) > t.social_events,
            high_frequency: sig.mean(F::BookingsPerMonth) > t.bookings_per_month,
            high_spend: sig.mean(F::SpendPerBooking) > t.spend_per_booking,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Archetype {
    ConsistentExerciser,
    SocialConnector,
    SkillImprover,
    CompetitivePlayer,
    CasualExplorer,
}

impl Archetype {
    pub fn name(self) -> &'static str {
        match self {
            Self::ConsistentExerciser => "Consistent Exercisers",
            Self::SocialConnector => "Social Connectors",
            Self::SkillImprover => "Skill Improvers",
            Self::CompetitivePlayer => "Competitive Players",
            Self::CasualExplorer => "Casual Explorers",
        }
    }

    pub fn confidence(self) -> Confidence {
        match self {
            Self::ConsistentExerciser | Self::SocialConnector | Self::SkillImprover => {
                Confidence::High
            }
            Self::CompetitivePlayer | Self::CasualExplorer => Confidence::Medium,
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => f.write_str("high"),
            Self::Medium => f.write_str("medium"),
        }
    }
}

/// One row of the decision table
pub struct Rule {
    pub archetype: Archetype,
    pub matches: fn(&Predicates) -> bool,
}

fn consistent_exerciser(p: &Predicates) -> bool {
    p.morning && p.weekday && p.high_frequency && !p.high_partner_variety
}

fn social_connector(p: &Predicates) -> bool {
    (p.evening || !p.weekday) && p.high_partner_variety && p.high_spend
}

fn skill_improver(p: &Predicates) -> bool {
    p.high_drills && p.high_events && !p.high_social
}

fn competitive_player(p: &Predicates) -> bool {
    p.high_frequency && !p.high_partner_variety && p.high_events
}

/// Classification rules in priority order
pub const RULES: [Rule; 4] = [
    Rule {
        archetype: Archetype::ConsistentExerciser,
        matches: consistent_exerciser,
    },
    Rule {
        archetype: Archetype::SocialConnector,
        matches: social_connector,
    },
    Rule {
        archetype: Archetype::SkillImprover,
        matches: skill_improver,
    },
    Rule {
        archetype: Archetype::CompetitivePlayer,
        matches: competitive_player,
    },
];

pub const FALLBACK: Archetype = Archetype::CasualExplorer;

/// First matching archetype, or the fallback
pub fn classify_predicates(predicates: &Predicates) -> Archetype {
    RULES
        .iter()
        .find(|rule| (rule.matches)(predicates))
        .map_or(FALLBACK, |rule| rule.archetype)
}

/// Nine-element JTBD statement plus confidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JtbdHypothesis {
    pub archetype: Archetype,
    pub name: &'static str,
    pub job_performer: &'static str,
    pub verb: &'static str,
    pub object: &'static str,
    pub context: &'static str,
    pub desired_outcome: &'static str,
    pub success_metric: &'static str,
    pub constraints: &'static str,
    pub emotional_social: &'static str,
    pub time_dimension: &'static str,
    pub confidence: Confidence,
}

impl JtbdHypothesis {
    pub fn for_archetype(archetype: Archetype) -> Self {
        let [
            job_performer,
            verb,
            object,
            context,
            desired_outcome,
            success_metric,
            constraints,
            emotional_social,
            time_dimension,
        ] = statement_fields(archetype);
        Self {
            archetype,
            name: archetype.name(),
            job_performer,
            verb,
            object,
            context,
            desired_outcome,
            success_metric,
            constraints,
            emotional_social,
            time_dimension,
            confidence: archetype.confidence(),
        }
    }

    /// One-sentence job statement
    pub fn statement(&self) -> String {
        format!(
            "When {}, {} want to {} {}, so they can {}, measured by {}.",
            self.context,
            self.job_performer,
            self.verb,
            self.object,
            self.desired_outcome,
            self.success_metric
        )
    }
}

fn statement_fields(archetype: Archetype) -> [&'static str; 9] {
    match archetype {
        Archetype::ConsistentExerciser => [
            "Busy professionals and retirees",
            "maintain",
            "physical fitness routine",
            "fitting exercise into a busy schedule",
            "stay healthy and energized without disrupting daily commitments",
            "consistency of attendance and feeling physically strong",
            "limited time windows (early morning), need reliable court availability",
            "feel disciplined and accomplished, not seeking heavy social interaction",
            "regular weekday mornings, 3-5x per week",
        ],
        Archetype::SocialConnector => [
            "Social individuals seeking community",
            "build and maintain",
            "friendships and social connections",
            "looking for fun social activities with diverse groups",
            "feel part of a vibrant community and make lasting friendships",
            "number of new people met, quality of social interactions, having plans to meet again",
            "need variety in playing partners, want welcoming atmosphere",
            "feel welcomed, energized, and socially fulfilled",
            "evenings and weekends when social energy is high",
        ],
        Archetype::SkillImprover => [
            "Competitive individuals focused on mastery",
            "improve",
            "pickleball skills and competitive standing",
            "seeking to advance their game systematically",
            "see measurable skill progression and win more games",
            "skill rating improvement, tournament results, coach feedback",
            "need structured instruction, quality coaching, appropriate skill-level partners",
            "feel challenged but not overwhelmed, recognized for improvement",
            "consistent weekly drills and practice sessions",
        ],
        Archetype::CompetitivePlayer => [
            "Serious pickleball players",
            "compete and win",
            "matches against worthy opponents",
            "seeking competitive challenge and testing skills",
            "win competitive matches and build strong playing partnerships",
            "win rate, tournament results, strength of opponents",
            "need high-quality competition, consistent partners, peak-time courts",
            "feel respected as a skilled player, enjoy competitive thrill",
            "regular games with consistent partners, tournament participation",
        ],
        Archetype::CasualExplorer => [
            "Occasional players testing the waters",
            "explore and try",
            "pickleball as a potential hobby",
            "looking for new activities or occasional recreation",
            "have fun without commitment, decide if pickleball is for them",
            "enjoyment level, ease of getting started, welcoming atmosphere",
            "uncertain about long-term commitment, price-sensitive, need beginner-friendly options",
            "feel welcome as a beginner, not judged for skill level",
            "sporadic, typically weekends or special occasions",
        ],
    }
}

/// Classify one segment signature
pub fn classify(signature: &BehavioralSignature, thresholds: &ClassifierThresholds) -> JtbdHypothesis {
    let predicates = Predicates::from_signature(signature, thresholds);
    JtbdHypothesis::for_archetype(classify_predicates(&predicates))
}
