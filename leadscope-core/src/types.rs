//! Core domain types for leadscope
//!
//! These types model a lead's engagement with a Franchise Disclosure
//! Document (FDD) and the derived read models served to franchisors.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Subject** | The buyer/lead whose viewing behavior is being measured |
//! | **Session** | One browsing session of the FDD viewer, keyed by a client-generated id |
//! | **Snapshot** | The wire form of a session's cumulative state, flushed to ingestion |
//! | **Milestone** | A one-way boolean flag marking that a behavior occurred at least once |
//! | **Aggregate** | The roll-up of all sessions for one (subject, franchise) pair |
//! | **Tier** | Coarse engagement classification: none/minimal/partial/meaningful/high |
//!
//! Milestones and sets only ever grow: `time_spent_seconds` is monotonic
//! non-decreasing, milestone flags latch true, and `sections_viewed` /
//! `viewed_items` grow by union. The ingestion merge in the store relies on
//! these invariants to stay commutative across uncoordinated writers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tier::EngagementTier;

// ============================================
// Milestones
// ============================================

/// One-way behavior flags for a session.
///
/// Each flag transitions false -> true at most once and never reverts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestones {
    /// The FDD was opened and at least one second of active time accrued
    #[serde(rename = "viewedFDD")]
    pub viewed_fdd: bool,
    /// At least one question was asked through the document assistant
    pub asked_questions: bool,
    /// Item 19 (financial performance) was viewed
    pub viewed_item19: bool,
    /// Item 7 (initial investment) was viewed
    pub viewed_item7: bool,
    /// At least one note was created while reading
    pub created_notes: bool,
    /// Accrued active time crossed the significant-time threshold
    pub spent_significant_time: bool,
}

impl Milestones {
    /// Combine two milestone sets; true wins on every flag.
    pub fn union(&self, other: &Milestones) -> Milestones {
        Milestones {
            viewed_fdd: self.viewed_fdd || other.viewed_fdd,
            asked_questions: self.asked_questions || other.asked_questions,
            viewed_item19: self.viewed_item19 || other.viewed_item19,
            viewed_item7: self.viewed_item7 || other.viewed_item7,
            created_notes: self.created_notes || other.created_notes,
            spent_significant_time: self.spent_significant_time || other.spent_significant_time,
        }
    }
}

// ============================================
// Engagement session
// ============================================

/// One browsing session's cumulative engagement state.
///
/// Created when a viewer mounts (the client generates and keeps the
/// `session_id` so reloads reuse it), mutated throughout the session, and
/// flushed to the ingestion endpoint. Sessions are never deleted; they feed
/// the aggregate for the lifetime of the buyer-franchise relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementSession {
    /// Opaque client-generated id, stable for the session's lifetime
    pub session_id: String,
    /// The buyer whose behavior this session records
    pub subject_id: String,
    /// Franchise whose FDD is being read
    pub franchise_id: String,
    /// URL slug of the franchise (carried for downstream display)
    pub franchise_slug: Option<String>,
    /// Seconds of visible-and-active viewing time; monotonic non-decreasing
    pub time_spent_seconds: i64,
    /// Deduplicated section labels, in first-seen order
    pub sections_viewed: Vec<String>,
    /// Deduplicated disclosure-item keys (e.g., "item7", "item19")
    pub viewed_items: Vec<String>,
    /// Questions asked, append-only in ask order
    pub questions_asked: Vec<String>,
    /// Notes created while reading
    pub notes_created: i64,
    /// Whether the document was downloaded
    pub downloaded: bool,
    /// When the first download happened; set at most once
    pub downloaded_at: Option<DateTime<Utc>>,
    /// One-way behavior flags
    pub milestones: Milestones,
    /// Updated on every mutating operation
    pub last_activity: DateTime<Utc>,
    /// Immutable creation timestamp
    pub created_at: DateTime<Utc>,
}

impl EngagementSession {
    /// Create an empty session for a viewer mount.
    pub fn new(
        session_id: impl Into<String>,
        subject_id: impl Into<String>,
        franchise_id: impl Into<String>,
        franchise_slug: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            subject_id: subject_id.into(),
            franchise_id: franchise_id.into(),
            franchise_slug,
            time_spent_seconds: 0,
            sections_viewed: Vec::new(),
            viewed_items: Vec::new(),
            questions_asked: Vec::new(),
            notes_created: 0,
            downloaded: false,
            downloaded_at: None,
            milestones: Milestones::default(),
            last_activity: now,
            created_at: now,
        }
    }

    /// Produce the wire snapshot of the current cumulative state.
    ///
    /// Every flush path (debounce, periodic, on-hide, beacon) serializes
    /// through here so all transports carry the identical body.
    pub fn snapshot(&self) -> EngagementSnapshot {
        EngagementSnapshot {
            franchise_id: self.franchise_id.clone(),
            franchise_slug: self.franchise_slug.clone(),
            time_spent: self.time_spent_seconds,
            questions_asked: self.questions_asked.clone(),
            sections_viewed: self.sections_viewed.clone(),
            viewed_items: self.viewed_items.clone(),
            notes_created: self.notes_created,
            downloaded: self.downloaded,
            downloaded_at: self.downloaded_at,
            last_activity: self.last_activity,
            session_id: self.session_id.clone(),
            viewed_fdd: self.milestones.viewed_fdd,
            asked_questions: self.milestones.asked_questions,
            viewed_item19: self.milestones.viewed_item19,
            viewed_item7: self.milestones.viewed_item7,
            created_notes: self.milestones.created_notes,
            spent_significant_time: self.milestones.spent_significant_time,
        }
    }
}

// ============================================
// Wire snapshot
// ============================================

/// The JSON body accepted by `POST /engagement`.
///
/// Milestone flags are flattened to top-level booleans on the wire; the
/// beacon transport posts the identical shape. The subject is not part of
/// the body - it is resolved by the authenticating layer upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementSnapshot {
    pub franchise_id: String,
    #[serde(default)]
    pub franchise_slug: Option<String>,
    pub time_spent: i64,
    #[serde(default)]
    pub questions_asked: Vec<String>,
    #[serde(default)]
    pub sections_viewed: Vec<String>,
    #[serde(default)]
    pub viewed_items: Vec<String>,
    #[serde(default)]
    pub notes_created: i64,
    #[serde(default)]
    pub downloaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub session_id: String,
    #[serde(rename = "viewedFDD", default)]
    pub viewed_fdd: bool,
    #[serde(default)]
    pub asked_questions: bool,
    #[serde(default)]
    pub viewed_item19: bool,
    #[serde(default)]
    pub viewed_item7: bool,
    #[serde(default)]
    pub created_notes: bool,
    #[serde(default)]
    pub spent_significant_time: bool,
}

impl EngagementSnapshot {
    /// Reassemble the nested milestone flags from the flat wire fields.
    pub fn milestones(&self) -> Milestones {
        Milestones {
            viewed_fdd: self.viewed_fdd,
            asked_questions: self.asked_questions,
            viewed_item19: self.viewed_item19,
            viewed_item7: self.viewed_item7,
            created_notes: self.created_notes,
            spent_significant_time: self.spent_significant_time,
        }
    }
}

// ============================================
// Context records
// ============================================

/// Self-reported buyer profile consulted by templates and the AI prompt.
///
/// Every field is optional in practice; consumers substitute neutral
/// defaults rather than fail when data is missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuyerProfile {
    pub subject_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub buying_timeline: Option<String>,
    pub signup_source: Option<String>,
    pub fico_score_range: Option<String>,
    pub liquid_assets_range: Option<String>,
    pub net_worth_range: Option<String>,
    pub funding_plans: Option<String>,
    pub years_of_experience: Option<i64>,
    pub has_owned_business: bool,
    pub linkedin_url: Option<String>,
}

impl BuyerProfile {
    /// "First Last" when a first name is known.
    pub fn full_name(&self) -> Option<String> {
        let first = self.first_name.as_deref()?;
        let name = match self.last_name.as_deref() {
            Some(last) => format!("{} {}", first, last),
            None => first.to_string(),
        };
        Some(name.trim().to_string())
    }

    /// "City, ST" when both parts are known.
    pub fn location(&self) -> Option<String> {
        match (self.city.as_deref(), self.state.as_deref()) {
            (Some(city), Some(state)) => Some(format!("{}, {}", city, state)),
            _ => None,
        }
    }
}

/// Franchise facts consulted by templates and the AI prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Franchise {
    pub id: String,
    pub slug: Option<String>,
    pub name: String,
    pub industry: Option<String>,
    pub investment_min: Option<i64>,
    pub investment_max: Option<i64>,
    /// Minimum liquid capital the franchisor requires of candidates
    pub liquid_capital_min: Option<i64>,
    /// Minimum net worth the franchisor requires of candidates
    pub net_worth_min: Option<i64>,
}

impl Franchise {
    /// "$100K - $250K" style display range, when both bounds are known.
    pub fn investment_range(&self) -> Option<String> {
        match (self.investment_min, self.investment_max) {
            (Some(min), Some(max)) => Some(format!(
                "${}K - ${}K",
                min / 1000,
                max / 1000
            )),
            _ => None,
        }
    }
}

/// Grant of FDD access to a subject; the lead id franchisors query by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadAccess {
    pub id: String,
    pub subject_id: String,
    pub franchise_id: String,
    pub granted_at: DateTime<Utc>,
}

/// An invitation sent to a prospect before they sign up.
///
/// When a lead id resolves to an invitation but no access record, the
/// prospect has not opened the FDD yet and insights use the pending path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Invitation {
    pub id: String,
    pub franchise_id: String,
    pub lead_email: Option<String>,
    pub lead_name: Option<String>,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub timeline: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub target_location: Option<String>,
    pub brand: Option<String>,
}

// ============================================
// Aggregated engagement (derived, not stored)
// ============================================

/// Behavioral signals derived from section labels and item keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BehavioralSignals {
    /// Item 19, financial performance - ROI focused
    pub viewed_item19: bool,
    /// Item 7, initial investment - cost conscious
    pub viewed_item7: bool,
    /// Item 12, territory - growth oriented
    pub viewed_item12: bool,
    /// Item 20, outlets/system size - due diligence
    pub viewed_item20: bool,
    /// Item 11, training - operations focused
    pub viewed_item11: bool,
}

/// The roll-up of every session for one (subject, franchise) pair.
#[derive(Debug, Clone)]
pub struct AggregatedEngagement {
    pub subject_id: String,
    pub franchise_id: String,
    /// Sum of `time_spent_seconds` across sessions
    pub total_time_seconds: i64,
    /// Number of distinct sessions
    pub session_count: usize,
    /// Days between the first and last session (0 for a single session)
    pub session_span_days: i64,
    /// Union of section labels across sessions, first-seen order
    pub sections_viewed: Vec<String>,
    /// Union of item keys across sessions
    pub viewed_items: Vec<String>,
    /// Questions concatenated across sessions in creation order
    pub questions_asked: Vec<String>,
    pub notes_created: i64,
    pub downloaded: bool,
    /// OR of all sessions' milestones
    pub milestones: Milestones,
    /// Earliest session creation time
    pub first_accessed_at: Option<DateTime<Utc>>,
    /// Latest activity across sessions
    pub last_activity_at: Option<DateTime<Utc>>,
    pub tier: EngagementTier,
}

impl AggregatedEngagement {
    /// An empty aggregate for a pair with no recorded sessions.
    pub fn empty(subject_id: impl Into<String>, franchise_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            franchise_id: franchise_id.into(),
            total_time_seconds: 0,
            session_count: 0,
            session_span_days: 0,
            sections_viewed: Vec::new(),
            viewed_items: Vec::new(),
            questions_asked: Vec::new(),
            notes_created: 0,
            downloaded: false,
            milestones: Milestones::default(),
            first_accessed_at: None,
            last_activity_at: None,
            tier: EngagementTier::None,
        }
    }

    /// Whole minutes of total viewing time.
    pub fn total_minutes(&self) -> i64 {
        self.total_time_seconds / 60
    }

    /// Derive item-level signals from milestones, section labels, and item
    /// keys. Label matching is forgiving because sections arrive as free
    /// text ("Item 19 - Financial Performance", "financial data", ...).
    pub fn signals(&self) -> BehavioralSignals {
        let sections: Vec<String> = self
            .sections_viewed
            .iter()
            .map(|s| s.to_lowercase())
            .collect();
        let items: Vec<String> = self.viewed_items.iter().map(|s| s.to_lowercase()).collect();

        let matches = |item_number: &str, keywords: &[&str]| {
            let item_label = format!("item {}", item_number);
            sections
                .iter()
                .any(|s| s.contains(&item_label) || keywords.iter().any(|k| s.contains(k)))
                || items.iter().any(|i| {
                    i == &format!("item{}", item_number) || i.as_str() == item_number
                })
        };

        BehavioralSignals {
            viewed_item19: self.milestones.viewed_item19 || matches("19", &["financial"]),
            viewed_item7: self.milestones.viewed_item7 || matches("7", &["investment"]),
            viewed_item12: matches("12", &["territory"]),
            viewed_item20: matches("20", &["outlets"]),
            viewed_item11: matches("11", &["training"]),
        }
    }
}

// ============================================
// Insight output
// ============================================

/// The structured sales-insight object, identical in shape across every
/// strategy and tier. Every path - template or AI, data-rich or empty -
/// returns a well-formed report; callers never see a blank insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightReport {
    pub summary: String,
    pub key_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub next_steps: Vec<String>,
    pub engagement_tier: EngagementTier,
    pub tier_message: String,
    /// Present when buyer financial fields allowed a fit assessment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub financial_fit_assessment: Option<String>,
}

// ============================================
// Lead engagement read model
// ============================================

/// One row of the FDD focus-area breakdown in the lead report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusArea {
    pub item: String,
    pub time_spent: String,
    pub interest: String,
}

/// Buyer qualification block returned to franchisors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerQualification {
    pub fico_score_range: Option<String>,
    pub liquid_assets_range: Option<String>,
    pub net_worth_range: Option<String>,
    pub funding_plans: Option<String>,
    pub linked_in_url: Option<String>,
    pub years_of_experience: Option<i64>,
    pub has_owned_business: bool,
}

impl BuyerQualification {
    pub fn from_profile(profile: &BuyerProfile) -> Self {
        Self {
            fico_score_range: profile.fico_score_range.clone(),
            liquid_assets_range: profile.liquid_assets_range.clone(),
            net_worth_range: profile.net_worth_range.clone(),
            funding_plans: profile.funding_plans.clone(),
            linked_in_url: profile.linkedin_url.clone(),
            years_of_experience: profile.years_of_experience,
            has_owned_business: profile.has_owned_business,
        }
    }
}

/// Invitation context block returned to franchisors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationData {
    pub source: Option<String>,
    pub timeline: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub target_location: Option<String>,
    pub brand: Option<String>,
}

impl InvitationData {
    pub fn from_invitation(invitation: &Invitation) -> Self {
        Self {
            source: invitation.source.clone(),
            timeline: invitation.timeline.clone(),
            city: invitation.city.clone(),
            state: invitation.state.clone(),
            target_location: invitation.target_location.clone(),
            brand: invitation.brand.clone(),
        }
    }
}

/// The response body of `GET /engagement?lead_id=`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementReport {
    /// "Xh Ym" or "Ym"
    pub total_time_spent: String,
    pub total_time_spent_seconds: i64,
    /// Capped at 10 entries
    pub sections_viewed: Vec<String>,
    /// Capped at 5 entries
    pub questions_asked: Vec<String>,
    pub fdd_focus_areas: Vec<FocusArea>,
    pub accessed_date: Option<String>,
    pub engagement_count: usize,
    pub engagement_tier: EngagementTier,
    pub ai_insights: InsightReport,
    pub buyer_qualification: Option<BuyerQualification>,
    pub buyer_location: Option<String>,
    pub invitation_data: Option<InvitationData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestones_union_latches_true() {
        let a = Milestones {
            viewed_fdd: true,
            viewed_item19: true,
            ..Default::default()
        };
        let b = Milestones {
            asked_questions: true,
            ..Default::default()
        };
        let merged = a.union(&b);
        assert!(merged.viewed_fdd);
        assert!(merged.viewed_item19);
        assert!(merged.asked_questions);
        assert!(!merged.viewed_item7);
    }

    #[test]
    fn snapshot_round_trips_milestones() {
        let now = Utc::now();
        let mut session =
            EngagementSession::new("s-1", "buyer-1", "fr-1", Some("drybar".to_string()), now);
        session.milestones.viewed_item19 = true;
        session.milestones.viewed_fdd = true;
        session.time_spent_seconds = 42;

        let snap = session.snapshot();
        assert_eq!(snap.time_spent, 42);
        assert!(snap.viewed_item19);
        assert_eq!(snap.milestones(), session.milestones);
    }

    #[test]
    fn snapshot_wire_names_are_camel_case() {
        let now = Utc::now();
        let session = EngagementSession::new("s-1", "buyer-1", "fr-1", None, now);
        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert!(json.get("timeSpent").is_some());
        assert!(json.get("viewedFDD").is_some());
        assert!(json.get("spentSignificantTime").is_some());
        assert!(json.get("sessionId").is_some());
        // downloadedAt omitted until the first download
        assert!(json.get("downloadedAt").is_none());
    }

    #[test]
    fn signals_match_sections_and_items() {
        let mut agg = AggregatedEngagement::empty("buyer-1", "fr-1");
        agg.sections_viewed = vec![
            "Item 19 - Financial Performance".to_string(),
            "Item 12 - Territory".to_string(),
        ];
        agg.viewed_items = vec!["item7".to_string()];

        let signals = agg.signals();
        assert!(signals.viewed_item19);
        assert!(signals.viewed_item7);
        assert!(signals.viewed_item12);
        assert!(!signals.viewed_item20);
        assert!(!signals.viewed_item11);
    }

    #[test]
    fn franchise_investment_range_display() {
        let franchise = Franchise {
            id: "fr-1".to_string(),
            name: "Drybar".to_string(),
            investment_min: Some(100_000),
            investment_max: Some(250_000),
            ..Default::default()
        };
        assert_eq!(
            franchise.investment_range().as_deref(),
            Some("$100K - $250K")
        );
    }
}
