//! Engagement aggregation
//!
//! Rolls every stored session for a (subject, franchise) pair into one
//! derived view: total time, unioned sections and items, concatenated
//! questions, OR-ed milestones, and the engagement tier. The aggregate is
//! computed on read and never stored.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::format::{format_date_opt, format_duration};
use crate::store::Database;
use crate::tier;
use crate::types::{
    AggregatedEngagement, BuyerProfile, BuyerQualification, EngagementReport, EngagementSession,
    FocusArea, InsightReport, Invitation, InvitationData,
};

/// Share of total time attributed to each ranked focus area.
const FOCUS_WEIGHTS: [f64; 4] = [0.40, 0.25, 0.20, 0.15];

/// Reads sessions for a lead and derives the aggregate view.
pub struct EngagementAggregator<'a> {
    db: &'a Database,
}

impl<'a> EngagementAggregator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Aggregate all sessions for a (subject, franchise) pair.
    ///
    /// Returns an empty aggregate (tier `none`) when no sessions exist.
    pub fn aggregate(&self, subject_id: &str, franchise_id: &str) -> Result<AggregatedEngagement> {
        let sessions = self.db.list_engagement_sessions(subject_id, franchise_id)?;
        Ok(fold_sessions(subject_id, franchise_id, &sessions))
    }
}

/// Fold sessions into the derived aggregate.
pub fn fold_sessions(
    subject_id: &str,
    franchise_id: &str,
    sessions: &[EngagementSession],
) -> AggregatedEngagement {
    let mut agg = AggregatedEngagement::empty(subject_id, franchise_id);

    for session in sessions {
        agg.total_time_seconds += session.time_spent_seconds;
        union_into(&mut agg.sections_viewed, &session.sections_viewed);
        union_into(&mut agg.viewed_items, &session.viewed_items);
        agg.questions_asked
            .extend(session.questions_asked.iter().cloned());
        agg.notes_created += session.notes_created;
        agg.downloaded = agg.downloaded || session.downloaded;
        agg.milestones = agg.milestones.union(&session.milestones);

        agg.first_accessed_at = Some(match agg.first_accessed_at {
            Some(first) if first <= session.created_at => first,
            _ => session.created_at,
        });
        agg.last_activity_at = Some(match agg.last_activity_at {
            Some(last) if last >= session.last_activity => last,
            _ => session.last_activity,
        });
    }

    agg.session_count = sessions.len();
    agg.session_span_days = span_days(agg.first_accessed_at, agg.last_activity_at);
    agg.tier = tier::classify(agg.total_time_seconds, agg.session_count);
    agg
}

/// Whole days (rounded up) between first and last activity.
fn span_days(first: Option<DateTime<Utc>>, last: Option<DateTime<Utc>>) -> i64 {
    match (first, last) {
        (Some(first), Some(last)) if last > first => {
            let seconds = (last - first).num_seconds();
            (seconds + 86_399) / 86_400
        }
        _ => 0,
    }
}

/// Rank viewed sections into display focus areas, splitting the measured
/// total time across them with decaying weights. The top two areas read as
/// high interest.
pub fn focus_areas(agg: &AggregatedEngagement) -> Vec<FocusArea> {
    agg.sections_viewed
        .iter()
        .take(FOCUS_WEIGHTS.len())
        .enumerate()
        .map(|(idx, section)| {
            let share = (agg.total_time_seconds as f64 * FOCUS_WEIGHTS[idx]) as i64;
            FocusArea {
                item: section.clone(),
                time_spent: format_duration(share),
                interest: if idx < 2 { "High" } else { "Medium" }.to_string(),
            }
        })
        .collect()
}

/// Assemble the lead engagement read model served to franchisors.
pub fn build_report(
    agg: &AggregatedEngagement,
    insights: InsightReport,
    buyer: Option<&BuyerProfile>,
    invitation: Option<&Invitation>,
) -> EngagementReport {
    // Invitation data is usually fresher than the profile for location
    let buyer_location = invitation
        .and_then(|inv| match (inv.city.as_deref(), inv.state.as_deref()) {
            (Some(city), Some(state)) => Some(format!("{}, {}", city, state)),
            _ => None,
        })
        .or_else(|| buyer.and_then(|b| b.location()));

    EngagementReport {
        total_time_spent: format_duration(agg.total_time_seconds),
        total_time_spent_seconds: agg.total_time_seconds,
        sections_viewed: agg.sections_viewed.iter().take(10).cloned().collect(),
        questions_asked: agg.questions_asked.iter().take(5).cloned().collect(),
        fdd_focus_areas: focus_areas(agg),
        accessed_date: format_date_opt(agg.first_accessed_at),
        engagement_count: agg.session_count,
        engagement_tier: agg.tier,
        ai_insights: insights,
        buyer_qualification: buyer.map(BuyerQualification::from_profile),
        buyer_location,
        invitation_data: invitation.map(InvitationData::from_invitation),
    }
}

fn union_into(dst: &mut Vec<String>, src: &[String]) {
    for value in src {
        if !dst.iter().any(|existing| existing == value) {
            dst.push(value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::EngagementTier;
    use crate::types::{EngagementSession, Milestones};
    use chrono::Duration;

    fn session(id: &str, seconds: i64, created_offset_days: i64) -> EngagementSession {
        let created = Utc::now() - Duration::days(created_offset_days);
        let mut s = EngagementSession::new(id, "buyer-1", "fr-1", None, created);
        s.time_spent_seconds = seconds;
        s.last_activity = created;
        s
    }

    #[test]
    fn empty_pair_aggregates_to_none() {
        let agg = fold_sessions("buyer-1", "fr-1", &[]);
        assert_eq!(agg.session_count, 0);
        assert_eq!(agg.total_time_seconds, 0);
        assert_eq!(agg.tier, EngagementTier::None);
    }

    #[test]
    fn sums_time_and_counts_sessions() {
        let sessions = vec![session("s-1", 600, 3), session("s-2", 600, 1), session("s-3", 600, 0)];
        let agg = fold_sessions("buyer-1", "fr-1", &sessions);
        assert_eq!(agg.total_time_seconds, 1800);
        assert_eq!(agg.session_count, 3);
        assert_eq!(agg.tier, EngagementTier::Meaningful);
        assert!(agg.session_span_days >= 3);
    }

    #[test]
    fn unions_sections_and_concatenates_questions() {
        let mut a = session("s-1", 100, 1);
        a.sections_viewed = vec!["Item 19".to_string(), "Item 7".to_string()];
        a.questions_asked = vec!["q1".to_string()];
        a.milestones = Milestones {
            viewed_item19: true,
            ..Default::default()
        };
        let mut b = session("s-2", 100, 0);
        b.sections_viewed = vec!["Item 19".to_string(), "Item 12".to_string()];
        b.questions_asked = vec!["q2".to_string()];

        let agg = fold_sessions("buyer-1", "fr-1", &[a, b]);
        assert_eq!(
            agg.sections_viewed,
            vec![
                "Item 19".to_string(),
                "Item 7".to_string(),
                "Item 12".to_string()
            ]
        );
        assert_eq!(agg.questions_asked, vec!["q1".to_string(), "q2".to_string()]);
        assert!(agg.milestones.viewed_item19);
    }

    #[test]
    fn focus_areas_split_real_time_with_decaying_weights() {
        let mut s = session("s-1", 3600, 0);
        s.sections_viewed = vec![
            "Item 19".to_string(),
            "Item 7".to_string(),
            "Item 12".to_string(),
        ];
        let agg = fold_sessions("buyer-1", "fr-1", &[s]);

        let areas = focus_areas(&agg);
        assert_eq!(areas.len(), 3);
        assert_eq!(areas[0].time_spent, "24m"); // 40% of an hour
        assert_eq!(areas[0].interest, "High");
        assert_eq!(areas[1].interest, "High");
        assert_eq!(areas[2].interest, "Medium");
    }

    #[test]
    fn report_caps_sections_and_questions() {
        let mut s = session("s-1", 3000, 0);
        s.sections_viewed = (0..15).map(|i| format!("Section {}", i)).collect();
        s.questions_asked = (0..8).map(|i| format!("question {}", i)).collect();
        let agg = fold_sessions("buyer-1", "fr-1", &[s]);

        let insights = InsightReport {
            summary: "s".to_string(),
            key_findings: vec![],
            recommendations: vec![],
            next_steps: vec![],
            engagement_tier: agg.tier,
            tier_message: agg.tier.message().to_string(),
            financial_fit_assessment: None,
        };
        let report = build_report(&agg, insights, None, None);
        assert_eq!(report.sections_viewed.len(), 10);
        assert_eq!(report.questions_asked.len(), 5);
        assert_eq!(report.engagement_count, 1);
        assert!(report.accessed_date.is_some());
    }

    #[test]
    fn location_prefers_invitation_over_profile() {
        let agg = fold_sessions("buyer-1", "fr-1", &[]);
        let insights = InsightReport {
            summary: "s".to_string(),
            key_findings: vec![],
            recommendations: vec![],
            next_steps: vec![],
            engagement_tier: agg.tier,
            tier_message: agg.tier.message().to_string(),
            financial_fit_assessment: None,
        };
        let buyer = BuyerProfile {
            subject_id: "buyer-1".to_string(),
            city: Some("Phoenix".to_string()),
            state: Some("AZ".to_string()),
            ..Default::default()
        };
        let invitation = Invitation {
            id: "inv-1".to_string(),
            franchise_id: "fr-1".to_string(),
            status: "sent".to_string(),
            city: Some("Los Angeles".to_string()),
            state: Some("CA".to_string()),
            ..Default::default()
        };
        let report = build_report(&agg, insights, Some(&buyer), Some(&invitation));
        assert_eq!(report.buyer_location.as_deref(), Some("Los Angeles, CA"));
    }
}
