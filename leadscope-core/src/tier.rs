//! Engagement tier classification
//!
//! A pure mapping from accumulated viewing time and session count to a
//! coarse tier. The tier drives which insight strategy runs and how the
//! lead is presented to the franchisor.

use serde::{Deserialize, Serialize};

/// Coarse classification of how deeply a lead engaged with the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementTier {
    /// Invitation sent, FDD never opened
    None,
    /// Under 5 minutes of viewing
    Minimal,
    /// 5 to 15 minutes
    Partial,
    /// 15 to 45 minutes
    Meaningful,
    /// 45 minutes or more
    High,
}

impl EngagementTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementTier::None => "none",
            EngagementTier::Minimal => "minimal",
            EngagementTier::Partial => "partial",
            EngagementTier::Meaningful => "meaningful",
            EngagementTier::High => "high",
        }
    }

    /// The follow-up guidance line attached to every insight report.
    pub fn message(&self) -> &'static str {
        match self {
            EngagementTier::None => "Awaiting first FDD session",
            EngagementTier::Minimal => "Limited engagement - early stage, needs nurturing",
            EngagementTier::Partial => "Partial engagement - interested, needs encouragement",
            EngagementTier::Meaningful => "Warm lead - ready for deeper conversation",
            EngagementTier::High => "Hot lead - prioritize immediate follow-up",
        }
    }

    /// Only meaningful/high leads justify a generative call; lower tiers
    /// always use deterministic templates.
    pub fn ai_eligible(&self) -> bool {
        matches!(self, EngagementTier::Meaningful | EngagementTier::High)
    }
}

impl std::fmt::Display for EngagementTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EngagementTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(EngagementTier::None),
            "minimal" => Ok(EngagementTier::Minimal),
            "partial" => Ok(EngagementTier::Partial),
            "meaningful" => Ok(EngagementTier::Meaningful),
            "high" => Ok(EngagementTier::High),
            _ => Err(format!("unknown engagement tier: {}", s)),
        }
    }
}

/// Classify total viewing time and session count into a tier.
///
/// Boundaries are half-open on the lower bound: strictly less than the
/// threshold stays in the lower tier, exactly at the threshold moves up.
pub fn classify(total_time_seconds: i64, session_count: usize) -> EngagementTier {
    if session_count == 0 || total_time_seconds == 0 {
        return EngagementTier::None;
    }
    let minutes = total_time_seconds as f64 / 60.0;
    if minutes < 5.0 {
        EngagementTier::Minimal
    } else if minutes < 15.0 {
        EngagementTier::Partial
    } else if minutes < 45.0 {
        EngagementTier::Meaningful
    } else {
        EngagementTier::High
    }
}
