//! Financial fit assessment
//!
//! Compares a buyer's self-reported asset ranges against the franchise's
//! capital requirements. Self-reported ranges arrive as free text
//! ("$100K - $250K", "$2M+", "Under $100K", "500000"), so parsing is
//! forgiving and missing data degrades to an unknown fit rather than an
//! error.

use crate::types::{BuyerProfile, Franchise};

/// A parsed dollar range, in whole dollars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinancialRange {
    pub min: i64,
    pub max: i64,
}

/// Overall financial qualification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    Qualified,
    Borderline,
    NotQualified,
    Unknown,
}

impl FitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitStatus::Qualified => "qualified",
            FitStatus::Borderline => "borderline",
            FitStatus::NotQualified => "not_qualified",
            FitStatus::Unknown => "unknown",
        }
    }

    /// Leading sentence fragment for insight summaries; empty when unknown.
    pub fn summary_prefix(&self) -> &'static str {
        match self {
            FitStatus::Qualified => "FINANCIALLY QUALIFIED. ",
            FitStatus::Borderline => "BORDERLINE FINANCIAL FIT. ",
            FitStatus::NotQualified => "DOES NOT MEET FINANCIAL REQUIREMENTS. ",
            FitStatus::Unknown => "",
        }
    }
}

/// The assessed fit with per-requirement detail lines.
#[derive(Debug, Clone)]
pub struct FinancialFit {
    pub status: FitStatus,
    /// 0-100; rewards met requirements and a concrete funding plan
    pub score: u32,
    pub liquid_capital_assessment: String,
    pub net_worth_assessment: String,
}

impl FinancialFit {
    /// One-line rendering for the report's `financialFitAssessment` field.
    pub fn summary_line(&self) -> String {
        format!(
            "{}: {}; {}",
            match self.status {
                FitStatus::Qualified => "Qualified",
                FitStatus::Borderline => "Borderline",
                FitStatus::NotQualified => "Not qualified",
                FitStatus::Unknown => "Unknown",
            },
            self.liquid_capital_assessment,
            self.net_worth_assessment
        )
    }
}

/// Parse a self-reported dollar range.
///
/// Handles "$100K - $250K", "$2M+", "$500,000+", "Under $100K", "500000",
/// and bare small numbers that conventionally mean thousands.
pub fn parse_financial_range(range: &str) -> Option<FinancialRange> {
    let clean = range.replace(',', "").to_lowercase();
    let amounts = extract_amounts(&clean);
    let first = *amounts.first()?;

    if clean.contains("under") || clean.contains("less than") {
        return Some(FinancialRange { min: 0, max: first });
    }

    if clean.contains('+') || clean.contains("over") || clean.contains("more than") {
        // Open-ended upward; assume a 10x upper bound for midpoint math
        return Some(FinancialRange {
            min: first,
            max: first.saturating_mul(10),
        });
    }

    if amounts.len() >= 2 {
        return Some(FinancialRange {
            min: first,
            max: amounts[1],
        });
    }

    Some(FinancialRange {
        min: first,
        max: first,
    })
}

/// Pull dollar amounts out of free text, applying k/m suffixes. A bare
/// number under 1000 is taken as thousands ("250" means $250K).
fn extract_amounts(text: &str) -> Vec<i64> {
    let mut amounts = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if !c.is_ascii_digit() {
            continue;
        }
        let mut value = (c as u8 - b'0') as i64;
        while let Some(&next) = chars.peek() {
            if next.is_ascii_digit() {
                value = value * 10 + (next as u8 - b'0') as i64;
                chars.next();
            } else {
                break;
            }
        }
        let multiplier = match chars.peek() {
            Some('k') => {
                chars.next();
                1_000
            }
            Some('m') => {
                chars.next();
                1_000_000
            }
            _ => {
                if value < 1_000 {
                    1_000
                } else {
                    1
                }
            }
        };
        amounts.push(value.saturating_mul(multiplier));
    }

    amounts
}

/// Assess a requirement against a reported range.
///
/// Returns (meets, assessment line, score contribution). A midpoint within
/// 90% of the requirement counts as borderline-met and asks for
/// verification.
fn assess_requirement(
    label: &str,
    reported: &str,
    range: FinancialRange,
    required: i64,
) -> (bool, String, u32) {
    let required_display = format!("${}K", required / 1_000);
    let midpoint = (range.min + range.max) / 2;

    if range.min >= required {
        (
            true,
            format!("MEETS: {} {} exceeds {} requirement", reported, label, required_display),
            40,
        )
    } else if midpoint as f64 >= required as f64 * 0.9 {
        (
            true,
            format!(
                "BORDERLINE: {} {} is close to {} requirement - verify assets",
                reported, label, required_display
            ),
            25,
        )
    } else {
        (
            false,
            format!("SHORTFALL: {} {} below {} requirement", reported, label, required_display),
            5,
        )
    }
}

/// Assess a buyer's financial fit for a franchise.
///
/// Returns None when the franchise declares no capital requirements or the
/// buyer reported no liquid assets at all - callers fall back to
/// unqualified-neutral wording.
pub fn assess_financial_fit(profile: &BuyerProfile, franchise: &Franchise) -> Option<FinancialFit> {
    let liquid_required = franchise.liquid_capital_min?;
    profile.liquid_assets_range.as_deref()?;

    let mut score: u32 = 0;
    let mut meets_liquid: Option<bool> = None;
    let mut meets_net_worth: Option<bool> = None;
    let mut liquid_capital_assessment = "Liquid assets not provided".to_string();
    let mut net_worth_assessment = "Net worth not provided".to_string();

    if let Some(reported) = profile.liquid_assets_range.as_deref() {
        if let Some(range) = parse_financial_range(reported) {
            let (meets, line, points) =
                assess_requirement("liquid assets", reported, range, liquid_required);
            meets_liquid = Some(meets);
            liquid_capital_assessment = line;
            score += points;
        }
    }

    if let (Some(reported), Some(required)) =
        (profile.net_worth_range.as_deref(), franchise.net_worth_min)
    {
        if let Some(range) = parse_financial_range(reported) {
            let (meets, line, points) = assess_requirement("net worth", reported, range, required);
            meets_net_worth = Some(meets);
            net_worth_assessment = line;
            score += points;
        }
    }

    if let Some(plans) = profile.funding_plans.as_deref() {
        let plans = plans.to_lowercase();
        if plans.contains("cash") {
            score += 20;
        } else if plans.contains("sba") || plans.contains("401") {
            score += 15;
        } else {
            score += 10;
        }
    }

    let status = match (meets_liquid, meets_net_worth) {
        (None, None) => FitStatus::Unknown,
        (Some(false), _) | (_, Some(false)) => FitStatus::NotQualified,
        (Some(true), Some(true)) => FitStatus::Qualified,
        _ => FitStatus::Borderline,
    };

    Some(FinancialFit {
        status,
        score: score.min(100),
        liquid_capital_assessment,
        net_worth_assessment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn franchise(liquid: i64, net_worth: i64) -> Franchise {
        Franchise {
            id: "fr-1".to_string(),
            name: "Drybar".to_string(),
            liquid_capital_min: Some(liquid),
            net_worth_min: Some(net_worth),
            ..Default::default()
        }
    }

    fn buyer(liquid: &str, net_worth: &str) -> BuyerProfile {
        BuyerProfile {
            subject_id: "buyer-1".to_string(),
            liquid_assets_range: Some(liquid.to_string()),
            net_worth_range: Some(net_worth.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn parses_ranges() {
        assert_eq!(
            parse_financial_range("$100K - $250K"),
            Some(FinancialRange {
                min: 100_000,
                max: 250_000
            })
        );
        assert_eq!(
            parse_financial_range("$1M - $2M"),
            Some(FinancialRange {
                min: 1_000_000,
                max: 2_000_000
            })
        );
        assert_eq!(
            parse_financial_range("100000 - 250000"),
            Some(FinancialRange {
                min: 100_000,
                max: 250_000
            })
        );
    }

    #[test]
    fn parses_open_ended_and_bounded() {
        assert_eq!(
            parse_financial_range("$2M+"),
            Some(FinancialRange {
                min: 2_000_000,
                max: 20_000_000
            })
        );
        assert_eq!(
            parse_financial_range("Under $100K"),
            Some(FinancialRange {
                min: 0,
                max: 100_000
            })
        );
        assert_eq!(
            parse_financial_range("$500,000+"),
            Some(FinancialRange {
                min: 500_000,
                max: 5_000_000
            })
        );
    }

    #[test]
    fn bare_small_numbers_mean_thousands() {
        assert_eq!(
            parse_financial_range("250"),
            Some(FinancialRange {
                min: 250_000,
                max: 250_000
            })
        );
    }

    #[test]
    fn unparseable_is_none() {
        assert_eq!(parse_financial_range("prefer not to say"), None);
    }

    #[test]
    fn qualified_when_both_requirements_met() {
        let fit = assess_financial_fit(
            &buyer("$250K - $500K", "$500K - $1M"),
            &franchise(100_000, 300_000),
        )
        .unwrap();
        assert_eq!(fit.status, FitStatus::Qualified);
        assert!(fit.liquid_capital_assessment.starts_with("MEETS"));
        assert!(fit.net_worth_assessment.starts_with("MEETS"));
        assert_eq!(fit.score, 80);
    }

    #[test]
    fn shortfall_disqualifies() {
        let fit = assess_financial_fit(
            &buyer("$50K - $75K", "$500K - $1M"),
            &franchise(200_000, 300_000),
        )
        .unwrap();
        assert_eq!(fit.status, FitStatus::NotQualified);
        assert!(fit.liquid_capital_assessment.starts_with("SHORTFALL"));
    }

    #[test]
    fn near_miss_is_borderline_met() {
        // Midpoint $95K against a $100K requirement: within 90%
        let profile = BuyerProfile {
            subject_id: "buyer-1".to_string(),
            liquid_assets_range: Some("$90K - $100K".to_string()),
            ..Default::default()
        };
        let fit = assess_financial_fit(&profile, &franchise(100_000, 300_000)).unwrap();
        assert!(fit.liquid_capital_assessment.starts_with("BORDERLINE"));
        assert_eq!(fit.status, FitStatus::Borderline);
    }

    #[test]
    fn funding_plan_adds_score() {
        let mut profile = buyer("$250K - $500K", "$500K - $1M");
        profile.funding_plans = Some("Cash purchase".to_string());
        let fit = assess_financial_fit(&profile, &franchise(100_000, 300_000)).unwrap();
        assert_eq!(fit.score, 100);
        assert_eq!(fit.status, FitStatus::Qualified);
    }

    #[test]
    fn missing_requirements_yield_none() {
        let no_reqs = Franchise {
            id: "fr-1".to_string(),
            name: "Drybar".to_string(),
            ..Default::default()
        };
        assert!(assess_financial_fit(&buyer("$250K", "$500K"), &no_reqs).is_none());

        let no_assets = BuyerProfile {
            subject_id: "buyer-1".to_string(),
            ..Default::default()
        };
        assert!(assess_financial_fit(&no_assets, &franchise(100_000, 300_000)).is_none());
    }
}
