//! Deterministic insight templates
//!
//! One builder per tier, parameterized by whatever telemetry and context
//! records exist. Missing records degrade to neutral wording ("This
//! prospect", "the franchise", "Not specified") - a template never fails,
//! which is what makes it a safe landing spot for the AI fallback.

use crate::insight::fit::{FinancialFit, FitStatus};
use crate::insight::InsightContext;
use crate::tier::EngagementTier;
use crate::types::InsightReport;

/// Build the deterministic report for a tier.
pub fn generate(ctx: &InsightContext, tier: EngagementTier) -> InsightReport {
    match tier {
        EngagementTier::None => pending(ctx),
        EngagementTier::Minimal => minimal(ctx),
        EngagementTier::Partial => partial(ctx),
        EngagementTier::Meaningful | EngagementTier::High => engaged(ctx, tier),
    }
}

/// Invitation sent, FDD never opened.
fn pending(ctx: &InsightContext) -> InsightReport {
    let name = ctx.buyer_name();
    let franchise = ctx.franchise_name();
    let fit = ctx.financial_fit();

    let sent = ctx
        .invitation
        .and_then(|inv| inv.sent_at)
        .map(crate::format::format_date)
        .unwrap_or_else(|| "recently".to_string());

    let summary = format!(
        "{} was invited to review the {} FDD on {} but has not opened it yet. \
         Specific insights about their interests, concerns, and questions will be \
         available once they begin reviewing the document.",
        name, franchise, sent
    );

    let mut key_findings = vec![format!("Invitation sent {} - awaiting first open", sent)];
    if let Some(fit) = &fit {
        key_findings.push(fit.liquid_capital_assessment.clone());
        key_findings.push(fit.net_worth_assessment.clone());
    }
    if let Some(source) = ctx.invitation.and_then(|inv| inv.source.as_deref()) {
        key_findings.push(format!("Lead source: {}", source));
    }

    let recommendations = vec![
        "Send a friendly reminder highlighting what the FDD covers".to_string(),
        format!(
            "Offer a short intro call to walk {} through the opportunity",
            name
        ),
    ];

    let next_steps = vec![
        "Follow up if the invitation stays unopened for a week".to_string(),
        "Confirm the invitation reached the right inbox".to_string(),
    ];

    report(EngagementTier::None, summary, key_findings, recommendations, next_steps, fit)
}

/// Under five minutes of viewing: early-stage lead.
fn minimal(ctx: &InsightContext) -> InsightReport {
    let name = ctx.buyer_name();
    let franchise = ctx.franchise_name();
    let source = ctx.source();
    let minutes = ctx.aggregate.total_minutes();
    let fit = ctx.financial_fit();
    let status = fit.as_ref().map(|f| f.status).unwrap_or(FitStatus::Unknown);

    let summary = format!(
        "{}{} has briefly accessed the {} FDD ({} minute{}), suggesting initial \
         interest but limited engagement so far. This is an early-stage lead that \
         needs nurturing.",
        status.summary_prefix(),
        name,
        franchise,
        minutes,
        plural(minutes),
    );

    let mut key_findings = fit_findings(&fit);
    key_findings.push(format!(
        "Limited engagement: only {} minute{} of FDD review suggests they may be exploring options",
        minutes,
        plural(minutes)
    ));
    key_findings.push(match ctx.aggregate.sections_viewed.first() {
        Some(_) => format!(
            "Initial focus on: {}",
            ctx.aggregate
                .sections_viewed
                .iter()
                .take(2)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        ),
        None => "No specific sections recorded yet".to_string(),
    });
    key_findings.push(format!(
        "Lead source: {} - consider how to re-engage based on this channel",
        source
    ));

    let recommendations = vec![
        if status == FitStatus::NotQualified {
            format!(
                "Address the financial gap early - {} may need to explore financing options or other brands",
                name
            )
        } else {
            "Verify financial qualification on the first call".to_string()
        },
        "Send a personalized follow-up asking if they have any initial questions".to_string(),
        "Offer a brief call to highlight the most relevant FDD sections for their situation"
            .to_string(),
        "Share a getting-started guide to encourage further exploration".to_string(),
    ];

    let next_steps = vec![
        "Send a friendly check-in email within 48 hours".to_string(),
        "Prepare 2-3 talking points about the franchise's key differentiators".to_string(),
        "Schedule a follow-up reminder if they haven't returned to the FDD in 5 days".to_string(),
    ];

    report(EngagementTier::Minimal, summary, key_findings, recommendations, next_steps, fit)
}

/// Five to fifteen minutes: interested, needs encouragement.
fn partial(ctx: &InsightContext) -> InsightReport {
    let name = ctx.buyer_name();
    let franchise = ctx.franchise_name();
    let source = ctx.source();
    let minutes = ctx.aggregate.total_minutes();
    let sessions = ctx.aggregate.session_count;
    let signals = ctx.aggregate.signals();
    let timeline = ctx.timeline();
    let location = ctx.location();
    let fit = ctx.financial_fit();
    let status = fit.as_ref().map(|f| f.status).unwrap_or(FitStatus::Unknown);

    let focus_clause = if signals.viewed_item19 || signals.viewed_item7 {
        "Their focus on financial sections suggests they're evaluating the investment seriously."
    } else {
        "They appear to be in the exploration phase and may benefit from guided engagement."
    };

    let summary = format!(
        "{}{} has shown moderate interest in {}, spending {} minutes across {} session{}. {}",
        status.summary_prefix(),
        name,
        franchise,
        minutes,
        sessions,
        plural(sessions as i64),
        focus_clause,
    );

    let mut key_findings = fit_findings(&fit);
    key_findings.push(format!(
        "Moderate engagement: {} minutes indicates genuine interest but not deep due diligence yet",
        minutes
    ));
    key_findings.push(if signals.viewed_item19 {
        "Viewed financial performance data (Item 19) - interested in ROI potential".to_string()
    } else {
        "Hasn't viewed Item 19 yet - may need prompting to review financial performance".to_string()
    });
    key_findings.push(if signals.viewed_item7 {
        "Reviewed initial investment (Item 7) - evaluating affordability".to_string()
    } else {
        "Hasn't focused on investment details yet".to_string()
    });
    if let Some(timeline) = &timeline {
        key_findings.push(format!("Timeline: {}", timeline));
    }

    let recommendations = vec![
        match status {
            FitStatus::NotQualified => {
                "Financial gap identified - discuss financing options or alternative paths before investing more time".to_string()
            }
            FitStatus::Borderline => {
                "Verify financial details - they're close to requirements but need confirmation".to_string()
            }
            _ => "Confirm financial qualification early in the discovery call".to_string(),
        },
        if signals.viewed_item19 {
            "Lead with financial success stories since they've shown interest in Item 19".to_string()
        } else {
            "Proactively share Item 19 highlights to spark financial interest".to_string()
        },
        format!("Personalize outreach based on their {} lead source", source),
        "Offer a discovery call to understand their specific goals and questions".to_string(),
    ];

    let next_steps = vec![
        format!("Schedule a discovery call with {} within the next 3-5 days", name),
        if signals.viewed_item19 {
            "Prepare specific ROI examples and franchisee success stories".to_string()
        } else {
            "Create a summary of Item 19 highlights to share".to_string()
        },
        match &location {
            Some(location) => format!("Research territory availability in the {} area", location),
            None => "Have territory availability information ready".to_string(),
        },
        "Prepare answers to common questions about training, support, and timeline to opening"
            .to_string(),
    ];

    report(EngagementTier::Partial, summary, key_findings, recommendations, next_steps, fit)
}

/// Fifteen minutes or more: the meaningful/high template, also the landing
/// spot when the AI path fails.
fn engaged(ctx: &InsightContext, tier: EngagementTier) -> InsightReport {
    let name = ctx.buyer_name();
    let franchise = ctx.franchise_name();
    let source = ctx.source();
    let minutes = ctx.aggregate.total_minutes();
    let sessions = ctx.aggregate.session_count;
    let span_days = ctx.aggregate.session_span_days;
    let questions = ctx.aggregate.questions_asked.len();
    let signals = ctx.aggregate.signals();
    let timeline = ctx.timeline();
    let location = ctx.location();
    let target_location = ctx.target_location();
    let fit = ctx.financial_fit();
    let status = fit.as_ref().map(|f| f.status).unwrap_or(FitStatus::Unknown);

    let mut summary = format!(
        "{}{} has demonstrated {} engagement with the {} FDD over {} session{}, \
         spending {} minutes reviewing key sections. ",
        status.summary_prefix(),
        name,
        if tier == EngagementTier::High { "exceptional" } else { "strong" },
        franchise,
        sessions,
        plural(sessions as i64),
        minutes,
    );
    if signals.viewed_item19 {
        summary.push_str(
            "Their significant focus on financial performance data (Item 19) indicates serious ROI evaluation. ",
        );
    }
    if source != "Direct" {
        summary.push_str(&format!(
            "As a {} lead{}, they appear to be {}.",
            source,
            timeline
                .as_deref()
                .map(|t| format!(" with a {} timeline", t))
                .unwrap_or_default(),
            if tier == EngagementTier::High {
                "a high-priority prospect ready for immediate follow-up"
            } else {
                "actively evaluating this opportunity"
            },
        ));
    }

    let mut key_findings = fit_findings(&fit);
    if signals.viewed_item19 && signals.viewed_item7 {
        key_findings.push(
            "Financial focus: deep analysis of both investment requirements and financial performance - likely calculating ROI"
                .to_string(),
        );
    }
    if sessions >= 3 {
        key_findings.push(format!(
            "Persistent interest: {} sessions over {} day{} shows sustained commitment to due diligence",
            sessions,
            span_days,
            plural(span_days)
        ));
    }
    match (&target_location, signals.viewed_item12) {
        (Some(target), true) => key_findings.push(format!(
            "Territory interest: actively researching territories with specific interest in {}",
            target
        )),
        (None, true) => key_findings
            .push("Territory concerns: reviewing protected territories and expansion potential".to_string()),
        _ => {}
    }
    if signals.viewed_item11 {
        key_findings.push(
            "Operational readiness: reviewing training and support systems indicates a preparation mindset"
                .to_string(),
        );
    }
    key_findings.push(format!(
        "Lead source: {} - tailor your approach to this acquisition channel",
        source
    ));

    let mut recommendations = Vec::new();
    match status {
        FitStatus::NotQualified => recommendations.push(format!(
            "FINANCIAL BLOCKER: {} does not meet financial requirements. Discuss financing options, partnerships, or alternative brands before investing significant time.",
            name
        )),
        FitStatus::Borderline => recommendations.push(format!(
            "Verify financial details early - {} is close to requirements but confirmation is needed before the agreement stage.",
            name
        )),
        _ => {}
    }
    if signals.viewed_item19 {
        recommendations.push(format!(
            "Lead with financial success stories - {} has invested significant time in Item 19, indicating they value data-driven ROI discussions",
            name
        ));
    }
    match source.as_str() {
        "Trade Show" => recommendations.push(
            "Reference your trade show conversation to personalize the follow-up and build on existing rapport"
                .to_string(),
        ),
        "Referral" => recommendations
            .push("Mention the referral source to build trust and credibility in your outreach".to_string()),
        "Website" => recommendations.push(
            "Highlight the key benefits and differentiators they likely saw on your website".to_string(),
        ),
        _ => {}
    }
    if questions >= 5 {
        recommendations.push(
            "They're detail-oriented - prepare comprehensive answers and be ready for in-depth questions"
                .to_string(),
        );
    }
    if sessions >= 3 {
        recommendations.push(
            "Multiple sessions indicate thorough research - respect their process while addressing any remaining concerns"
                .to_string(),
        );
    }
    recommendations.push(
        "Strike while engagement is high - their recent activity suggests active decision-making"
            .to_string(),
    );

    let mut next_steps = Vec::new();
    if status == FitStatus::NotQualified {
        next_steps.push("Address the financial gap before scheduling a discovery call".to_string());
    }
    next_steps.push(format!(
        "Schedule a call with {} within 24-48 hours to discuss their questions about {}",
        name,
        if signals.viewed_item19 { "financial performance" } else { "the opportunity" },
    ));
    if signals.viewed_item19 {
        next_steps.push(
            "Share success stories from top-performing franchisees in similar markets".to_string(),
        );
    }
    match (&target_location, &location) {
        (Some(target), _) => next_steps.push(format!(
            "Prepare territory availability maps and demographic data for {}",
            target
        )),
        (None, Some(location)) => next_steps.push(format!(
            "Prepare territory availability maps and demographic data for the {} area",
            location
        )),
        _ => {}
    }
    if timeline
        .as_deref()
        .is_some_and(|t| t.contains("0-3") || t.contains("3-6"))
    {
        next_steps.push(
            "Prepare the franchise agreement for review - their timeline indicates readiness to move forward"
                .to_string(),
        );
    }
    next_steps.push(
        "Send a personalized follow-up email summarizing your conversation and next steps"
            .to_string(),
    );

    report(tier, summary, key_findings, recommendations, next_steps, fit)
}

fn fit_findings(fit: &Option<FinancialFit>) -> Vec<String> {
    match fit {
        Some(fit) => vec![
            fit.liquid_capital_assessment.clone(),
            fit.net_worth_assessment.clone(),
        ],
        None => vec!["Financial qualification: not yet provided".to_string()],
    }
}

fn report(
    tier: EngagementTier,
    summary: String,
    key_findings: Vec<String>,
    recommendations: Vec<String>,
    next_steps: Vec<String>,
    fit: Option<FinancialFit>,
) -> InsightReport {
    InsightReport {
        summary,
        key_findings,
        recommendations,
        next_steps,
        engagement_tier: tier,
        tier_message: tier.message().to_string(),
        financial_fit_assessment: fit.map(|f| f.summary_line()),
    }
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
