//! Sales insight generation
//!
//! Turns aggregated telemetry plus contextual records (buyer profile,
//! franchise, invitation) into a structured sales-insight report.
//!
//! The strategy is keyed by tier: low tiers always use deterministic
//! templates; meaningful/high tiers attempt a generative call first and
//! fall back to the same-tier template on any failure. Callers never
//! observe an error - every path returns a well-formed report.

pub mod fit;
pub mod llm;
pub mod template;

use sha2::{Digest, Sha256};

use crate::config::LlmConfig;
use crate::store::Database;
use crate::tier::EngagementTier;
use crate::types::{AggregatedEngagement, BuyerProfile, Franchise, InsightReport, Invitation};

pub use fit::{assess_financial_fit, FinancialFit, FitStatus};
pub use llm::{create_insight_client, LlmInsightClient};

/// Everything insight generation consumes. Any context record may be
/// absent; builders substitute neutral defaults.
pub struct InsightContext<'a> {
    pub aggregate: &'a AggregatedEngagement,
    pub buyer: Option<&'a BuyerProfile>,
    pub franchise: Option<&'a Franchise>,
    pub invitation: Option<&'a Invitation>,
}

impl<'a> InsightContext<'a> {
    pub fn buyer_name(&self) -> String {
        self.buyer
            .and_then(|b| b.full_name())
            .or_else(|| self.invitation.and_then(|inv| inv.lead_name.clone()))
            .unwrap_or_else(|| "This prospect".to_string())
    }

    pub fn franchise_name(&self) -> String {
        self.franchise
            .map(|f| f.name.clone())
            .or_else(|| self.invitation.and_then(|inv| inv.brand.clone()))
            .unwrap_or_else(|| "the franchise".to_string())
    }

    pub fn source(&self) -> String {
        self.invitation
            .and_then(|inv| inv.source.clone())
            .or_else(|| self.buyer.and_then(|b| b.signup_source.clone()))
            .unwrap_or_else(|| "Direct".to_string())
    }

    pub fn timeline(&self) -> Option<String> {
        self.invitation
            .and_then(|inv| inv.timeline.clone())
            .or_else(|| self.buyer.and_then(|b| b.buying_timeline.clone()))
    }

    /// Invitation location wins over the profile; invitations are fresher.
    pub fn location(&self) -> Option<String> {
        self.invitation
            .and_then(|inv| match (inv.city.as_deref(), inv.state.as_deref()) {
                (Some(city), Some(state)) => Some(format!("{}, {}", city, state)),
                _ => None,
            })
            .or_else(|| self.buyer.and_then(|b| b.location()))
    }

    pub fn target_location(&self) -> Option<String> {
        self.invitation.and_then(|inv| inv.target_location.clone())
    }

    pub fn financial_fit(&self) -> Option<FinancialFit> {
        match (self.buyer, self.franchise) {
            (Some(buyer), Some(franchise)) => assess_financial_fit(buyer, franchise),
            _ => None,
        }
    }
}

/// How a report will be produced for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightStrategy {
    Template(EngagementTier),
    AiBacked(EngagementTier),
}

/// Pure strategy dispatch: AI only for meaningful/high, and only when a
/// provider is configured. The fallback of `AiBacked(tier)` is always
/// `Template(tier)`.
pub fn select_strategy(tier: EngagementTier, ai_available: bool) -> InsightStrategy {
    if tier.ai_eligible() && ai_available {
        InsightStrategy::AiBacked(tier)
    } else {
        InsightStrategy::Template(tier)
    }
}

/// Generates insight reports; infallible by contract.
pub struct InsightGenerator {
    client: Option<Box<dyn LlmInsightClient>>,
    model: Option<String>,
}

impl InsightGenerator {
    /// Template-only generator (no provider configured).
    pub fn disabled() -> Self {
        Self {
            client: None,
            model: None,
        }
    }

    /// Build from configuration. A misconfigured provider logs a warning
    /// and degrades to templates instead of failing startup.
    pub fn from_config(llm: Option<&LlmConfig>) -> Self {
        match llm {
            Some(config) => match create_insight_client(config) {
                Ok(client) => Self {
                    client: Some(client),
                    model: Some(config.model.clone()),
                },
                Err(e) => {
                    tracing::warn!(error = %e, "LLM client unavailable; using templates only");
                    Self::disabled()
                }
            },
            None => Self::disabled(),
        }
    }

    /// Build with a supplied client (tests, custom providers).
    pub fn with_client(client: Box<dyn LlmInsightClient>, model: impl Into<String>) -> Self {
        Self {
            client: Some(client),
            model: Some(model.into()),
        }
    }

    /// Generate a report for a lead. Never fails: any AI-path error is
    /// logged and the same-tier template takes over.
    pub fn generate(&self, ctx: &InsightContext) -> InsightReport {
        let tier = ctx.aggregate.tier;
        match select_strategy(tier, self.client.is_some()) {
            InsightStrategy::Template(tier) => template::generate(ctx, tier),
            InsightStrategy::AiBacked(tier) => {
                let prompt = llm::build_prompt(ctx);
                match self.try_ai(ctx, tier, &prompt) {
                    Ok(report) => report,
                    Err(e) => {
                        tracing::warn!(
                            subject_id = %ctx.aggregate.subject_id,
                            tier = %tier,
                            error = %e,
                            "AI insight generation failed; falling back to template"
                        );
                        template::generate(ctx, tier)
                    }
                }
            }
        }
    }

    /// Generate with a prompt-hash cache: while the lead's data (and thus
    /// the prompt) is unchanged, the stored report is served without
    /// another generation.
    pub fn generate_cached(&self, db: &Database, ctx: &InsightContext) -> InsightReport {
        let prompt = llm::build_prompt(ctx);
        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        let prompt_hash = hex::encode(hasher.finalize());

        let subject_id = &ctx.aggregate.subject_id;
        let franchise_id = &ctx.aggregate.franchise_id;

        match db.get_cached_insight(subject_id, franchise_id) {
            Ok(Some(cached)) if cached.prompt_hash.as_deref() == Some(prompt_hash.as_str()) => {
                tracing::debug!(subject_id = %subject_id, "Serving cached insight");
                return cached.report;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Insight cache read failed"),
        }

        let tier = ctx.aggregate.tier;
        let report = match select_strategy(tier, self.client.is_some()) {
            InsightStrategy::Template(tier) => template::generate(ctx, tier),
            InsightStrategy::AiBacked(tier) => match self.try_ai(ctx, tier, &prompt) {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(
                        subject_id = %subject_id,
                        tier = %tier,
                        error = %e,
                        "AI insight generation failed; falling back to template"
                    );
                    template::generate(ctx, tier)
                }
            },
        };

        if let Err(e) = db.store_insight(
            subject_id,
            franchise_id,
            self.model.as_deref(),
            &report,
            Some(&prompt_hash),
        ) {
            tracing::warn!(error = %e, "Insight cache write failed");
        }

        report
    }

    fn try_ai(
        &self,
        ctx: &InsightContext,
        tier: EngagementTier,
        prompt: &str,
    ) -> crate::error::Result<InsightReport> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| crate::error::Error::Llm("no LLM client configured".to_string()))?;

        let raw = client.complete(prompt)?;
        let payload = llm::parse_insight(&raw)?;

        Ok(InsightReport {
            summary: payload.summary,
            key_findings: payload.key_findings,
            recommendations: payload.recommendations,
            next_steps: payload.next_steps,
            engagement_tier: tier,
            tier_message: tier.message().to_string(),
            financial_fit_assessment: ctx.financial_fit().map(|f| f.summary_line()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockClient {
        response: String,
        calls: Arc<AtomicUsize>,
    }

    impl MockClient {
        fn new(response: &str) -> (Box<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Box::new(Self {
                    response: response.to_string(),
                    calls: Arc::clone(&calls),
                }),
                calls,
            )
        }
    }

    impl LlmInsightClient for MockClient {
        fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    struct FailingClient;

    impl LlmInsightClient for FailingClient {
        fn complete(&self, _prompt: &str) -> Result<String> {
            Err(Error::Llm("simulated provider outage".to_string()))
        }
    }

    fn meaningful_aggregate() -> AggregatedEngagement {
        let mut agg = AggregatedEngagement::empty("buyer-1", "fr-1");
        agg.total_time_seconds = 1800;
        agg.session_count = 3;
        agg.milestones.viewed_item19 = true;
        agg.tier = crate::tier::classify(1800, 3);
        agg
    }

    const VALID_JSON: &str = r#"{"summary":"FINANCIALLY QUALIFIED. Strong lead.","keyFindings":["deep Item 19 focus"],"recommendations":["lead with ROI data"],"nextSteps":["call within 48 hours"]}"#;

    #[test]
    fn strategy_dispatch_is_pure() {
        assert_eq!(
            select_strategy(EngagementTier::None, true),
            InsightStrategy::Template(EngagementTier::None)
        );
        assert_eq!(
            select_strategy(EngagementTier::Partial, true),
            InsightStrategy::Template(EngagementTier::Partial)
        );
        assert_eq!(
            select_strategy(EngagementTier::Meaningful, true),
            InsightStrategy::AiBacked(EngagementTier::Meaningful)
        );
        assert_eq!(
            select_strategy(EngagementTier::High, false),
            InsightStrategy::Template(EngagementTier::High)
        );
    }

    #[test]
    fn ai_path_produces_report_from_valid_json() {
        let agg = meaningful_aggregate();
        let ctx = InsightContext {
            aggregate: &agg,
            buyer: None,
            franchise: None,
            invitation: None,
        };
        let (client, calls) = MockClient::new(VALID_JSON);
        let generator = InsightGenerator::with_client(client, "test-model");

        let report = generator.generate(&ctx);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(report.summary.contains("Strong lead"));
        assert_eq!(report.engagement_tier, EngagementTier::Meaningful);
        assert_eq!(
            report.tier_message,
            "Warm lead - ready for deeper conversation"
        );
    }

    #[test]
    fn provider_failure_falls_back_to_template() {
        let agg = meaningful_aggregate();
        let ctx = InsightContext {
            aggregate: &agg,
            buyer: None,
            franchise: None,
            invitation: None,
        };
        let generator = InsightGenerator::with_client(Box::new(FailingClient), "test-model");

        let report = generator.generate(&ctx);
        assert!(!report.summary.is_empty());
        assert!(!report.key_findings.is_empty());
        assert!(!report.recommendations.is_empty());
        assert!(!report.next_steps.is_empty());
        assert_eq!(report.engagement_tier, EngagementTier::Meaningful);
    }

    #[test]
    fn malformed_response_falls_back_to_template() {
        let agg = meaningful_aggregate();
        let ctx = InsightContext {
            aggregate: &agg,
            buyer: None,
            franchise: None,
            invitation: None,
        };
        let (client, _calls) = MockClient::new("I think this lead is promising!");
        let generator = InsightGenerator::with_client(client, "test-model");

        let report = generator.generate(&ctx);
        assert!(!report.summary.is_empty());
        assert!(!report.key_findings.is_empty());
    }

    #[test]
    fn low_tiers_never_call_the_provider() {
        let mut agg = meaningful_aggregate();
        agg.total_time_seconds = 200;
        agg.session_count = 1;
        agg.tier = crate::tier::classify(200, 1);
        let ctx = InsightContext {
            aggregate: &agg,
            buyer: None,
            franchise: None,
            invitation: None,
        };
        let (client, calls) = MockClient::new(VALID_JSON);
        let generator = InsightGenerator::with_client(client, "test-model");

        let report = generator.generate(&ctx);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "minimal tier is template-only");
        assert_eq!(report.engagement_tier, EngagementTier::Minimal);
    }

    #[test]
    fn cached_generation_skips_unchanged_prompts() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();

        let agg = meaningful_aggregate();
        let ctx = InsightContext {
            aggregate: &agg,
            buyer: None,
            franchise: None,
            invitation: None,
        };
        let (client, calls) = MockClient::new(VALID_JSON);
        let generator = InsightGenerator::with_client(client, "test-model");

        let first = generator.generate_cached(&db, &ctx);
        let second = generator.generate_cached(&db, &ctx);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "second read is cached");
        assert_eq!(first.summary, second.summary);

        // New telemetry changes the prompt hash and regenerates
        let mut changed = meaningful_aggregate();
        changed.total_time_seconds = 2400;
        let ctx = InsightContext {
            aggregate: &changed,
            buyer: None,
            franchise: None,
            invitation: None,
        };
        generator.generate_cached(&db, &ctx);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
