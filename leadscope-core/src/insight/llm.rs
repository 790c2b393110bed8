//! LLM-backed insight generation
//!
//! The provider is configuration: ollama for local models, claude or
//! openai over HTTP. The provider must return a strict JSON object;
//! incidental code-fence markers are stripped before parsing, and any
//! shape violation is an error the generator downgrades to a template.

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, Result};
use crate::insight::InsightContext;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are a franchise sales intelligence analyst. You help franchise development teams understand leads and close deals. Return strict JSON with keys: summary (string), keyFindings (array of strings), recommendations (array of strings), nextSteps (array of strings). Every array must contain at least one entry.";

/// The validated JSON payload an LLM provider must return.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiInsightPayload {
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

/// LLM completion interface for insight generation.
pub trait LlmInsightClient: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// Create the default HTTP-backed insight client.
pub fn create_insight_client(llm: &LlmConfig) -> Result<Box<dyn LlmInsightClient>> {
    Ok(Box::new(HttpLlmInsightClient::new(llm)?))
}

/// Build the structured prompt for a lead.
///
/// Missing context degrades to "Not specified" rather than omission so the
/// prompt shape stays stable across leads.
pub fn build_prompt(ctx: &InsightContext) -> String {
    let agg = ctx.aggregate;
    let signals = agg.signals();
    let fit = ctx.financial_fit();

    let franchise_industry = ctx
        .franchise
        .and_then(|f| f.industry.clone())
        .unwrap_or_else(|| "Not specified".to_string());
    let investment_range = ctx
        .franchise
        .and_then(|f| f.investment_range())
        .unwrap_or_else(|| "Not specified".to_string());

    let qualification = match ctx.buyer {
        Some(buyer) => format!(
            "- FICO Score Range: {}\n\
             - Liquid Assets: {}\n\
             - Net Worth: {}\n\
             - Funding Plan: {}\n\
             - Business Experience: {}\n\
             - Has Owned Business Before: {}\n\
             - LinkedIn: {}",
            or_not_provided(buyer.fico_score_range.as_deref()),
            or_not_provided(buyer.liquid_assets_range.as_deref()),
            or_not_provided(buyer.net_worth_range.as_deref()),
            or_not_provided(buyer.funding_plans.as_deref()),
            buyer
                .years_of_experience
                .map(|y| format!("{} years", y))
                .unwrap_or_else(|| "Not provided".to_string()),
            if buyer.has_owned_business { "Yes" } else { "No" },
            if buyer.linkedin_url.is_some() {
                "Available - research before the call"
            } else {
                "Not provided"
            },
        ),
        None => "- No buyer profile on file".to_string(),
    };

    let fit_block = match &fit {
        Some(fit) => format!(
            "\n### Financial Fit (pre-calculated)\n\
             - Overall Status: {}\n\
             - Liquid Capital: {}\n\
             - Net Worth: {}\n\
             - Financial Score: {}/100\n",
            fit.status.as_str().to_uppercase(),
            fit.liquid_capital_assessment,
            fit.net_worth_assessment,
            fit.score,
        ),
        None => String::new(),
    };

    format!(
        "## THE FRANCHISE: {franchise}\n\
         Industry: {industry}\n\
         Investment Range: {investment}\n\
         \n\
         ## THE LEAD: {lead}\n\
         Location: {location}\n\
         Target Territory: {target}\n\
         Buying Timeline: {timeline}\n\
         Lead Source: {source}\n\
         Engagement Level: {tier}\n\
         \n\
         ### Financial Qualification (self-reported)\n\
         {qualification}\n\
         {fit_block}\
         \n\
         ### FDD Engagement Behavior\n\
         - Total Sessions: {sessions}\n\
         - Session Span: {span} days\n\
         - Total Time: {minutes} minutes\n\
         - Questions Asked: {questions}\n\
         - Sections Viewed: {sections}\n\
         - Items Viewed: {items}\n\
         \n\
         ### Key Behavioral Signals\n\
         - Viewed Item 19 (Financial Performance): {i19}\n\
         - Viewed Item 7 (Initial Investment): {i7}\n\
         - Viewed Item 12 (Territory): {i12}\n\
         - Viewed Item 20 (System Size/Outlets): {i20}\n\
         - Viewed Item 11 (Training): {i11}\n\
         \n\
         Analyze this lead and return sales guidance as JSON:\n\
         {{\"summary\": \"2-3 sentence executive summary leading with financial qualification status\",\n\
          \"keyFindings\": [\"5-6 key insights about this lead\"],\n\
          \"recommendations\": [\"5-6 specific recommendations\"],\n\
          \"nextSteps\": [\"3-5 concrete action items\"]}}\n\
         \n\
         Be specific - reference actual data from their profile and engagement.\n\
         Return ONLY valid JSON, no markdown formatting or code blocks.",
        franchise = ctx.franchise_name(),
        industry = franchise_industry,
        investment = investment_range,
        lead = ctx.buyer_name(),
        location = ctx.location().unwrap_or_else(|| "Not provided".to_string()),
        target = ctx
            .target_location()
            .unwrap_or_else(|| "Not specified".to_string()),
        timeline = ctx.timeline().unwrap_or_else(|| "Not specified".to_string()),
        source = ctx.source(),
        tier = agg.tier.as_str().to_uppercase(),
        qualification = qualification,
        fit_block = fit_block,
        sessions = agg.session_count,
        span = agg.session_span_days,
        minutes = agg.total_minutes(),
        questions = agg.questions_asked.len(),
        sections = join_or_none(&agg.sections_viewed),
        items = join_or_none(&agg.viewed_items),
        i19 = yes_no(signals.viewed_item19, "ROI focused"),
        i7 = yes_no(signals.viewed_item7, "cost conscious"),
        i12 = yes_no(signals.viewed_item12, "growth oriented"),
        i20 = yes_no(signals.viewed_item20, "due diligence"),
        i11 = yes_no(signals.viewed_item11, "operations focused"),
    )
}

fn or_not_provided(value: Option<&str>) -> &str {
    value.unwrap_or("Not provided")
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "None recorded".to_string()
    } else {
        values.join(", ")
    }
}

fn yes_no(value: bool, note: &str) -> String {
    if value {
        format!("Yes - {}", note)
    } else {
        "No".to_string()
    }
}

/// Parse and validate a provider response.
///
/// Strips code-fence markers and extracts the outermost JSON object before
/// parsing; rejects payloads with an empty summary or any empty array.
pub fn parse_insight(raw: &str) -> Result<AiInsightPayload> {
    let cleaned = raw
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string();

    let payload: AiInsightPayload = match serde_json::from_str(&cleaned) {
        Ok(payload) => payload,
        Err(_) => {
            let extracted = extract_json_object(&cleaned)?;
            serde_json::from_str(&extracted)?
        }
    };

    if payload.summary.trim().is_empty() {
        return Err(Error::Llm("insight response has empty summary".to_string()));
    }
    if payload.key_findings.is_empty()
        || payload.recommendations.is_empty()
        || payload.next_steps.is_empty()
    {
        return Err(Error::Llm(
            "insight response is missing findings, recommendations, or next steps".to_string(),
        ));
    }

    Ok(payload)
}

fn extract_json_object(raw: &str) -> Result<String> {
    let start = raw
        .find('{')
        .ok_or_else(|| Error::Llm("insight response did not contain JSON object".to_string()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| Error::Llm("insight response did not contain JSON object".to_string()))?;
    if end <= start {
        return Err(Error::Llm(
            "insight response JSON bounds are invalid".to_string(),
        ));
    }
    Ok(raw[start..=end].to_string())
}

struct HttpLlmInsightClient {
    model: String,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
}

impl HttpLlmInsightClient {
    fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string());
        let api_key = match config.provider {
            LlmProvider::Ollama => None,
            LlmProvider::Claude => config
                .api_key
                .clone()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok()),
            LlmProvider::OpenAI => config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        };

        if matches!(config.provider, LlmProvider::Claude | LlmProvider::OpenAI) && api_key.is_none()
        {
            return Err(Error::Config(
                "llm.api_key (or provider env var) is required".to_string(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Llm(format!("failed to build tokio runtime: {e}")))?;
        let timeout_secs = config.timeout_secs.max(1);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Llm(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: config.model.clone(),
            provider: config.provider,
            endpoint,
            api_key,
            runtime,
            http,
        })
    }
}

impl LlmInsightClient for HttpLlmInsightClient {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.runtime.block_on(async {
            match self.provider {
                LlmProvider::Ollama => {
                    let url = format!("{}/api/generate", self.endpoint.trim_end_matches('/'));
                    let resp = self
                        .http
                        .post(url)
                        .json(&json!({
                            "model": self.model,
                            "prompt": format!("{SYSTEM_PROMPT}\n\n{prompt}"),
                            "stream": false,
                        }))
                        .send()
                        .await
                        .map_err(|e| Error::Llm(format!("ollama request failed: {e}")))?;
                    let status = resp.status();
                    let body = resp
                        .text()
                        .await
                        .map_err(|e| Error::Llm(format!("ollama read body failed: {e}")))?;
                    if !status.is_success() {
                        return Err(Error::Llm(format!(
                            "ollama returned {}: {}",
                            status.as_u16(),
                            body
                        )));
                    }
                    let json: serde_json::Value = serde_json::from_str(&body)?;
                    json.get("response")
                        .and_then(|v| v.as_str())
                        .map(ToString::to_string)
                        .ok_or_else(|| {
                            Error::Llm(
                                "ollama response missing string field `response`".to_string(),
                            )
                        })
                }
                LlmProvider::Claude => {
                    let url = format!("{}/v1/messages", self.endpoint.trim_end_matches('/'));
                    let mut headers = HeaderMap::new();
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    headers.insert(
                        "x-api-key",
                        HeaderValue::from_str(self.api_key.as_deref().unwrap_or_default())
                            .map_err(|e| {
                                Error::Llm(format!("invalid claude api key header: {e}"))
                            })?,
                    );
                    headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

                    let resp = self
                        .http
                        .post(url)
                        .headers(headers)
                        .json(&json!({
                            "model": self.model,
                            "max_tokens": 1024,
                            "temperature": 0,
                            "system": SYSTEM_PROMPT,
                            "messages": [{ "role": "user", "content": prompt }],
                        }))
                        .send()
                        .await
                        .map_err(|e| Error::Llm(format!("claude request failed: {e}")))?;
                    let status = resp.status();
                    let body = resp
                        .text()
                        .await
                        .map_err(|e| Error::Llm(format!("claude read body failed: {e}")))?;
                    if !status.is_success() {
                        return Err(Error::Llm(format!(
                            "claude returned {}: {}",
                            status.as_u16(),
                            body
                        )));
                    }
                    let json: serde_json::Value = serde_json::from_str(&body)?;
                    json.get("content")
                        .and_then(|v| v.as_array())
                        .and_then(|arr| arr.first())
                        .and_then(|v| v.get("text"))
                        .and_then(|v| v.as_str())
                        .map(ToString::to_string)
                        .ok_or_else(|| {
                            Error::Llm("claude response missing content[0].text".to_string())
                        })
                }
                LlmProvider::OpenAI => {
                    let url = format!(
                        "{}/v1/chat/completions",
                        self.endpoint.trim_end_matches('/')
                    );
                    let mut headers = HeaderMap::new();
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    headers.insert(
                        AUTHORIZATION,
                        HeaderValue::from_str(&format!(
                            "Bearer {}",
                            self.api_key.as_deref().unwrap_or_default()
                        ))
                        .map_err(|e| Error::Llm(format!("invalid auth header: {e}")))?,
                    );

                    let resp = self
                        .http
                        .post(url)
                        .headers(headers)
                        .json(&json!({
                            "model": self.model,
                            "temperature": 0,
                            "messages": [
                                { "role": "system", "content": SYSTEM_PROMPT },
                                { "role": "user", "content": prompt }
                            ]
                        }))
                        .send()
                        .await
                        .map_err(|e| Error::Llm(format!("openai request failed: {e}")))?;
                    let status = resp.status();
                    let body = resp
                        .text()
                        .await
                        .map_err(|e| Error::Llm(format!("openai read body failed: {e}")))?;
                    if !status.is_success() {
                        return Err(Error::Llm(format!(
                            "openai returned {}: {}",
                            status.as_u16(),
                            body
                        )));
                    }
                    let json: serde_json::Value = serde_json::from_str(&body)?;
                    json.get("choices")
                        .and_then(|v| v.as_array())
                        .and_then(|arr| arr.first())
                        .and_then(|v| v.get("message"))
                        .and_then(|v| v.get("content"))
                        .and_then(|v| v.as_str())
                        .map(ToString::to_string)
                        .ok_or_else(|| {
                            Error::Llm(
                                "openai response missing choices[0].message.content".to_string(),
                            )
                        })
                }
            }
        })
    }
}
