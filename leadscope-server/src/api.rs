//! HTTP request handlers and routing
//!
//! Implements the engagement API:
//!
//! - `POST /engagement` - ingest a snapshot (also the beacon target)
//! - `GET /engagement?lead_id=` - the lead engagement report
//! - `GET /health` - liveness
//!
//! Ingestion is forgiving: a request without a resolved subject is
//! accepted and skipped, mirroring how the viewer fires snapshots without
//! waiting on the outcome. The report path never fails on insight
//! generation - the generator's contract guarantees a well-formed object.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use leadscope_core::aggregate::{build_report, fold_sessions};
use leadscope_core::insight::{InsightContext, InsightGenerator};
use leadscope_core::store::Database;
use leadscope_core::types::{EngagementReport, EngagementSession, EngagementSnapshot};
use leadscope_core::{Error, Result};

/// Header the upstream auth layer uses to convey the authenticated buyer.
const SUBJECT_HEADER: &str = "x-subject-id";

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub db: Arc<Database>,
    pub insights: Arc<InsightGenerator>,
}

/// Build the application router
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/engagement", post(ingest_engagement).get(lead_engagement))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

// ============================================
// Request/Response Types
// ============================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    engagement: Option<EngagementSession>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LeadQuery {
    lead_id: Option<String>,
}

// ============================================
// Health Endpoint
// ============================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "engagement_api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================
// Ingestion Endpoint
// ============================================

/// POST /engagement - upsert a snapshot by session id
///
/// The subject comes from the authenticating proxy via `x-subject-id`.
/// Without it the snapshot is accepted and skipped (the beacon cannot
/// react to an error anyway); with it the store merges commutatively and
/// the merged record is returned.
pub async fn ingest_engagement(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(snapshot): Json<EngagementSnapshot>,
) -> std::result::Result<Json<IngestResponse>, (StatusCode, Json<ErrorBody>)> {
    let subject_id = headers
        .get(SUBJECT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let Some(subject_id) = subject_id else {
        info!(
            session_id = %snapshot.session_id,
            "Skipping engagement ingest - no subject resolved"
        );
        return Ok(Json(IngestResponse { engagement: None }));
    };

    let db = Arc::clone(&ctx.db);
    let session_id = snapshot.session_id.clone();
    let stored = tokio::task::spawn_blocking(move || db.upsert_engagement(&subject_id, &snapshot))
        .await
        .map_err(|e| internal_error("ingest task failed", &e.to_string()))?;

    match stored {
        Ok(session) => Ok(Json(IngestResponse {
            engagement: Some(session),
        })),
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Failed to store engagement snapshot");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(format!("failed to store engagement: {}", e))),
            ))
        }
    }
}

// ============================================
// Lead Report Endpoint
// ============================================

/// GET /engagement?lead_id= - the franchisor-facing engagement report
///
/// A lead id resolves to an access record (the lead opened the FDD at
/// least once) or, failing that, to an invitation (pending lead, tier
/// none). Neither resolving is a 404.
pub async fn lead_engagement(
    State(ctx): State<AppContext>,
    Query(query): Query<LeadQuery>,
) -> std::result::Result<Json<EngagementReport>, (StatusCode, Json<ErrorBody>)> {
    let Some(lead_id) = query.lead_id.filter(|id| !id.is_empty()) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("lead_id is required")),
        ));
    };

    let db = Arc::clone(&ctx.db);
    let insights = Arc::clone(&ctx.insights);

    let report =
        tokio::task::spawn_blocking(move || build_lead_report(&db, &insights, &lead_id))
            .await
            .map_err(|e| internal_error("report task failed", &e.to_string()))?;

    match report {
        Ok(report) => Ok(Json(report)),
        Err(Error::LeadNotFound(lead_id)) => {
            warn!(lead_id = %lead_id, "Lead not found");
            Err((
                StatusCode::NOT_FOUND,
                Json(ErrorBody::new("Lead not found")),
            ))
        }
        Err(e) => {
            error!(error = %e, "Failed to build engagement report");
            Err(internal_error("Failed to fetch engagement data", &e.to_string()))
        }
    }
}

/// Resolve a lead and assemble its report; runs on the blocking pool.
fn build_lead_report(
    db: &Database,
    insights: &InsightGenerator,
    lead_id: &str,
) -> Result<EngagementReport> {
    if let Some(access) = db.get_lead_access(lead_id)? {
        let sessions = db.list_engagement_sessions(&access.subject_id, &access.franchise_id)?;
        let agg = fold_sessions(&access.subject_id, &access.franchise_id, &sessions);

        let buyer = db.get_buyer_profile(&access.subject_id)?;
        let franchise = db.get_franchise(&access.franchise_id)?;
        let invitation = match buyer.as_ref().and_then(|b| b.email.as_deref()) {
            Some(email) => db.find_invitation(&access.franchise_id, email)?,
            None => None,
        };

        let ctx = InsightContext {
            aggregate: &agg,
            buyer: buyer.as_ref(),
            franchise: franchise.as_ref(),
            invitation: invitation.as_ref(),
        };
        let ai_insights = insights.generate_cached(db, &ctx);

        return Ok(build_report(&agg, ai_insights, buyer.as_ref(), invitation.as_ref()));
    }

    // No access record: a pending invitation still yields a report
    if let Some(invitation) = db.get_invitation(lead_id)? {
        let buyer = match invitation.lead_email.as_deref() {
            Some(email) => db.get_buyer_profile_by_email(email)?,
            None => None,
        };
        let franchise = db.get_franchise(&invitation.franchise_id)?;

        let subject_id = buyer
            .as_ref()
            .map(|b| b.subject_id.clone())
            .unwrap_or_default();
        let agg = fold_sessions(&subject_id, &invitation.franchise_id, &[]);

        let ctx = InsightContext {
            aggregate: &agg,
            buyer: buyer.as_ref(),
            franchise: franchise.as_ref(),
            invitation: Some(&invitation),
        };
        // Pending leads have no stable subject to cache under; the
        // template path is cheap anyway.
        let ai_insights = insights.generate(&ctx);

        return Ok(build_report(&agg, ai_insights, buyer.as_ref(), Some(&invitation)));
    }

    Err(Error::LeadNotFound(lead_id.to_string()))
}

fn internal_error(error: &str, details: &str) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::with_details(error, details)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use leadscope_core::types::{Franchise, Invitation, LeadAccess};
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        let ctx = AppContext {
            db: Arc::clone(&db),
            insights: Arc::new(InsightGenerator::disabled()),
        };
        (router(ctx), db)
    }

    fn snapshot_body(session_id: &str, time_spent: i64) -> String {
        serde_json::json!({
            "franchiseId": "fr-1",
            "franchiseSlug": "drybar",
            "timeSpent": time_spent,
            "questionsAsked": [],
            "sectionsViewed": ["Item 19"],
            "viewedItems": ["item19"],
            "notesCreated": 0,
            "downloaded": false,
            "lastActivity": Utc::now().to_rfc3339(),
            "sessionId": session_id,
            "viewedFDD": true,
            "askedQuestions": false,
            "viewedItem19": true,
            "viewedItem7": false,
            "createdNotes": false,
            "spentSignificantTime": false,
        })
        .to_string()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_module() {
        let (app, _db) = test_app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["module"], "engagement_api");
    }

    #[tokio::test]
    async fn ingest_without_subject_is_accepted_and_skipped() {
        let (app, db) = test_app();
        let response = app
            .oneshot(
                Request::post("/engagement")
                    .header("content-type", "application/json")
                    .body(Body::from(snapshot_body("s-1", 100)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["engagement"].is_null());
        assert!(db.get_engagement_session("s-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn ingest_stores_and_merges() {
        let (app, db) = test_app();

        for time_spent in [100, 90] {
            let response = app
                .clone()
                .oneshot(
                    Request::post("/engagement")
                        .header("content-type", "application/json")
                        .header("x-subject-id", "buyer-1")
                        .body(Body::from(snapshot_body("s-1", time_spent)))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let stored = db.get_engagement_session("s-1").unwrap().unwrap();
        assert_eq!(stored.time_spent_seconds, 100, "max wins over the stale flush");
        assert_eq!(stored.subject_id, "buyer-1");
    }

    #[tokio::test]
    async fn missing_lead_id_is_bad_request() {
        let (app, _db) = test_app();
        let response = app
            .oneshot(Request::get("/engagement").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "lead_id is required");
    }

    #[tokio::test]
    async fn unknown_lead_is_not_found() {
        let (app, _db) = test_app();
        let response = app
            .oneshot(
                Request::get("/engagement?lead_id=nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lead_report_round_trip() {
        let (app, db) = test_app();

        db.upsert_franchise(&Franchise {
            id: "fr-1".to_string(),
            name: "Drybar".to_string(),
            ..Default::default()
        })
        .unwrap();
        db.upsert_lead_access(&LeadAccess {
            id: "lead-1".to_string(),
            subject_id: "buyer-1".to_string(),
            franchise_id: "fr-1".to_string(),
            granted_at: Utc::now(),
        })
        .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::post("/engagement")
                    .header("content-type", "application/json")
                    .header("x-subject-id", "buyer-1")
                    .body(Body::from(snapshot_body("s-1", 1800)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::get("/engagement?lead_id=lead-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;

        assert_eq!(json["totalTimeSpentSeconds"], 1800);
        assert_eq!(json["totalTimeSpent"], "30m");
        assert_eq!(json["engagementTier"], "meaningful");
        assert_eq!(json["engagementCount"], 1);
        assert!(json["aiInsights"]["summary"]
            .as_str()
            .unwrap()
            .contains("Drybar"));
        assert!(!json["aiInsights"]["keyFindings"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_invitation_reports_tier_none() {
        let (app, db) = test_app();

        db.upsert_franchise(&Franchise {
            id: "fr-1".to_string(),
            name: "Drybar".to_string(),
            ..Default::default()
        })
        .unwrap();
        db.upsert_invitation(&Invitation {
            id: "inv-1".to_string(),
            franchise_id: "fr-1".to_string(),
            lead_name: Some("Pat Doe".to_string()),
            status: "sent".to_string(),
            sent_at: Some(Utc::now()),
            ..Default::default()
        })
        .unwrap();

        let response = app
            .oneshot(
                Request::get("/engagement?lead_id=inv-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["engagementTier"], "none");
        assert_eq!(json["totalTimeSpentSeconds"], 0);
        assert!(json["accessedDate"].is_null());
    }
}
