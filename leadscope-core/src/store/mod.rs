//! Storage layer for engagement sessions and their context records
//!
//! The store is the one resource shared between uncoordinated writers: a
//! browser tab flushing on a debounce and a beacon firing during teardown
//! may both carry state for the same session, in either order. Ingestion
//! therefore merges commutatively - max for counters, union for sets, OR
//! for milestones - instead of trusting last-write-wins, and duplicate
//! deliveries of identical state are harmless by construction.

pub mod schema;

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

/// A cached insight report with its invalidation hash.
#[derive(Debug, Clone)]
pub struct CachedInsight {
    pub report: InsightReport,
    pub model: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub prompt_hash: Option<String>,
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL mode for better concurrency between ingest and read paths
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        schema::run_migrations(&conn)
    }

    // ============================================
    // Engagement session operations
    // ============================================

    /// Upsert a snapshot by session id, merging with any stored record.
    ///
    /// The merge is commutative so an out-of-order beacon arriving after a
    /// later periodic flush can never regress a field: time takes the max,
    /// sets take the union, milestones OR together, and `downloaded_at`
    /// keeps its first value. Returns the merged record as stored.
    pub fn upsert_engagement(
        &self,
        subject_id: &str,
        snapshot: &EngagementSnapshot,
    ) -> Result<EngagementSession> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                "SELECT * FROM engagement_sessions WHERE session_id = ?",
                [&snapshot.session_id],
                Self::row_to_engagement,
            )
            .optional()?;

        let merged = match existing {
            Some(mut session) => {
                merge_snapshot(&mut session, snapshot);
                session
            }
            None => session_from_snapshot(subject_id, snapshot),
        };

        tx.execute(
            r#"
            INSERT OR REPLACE INTO engagement_sessions (
                session_id, subject_id, franchise_id, franchise_slug,
                time_spent_seconds, sections_viewed, viewed_items,
                questions_asked, notes_created, downloaded, downloaded_at,
                viewed_fdd, asked_questions, viewed_item19, viewed_item7,
                created_notes, spent_significant_time, last_activity, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
            params![
                merged.session_id,
                merged.subject_id,
                merged.franchise_id,
                merged.franchise_slug,
                merged.time_spent_seconds,
                serde_json::to_string(&merged.sections_viewed)?,
                serde_json::to_string(&merged.viewed_items)?,
                serde_json::to_string(&merged.questions_asked)?,
                merged.notes_created,
                merged.downloaded,
                merged.downloaded_at.map(|t| t.to_rfc3339()),
                merged.milestones.viewed_fdd,
                merged.milestones.asked_questions,
                merged.milestones.viewed_item19,
                merged.milestones.viewed_item7,
                merged.milestones.created_notes,
                merged.milestones.spent_significant_time,
                merged.last_activity.to_rfc3339(),
                merged.created_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;

        tracing::debug!(
            session_id = %merged.session_id,
            subject_id = %merged.subject_id,
            time_spent = merged.time_spent_seconds,
            "Upserted engagement session"
        );

        Ok(merged)
    }

    /// Get one engagement session by id
    pub fn get_engagement_session(&self, session_id: &str) -> Result<Option<EngagementSession>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM engagement_sessions WHERE session_id = ?",
            [session_id],
            Self::row_to_engagement,
        )
        .optional()
        .map_err(Error::from)
    }

    /// All sessions for a (subject, franchise) pair, oldest first
    pub fn list_engagement_sessions(
        &self,
        subject_id: &str,
        franchise_id: &str,
    ) -> Result<Vec<EngagementSession>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM engagement_sessions
             WHERE subject_id = ? AND franchise_id = ?
             ORDER BY created_at ASC",
        )?;
        let sessions = stmt
            .query_map([subject_id, franchise_id], Self::row_to_engagement)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    fn row_to_engagement(row: &Row) -> rusqlite::Result<EngagementSession> {
        let sections: String = row.get("sections_viewed")?;
        let items: String = row.get("viewed_items")?;
        let questions: String = row.get("questions_asked")?;

        Ok(EngagementSession {
            session_id: row.get("session_id")?,
            subject_id: row.get("subject_id")?,
            franchise_id: row.get("franchise_id")?,
            franchise_slug: row.get("franchise_slug")?,
            time_spent_seconds: row.get("time_spent_seconds")?,
            sections_viewed: serde_json::from_str(&sections).unwrap_or_default(),
            viewed_items: serde_json::from_str(&items).unwrap_or_default(),
            questions_asked: serde_json::from_str(&questions).unwrap_or_default(),
            notes_created: row.get("notes_created")?,
            downloaded: row.get("downloaded")?,
            downloaded_at: parse_ts_opt(row.get::<_, Option<String>>("downloaded_at")?),
            milestones: Milestones {
                viewed_fdd: row.get("viewed_fdd")?,
                asked_questions: row.get("asked_questions")?,
                viewed_item19: row.get("viewed_item19")?,
                viewed_item7: row.get("viewed_item7")?,
                created_notes: row.get("created_notes")?,
                spent_significant_time: row.get("spent_significant_time")?,
            },
            last_activity: parse_ts(row.get::<_, String>("last_activity")?),
            created_at: parse_ts(row.get::<_, String>("created_at")?),
        })
    }

    // ============================================
    // Buyer profile operations
    // ============================================

    /// Insert or update a buyer profile
    pub fn upsert_buyer_profile(&self, profile: &BuyerProfile) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO buyer_profiles (
                subject_id, first_name, last_name, email, city, state,
                buying_timeline, signup_source, fico_score_range,
                liquid_assets_range, net_worth_range, funding_plans,
                years_of_experience, has_owned_business, linkedin_url
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(subject_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                email = excluded.email,
                city = excluded.city,
                state = excluded.state,
                buying_timeline = excluded.buying_timeline,
                signup_source = excluded.signup_source,
                fico_score_range = excluded.fico_score_range,
                liquid_assets_range = excluded.liquid_assets_range,
                net_worth_range = excluded.net_worth_range,
                funding_plans = excluded.funding_plans,
                years_of_experience = excluded.years_of_experience,
                has_owned_business = excluded.has_owned_business,
                linkedin_url = excluded.linkedin_url
            "#,
            params![
                profile.subject_id,
                profile.first_name,
                profile.last_name,
                profile.email,
                profile.city,
                profile.state,
                profile.buying_timeline,
                profile.signup_source,
                profile.fico_score_range,
                profile.liquid_assets_range,
                profile.net_worth_range,
                profile.funding_plans,
                profile.years_of_experience,
                profile.has_owned_business,
                profile.linkedin_url,
            ],
        )?;
        Ok(())
    }

    /// Get a buyer profile by subject id
    pub fn get_buyer_profile(&self, subject_id: &str) -> Result<Option<BuyerProfile>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM buyer_profiles WHERE subject_id = ?",
            [subject_id],
            Self::row_to_buyer_profile,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Get a buyer profile by email (used for pending invitations)
    pub fn get_buyer_profile_by_email(&self, email: &str) -> Result<Option<BuyerProfile>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM buyer_profiles WHERE email = ?",
            [email],
            Self::row_to_buyer_profile,
        )
        .optional()
        .map_err(Error::from)
    }

    fn row_to_buyer_profile(row: &Row) -> rusqlite::Result<BuyerProfile> {
        Ok(BuyerProfile {
            subject_id: row.get("subject_id")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            email: row.get("email")?,
            city: row.get("city")?,
            state: row.get("state")?,
            buying_timeline: row.get("buying_timeline")?,
            signup_source: row.get("signup_source")?,
            fico_score_range: row.get("fico_score_range")?,
            liquid_assets_range: row.get("liquid_assets_range")?,
            net_worth_range: row.get("net_worth_range")?,
            funding_plans: row.get("funding_plans")?,
            years_of_experience: row.get("years_of_experience")?,
            has_owned_business: row.get("has_owned_business")?,
            linkedin_url: row.get("linkedin_url")?,
        })
    }

    // ============================================
    // Franchise operations
    // ============================================

    /// Insert or update a franchise
    pub fn upsert_franchise(&self, franchise: &Franchise) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO franchises (
                id, slug, name, industry, investment_min, investment_max,
                liquid_capital_min, net_worth_min
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                slug = excluded.slug,
                name = excluded.name,
                industry = excluded.industry,
                investment_min = excluded.investment_min,
                investment_max = excluded.investment_max,
                liquid_capital_min = excluded.liquid_capital_min,
                net_worth_min = excluded.net_worth_min
            "#,
            params![
                franchise.id,
                franchise.slug,
                franchise.name,
                franchise.industry,
                franchise.investment_min,
                franchise.investment_max,
                franchise.liquid_capital_min,
                franchise.net_worth_min,
            ],
        )?;
        Ok(())
    }

    /// Get a franchise by id
    pub fn get_franchise(&self, id: &str) -> Result<Option<Franchise>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM franchises WHERE id = ?", [id], |row| {
            Ok(Franchise {
                id: row.get("id")?,
                slug: row.get("slug")?,
                name: row.get("name")?,
                industry: row.get("industry")?,
                investment_min: row.get("investment_min")?,
                investment_max: row.get("investment_max")?,
                liquid_capital_min: row.get("liquid_capital_min")?,
                net_worth_min: row.get("net_worth_min")?,
            })
        })
        .optional()
        .map_err(Error::from)
    }

    // ============================================
    // Lead access operations
    // ============================================

    /// Insert or update an access grant
    pub fn upsert_lead_access(&self, access: &LeadAccess) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO lead_access (id, subject_id, franchise_id, granted_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                subject_id = excluded.subject_id,
                franchise_id = excluded.franchise_id,
                granted_at = excluded.granted_at
            "#,
            params![
                access.id,
                access.subject_id,
                access.franchise_id,
                access.granted_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get an access grant by lead id
    pub fn get_lead_access(&self, id: &str) -> Result<Option<LeadAccess>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM lead_access WHERE id = ?", [id], |row| {
            Ok(LeadAccess {
                id: row.get("id")?,
                subject_id: row.get("subject_id")?,
                franchise_id: row.get("franchise_id")?,
                granted_at: parse_ts(row.get::<_, String>("granted_at")?),
            })
        })
        .optional()
        .map_err(Error::from)
    }

    // ============================================
    // Invitation operations
    // ============================================

    /// Insert or update an invitation
    pub fn upsert_invitation(&self, invitation: &Invitation) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO invitations (
                id, franchise_id, lead_email, lead_name, status, sent_at,
                source, timeline, city, state, target_location, brand
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                franchise_id = excluded.franchise_id,
                lead_email = excluded.lead_email,
                lead_name = excluded.lead_name,
                status = excluded.status,
                sent_at = excluded.sent_at,
                source = excluded.source,
                timeline = excluded.timeline,
                city = excluded.city,
                state = excluded.state,
                target_location = excluded.target_location,
                brand = excluded.brand
            "#,
            params![
                invitation.id,
                invitation.franchise_id,
                invitation.lead_email,
                invitation.lead_name,
                invitation.status,
                invitation.sent_at.map(|t| t.to_rfc3339()),
                invitation.source,
                invitation.timeline,
                invitation.city,
                invitation.state,
                invitation.target_location,
                invitation.brand,
            ],
        )?;
        Ok(())
    }

    /// Get an invitation by id
    pub fn get_invitation(&self, id: &str) -> Result<Option<Invitation>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM invitations WHERE id = ?",
            [id],
            Self::row_to_invitation,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Find the invitation a franchise sent to a given email
    pub fn find_invitation(
        &self,
        franchise_id: &str,
        lead_email: &str,
    ) -> Result<Option<Invitation>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM invitations WHERE franchise_id = ? AND lead_email = ?",
            [franchise_id, lead_email],
            Self::row_to_invitation,
        )
        .optional()
        .map_err(Error::from)
    }

    fn row_to_invitation(row: &Row) -> rusqlite::Result<Invitation> {
        Ok(Invitation {
            id: row.get("id")?,
            franchise_id: row.get("franchise_id")?,
            lead_email: row.get("lead_email")?,
            lead_name: row.get("lead_name")?,
            status: row.get("status")?,
            sent_at: parse_ts_opt(row.get::<_, Option<String>>("sent_at")?),
            source: row.get("source")?,
            timeline: row.get("timeline")?,
            city: row.get("city")?,
            state: row.get("state")?,
            target_location: row.get("target_location")?,
            brand: row.get("brand")?,
        })
    }

    // ============================================
    // Insight cache operations
    // ============================================

    /// Get the cached insight for a (subject, franchise) pair
    pub fn get_cached_insight(
        &self,
        subject_id: &str,
        franchise_id: &str,
    ) -> Result<Option<CachedInsight>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM insight_cache WHERE subject_id = ? AND franchise_id = ?",
            [subject_id, franchise_id],
            |row| {
                let report_json: String = row.get("report")?;
                Ok((
                    report_json,
                    row.get::<_, Option<String>>("model")?,
                    row.get::<_, String>("generated_at")?,
                    row.get::<_, Option<String>>("prompt_hash")?,
                ))
            },
        )
        .optional()?
        .map(|(report_json, model, generated_at, prompt_hash)| {
            let report = serde_json::from_str(&report_json)?;
            Ok(CachedInsight {
                report,
                model,
                generated_at: parse_ts(generated_at),
                prompt_hash,
            })
        })
        .transpose()
    }

    /// Store (or replace) the cached insight for a pair
    pub fn store_insight(
        &self,
        subject_id: &str,
        franchise_id: &str,
        model: Option<&str>,
        report: &InsightReport,
        prompt_hash: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO insight_cache (
                subject_id, franchise_id, model, generated_at, report, prompt_hash
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(subject_id, franchise_id) DO UPDATE SET
                model = excluded.model,
                generated_at = excluded.generated_at,
                report = excluded.report,
                prompt_hash = excluded.prompt_hash
            "#,
            params![
                subject_id,
                franchise_id,
                model,
                Utc::now().to_rfc3339(),
                serde_json::to_string(report)?,
                prompt_hash,
            ],
        )?;
        Ok(())
    }
}

// ============================================
// Merge semantics
// ============================================

/// Fold a snapshot into a stored session, commutatively.
fn merge_snapshot(session: &mut EngagementSession, snapshot: &EngagementSnapshot) {
    session.time_spent_seconds = session.time_spent_seconds.max(snapshot.time_spent);
    union_into(&mut session.sections_viewed, &snapshot.sections_viewed);
    union_into(&mut session.viewed_items, &snapshot.viewed_items);
    union_into(&mut session.questions_asked, &snapshot.questions_asked);
    session.notes_created = session.notes_created.max(snapshot.notes_created);
    session.downloaded = session.downloaded || snapshot.downloaded;
    if session.downloaded_at.is_none() {
        session.downloaded_at = snapshot.downloaded_at;
    }
    session.milestones = session.milestones.union(&snapshot.milestones());
    if snapshot.last_activity > session.last_activity {
        session.last_activity = snapshot.last_activity;
    }
    if session.franchise_slug.is_none() {
        session.franchise_slug = snapshot.franchise_slug.clone();
    }
}

/// Build the first stored record for a session from its snapshot.
fn session_from_snapshot(subject_id: &str, snapshot: &EngagementSnapshot) -> EngagementSession {
    EngagementSession {
        session_id: snapshot.session_id.clone(),
        subject_id: subject_id.to_string(),
        franchise_id: snapshot.franchise_id.clone(),
        franchise_slug: snapshot.franchise_slug.clone(),
        time_spent_seconds: snapshot.time_spent,
        sections_viewed: snapshot.sections_viewed.clone(),
        viewed_items: snapshot.viewed_items.clone(),
        questions_asked: snapshot.questions_asked.clone(),
        notes_created: snapshot.notes_created,
        downloaded: snapshot.downloaded,
        downloaded_at: snapshot.downloaded_at,
        milestones: snapshot.milestones(),
        last_activity: snapshot.last_activity,
        created_at: Utc::now(),
    }
}

/// Append values not already present, preserving first-seen order.
fn union_into(dst: &mut Vec<String>, src: &[String]) {
    for value in src {
        if !dst.iter().any(|existing| existing == value) {
            dst.push(value.clone());
        }
    }
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_ts_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
