//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    -- ============================================
    -- Engagement sessions (one row per viewer session)
    -- ============================================

    CREATE TABLE IF NOT EXISTS engagement_sessions (
        session_id            TEXT PRIMARY KEY,
        subject_id            TEXT NOT NULL,
        franchise_id          TEXT NOT NULL,
        franchise_slug        TEXT,
        time_spent_seconds    INTEGER NOT NULL DEFAULT 0,
        sections_viewed       JSON NOT NULL,
        viewed_items          JSON NOT NULL,
        questions_asked       JSON NOT NULL,
        notes_created         INTEGER NOT NULL DEFAULT 0,
        downloaded            INTEGER NOT NULL DEFAULT 0,
        downloaded_at         DATETIME,

        -- Milestones (one-way flags, flattened)
        viewed_fdd            INTEGER NOT NULL DEFAULT 0,
        asked_questions       INTEGER NOT NULL DEFAULT 0,
        viewed_item19         INTEGER NOT NULL DEFAULT 0,
        viewed_item7          INTEGER NOT NULL DEFAULT 0,
        created_notes         INTEGER NOT NULL DEFAULT 0,
        spent_significant_time INTEGER NOT NULL DEFAULT 0,

        last_activity         DATETIME NOT NULL,
        created_at            DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_engagement_pair
        ON engagement_sessions(subject_id, franchise_id);
    CREATE INDEX IF NOT EXISTS idx_engagement_last_activity
        ON engagement_sessions(last_activity DESC);

    -- ============================================
    -- Context records (written by the CRM side, read here)
    -- ============================================

    CREATE TABLE IF NOT EXISTS buyer_profiles (
        subject_id            TEXT PRIMARY KEY,
        first_name            TEXT,
        last_name             TEXT,
        email                 TEXT,
        city                  TEXT,
        state                 TEXT,
        buying_timeline       TEXT,
        signup_source         TEXT,
        fico_score_range      TEXT,
        liquid_assets_range   TEXT,
        net_worth_range       TEXT,
        funding_plans         TEXT,
        years_of_experience   INTEGER,
        has_owned_business    INTEGER NOT NULL DEFAULT 0,
        linkedin_url          TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_buyer_profiles_email ON buyer_profiles(email);

    CREATE TABLE IF NOT EXISTS franchises (
        id                    TEXT PRIMARY KEY,
        slug                  TEXT,
        name                  TEXT NOT NULL,
        industry              TEXT,
        investment_min        INTEGER,
        investment_max        INTEGER,
        liquid_capital_min    INTEGER,
        net_worth_min         INTEGER
    );

    CREATE TABLE IF NOT EXISTS lead_access (
        id                    TEXT PRIMARY KEY,
        subject_id            TEXT NOT NULL,
        franchise_id          TEXT NOT NULL,
        granted_at            DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_lead_access_pair
        ON lead_access(subject_id, franchise_id);

    CREATE TABLE IF NOT EXISTS invitations (
        id                    TEXT PRIMARY KEY,
        franchise_id          TEXT NOT NULL,
        lead_email            TEXT,
        lead_name             TEXT,
        status                TEXT NOT NULL,
        sent_at               DATETIME,
        source                TEXT,
        timeline              TEXT,
        city                  TEXT,
        state                 TEXT,
        target_location       TEXT,
        brand                 TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_invitations_franchise_email
        ON invitations(franchise_id, lead_email);

    -- ============================================
    -- Derived (regenerable)
    -- ============================================

    CREATE TABLE IF NOT EXISTS insight_cache (
        id                    INTEGER PRIMARY KEY AUTOINCREMENT,
        subject_id            TEXT NOT NULL,
        franchise_id          TEXT NOT NULL,
        model                 TEXT,
        generated_at          DATETIME NOT NULL,
        report                JSON NOT NULL,
        prompt_hash           TEXT,

        UNIQUE(subject_id, franchise_id)
    );
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run migrations twice - should be idempotent
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = [
            "engagement_sessions",
            "buyer_profiles",
            "franchises",
            "lead_access",
            "invitations",
            "insight_cache",
        ];

        for table in tables {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }
}
