use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

/// Event for audit trail ("every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    /// Profile id of whoever caused the change ("system" for CLI jobs)
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: new_id(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Fresh UUID v4 identity
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// SHA-256 hex digest; secrets (tokens, codes) are only ever stored hashed
pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    setup_database(&conn)?;
    info!(path = %path.display(), "database ready");
    Ok(conn)
}

// ============================================================================
// SCHEMA
// Foreign keys are enforced but never cascade: deletion.rs tears rows down
// in dependency order.
// ============================================================================

const TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS residences (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        address TEXT NOT NULL,
        city TEXT NOT NULL,
        syndic_id TEXT REFERENCES profiles(id),
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY,
        email TEXT UNIQUE NOT NULL,
        full_name TEXT NOT NULL,
        phone TEXT,
        role TEXT NOT NULL,
        status TEXT NOT NULL,
        residence_id TEXT REFERENCES residences(id),
        apartment_number TEXT,
        access_code TEXT UNIQUE NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        token_hash TEXT UNIQUE NOT NULL,
        profile_id TEXT NOT NULL REFERENCES profiles(id),
        client TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS otp_codes (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL,
        code_hash TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        expires_at TEXT NOT NULL,
        consumed_at TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS onboarding_codes (
        id TEXT PRIMARY KEY,
        code_hash TEXT UNIQUE NOT NULL,
        residence_id TEXT NOT NULL REFERENCES residences(id),
        email TEXT NOT NULL,
        full_name TEXT NOT NULL,
        apartment_number TEXT,
        phone TEXT,
        purpose TEXT NOT NULL,
        created_by TEXT REFERENCES profiles(id),
        expires_at TEXT NOT NULL,
        consumed_at TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS registration_requests (
        id TEXT PRIMARY KEY,
        residence_id TEXT NOT NULL REFERENCES residences(id),
        email TEXT NOT NULL,
        full_name TEXT NOT NULL,
        phone TEXT,
        apartment_number TEXT NOT NULL,
        status TEXT NOT NULL,
        rejection_reason TEXT,
        reviewed_by TEXT REFERENCES profiles(id),
        reviewed_at TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS contributions (
        id TEXT PRIMARY KEY,
        residence_id TEXT NOT NULL REFERENCES residences(id),
        title TEXT NOT NULL,
        amount_cents INTEGER NOT NULL,
        frequency TEXT NOT NULL,
        start_date TEXT NOT NULL,
        end_date TEXT,
        active INTEGER NOT NULL DEFAULT 1,
        created_by TEXT REFERENCES profiles(id),
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS fees (
        id TEXT PRIMARY KEY,
        residence_id TEXT NOT NULL REFERENCES residences(id),
        profile_id TEXT NOT NULL REFERENCES profiles(id),
        contribution_id TEXT REFERENCES contributions(id),
        title TEXT NOT NULL,
        amount_cents INTEGER NOT NULL,
        paid_cents INTEGER NOT NULL DEFAULT 0,
        due_date TEXT NOT NULL,
        period_start TEXT,
        period_end TEXT,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (contribution_id, profile_id, period_start)
    )",
    "CREATE TABLE IF NOT EXISTS payments (
        id TEXT PRIMARY KEY,
        fee_id TEXT NOT NULL REFERENCES fees(id),
        profile_id TEXT NOT NULL REFERENCES profiles(id),
        residence_id TEXT NOT NULL REFERENCES residences(id),
        amount_cents INTEGER NOT NULL,
        remaining_after_cents INTEGER NOT NULL,
        method TEXT NOT NULL,
        receipt_number TEXT UNIQUE NOT NULL,
        note TEXT,
        paid_at TEXT NOT NULL,
        recorded_by TEXT REFERENCES profiles(id),
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS expenses (
        id TEXT PRIMARY KEY,
        residence_id TEXT NOT NULL REFERENCES residences(id),
        category TEXT NOT NULL,
        description TEXT NOT NULL,
        amount_cents INTEGER NOT NULL,
        expense_date TEXT NOT NULL,
        recorded_by TEXT REFERENCES profiles(id),
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS email_outbox (
        id TEXT PRIMARY KEY,
        recipient TEXT NOT NULL,
        subject TEXT NOT NULL,
        body TEXT NOT NULL,
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        error TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_id TEXT UNIQUE NOT NULL,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        data TEXT NOT NULL,
        actor TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_profiles_residence ON profiles(residence_id, role)",
    "CREATE INDEX IF NOT EXISTS idx_sessions_profile ON sessions(profile_id)",
    "CREATE INDEX IF NOT EXISTS idx_otp_email ON otp_codes(email, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_onboarding_residence ON onboarding_codes(residence_id)",
    "CREATE INDEX IF NOT EXISTS idx_registrations_residence ON registration_requests(residence_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_fees_residence ON fees(residence_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_fees_profile ON fees(profile_id)",
    "CREATE INDEX IF NOT EXISTS idx_payments_fee ON payments(fee_id)",
    "CREATE INDEX IF NOT EXISTS idx_payments_residence ON payments(residence_id, paid_at)",
    "CREATE INDEX IF NOT EXISTS idx_expenses_residence ON expenses(residence_id, expense_date)",
    "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
    "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
];

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery; in-memory databases silently keep "memory"
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    for statement in TABLES.iter().chain(INDEXES) {
        conn.execute(statement, [])
            .with_context(|| format!("Failed to apply schema statement: {}", first_line(statement)))?;
    }

    Ok(())
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or(statement)
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp,
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Record an event without failing the surrounding operation
pub fn record_event(
    conn: &Connection,
    event_type: &str,
    entity_type: &str,
    entity_id: &str,
    data: serde_json::Value,
    actor: &str,
) {
    let event = Event::new(event_type, entity_type, entity_id, data, actor);
    if let Err(e) = insert_event(conn, &event) {
        warn!(event_type, entity_id, error = %e, "failed to record audit event");
    }
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: row.get(1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).unwrap_or(serde_json::Value::Null),
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Latest events across all entities, newest first
pub fn get_recent_events(conn: &Connection, limit: usize) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         ORDER BY timestamp DESC, id DESC
         LIMIT ?1",
    )?;

    let events = stmt
        .query_map([limit as i64], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: row.get(1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).unwrap_or(serde_json::Value::Null),
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Count rows of a table (used by stats and tests)
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        assert_eq!(count_rows(&conn, "residences").unwrap(), 0);
        assert_eq!(count_rows(&conn, "events").unwrap(), 0);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO sessions (id, token_hash, profile_id, client, expires_at, created_at)
             VALUES ('s1', 'h', 'missing-profile', 'web', '2030-01-01', '2024-01-01')",
            [],
        );

        assert!(result.is_err(), "session without a profile must be rejected");
    }

    #[test]
    fn test_sha256_hex() {
        let hash = sha256_hex("123456");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, sha256_hex("123456"));
        assert_ne!(hash, sha256_hex("123457"));
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new(
            "fee_created",
            "fee",
            "fee_123",
            serde_json::json!({"amount_cents": 25000}),
            "syndic_1",
        );

        insert_event(&conn, &event).unwrap();
        record_event(&conn, "fee_updated", "fee", "fee_123", serde_json::json!({}), "syndic_1");

        let events = get_events_for_entity(&conn, "fee", "fee_123").unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "fee_updated");
        assert_eq!(events[1].actor, "syndic_1");
        assert_eq!(events[1].data["amount_cents"], 25000);

        let recent = get_recent_events(&conn, 1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event_type, "fee_updated");
    }
}
