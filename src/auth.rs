// 🔐 Authentication - passwordless e-mail codes and opaque sessions
//
// Login: request_otp e-mails a 6-digit code, verify_otp trades it for a
// session token. Web clients keep the token in a cookie, mobile clients send
// it as a bearer token. Only SHA-256 hashes of codes and tokens are stored.

use crate::config::Config;
use crate::db::{new_id, sha256_hex};
use crate::entities::{Profile, Role};
use crate::error::{AppError, AppResult};
use crate::mailer::{deliver, otp_email, Mailer};
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

pub const SESSION_COOKIE: &str = "sakan_session";

/// Minimum gap between two OTP requests for the same address
const OTP_RESEND_COOLDOWN_SECS: i64 = 60;

text_enum! {
    /// Which surface a session belongs to
    Client {
        Web => "web",
        Mobile => "mobile",
    }
}

// ============================================================================
// SECRETS
// ============================================================================

/// 32 random bytes, base64url without padding
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    BASE64_URL_SAFE_NO_PAD.encode(&bytes)
}

/// Six decimal digits, leading zeros kept
pub fn generate_otp() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{code:06}")
}

// ============================================================================
// OTP LOGIN
// ============================================================================

/// E-mail a login code. Unknown or inactive addresses get the same Ok(())
/// without anything being sent.
pub fn request_otp(
    conn: &Connection,
    mailer: &dyn Mailer,
    config: &Config,
    email: &str,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let email = crate::entities::profile::validate_email(email)?;

    let profile = match Profile::find_by_email(conn, &email)? {
        Some(profile) if profile.is_active() => profile,
        _ => {
            debug!(%email, "otp requested for unknown or inactive account");
            return Ok(());
        }
    };

    let last_request: Option<DateTime<Utc>> = conn.query_row(
        "SELECT MAX(created_at) FROM otp_codes WHERE email = ?1",
        [&email],
        |row| row.get(0),
    )?;
    if let Some(last) = last_request {
        if now - last < Duration::seconds(OTP_RESEND_COOLDOWN_SECS) {
            return Err(AppError::RateLimited);
        }
    }

    // A new code invalidates any older one
    conn.execute(
        "UPDATE otp_codes SET consumed_at = ?1 WHERE email = ?2 AND consumed_at IS NULL",
        params![now, email],
    )?;

    let code = generate_otp();
    conn.execute(
        "INSERT INTO otp_codes (id, email, code_hash, attempts, expires_at, created_at)
         VALUES (?1, ?2, ?3, 0, ?4, ?5)",
        params![
            new_id(),
            email,
            sha256_hex(&code),
            now + Duration::minutes(config.otp_ttl_minutes),
            now
        ],
    )?;

    deliver(conn, mailer, otp_email(&profile.email, &code, config.otp_ttl_minutes));
    info!(profile_id = %profile.id, "otp issued");

    Ok(())
}

/// Exchange a login code for a session token
pub fn verify_otp(
    conn: &Connection,
    config: &Config,
    email: &str,
    code: &str,
    client: Client,
    now: DateTime<Utc>,
) -> AppResult<(String, Profile)> {
    let email = crate::entities::profile::normalize_email(email);

    let pending: Option<(String, String, i64, DateTime<Utc>)> = conn
        .query_row(
            "SELECT id, code_hash, attempts, expires_at FROM otp_codes
             WHERE email = ?1 AND consumed_at IS NULL
             ORDER BY created_at DESC LIMIT 1",
            [&email],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    let (otp_id, code_hash, attempts, expires_at) = pending.ok_or(AppError::InvalidCode)?;

    if expires_at <= now {
        return Err(AppError::InvalidCode);
    }
    if attempts >= config.otp_max_attempts {
        return Err(AppError::RateLimited);
    }

    if sha256_hex(code.trim()) != code_hash {
        conn.execute(
            "UPDATE otp_codes SET attempts = attempts + 1 WHERE id = ?1",
            [&otp_id],
        )?;
        return Err(AppError::InvalidCode);
    }

    let profile = Profile::find_by_email(conn, &email)?
        .filter(Profile::is_active)
        .ok_or(AppError::InvalidCode)?;

    conn.execute(
        "UPDATE otp_codes SET consumed_at = ?1 WHERE id = ?2",
        params![now, otp_id],
    )?;

    let token = create_session(conn, config, &profile.id, client, now)?;
    info!(profile_id = %profile.id, client = %client, "signed in");

    Ok((token, profile))
}

// ============================================================================
// SESSIONS
// ============================================================================

pub fn create_session(
    conn: &Connection,
    config: &Config,
    profile_id: &str,
    client: Client,
    now: DateTime<Utc>,
) -> AppResult<String> {
    let token = generate_token();

    conn.execute(
        "INSERT INTO sessions (id, token_hash, profile_id, client, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new_id(),
            sha256_hex(&token),
            profile_id,
            client,
            now + Duration::hours(config.session_ttl_hours),
            now
        ],
    )?;

    Ok(token)
}

/// Caller identity resolved from a session token
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub session_id: String,
    pub profile: Profile,
}

pub fn resolve_session(conn: &Connection, token: &str, now: DateTime<Utc>) -> AppResult<Identity> {
    let session: Option<(String, String, DateTime<Utc>)> = conn
        .query_row(
            "SELECT id, profile_id, expires_at FROM sessions WHERE token_hash = ?1",
            [sha256_hex(token)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let (session_id, profile_id, expires_at) = session.ok_or(AppError::Unauthorized)?;

    if expires_at <= now {
        revoke_session(conn, &session_id)?;
        return Err(AppError::Unauthorized);
    }

    let profile = Profile::find(conn, &profile_id)?
        .filter(Profile::is_active)
        .ok_or(AppError::Unauthorized)?;

    Ok(Identity { session_id, profile })
}

pub fn revoke_session(conn: &Connection, session_id: &str) -> AppResult<()> {
    conn.execute("DELETE FROM sessions WHERE id = ?1", [session_id])?;
    Ok(())
}

/// Drop expired sessions and spent or expired login codes
pub fn purge_expired(conn: &Connection, now: DateTime<Utc>) -> AppResult<usize> {
    let sessions = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now])?;
    let codes = conn.execute(
        "DELETE FROM otp_codes WHERE expires_at <= ?1 OR consumed_at IS NOT NULL",
        [now],
    )?;
    Ok(sessions + codes)
}

// ============================================================================
// AUTHORIZATION
// ============================================================================

impl Identity {
    pub fn id(&self) -> &str {
        &self.profile.id
    }

    pub fn role(&self) -> Role {
        self.profile.role
    }

    pub fn is_admin(&self) -> bool {
        self.profile.role == Role::Admin
    }

    pub fn require_role(&self, roles: &[Role]) -> AppResult<()> {
        if roles.contains(&self.profile.role) {
            Ok(())
        } else {
            Err(AppError::forbidden("You are not allowed to perform this action"))
        }
    }

    /// Residence the caller belongs to
    pub fn residence_id(&self) -> AppResult<&str> {
        self.profile
            .residence_id
            .as_deref()
            .ok_or_else(|| AppError::forbidden("Your account is not linked to a residence"))
    }

    /// Syndic of a residence; returns that residence id
    pub fn require_syndic(&self) -> AppResult<&str> {
        self.require_role(&[Role::Syndic])?;
        self.residence_id()
    }

    /// Admins manage every residence, syndics only their own
    pub fn ensure_manages(&self, residence_id: &str) -> AppResult<()> {
        match self.profile.role {
            Role::Admin => Ok(()),
            Role::Syndic if self.profile.residence_id.as_deref() == Some(residence_id) => Ok(()),
            _ => Err(AppError::forbidden("You do not manage this residence")),
        }
    }

    /// Self, admin, or the syndic of the profile's residence
    pub fn ensure_can_view(&self, profile: &Profile) -> AppResult<()> {
        if self.profile.id == profile.id {
            return Ok(());
        }
        match profile.residence_id.as_deref() {
            Some(residence_id) => self.ensure_manages(residence_id),
            None if self.is_admin() => Ok(()),
            None => Err(AppError::forbidden("You cannot access this profile")),
        }
    }
}
