// 🚪 Onboarding - invitation codes for residents, guards and replacement syndics

use crate::auth::{create_session, Client, Identity};
use crate::config::Config;
use crate::db::{new_id, record_event, sha256_hex};
use crate::entities::profile::{clean_optional, normalize_email, validate_email};
use crate::entities::{OnboardingCode, OnboardingPurpose, Profile, ProfileStatus, Residence, Role};
use crate::error::{AppError, AppResult};
use crate::mailer::{deliver, onboarding_email, Mailer};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::info;

/// No 0/O/1/I: codes get typed from phone screens and paper notes
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct InviteInput {
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub apartment_number: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub purpose: OnboardingPurpose,
    /// Required when an admin issues the code; syndics always use their own residence
    #[serde(default)]
    pub residence_id: Option<String>,
}

/// The plain code is only ever returned here
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCode {
    pub code: String,
    pub invitation: OnboardingCode,
    pub email_sent: bool,
}

pub fn generate_onboarding_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn claim_link(config: &Config, code: &str, email: &str) -> String {
    format!(
        "{}/onboarding?code={}&email={}",
        config.public_url,
        code,
        urlencoding::encode(email)
    )
}

/// Which residence the invitation is for, enforcing who may invite whom
fn target_residence(conn: &Connection, actor: &Identity, input: &InviteInput) -> AppResult<Residence> {
    let residence_id = match actor.role() {
        Role::Admin => input
            .residence_id
            .clone()
            .ok_or_else(|| AppError::validation("residence_id is required"))?,
        Role::Syndic => actor.residence_id()?.to_string(),
        _ => return Err(AppError::forbidden("Only syndics can invite people")),
    };

    let residence = Residence::get(conn, &residence_id)?;
    actor.ensure_manages(&residence.id)?;
    Ok(residence)
}

pub fn issue_code(
    conn: &Connection,
    mailer: &dyn Mailer,
    config: &Config,
    actor: &Identity,
    input: InviteInput,
    now: DateTime<Utc>,
) -> AppResult<IssuedCode> {
    let residence = target_residence(conn, actor, &input)?;
    let email = validate_email(&input.email)?;

    let full_name = input.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::validation("full_name is required"));
    }
    let apartment_number = clean_optional(input.apartment_number);
    if input.purpose == OnboardingPurpose::Resident && apartment_number.is_none() {
        return Err(AppError::validation("apartment_number is required for residents"));
    }

    if Profile::find_by_email(conn, &email)?.is_some() {
        return Err(AppError::conflict("An account with this email already exists"));
    }

    // Re-inviting replaces the previous code
    conn.execute(
        "UPDATE onboarding_codes SET consumed_at = ?1
         WHERE email = ?2 AND residence_id = ?3 AND consumed_at IS NULL",
        params![now, email, residence.id],
    )?;

    let code = generate_onboarding_code();
    let invitation = OnboardingCode {
        id: new_id(),
        residence_id: residence.id.clone(),
        email: email.clone(),
        full_name: full_name.to_string(),
        apartment_number,
        phone: clean_optional(input.phone),
        purpose: input.purpose,
        created_by: Some(actor.id().to_string()),
        expires_at: now + Duration::hours(config.onboarding_ttl_hours),
        consumed_at: None,
        created_at: now,
    };
    invitation.insert(conn, &sha256_hex(&code))?;

    record_event(
        conn,
        "onboarding_code_issued",
        "residence",
        &residence.id,
        serde_json::json!({ "email": email, "purpose": invitation.purpose }),
        actor.id(),
    );

    let email_sent = deliver(
        conn,
        mailer,
        onboarding_email(
            &email,
            &invitation.full_name,
            &residence.name,
            &code,
            &claim_link(config, &code, &email),
            config.onboarding_ttl_hours,
        ),
    );

    info!(residence_id = %residence.id, purpose = %invitation.purpose, "onboarding code issued");

    Ok(IssuedCode {
        code,
        invitation,
        email_sent,
    })
}

/// Outstanding invitations of a residence
pub fn list_pending_codes(
    conn: &Connection,
    residence_id: &str,
    now: DateTime<Utc>,
) -> AppResult<Vec<OnboardingCode>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM onboarding_codes
         WHERE residence_id = ?1 AND consumed_at IS NULL
         ORDER BY created_at DESC",
        crate::entities::onboarding::COLUMNS
    ))?;
    let codes = stmt
        .query_map([residence_id], OnboardingCode::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(codes.into_iter().filter(|code| code.is_usable(now)).collect())
}

pub fn revoke_code(conn: &Connection, actor: &Identity, code_id: &str) -> AppResult<()> {
    let code = OnboardingCode::find(conn, code_id)?.ok_or(AppError::NotFound("Onboarding code"))?;
    actor.ensure_manages(&code.residence_id)?;

    conn.execute("DELETE FROM onboarding_codes WHERE id = ?1", [code_id])?;
    Ok(())
}

/// Redeem a code: creates the profile and signs it in
pub fn claim_code(
    conn: &Connection,
    config: &Config,
    code: &str,
    email: &str,
    client: Client,
    now: DateTime<Utc>,
) -> AppResult<(String, Profile)> {
    let code_hash = sha256_hex(&code.trim().to_uppercase());
    let invitation = OnboardingCode::find_by_hash(conn, &code_hash)?
        .filter(|invitation| invitation.is_usable(now))
        .filter(|invitation| invitation.email == normalize_email(email))
        .ok_or(AppError::InvalidCode)?;

    let residence = Residence::get(conn, &invitation.residence_id)?;

    let tx = conn.unchecked_transaction()?;

    let mut profile = Profile::new(
        &invitation.email,
        &invitation.full_name,
        invitation.purpose.role(),
        ProfileStatus::Active,
    );
    profile.residence_id = Some(residence.id.clone());
    profile.apartment_number = invitation.apartment_number.clone();
    profile.phone = invitation.phone.clone();
    profile.insert(&tx)?;

    if invitation.purpose == OnboardingPurpose::Syndic {
        if let Some(previous) = residence.syndic_id.as_deref() {
            // The outgoing syndic stays in the building as a resident
            tx.execute(
                "UPDATE profiles SET role = ?1 WHERE id = ?2",
                params![Role::Resident, previous],
            )?;
            tx.execute("DELETE FROM sessions WHERE profile_id = ?1", [previous])?;
        }
        Residence::set_syndic(&tx, &residence.id, Some(&profile.id))?;
    }

    tx.execute(
        "UPDATE onboarding_codes SET consumed_at = ?1 WHERE id = ?2",
        params![now, invitation.id],
    )?;

    record_event(
        &tx,
        "onboarding_code_claimed",
        "profile",
        &profile.id,
        serde_json::json!({ "residence_id": residence.id, "purpose": invitation.purpose }),
        &profile.id,
    );

    let token = create_session(&tx, config, &profile.id, client, now)?;
    tx.commit()?;

    info!(profile_id = %profile.id, role = %profile.role, "onboarding code claimed");
    Ok((token, profile))
}
