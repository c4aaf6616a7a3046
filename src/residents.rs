// 🏠 Residents - the syndic's view of the people in a residence

use crate::auth::Identity;
use crate::config::Config;
use crate::db::record_event;
use crate::deletion::{delete_profile, DeletionReport};
use crate::entities::profile::clean_optional;
use crate::entities::{OnboardingPurpose, Profile, Role};
use crate::error::{AppError, AppResult};
use crate::mailer::Mailer;
use crate::onboarding::{issue_code, InviteInput};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResidentUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub apartment_number: Option<String>,
}

/// One row of a resident import file
#[derive(Debug, Clone, Deserialize)]
struct ImportRow {
    email: String,
    full_name: String,
    apartment_number: String,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportRowError {
    /// 1-based line in the file, header included
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub invited: usize,
    pub errors: Vec<ImportRowError>,
}

pub fn list_residents(conn: &Connection, actor: &Identity, residence_id: &str) -> AppResult<Vec<Profile>> {
    actor.ensure_manages(residence_id)?;
    Profile::list_for_residence(conn, residence_id, Role::Resident)
}

pub fn list_guards(conn: &Connection, actor: &Identity, residence_id: &str) -> AppResult<Vec<Profile>> {
    actor.ensure_manages(residence_id)?;
    Profile::list_for_residence(conn, residence_id, Role::Guard)
}

/// A resident or guard the caller may manage
fn managed_member(conn: &Connection, actor: &Identity, profile_id: &str) -> AppResult<Profile> {
    let profile = Profile::get(conn, profile_id)?;
    if !matches!(profile.role, Role::Resident | Role::Guard) {
        return Err(AppError::NotFound("Resident"));
    }

    let residence_id = profile.residence_id.as_deref().ok_or(AppError::NotFound("Resident"))?;
    actor.ensure_manages(residence_id)?;
    Ok(profile)
}

pub fn get_resident(conn: &Connection, actor: &Identity, profile_id: &str) -> AppResult<Profile> {
    let profile = Profile::get(conn, profile_id)?;
    actor.ensure_can_view(&profile)?;
    Ok(profile)
}

fn apply_update(profile: &mut Profile, update: ResidentUpdate) -> AppResult<()> {
    if let Some(full_name) = update.full_name {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(AppError::validation("full_name cannot be empty"));
        }
        profile.full_name = full_name.to_string();
    }
    if update.phone.is_some() {
        profile.phone = clean_optional(update.phone);
    }
    if update.apartment_number.is_some() {
        profile.apartment_number = clean_optional(update.apartment_number);
    }
    Ok(())
}

fn save_contact(conn: &Connection, profile: &Profile) -> AppResult<()> {
    conn.execute(
        "UPDATE profiles SET full_name = ?1, phone = ?2, apartment_number = ?3 WHERE id = ?4",
        params![profile.full_name, profile.phone, profile.apartment_number, profile.id],
    )?;
    Ok(())
}

pub fn update_resident(
    conn: &Connection,
    actor: &Identity,
    profile_id: &str,
    update: ResidentUpdate,
) -> AppResult<Profile> {
    let mut profile = managed_member(conn, actor, profile_id)?;
    apply_update(&mut profile, update)?;
    save_contact(conn, &profile)?;

    record_event(conn, "resident_updated", "profile", &profile.id, serde_json::json!({}), actor.id());
    Ok(profile)
}

/// Own contact details; apartment changes go through the syndic
pub fn update_me(conn: &Connection, actor: &Identity, update: ResidentUpdate) -> AppResult<Profile> {
    let mut profile = Profile::get(conn, actor.id())?;
    apply_update(
        &mut profile,
        ResidentUpdate {
            apartment_number: None,
            ..update
        },
    )?;
    save_contact(conn, &profile)?;
    Ok(profile)
}

pub fn remove_resident(conn: &Connection, actor: &Identity, profile_id: &str) -> AppResult<DeletionReport> {
    let profile = managed_member(conn, actor, profile_id)?;
    let report = delete_profile(conn, &profile.id)?;

    record_event(
        conn,
        "resident_removed",
        "residence",
        profile.residence_id.as_deref().unwrap_or_default(),
        serde_json::json!({ "profile_id": profile.id, "email": profile.email }),
        actor.id(),
    );
    Ok(report)
}

/// Self-service account deletion
pub fn delete_me(conn: &Connection, actor: &Identity) -> AppResult<DeletionReport> {
    let report = delete_profile(conn, actor.id())?;
    record_event(conn, "account_deleted", "profile", actor.id(), serde_json::json!({}), actor.id());
    Ok(report)
}

/// Invite every row of a CSV file (email,full_name,apartment_number,phone).
/// Bad rows are reported and skipped.
pub fn import_residents_csv<R: Read>(
    conn: &Connection,
    mailer: &dyn Mailer,
    config: &Config,
    actor: &Identity,
    residence_id: Option<String>,
    reader: R,
    now: DateTime<Utc>,
) -> AppResult<ImportReport> {
    actor.require_role(&[Role::Admin, Role::Syndic])?;

    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut report = ImportReport::default();

    for (index, result) in rdr.deserialize::<ImportRow>().enumerate() {
        let line = index + 2;

        let row = match result {
            Ok(row) => row,
            Err(e) => {
                report.errors.push(ImportRowError { line, message: e.to_string() });
                continue;
            }
        };

        let invite = InviteInput {
            email: row.email,
            full_name: row.full_name,
            apartment_number: Some(row.apartment_number),
            phone: row.phone,
            purpose: OnboardingPurpose::Resident,
            residence_id: residence_id.clone(),
        };

        match issue_code(conn, mailer, config, actor, invite, now) {
            Ok(_) => report.invited += 1,
            Err(e @ (AppError::Database(_) | AppError::Internal(_) | AppError::Forbidden(_) | AppError::NotFound(_))) => {
                return Err(e);
            }
            Err(e) => {
                warn!(line, error = %e, "skipping resident import row");
                report.errors.push(ImportRowError { line, message: e.to_string() });
            }
        }
    }

    info!(invited = report.invited, errors = report.errors.len(), "resident import finished");
    Ok(report)
}
