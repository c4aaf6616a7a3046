// 🏛️ Residences - syndic sign-up and the admin back-office

use crate::auth::Identity;
use crate::db::{record_event, count_rows};
use crate::entities::{Profile, ProfileStatus, Residence, Role};
use crate::error::{AppError, AppResult};
use crate::mailer::{application_received_email, deliver, syndic_decision_email, Mailer};
use crate::entities::profile::clean_optional;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct SyndicSignup {
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub apartment_number: Option<String>,
    pub residence_name: String,
    pub address: String,
    pub city: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResidenceInput {
    pub name: String,
    pub address: String,
    pub city: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResidenceUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResidenceOverview {
    #[serde(flatten)]
    pub residence: Residence,
    pub syndic_name: Option<String>,
    pub syndic_status: Option<ProfileStatus>,
    pub resident_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminStats {
    pub residences: i64,
    pub pending_syndics: i64,
    pub active_syndics: i64,
    pub residents: i64,
    pub guards: i64,
    pub pending_registrations: i64,
    pub total_collected_cents: i64,
}

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        Err(AppError::validation(format!("{field} is required")))
    } else {
        Ok(value.to_string())
    }
}

/// Public sign-up: a prospective syndic and their residence, pending review
pub fn signup_syndic(
    conn: &Connection,
    mailer: &dyn Mailer,
    input: SyndicSignup,
) -> AppResult<(Profile, Residence)> {
    let email = crate::entities::profile::validate_email(&input.email)?;
    let full_name = required("full_name", &input.full_name)?;
    let residence_name = required("residence_name", &input.residence_name)?;
    let address = required("address", &input.address)?;
    let city = required("city", &input.city)?;

    if Profile::find_by_email(conn, &email)?.is_some() {
        return Err(AppError::conflict("An account with this email already exists"));
    }

    let tx = conn.unchecked_transaction()?;

    let mut residence = Residence::new(&residence_name, &address, &city);
    residence.insert(&tx)?;

    let mut profile = Profile::new(&email, &full_name, Role::Syndic, ProfileStatus::Pending);
    profile.phone = clean_optional(input.phone);
    profile.apartment_number = clean_optional(input.apartment_number);
    profile.residence_id = Some(residence.id.clone());
    profile.insert(&tx)?;

    Residence::set_syndic(&tx, &residence.id, Some(&profile.id))?;
    residence.syndic_id = Some(profile.id.clone());

    record_event(
        &tx,
        "syndic_signed_up",
        "profile",
        &profile.id,
        serde_json::json!({ "residence_id": residence.id }),
        &profile.id,
    );
    tx.commit()?;

    deliver(
        conn,
        mailer,
        application_received_email(&profile.email, &profile.full_name, &residence.name),
    );
    info!(profile_id = %profile.id, residence_id = %residence.id, "syndic application received");

    Ok((profile, residence))
}

pub fn list_residences(conn: &Connection, actor: &Identity) -> AppResult<Vec<ResidenceOverview>> {
    actor.require_role(&[Role::Admin])?;

    let mut stmt = conn.prepare(
        "SELECT r.id, r.name, r.address, r.city, r.syndic_id, r.created_at,
                s.full_name, s.status,
                (SELECT COUNT(*) FROM profiles p WHERE p.residence_id = r.id AND p.role = 'resident')
         FROM residences r
         LEFT JOIN profiles s ON s.id = r.syndic_id
         ORDER BY r.name",
    )?;

    let residences = stmt
        .query_map([], |row| {
            Ok(ResidenceOverview {
                residence: Residence::from_row(row)?,
                syndic_name: row.get(6)?,
                syndic_status: row.get(7)?,
                resident_count: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(residences)
}

pub fn get_residence(conn: &Connection, actor: &Identity, id: &str) -> AppResult<Residence> {
    let residence = Residence::get(conn, id)?;
    if !actor.is_admin() && actor.profile.residence_id.as_deref() != Some(id) {
        return Err(AppError::forbidden("You do not belong to this residence"));
    }
    Ok(residence)
}

pub fn create_residence(
    conn: &Connection,
    actor: &Identity,
    input: ResidenceInput,
) -> AppResult<Residence> {
    actor.require_role(&[Role::Admin])?;

    let residence = Residence::new(
        &required("name", &input.name)?,
        &required("address", &input.address)?,
        &required("city", &input.city)?,
    );
    residence.insert(conn)?;

    record_event(
        conn,
        "residence_created",
        "residence",
        &residence.id,
        serde_json::json!({ "name": residence.name }),
        actor.id(),
    );
    Ok(residence)
}

pub fn update_residence(
    conn: &Connection,
    actor: &Identity,
    id: &str,
    update: ResidenceUpdate,
) -> AppResult<Residence> {
    actor.ensure_manages(id)?;
    let mut residence = Residence::get(conn, id)?;

    if let Some(name) = update.name {
        residence.name = required("name", &name)?;
    }
    if let Some(address) = update.address {
        residence.address = required("address", &address)?;
    }
    if let Some(city) = update.city {
        residence.city = required("city", &city)?;
    }

    conn.execute(
        "UPDATE residences SET name = ?1, address = ?2, city = ?3 WHERE id = ?4",
        params![residence.name, residence.address, residence.city, residence.id],
    )?;

    Ok(residence)
}

pub fn list_syndics(
    conn: &Connection,
    actor: &Identity,
    status: Option<ProfileStatus>,
) -> AppResult<Vec<Profile>> {
    actor.require_role(&[Role::Admin])?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM profiles
         WHERE role = 'syndic' AND (?1 IS NULL OR status = ?1)
         ORDER BY created_at DESC",
        crate::entities::profile::COLUMNS
    ))?;
    let syndics = stmt
        .query_map([status], Profile::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(syndics)
}

fn pending_syndic(conn: &Connection, profile_id: &str) -> AppResult<Profile> {
    let profile = Profile::get(conn, profile_id)?;
    if profile.role != Role::Syndic {
        return Err(AppError::NotFound("Syndic"));
    }
    if profile.status != ProfileStatus::Pending {
        return Err(AppError::conflict(format!(
            "Syndic application is already {}",
            profile.status
        )));
    }
    Ok(profile)
}

fn set_status(conn: &Connection, profile_id: &str, status: ProfileStatus) -> AppResult<()> {
    conn.execute(
        "UPDATE profiles SET status = ?1 WHERE id = ?2",
        params![status, profile_id],
    )?;
    Ok(())
}

pub fn approve_syndic(
    conn: &Connection,
    mailer: &dyn Mailer,
    actor: &Identity,
    profile_id: &str,
) -> AppResult<Profile> {
    actor.require_role(&[Role::Admin])?;
    let mut profile = pending_syndic(conn, profile_id)?;

    set_status(conn, &profile.id, ProfileStatus::Active)?;
    profile.status = ProfileStatus::Active;

    record_event(conn, "syndic_approved", "profile", &profile.id, serde_json::json!({}), actor.id());
    deliver(conn, mailer, syndic_decision_email(&profile.email, &profile.full_name, true, None));
    info!(profile_id = %profile.id, "syndic approved");

    Ok(profile)
}

pub fn reject_syndic(
    conn: &Connection,
    mailer: &dyn Mailer,
    actor: &Identity,
    profile_id: &str,
    reason: Option<String>,
) -> AppResult<Profile> {
    actor.require_role(&[Role::Admin])?;
    let mut profile = pending_syndic(conn, profile_id)?;
    let reason = clean_optional(reason);

    set_status(conn, &profile.id, ProfileStatus::Rejected)?;
    profile.status = ProfileStatus::Rejected;

    record_event(
        conn,
        "syndic_rejected",
        "profile",
        &profile.id,
        serde_json::json!({ "reason": reason }),
        actor.id(),
    );
    deliver(
        conn,
        mailer,
        syndic_decision_email(&profile.email, &profile.full_name, false, reason.as_deref()),
    );
    info!(profile_id = %profile.id, "syndic rejected");

    Ok(profile)
}

pub fn delete_residence(conn: &Connection, actor: &Identity, id: &str) -> AppResult<()> {
    actor.require_role(&[Role::Admin])?;
    crate::deletion::delete_residence(conn, id)?;
    record_event(conn, "residence_deleted", "residence", id, serde_json::json!({}), actor.id());
    Ok(())
}

pub fn admin_stats(conn: &Connection, actor: &Identity) -> AppResult<AdminStats> {
    actor.require_role(&[Role::Admin])?;

    let count_profiles = |role: Role, status: ProfileStatus| -> AppResult<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM profiles WHERE role = ?1 AND status = ?2",
            params![role, status],
            |row| row.get(0),
        )?;
        Ok(count)
    };

    let pending_registrations = conn.query_row(
        "SELECT COUNT(*) FROM registration_requests WHERE status = 'pending'",
        [],
        |row| row.get(0),
    )?;
    let total_collected_cents = conn.query_row(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM payments",
        [],
        |row| row.get(0),
    )?;

    Ok(AdminStats {
        residences: count_rows(conn, "residences")?,
        pending_syndics: count_profiles(Role::Syndic, ProfileStatus::Pending)?,
        active_syndics: count_profiles(Role::Syndic, ProfileStatus::Active)?,
        residents: count_profiles(Role::Resident, ProfileStatus::Active)?,
        guards: count_profiles(Role::Guard, ProfileStatus::Active)?,
        pending_registrations,
        total_collected_cents,
    })
}
