// 🔑 Access codes - what a resident's QR code carries
//
// The code is opaque and only means something to guards of the same
// residence. Regenerating it invalidates every printed or cached copy.

use crate::auth::Identity;
use crate::db::record_event;
use crate::entities::profile::generate_access_code;
use crate::entities::{Fee, Profile, ProfileStatus, Role};
use crate::error::{AppError, AppResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct AccessCard {
    pub access_code: String,
    pub full_name: String,
    pub apartment_number: Option<String>,
    pub residence_id: Option<String>,
}

impl From<&Profile> for AccessCard {
    fn from(profile: &Profile) -> Self {
        AccessCard {
            access_code: profile.access_code.clone(),
            full_name: profile.full_name.clone(),
            apartment_number: profile.apartment_number.clone(),
            residence_id: profile.residence_id.clone(),
        }
    }
}

/// What a guard sees after scanning
#[derive(Debug, Clone, Serialize)]
pub struct AccessCheck {
    pub profile_id: String,
    pub full_name: String,
    pub apartment_number: Option<String>,
    pub role: Role,
    pub status: ProfileStatus,
    pub has_overdue_fees: bool,
}

pub fn my_access_code(conn: &Connection, actor: &Identity) -> AppResult<AccessCard> {
    let profile = Profile::get(conn, actor.id())?;
    Ok(AccessCard::from(&profile))
}

pub fn regenerate_access_code(conn: &Connection, actor: &Identity) -> AppResult<AccessCard> {
    let mut profile = Profile::get(conn, actor.id())?;
    profile.access_code = generate_access_code();

    conn.execute(
        "UPDATE profiles SET access_code = ?1 WHERE id = ?2",
        params![profile.access_code, profile.id],
    )?;
    record_event(conn, "access_code_regenerated", "profile", &profile.id, serde_json::json!({}), actor.id());

    Ok(AccessCard::from(&profile))
}

pub fn verify_access_code(
    conn: &Connection,
    actor: &Identity,
    code: &str,
    today: NaiveDate,
) -> AppResult<AccessCheck> {
    actor.require_role(&[Role::Guard, Role::Syndic])?;
    let residence_id = actor.residence_id()?;

    // Codes from other residences look exactly like unknown ones
    let profile = Profile::find_by_access_code(conn, code)?
        .filter(|p| p.residence_id.as_deref() == Some(residence_id))
        .ok_or(AppError::NotFound("Access code"))?;

    let has_overdue_fees = Fee::list_for_profile(conn, &profile.id)?
        .iter()
        .any(|fee| fee.is_overdue(today));

    info!(guard = %actor.id(), profile_id = %profile.id, "access code verified");

    Ok(AccessCheck {
        profile_id: profile.id,
        full_name: profile.full_name,
        apartment_number: profile.apartment_number,
        role: profile.role,
        status: profile.status,
        has_overdue_fees,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{new_id, setup_database};
    use crate::entities::{FeeStatus, Residence};
    use chrono::Utc;

    fn member(conn: &Connection, residence_id: &str, email: &str, role: Role) -> Profile {
        let mut p = Profile::new(email, "Member", role, ProfileStatus::Active);
        p.residence_id = Some(residence_id.to_string());
        p.apartment_number = Some("9".to_string());
        p.insert(conn).unwrap();
        p
    }

    fn setup() -> (Connection, Identity, Profile, Profile) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let home = Residence::new("Home", "1 Rue A", "Fes");
        home.insert(&conn).unwrap();
        let other = Residence::new("Other", "2 Rue B", "Fes");
        other.insert(&conn).unwrap();

        let guard = member(&conn, &home.id, "guard@example.ma", Role::Guard);
        let resident = member(&conn, &home.id, "r@example.ma", Role::Resident);
        let stranger = member(&conn, &other.id, "x@example.ma", Role::Resident);

        (conn, Identity { session_id: "g".to_string(), profile: guard }, resident, stranger)
    }

    #[test]
    fn test_guard_verifies_resident() {
        let (conn, guard, resident, _) = setup();
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let check = verify_access_code(&conn, &guard, &resident.access_code.to_lowercase(), today).unwrap();
        assert_eq!(check.profile_id, resident.id);
        assert!(!check.has_overdue_fees);

        Fee {
            id: new_id(),
            residence_id: resident.residence_id.clone().unwrap(),
            profile_id: resident.id.clone(),
            contribution_id: None,
            title: "Charges".to_string(),
            amount_cents: 100,
            paid_cents: 0,
            due_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            period_start: None,
            period_end: None,
            status: FeeStatus::Unpaid,
            created_at: Utc::now(),
        }
        .insert(&conn)
        .unwrap();

        let check = verify_access_code(&conn, &guard, &resident.access_code, today).unwrap();
        assert!(check.has_overdue_fees);
    }

    #[test]
    fn test_other_residence_is_not_found() {
        let (conn, guard, _, stranger) = setup();
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let result = verify_access_code(&conn, &guard, &stranger.access_code, today);
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let unknown = verify_access_code(&conn, &guard, "SKN-NOTACODE", today);
        assert!(matches!(unknown, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_resident_cannot_verify() {
        let (conn, _, resident, stranger) = setup();
        let me = Identity { session_id: "r".to_string(), profile: resident };
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let result = verify_access_code(&conn, &me, &stranger.access_code, today);
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_regenerate_invalidates_old_code() {
        let (conn, guard, resident, _) = setup();
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let old = resident.access_code.clone();
        let me = Identity { session_id: "r".to_string(), profile: resident };

        let card = regenerate_access_code(&conn, &me).unwrap();
        assert_ne!(card.access_code, old);
        assert_eq!(my_access_code(&conn, &me).unwrap().access_code, card.access_code);

        assert!(verify_access_code(&conn, &guard, &old, today).is_err());
        assert!(verify_access_code(&conn, &guard, &card.access_code, today).is_ok());
    }
}
