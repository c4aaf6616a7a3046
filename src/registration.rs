// 📝 Registration requests - self-service applications reviewed by the syndic

use crate::auth::Identity;
use crate::db::{new_id, record_event};
use crate::entities::profile::validate_email;
use crate::entities::{Profile, ProfileStatus, RegistrationRequest, RequestStatus, Residence, Role};
use crate::error::{AppError, AppResult};
use crate::mailer::{deliver, registration_decision_email, Mailer};
use crate::entities::profile::clean_optional;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationInput {
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub apartment_number: String,
}

/// Public: anyone may ask to join a residence
pub fn submit_request(
    conn: &Connection,
    residence_id: &str,
    input: RegistrationInput,
    now: DateTime<Utc>,
) -> AppResult<RegistrationRequest> {
    let residence = Residence::get(conn, residence_id)?;
    let email = validate_email(&input.email)?;

    let full_name = input.full_name.trim().to_string();
    let apartment_number = input.apartment_number.trim().to_string();
    if full_name.is_empty() || apartment_number.is_empty() {
        return Err(AppError::validation("full_name and apartment_number are required"));
    }

    if Profile::find_by_email(conn, &email)?.is_some() {
        return Err(AppError::conflict("An account with this email already exists"));
    }

    let pending: i64 = conn.query_row(
        "SELECT COUNT(*) FROM registration_requests
         WHERE residence_id = ?1 AND email = ?2 AND status = 'pending'",
        params![residence.id, email],
        |row| row.get(0),
    )?;
    if pending > 0 {
        return Err(AppError::conflict("A request for this email is already pending"));
    }

    let request = RegistrationRequest {
        id: new_id(),
        residence_id: residence.id,
        email,
        full_name,
        phone: clean_optional(input.phone),
        apartment_number,
        status: RequestStatus::Pending,
        rejection_reason: None,
        reviewed_by: None,
        reviewed_at: None,
        created_at: now,
    };
    request.insert(conn)?;

    info!(request_id = %request.id, residence_id = %request.residence_id, "registration request submitted");
    Ok(request)
}

pub fn list_requests(
    conn: &Connection,
    actor: &Identity,
    residence_id: &str,
    status: Option<RequestStatus>,
) -> AppResult<Vec<RegistrationRequest>> {
    actor.ensure_manages(residence_id)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM registration_requests
         WHERE residence_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at DESC",
        crate::entities::registration::COLUMNS
    ))?;
    let requests = stmt
        .query_map(params![residence_id, status], RegistrationRequest::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(requests)
}

fn pending_request(conn: &Connection, actor: &Identity, id: &str) -> AppResult<RegistrationRequest> {
    let request = RegistrationRequest::get(conn, id)?;
    actor.ensure_manages(&request.residence_id)?;

    if request.status != RequestStatus::Pending {
        return Err(AppError::conflict(format!("Request is already {}", request.status)));
    }
    Ok(request)
}

/// Approve: the applicant becomes an active resident and can sign in
pub fn approve_request(
    conn: &Connection,
    mailer: &dyn Mailer,
    actor: &Identity,
    id: &str,
    now: DateTime<Utc>,
) -> AppResult<Profile> {
    let mut request = pending_request(conn, actor, id)?;
    let residence = Residence::get(conn, &request.residence_id)?;

    let tx = conn.unchecked_transaction()?;

    let mut profile = Profile::new(&request.email, &request.full_name, Role::Resident, ProfileStatus::Active);
    profile.residence_id = Some(residence.id.clone());
    profile.apartment_number = Some(request.apartment_number.clone());
    profile.phone = request.phone.clone();
    profile.insert(&tx)?;

    request.status = RequestStatus::Approved;
    request.reviewed_by = Some(actor.id().to_string());
    request.reviewed_at = Some(now);
    request.save_review(&tx)?;

    record_event(
        &tx,
        "registration_approved",
        "registration_request",
        &request.id,
        serde_json::json!({ "profile_id": profile.id }),
        actor.id(),
    );
    tx.commit()?;

    deliver(
        conn,
        mailer,
        registration_decision_email(&profile.email, &profile.full_name, &residence.name, true, None),
    );

    Ok(profile)
}

pub fn reject_request(
    conn: &Connection,
    mailer: &dyn Mailer,
    actor: &Identity,
    id: &str,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> AppResult<RegistrationRequest> {
    let mut request = pending_request(conn, actor, id)?;
    let residence = Residence::get(conn, &request.residence_id)?;

    request.status = RequestStatus::Rejected;
    request.rejection_reason = clean_optional(reason);
    request.reviewed_by = Some(actor.id().to_string());
    request.reviewed_at = Some(now);
    request.save_review(conn)?;

    record_event(
        conn,
        "registration_rejected",
        "registration_request",
        &request.id,
        serde_json::json!({ "reason": request.rejection_reason }),
        actor.id(),
    );

    deliver(
        conn,
        mailer,
        registration_decision_email(
            &request.email,
            &request.full_name,
            &residence.name,
            false,
            request.rejection_reason.as_deref(),
        ),
    );

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::mailer::MemoryMailer;

    fn setup() -> (Connection, Residence, Identity) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let residence = Residence::new("Palmeraie", "Route de Fès", "Marrakech");
        residence.insert(&conn).unwrap();

        let mut syndic = Profile::new("s@example.ma", "Hassan", Role::Syndic, ProfileStatus::Active);
        syndic.residence_id = Some(residence.id.clone());
        syndic.insert(&conn).unwrap();

        (conn, residence, Identity { session_id: "s".to_string(), profile: syndic })
    }

    fn input(email: &str) -> RegistrationInput {
        RegistrationInput {
            email: email.to_string(),
            full_name: "Khadija".to_string(),
            phone: None,
            apartment_number: "12".to_string(),
        }
    }

    #[test]
    fn test_submit_and_approve() {
        let (conn, residence, syndic) = setup();
        let mailer = MemoryMailer::new();
        let now = Utc::now();

        let request = submit_request(&conn, &residence.id, input("k@example.ma"), now).unwrap();
        assert_eq!(request.status, RequestStatus::Pending);

        let pending = list_requests(&conn, &syndic, &residence.id, Some(RequestStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);

        let profile = approve_request(&conn, &mailer, &syndic, &request.id, now).unwrap();
        assert_eq!(profile.role, Role::Resident);
        assert_eq!(profile.apartment_number.as_deref(), Some("12"));
        assert_eq!(mailer.last_to("k@example.ma").unwrap().kind, "registration_decision");

        let reviewed = RegistrationRequest::get(&conn, &request.id).unwrap();
        assert_eq!(reviewed.status, RequestStatus::Approved);
        assert_eq!(reviewed.reviewed_by.as_deref(), Some(syndic.id()));

        let twice = approve_request(&conn, &mailer, &syndic, &request.id, now);
        assert!(matches!(twice, Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_duplicate_pending_request_is_conflict() {
        let (conn, residence, _) = setup();
        let now = Utc::now();

        submit_request(&conn, &residence.id, input("k@example.ma"), now).unwrap();
        let second = submit_request(&conn, &residence.id, input("K@example.ma"), now);
        assert!(matches!(second, Err(AppError::Conflict(_))));

        let existing = submit_request(&conn, &residence.id, input("s@example.ma"), now);
        assert!(matches!(existing, Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_reject_with_reason() {
        let (conn, residence, syndic) = setup();
        let mailer = MemoryMailer::new();
        let now = Utc::now();

        let request = submit_request(&conn, &residence.id, input("k@example.ma"), now).unwrap();
        let rejected = reject_request(&conn, &mailer, &syndic, &request.id, Some("Unknown apartment".to_string()), now).unwrap();

        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert!(mailer.last_to("k@example.ma").unwrap().body.contains("Unknown apartment"));

        // a rejected applicant may apply again
        assert!(submit_request(&conn, &residence.id, input("k@example.ma"), now).is_ok());
    }

    #[test]
    fn test_other_syndic_cannot_review() {
        let (conn, residence, mut other) = setup();
        other.profile.residence_id = Some("another".to_string());
        let now = Utc::now();

        let request = submit_request(&conn, &residence.id, input("k@example.ma"), now).unwrap();
        let result = approve_request(&conn, &MemoryMailer::new(), &other, &request.id, now);
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_unknown_residence() {
        let (conn, _, _) = setup();
        let result = submit_request(&conn, "missing", input("k@example.ma"), Utc::now());
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
