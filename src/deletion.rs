// 🧹 Cascading deletion
//
// Foreign keys never cascade, so rows are torn down child-first. Each public
// entry point runs inside one transaction: either everything goes or nothing.

use crate::entities::{Profile, Residence, Role};
use crate::error::{AppError, AppResult};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeletionReport {
    pub profiles: usize,
    pub sessions: usize,
    pub fees: usize,
    pub payments: usize,
}

/// Delete one profile and everything that belongs to it
pub fn delete_profile(conn: &Connection, profile_id: &str) -> AppResult<DeletionReport> {
    let profile = Profile::get(conn, profile_id)?;
    if profile.role == Role::Admin {
        return Err(AppError::forbidden("Admin accounts cannot be deleted"));
    }

    let tx = conn.unchecked_transaction()?;
    let mut report = DeletionReport::default();
    teardown_profile(&tx, &profile, &mut report)?;
    tx.commit()?;

    info!(profile_id, ?report, "profile deleted");
    Ok(report)
}

/// Delete a residence, its people, and all of its financial history
pub fn delete_residence(conn: &Connection, residence_id: &str) -> AppResult<DeletionReport> {
    let residence = Residence::get(conn, residence_id)?;

    let tx = conn.unchecked_transaction()?;
    let mut report = DeletionReport::default();

    Residence::set_syndic(&tx, &residence.id, None)?;

    let members: Vec<Profile> = {
        let mut stmt = tx.prepare(&format!(
            "SELECT {} FROM profiles WHERE residence_id = ?1",
            crate::entities::profile::COLUMNS
        ))?;
        let rows = stmt
            .query_map([&residence.id], Profile::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    for member in &members {
        teardown_profile(&tx, member, &mut report)?;
    }

    report.payments += tx.execute("DELETE FROM payments WHERE residence_id = ?1", [&residence.id])?;
    report.fees += tx.execute("DELETE FROM fees WHERE residence_id = ?1", [&residence.id])?;
    for table in [
        "contributions",
        "expenses",
        "registration_requests",
        "onboarding_codes",
    ] {
        tx.execute(
            &format!("DELETE FROM {table} WHERE residence_id = ?1"),
            [&residence.id],
        )?;
    }
    tx.execute("DELETE FROM residences WHERE id = ?1", [&residence.id])?;

    tx.commit()?;

    info!(residence_id, ?report, "residence deleted");
    Ok(report)
}

fn teardown_profile(
    conn: &Connection,
    profile: &Profile,
    report: &mut DeletionReport,
) -> AppResult<()> {
    let id = profile.id.as_str();

    report.sessions += conn.execute("DELETE FROM sessions WHERE profile_id = ?1", [id])?;
    conn.execute("DELETE FROM otp_codes WHERE email = ?1", [&profile.email])?;

    report.payments += conn.execute(
        "DELETE FROM payments
         WHERE profile_id = ?1 OR fee_id IN (SELECT id FROM fees WHERE profile_id = ?1)",
        [id],
    )?;
    report.fees += conn.execute("DELETE FROM fees WHERE profile_id = ?1", [id])?;

    // Rows that merely remember who acted keep existing without the link
    for (table, column) in [
        ("payments", "recorded_by"),
        ("expenses", "recorded_by"),
        ("contributions", "created_by"),
        ("onboarding_codes", "created_by"),
        ("registration_requests", "reviewed_by"),
        ("residences", "syndic_id"),
    ] {
        conn.execute(
            &format!("UPDATE {table} SET {column} = NULL WHERE {column} = ?1"),
            params![id],
        )?;
    }

    report.profiles += conn.execute("DELETE FROM profiles WHERE id = ?1", [id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{create_session, request_otp, Client};
    use crate::config::Config;
    use crate::db::{count_rows, setup_database};
    use crate::entities::{
        Contribution, Expense, Fee, FeeStatus, Frequency, OnboardingCode, OnboardingPurpose, Payment,
        PaymentMethod, ProfileStatus, RegistrationRequest, RequestStatus,
    };
    use crate::mailer::MemoryMailer;
    use chrono::{Duration, NaiveDate, Utc};

    struct World {
        conn: Connection,
        residence: Residence,
        syndic: Profile,
        resident: Profile,
    }

    fn world() -> World {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let residence = Residence::new("Riad", "3 Derb", "Marrakech");
        residence.insert(&conn).unwrap();

        let mut syndic = Profile::new("s@example.ma", "Syndic", Role::Syndic, ProfileStatus::Active);
        syndic.residence_id = Some(residence.id.clone());
        syndic.insert(&conn).unwrap();
        Residence::set_syndic(&conn, &residence.id, Some(&syndic.id)).unwrap();

        let mut resident = Profile::new("r@example.ma", "Resident", Role::Resident, ProfileStatus::Active);
        resident.residence_id = Some(residence.id.clone());
        resident.apartment_number = Some("3".to_string());
        resident.insert(&conn).unwrap();

        let now = Utc::now();
        create_session(&conn, &Config::default(), &resident.id, Client::Web, now).unwrap();

        let fee = Fee {
            id: "fee_1".to_string(),
            residence_id: residence.id.clone(),
            profile_id: resident.id.clone(),
            contribution_id: None,
            title: "Syndic fee".to_string(),
            amount_cents: 10000,
            paid_cents: 5000,
            due_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            period_start: None,
            period_end: None,
            status: FeeStatus::Partial,
            created_at: now,
        };
        fee.insert(&conn).unwrap();

        Payment {
            id: "pay_1".to_string(),
            fee_id: fee.id.clone(),
            profile_id: resident.id.clone(),
            residence_id: residence.id.clone(),
            amount_cents: 5000,
            remaining_after_cents: 5000,
            method: PaymentMethod::Cash,
            receipt_number: "RCT-1".to_string(),
            note: None,
            paid_at: now,
            recorded_by: Some(syndic.id.clone()),
            created_at: now,
        }
        .insert(&conn)
        .unwrap();

        Expense {
            id: "exp_1".to_string(),
            residence_id: residence.id.clone(),
            category: "Cleaning".to_string(),
            description: "Stairs".to_string(),
            amount_cents: 2000,
            expense_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            recorded_by: Some(syndic.id.clone()),
            created_at: now,
        }
        .insert(&conn)
        .unwrap();

        Contribution {
            id: "contrib_1".to_string(),
            residence_id: residence.id.clone(),
            title: "Charges".to_string(),
            amount_cents: 20000,
            frequency: Frequency::Monthly,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: None,
            active: true,
            created_by: Some(syndic.id.clone()),
            created_at: now,
        }
        .insert(&conn)
        .unwrap();

        RegistrationRequest {
            id: "req_1".to_string(),
            residence_id: residence.id.clone(),
            email: "applicant@example.ma".to_string(),
            full_name: "Applicant".to_string(),
            phone: None,
            apartment_number: "7".to_string(),
            status: RequestStatus::Pending,
            rejection_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
        }
        .insert(&conn)
        .unwrap();

        OnboardingCode {
            id: "code_1".to_string(),
            residence_id: residence.id.clone(),
            email: "guard@example.ma".to_string(),
            full_name: "Guard".to_string(),
            apartment_number: None,
            phone: None,
            purpose: OnboardingPurpose::Guard,
            created_by: Some(syndic.id.clone()),
            expires_at: now + Duration::hours(72),
            consumed_at: None,
            created_at: now,
        }
        .insert(&conn, "hash_1")
        .unwrap();

        request_otp(&conn, &MemoryMailer::new(), &Config::default(), &resident.email, now).unwrap();

        World { conn, residence, syndic, resident }
    }

    #[test]
    fn test_delete_resident_removes_financial_rows() {
        let w = world();

        let report = delete_profile(&w.conn, &w.resident.id).unwrap();

        assert_eq!(
            report,
            DeletionReport { profiles: 1, sessions: 1, fees: 1, payments: 1 }
        );
        assert_eq!(count_rows(&w.conn, "fees").unwrap(), 0);
        assert_eq!(count_rows(&w.conn, "otp_codes").unwrap(), 0);
        assert_eq!(count_rows(&w.conn, "profiles").unwrap(), 1);
    }

    #[test]
    fn test_delete_syndic_unlinks_history() {
        let w = world();

        delete_profile(&w.conn, &w.syndic.id).unwrap();

        let residence = Residence::get(&w.conn, &w.residence.id).unwrap();
        assert!(residence.syndic_id.is_none());

        let recorded_by: Option<String> = w
            .conn
            .query_row("SELECT recorded_by FROM expenses WHERE id = 'exp_1'", [], |row| row.get(0))
            .unwrap();
        assert!(recorded_by.is_none());
        assert_eq!(count_rows(&w.conn, "payments").unwrap(), 1);
    }

    #[test]
    fn test_delete_residence_leaves_nothing_behind() {
        let w = world();

        let report = delete_residence(&w.conn, &w.residence.id).unwrap();
        assert_eq!(report.profiles, 2);

        for table in [
            "residences",
            "profiles",
            "sessions",
            "otp_codes",
            "fees",
            "payments",
            "contributions",
            "expenses",
            "registration_requests",
            "onboarding_codes",
        ] {
            assert_eq!(count_rows(&w.conn, table).unwrap(), 0, "{table} should be empty");
        }
    }

    #[test]
    fn test_admin_cannot_be_deleted() {
        let w = world();
        let admin = Profile::new("root@sakan.ma", "Root", Role::Admin, ProfileStatus::Active);
        admin.insert(&w.conn).unwrap();

        assert!(matches!(delete_profile(&w.conn, &admin.id), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn test_missing_profile_is_not_found() {
        let w = world();
        assert!(matches!(delete_profile(&w.conn, "nope"), Err(AppError::NotFound(_))));
    }
}
