// 💰 Fees & Contributions
//
// One-off fees are created by hand. Recurring fees come from contributions:
// generate_contribution_fees walks every period up to a date and inserts the
// missing fees. The unique (contribution, profile, period_start) key makes the
// walk idempotent, so it can run from cron as often as needed. Generated fees
// are never deleted: a deleted row would simply be generated again.

use crate::auth::Identity;
use crate::db::{new_id, record_event};
use crate::entities::{Contribution, Fee, FeeStatus, Frequency, Payment, Profile, Role};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ============================================================================
// ONE-OFF FEES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct FeeInput {
    pub title: String,
    pub amount_cents: i64,
    pub due_date: NaiveDate,
    /// Bill one resident; omitted means every active resident
    #[serde(default)]
    pub profile_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeeUpdate {
    pub title: Option<String>,
    pub amount_cents: Option<i64>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeeFilter {
    pub status: Option<FeeStatus>,
    pub profile_id: Option<String>,
    pub contribution_id: Option<String>,
    /// Only fees due before today that are not fully paid
    #[serde(default)]
    pub overdue: bool,
}

fn validate_title(title: &str) -> AppResult<String> {
    let title = title.trim();
    if title.is_empty() {
        Err(AppError::validation("title is required"))
    } else {
        Ok(title.to_string())
    }
}

fn validate_amount(amount_cents: i64) -> AppResult<i64> {
    if amount_cents > 0 {
        Ok(amount_cents)
    } else {
        Err(AppError::validation("amount_cents must be greater than zero"))
    }
}

fn active_residents(conn: &Connection, residence_id: &str) -> AppResult<Vec<Profile>> {
    Ok(Profile::list_for_residence(conn, residence_id, Role::Resident)?
        .into_iter()
        .filter(Profile::is_active)
        .collect())
}

pub fn create_fee(
    conn: &Connection,
    actor: &Identity,
    residence_id: &str,
    input: FeeInput,
    now: DateTime<Utc>,
) -> AppResult<Vec<Fee>> {
    actor.ensure_manages(residence_id)?;
    let title = validate_title(&input.title)?;
    let amount_cents = validate_amount(input.amount_cents)?;

    let targets = match input.profile_id.as_deref() {
        Some(profile_id) => {
            let profile = Profile::get(conn, profile_id)?;
            if profile.residence_id.as_deref() != Some(residence_id) || profile.role != Role::Resident {
                return Err(AppError::NotFound("Resident"));
            }
            vec![profile]
        }
        None => active_residents(conn, residence_id)?,
    };
    if targets.is_empty() {
        return Err(AppError::validation("The residence has no active residents to bill"));
    }

    let tx = conn.unchecked_transaction()?;
    let mut fees = Vec::with_capacity(targets.len());

    for profile in targets {
        let fee = Fee {
            id: new_id(),
            residence_id: residence_id.to_string(),
            profile_id: profile.id,
            contribution_id: None,
            title: title.clone(),
            amount_cents,
            paid_cents: 0,
            due_date: input.due_date,
            period_start: None,
            period_end: None,
            status: FeeStatus::Unpaid,
            created_at: now,
        };
        fee.insert(&tx)?;
        fees.push(fee);
    }

    record_event(
        &tx,
        "fees_created",
        "residence",
        residence_id,
        serde_json::json!({ "title": title, "amount_cents": amount_cents, "count": fees.len() }),
        actor.id(),
    );
    tx.commit()?;

    Ok(fees)
}

pub fn list_fees(
    conn: &Connection,
    residence_id: &str,
    filter: &FeeFilter,
    today: NaiveDate,
) -> AppResult<Vec<Fee>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM fees
         WHERE residence_id = ?1
           AND (?2 IS NULL OR status = ?2)
           AND (?3 IS NULL OR profile_id = ?3)
           AND (?4 IS NULL OR contribution_id = ?4)
         ORDER BY due_date DESC, title",
        crate::entities::fee::COLUMNS
    ))?;

    let fees = stmt
        .query_map(
            params![residence_id, filter.status, filter.profile_id, filter.contribution_id],
            Fee::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(fees
        .into_iter()
        .filter(|fee| !filter.overdue || fee.is_overdue(today))
        .collect())
}

/// Fees visible to the caller: the residence's for its syndic, own fees otherwise
pub fn list_fees_for(
    conn: &Connection,
    actor: &Identity,
    mut filter: FeeFilter,
    today: NaiveDate,
) -> AppResult<Vec<Fee>> {
    let residence_id = actor.residence_id()?.to_string();
    match actor.role() {
        Role::Syndic => {}
        Role::Resident => filter.profile_id = Some(actor.id().to_string()),
        _ => return Err(AppError::forbidden("You cannot view fees")),
    }
    list_fees(conn, &residence_id, &filter, today)
}

fn managed_fee(conn: &Connection, actor: &Identity, fee_id: &str) -> AppResult<Fee> {
    let fee = Fee::get(conn, fee_id)?;
    actor.ensure_manages(&fee.residence_id)?;
    Ok(fee)
}

pub fn update_fee(conn: &Connection, actor: &Identity, fee_id: &str, update: FeeUpdate) -> AppResult<Fee> {
    let mut fee = managed_fee(conn, actor, fee_id)?;

    if let Some(title) = update.title {
        fee.title = validate_title(&title)?;
    }
    if let Some(due_date) = update.due_date {
        fee.due_date = due_date;
    }
    if let Some(amount_cents) = update.amount_cents {
        let amount_cents = validate_amount(amount_cents)?;
        if amount_cents < fee.paid_cents {
            return Err(AppError::validation(
                "amount_cents cannot be lower than what has already been paid",
            ));
        }
        fee.amount_cents = amount_cents;
        fee.status = FeeStatus::from_amounts(fee.amount_cents, fee.paid_cents);
    }

    fee.save_amounts(conn)?;
    record_event(
        conn,
        "fee_updated",
        "fee",
        &fee.id,
        serde_json::json!({ "amount_cents": fee.amount_cents, "due_date": fee.due_date }),
        actor.id(),
    );
    Ok(fee)
}

pub fn delete_fee(conn: &Connection, actor: &Identity, fee_id: &str) -> AppResult<()> {
    let fee = managed_fee(conn, actor, fee_id)?;
    if fee.contribution_id.is_some() {
        return Err(AppError::conflict(
            "Generated fees cannot be deleted; adjust the amount or deactivate the contribution",
        ));
    }
    if Payment::count_for_fee(conn, &fee.id)? > 0 {
        return Err(AppError::conflict("Void the fee's payments before deleting it"));
    }

    conn.execute("DELETE FROM fees WHERE id = ?1", [&fee.id])?;
    record_event(conn, "fee_deleted", "fee", &fee.id, serde_json::json!({ "title": fee.title }), actor.id());
    Ok(())
}

// ============================================================================
// CONTRIBUTIONS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ContributionInput {
    pub title: String,
    pub amount_cents: i64,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContributionUpdate {
    pub title: Option<String>,
    pub amount_cents: Option<i64>,
    pub active: Option<bool>,
    /// `Some(None)` clears the end date
    #[serde(default, with = "double_option")]
    pub end_date: Option<Option<NaiveDate>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

fn validate_end_date(start: NaiveDate, end: Option<NaiveDate>) -> AppResult<()> {
    match end {
        Some(end) if end < start => Err(AppError::validation("end_date cannot be before start_date")),
        _ => Ok(()),
    }
}

pub fn create_contribution(
    conn: &Connection,
    actor: &Identity,
    residence_id: &str,
    input: ContributionInput,
    now: DateTime<Utc>,
) -> AppResult<Contribution> {
    actor.ensure_manages(residence_id)?;
    validate_end_date(input.start_date, input.end_date)?;

    let contribution = Contribution {
        id: new_id(),
        residence_id: residence_id.to_string(),
        title: validate_title(&input.title)?,
        amount_cents: validate_amount(input.amount_cents)?,
        frequency: input.frequency,
        start_date: input.start_date,
        end_date: input.end_date,
        active: true,
        created_by: Some(actor.id().to_string()),
        created_at: now,
    };
    contribution.insert(conn)?;

    record_event(
        conn,
        "contribution_created",
        "contribution",
        &contribution.id,
        serde_json::json!({ "amount_cents": contribution.amount_cents, "frequency": contribution.frequency }),
        actor.id(),
    );
    Ok(contribution)
}

pub fn list_contributions(conn: &Connection, actor: &Identity, residence_id: &str) -> AppResult<Vec<Contribution>> {
    if actor.profile.residence_id.as_deref() != Some(residence_id) {
        actor.ensure_manages(residence_id)?;
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM contributions WHERE residence_id = ?1 ORDER BY active DESC, start_date DESC",
        crate::entities::contribution::COLUMNS
    ))?;
    let contributions = stmt
        .query_map([residence_id], Contribution::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(contributions)
}

/// Changes only affect fees generated afterwards
pub fn update_contribution(
    conn: &Connection,
    actor: &Identity,
    id: &str,
    update: ContributionUpdate,
) -> AppResult<Contribution> {
    let mut contribution = Contribution::get(conn, id)?;
    actor.ensure_manages(&contribution.residence_id)?;

    if let Some(title) = update.title {
        contribution.title = validate_title(&title)?;
    }
    if let Some(amount_cents) = update.amount_cents {
        contribution.amount_cents = validate_amount(amount_cents)?;
    }
    if let Some(active) = update.active {
        contribution.active = active;
    }
    if let Some(end_date) = update.end_date {
        validate_end_date(contribution.start_date, end_date)?;
        contribution.end_date = end_date;
    }

    contribution.save(conn)?;
    record_event(conn, "contribution_updated", "contribution", &contribution.id, serde_json::json!({}), actor.id());
    Ok(contribution)
}

/// Generated fees survive, detached from the plan
pub fn delete_contribution(conn: &Connection, actor: &Identity, id: &str) -> AppResult<()> {
    let contribution = Contribution::get(conn, id)?;
    actor.ensure_manages(&contribution.residence_id)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute("UPDATE fees SET contribution_id = NULL WHERE contribution_id = ?1", [id])?;
    tx.execute("DELETE FROM contributions WHERE id = ?1", [id])?;
    tx.commit()?;

    record_event(conn, "contribution_deleted", "contribution", id, serde_json::json!({}), actor.id());
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationReport {
    pub contributions: usize,
    pub fees_created: usize,
}

/// Create every missing fee for active contributions up to `as_of`.
/// `residence_id = None` processes all residences.
pub fn generate_contribution_fees(
    conn: &Connection,
    residence_id: Option<&str>,
    as_of: NaiveDate,
    now: DateTime<Utc>,
) -> AppResult<GenerationReport> {
    let contributions: Vec<Contribution> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM contributions
             WHERE active = 1 AND (?1 IS NULL OR residence_id = ?1)
             ORDER BY residence_id, start_date",
            crate::entities::contribution::COLUMNS
        ))?;
        let rows = stmt
            .query_map([residence_id], Contribution::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let mut report = GenerationReport::default();

    for contribution in &contributions {
        let periods = contribution.periods_until(as_of);
        if periods.is_empty() {
            continue;
        }
        report.contributions += 1;

        let residents = active_residents(conn, &contribution.residence_id)?;
        let mut created = 0;

        for period in &periods {
            // Nobody is billed for a period that ended before they joined
            for resident in residents.iter().filter(|r| r.created_at.date_naive() <= period.end) {
                let fee = Fee {
                    id: new_id(),
                    residence_id: contribution.residence_id.clone(),
                    profile_id: resident.id.clone(),
                    contribution_id: Some(contribution.id.clone()),
                    title: format!("{} ({})", contribution.title, period.start.format("%Y-%m")),
                    amount_cents: contribution.amount_cents,
                    paid_cents: 0,
                    due_date: period.start,
                    period_start: Some(period.start),
                    period_end: Some(period.end),
                    status: FeeStatus::Unpaid,
                    created_at: now,
                };
                if fee.insert_generated(conn)? {
                    created += 1;
                }
            }
        }

        if created > 0 {
            record_event(
                conn,
                "contribution_fees_generated",
                "contribution",
                &contribution.id,
                serde_json::json!({ "fees_created": created, "as_of": as_of }),
                "system",
            );
        }
        debug!(contribution_id = %contribution.id, created, "contribution processed");
        report.fees_created += created;
    }

    info!(?report, %as_of, "contribution fee generation finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::entities::{ProfileStatus, Residence};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn joined(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        date(y, m, d).and_hms_opt(9, 0, 0).unwrap().and_utc()
    }

    struct Setup {
        conn: Connection,
        residence: Residence,
        syndic: Identity,
        residents: Vec<Profile>,
    }

    fn setup() -> Setup {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let residence = Residence::new("Anfa", "1 Bd Anfa", "Casablanca");
        residence.insert(&conn).unwrap();

        let mut syndic = Profile::new("s@example.ma", "Syndic", Role::Syndic, ProfileStatus::Active);
        syndic.residence_id = Some(residence.id.clone());
        syndic.insert(&conn).unwrap();

        let residents = ["a", "b"]
            .iter()
            .map(|name| {
                let mut p = Profile::new(&format!("{name}@example.ma"), name, Role::Resident, ProfileStatus::Active);
                p.residence_id = Some(residence.id.clone());
                p.apartment_number = Some(name.to_uppercase());
                p.created_at = joined(2020, 1, 1);
                p.insert(&conn).unwrap();
                p
            })
            .collect();

        Setup {
            conn,
            residence,
            syndic: Identity { session_id: "s".to_string(), profile: syndic },
            residents,
        }
    }

    fn monthly(title: &str, start: NaiveDate) -> ContributionInput {
        ContributionInput {
            title: title.to_string(),
            amount_cents: 25000,
            frequency: Frequency::Monthly,
            start_date: start,
            end_date: None,
        }
    }

    #[test]
    fn test_create_fee_for_everyone_and_for_one() {
        let s = setup();
        let now = Utc::now();

        let all = create_fee(
            &s.conn,
            &s.syndic,
            &s.residence.id,
            FeeInput { title: "Painting".to_string(), amount_cents: 50000, due_date: date(2024, 6, 1), profile_id: None },
            now,
        )
        .unwrap();
        assert_eq!(all.len(), 2);

        let one = create_fee(
            &s.conn,
            &s.syndic,
            &s.residence.id,
            FeeInput { title: "Key copy".to_string(), amount_cents: 3000, due_date: date(2024, 6, 1), profile_id: Some(s.residents[0].id.clone()) },
            now,
        )
        .unwrap();
        assert_eq!(one.len(), 1);

        let filter = FeeFilter { profile_id: Some(s.residents[0].id.clone()), ..Default::default() };
        assert_eq!(list_fees(&s.conn, &s.residence.id, &filter, date(2024, 6, 1)).unwrap().len(), 2);
    }

    #[test]
    fn test_create_fee_validates_amount() {
        let s = setup();
        let result = create_fee(
            &s.conn,
            &s.syndic,
            &s.residence.id,
            FeeInput { title: "Zero".to_string(), amount_cents: 0, due_date: date(2024, 6, 1), profile_id: None },
            Utc::now(),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_generation_is_idempotent() {
        let s = setup();
        let now = Utc::now();
        create_contribution(&s.conn, &s.syndic, &s.residence.id, monthly("Charges", date(2024, 1, 1)), now).unwrap();

        let first = generate_contribution_fees(&s.conn, None, date(2024, 3, 10), now).unwrap();
        assert_eq!(first, GenerationReport { contributions: 1, fees_created: 6 });

        let second = generate_contribution_fees(&s.conn, Some(&s.residence.id), date(2024, 3, 31), now).unwrap();
        assert_eq!(second.fees_created, 0);

        let rollover = generate_contribution_fees(&s.conn, None, date(2024, 4, 1), now).unwrap();
        assert_eq!(rollover.fees_created, 2);

        let fees = list_fees(&s.conn, &s.residence.id, &FeeFilter::default(), date(2024, 4, 1)).unwrap();
        let april = fees.iter().find(|f| f.period_start == Some(date(2024, 4, 1))).unwrap();
        assert_eq!(april.period_end, Some(date(2024, 4, 30)));
        assert_eq!(april.due_date, date(2024, 4, 1));
        assert_eq!(april.title, "Charges (2024-04)");
    }

    #[test]
    fn test_inactive_contribution_is_skipped() {
        let s = setup();
        let now = Utc::now();
        let c = create_contribution(&s.conn, &s.syndic, &s.residence.id, monthly("Charges", date(2024, 1, 1)), now).unwrap();
        update_contribution(&s.conn, &s.syndic, &c.id, ContributionUpdate { active: Some(false), ..Default::default() }).unwrap();

        let report = generate_contribution_fees(&s.conn, None, date(2024, 6, 1), now).unwrap();
        assert_eq!(report.fees_created, 0);
    }

    #[test]
    fn test_end_date_validation() {
        let s = setup();
        let mut input = monthly("Charges", date(2024, 5, 1));
        input.end_date = Some(date(2024, 4, 1));

        let result = create_contribution(&s.conn, &s.syndic, &s.residence.id, input, Utc::now());
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_overdue_filter_and_resident_view() {
        let s = setup();
        let now = Utc::now();
        create_contribution(&s.conn, &s.syndic, &s.residence.id, monthly("Charges", date(2024, 1, 1)), now).unwrap();
        generate_contribution_fees(&s.conn, None, date(2024, 2, 1), now).unwrap();

        let overdue = FeeFilter { overdue: true, ..Default::default() };
        assert_eq!(list_fees(&s.conn, &s.residence.id, &overdue, date(2024, 1, 15)).unwrap().len(), 2);

        let resident = Identity { session_id: "r".to_string(), profile: s.residents[1].clone() };
        let own = list_fees_for(&s.conn, &resident, FeeFilter::default(), date(2024, 2, 1)).unwrap();
        assert_eq!(own.len(), 2);
        assert!(own.iter().all(|f| f.profile_id == s.residents[1].id));
    }

    #[test]
    fn test_update_fee_cannot_undercut_payments() {
        let s = setup();
        let now = Utc::now();
        let fees = create_fee(
            &s.conn,
            &s.syndic,
            &s.residence.id,
            FeeInput { title: "Roof".to_string(), amount_cents: 10000, due_date: date(2024, 6, 1), profile_id: Some(s.residents[0].id.clone()) },
            now,
        )
        .unwrap();

        let mut fee = fees[0].clone();
        fee.apply_payment(6000);
        fee.save_amounts(&s.conn).unwrap();

        let result = update_fee(&s.conn, &s.syndic, &fee.id, FeeUpdate { amount_cents: Some(5000), ..Default::default() });
        assert!(matches!(result, Err(AppError::Validation(_))));

        let updated = update_fee(&s.conn, &s.syndic, &fee.id, FeeUpdate { amount_cents: Some(6000), ..Default::default() }).unwrap();
        assert_eq!(updated.status, FeeStatus::Paid);
    }

    #[test]
    fn test_delete_contribution_keeps_fees() {
        let s = setup();
        let now = Utc::now();
        let c = create_contribution(&s.conn, &s.syndic, &s.residence.id, monthly("Charges", date(2024, 1, 1)), now).unwrap();
        generate_contribution_fees(&s.conn, None, date(2024, 1, 1), now).unwrap();

        delete_contribution(&s.conn, &s.syndic, &c.id).unwrap();

        let fees = list_fees(&s.conn, &s.residence.id, &FeeFilter::default(), date(2024, 1, 1)).unwrap();
        assert_eq!(fees.len(), 2);
        assert!(fees.iter().all(|f| f.contribution_id.is_none()));
    }

    #[test]
    fn test_generated_fee_cannot_be_deleted() {
        let s = setup();
        let now = Utc::now();
        create_contribution(&s.conn, &s.syndic, &s.residence.id, monthly("Charges", date(2025, 1, 1)), now).unwrap();
        generate_contribution_fees(&s.conn, None, date(2025, 1, 15), now).unwrap();

        let fees = list_fees(&s.conn, &s.residence.id, &FeeFilter::default(), date(2025, 1, 15)).unwrap();
        let result = delete_fee(&s.conn, &s.syndic, &fees[0].id);
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let again = generate_contribution_fees(&s.conn, None, date(2025, 1, 15), now).unwrap();
        assert_eq!(again.fees_created, 0);
        assert_eq!(list_fees(&s.conn, &s.residence.id, &FeeFilter::default(), date(2025, 1, 15)).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_one_off_fee() {
        let s = setup();
        let fees = create_fee(
            &s.conn,
            &s.syndic,
            &s.residence.id,
            FeeInput { title: "Badge".to_string(), amount_cents: 2000, due_date: date(2025, 3, 1), profile_id: Some(s.residents[0].id.clone()) },
            Utc::now(),
        )
        .unwrap();

        delete_fee(&s.conn, &s.syndic, &fees[0].id).unwrap();
        assert!(Fee::find(&s.conn, &fees[0].id).unwrap().is_none());
    }

    #[test]
    fn test_late_joiner_only_billed_from_joining() {
        let s = setup();
        let now = Utc::now();

        let mut late = Profile::new("late@example.ma", "Late", Role::Resident, ProfileStatus::Active);
        late.residence_id = Some(s.residence.id.clone());
        late.apartment_number = Some("C".to_string());
        late.created_at = joined(2025, 3, 20);
        late.insert(&s.conn).unwrap();

        create_contribution(&s.conn, &s.syndic, &s.residence.id, monthly("Charges", date(2025, 1, 1)), now).unwrap();
        let report = generate_contribution_fees(&s.conn, None, date(2025, 5, 10), now).unwrap();
        assert_eq!(report.fees_created, 5 * 2 + 3);

        let filter = FeeFilter { profile_id: Some(late.id.clone()), ..Default::default() };
        let mut starts: Vec<NaiveDate> = list_fees(&s.conn, &s.residence.id, &filter, date(2025, 5, 10))
            .unwrap()
            .into_iter()
            .filter_map(|f| f.period_start)
            .collect();
        starts.sort();
        assert_eq!(starts, vec![date(2025, 3, 1), date(2025, 4, 1), date(2025, 5, 1)]);
    }

    #[test]
    fn test_one_off_insert_never_silently_ignored() {
        let s = setup();
        let fees = create_fee(
            &s.conn,
            &s.syndic,
            &s.residence.id,
            FeeInput { title: "Parking".to_string(), amount_cents: 5000, due_date: date(2025, 3, 1), profile_id: Some(s.residents[0].id.clone()) },
            Utc::now(),
        )
        .unwrap();

        assert!(fees[0].insert(&s.conn).is_err());
        assert!(!fees[0].insert_generated(&s.conn).unwrap());
    }

    #[test]
    fn test_double_option_end_date() {
        let cleared: ContributionUpdate = serde_json::from_str(r#"{"end_date": null}"#).unwrap();
        assert_eq!(cleared.end_date, Some(None));

        let untouched: ContributionUpdate = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(untouched.end_date, None);
    }
}
