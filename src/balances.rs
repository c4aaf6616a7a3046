// ⚖️ Balances, residence summary and payment reminders

use crate::auth::Identity;
use crate::config::Config;
use crate::entities::{Fee, FeeStatus, Profile, Residence, Role};
use crate::error::AppResult;
use crate::mailer::{deliver, reminder_email, Mailer};
use crate::receipts::format_money;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResidentBalance {
    pub profile_id: String,
    pub billed_cents: i64,
    pub paid_cents: i64,
    pub outstanding_cents: i64,
    pub overdue_count: usize,
    pub overdue_cents: i64,
    /// Earliest due date among fees not yet paid
    pub next_due_date: Option<NaiveDate>,
}

impl ResidentBalance {
    fn from_fees(profile_id: &str, fees: &[Fee], today: NaiveDate) -> Self {
        let mut balance = ResidentBalance {
            profile_id: profile_id.to_string(),
            ..Default::default()
        };

        for fee in fees {
            balance.billed_cents += fee.amount_cents;
            balance.paid_cents += fee.paid_cents;
            balance.outstanding_cents += fee.remaining_cents();

            if fee.is_overdue(today) {
                balance.overdue_count += 1;
                balance.overdue_cents += fee.remaining_cents();
            }
            if fee.status != FeeStatus::Paid {
                balance.next_due_date = Some(match balance.next_due_date {
                    Some(current) => current.min(fee.due_date),
                    None => fee.due_date,
                });
            }
        }

        balance
    }
}

pub fn resident_balance(
    conn: &Connection,
    actor: &Identity,
    profile_id: &str,
    today: NaiveDate,
) -> AppResult<ResidentBalance> {
    let profile = Profile::get(conn, profile_id)?;
    actor.ensure_can_view(&profile)?;

    let fees = Fee::list_for_profile(conn, &profile.id)?;
    Ok(ResidentBalance::from_fees(&profile.id, &fees, today))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidenceSummary {
    pub residence_id: String,
    pub billed_cents: i64,
    pub collected_cents: i64,
    pub outstanding_cents: i64,
    pub expenses_cents: i64,
    /// collected - expenses
    pub cash_balance_cents: i64,
    pub expenses_by_category: Vec<CategoryTotal>,
    pub resident_count: i64,
    pub overdue_residents: i64,
}

pub fn residence_summary(
    conn: &Connection,
    actor: &Identity,
    residence_id: &str,
    today: NaiveDate,
) -> AppResult<ResidenceSummary> {
    actor.ensure_manages(residence_id)?;
    let residence = Residence::get(conn, residence_id)?;

    let (billed_cents, outstanding_cents): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(amount_cents), 0),
                COALESCE(SUM(MAX(amount_cents - paid_cents, 0)), 0)
         FROM fees WHERE residence_id = ?1",
        [&residence.id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let collected_cents: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount_cents), 0) FROM payments WHERE residence_id = ?1",
        [&residence.id],
        |row| row.get(0),
    )?;

    let expenses_by_category: Vec<CategoryTotal> = {
        let mut stmt = conn.prepare(
            "SELECT category, SUM(amount_cents) FROM expenses
             WHERE residence_id = ?1
             GROUP BY category
             ORDER BY SUM(amount_cents) DESC, category",
        )?;
        let rows = stmt
            .query_map([&residence.id], |row| {
                Ok(CategoryTotal { category: row.get(0)?, total_cents: row.get(1)? })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    let expenses_cents = expenses_by_category.iter().map(|c| c.total_cents).sum();

    let resident_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM profiles WHERE residence_id = ?1 AND role = 'resident' AND status = 'active'",
        [&residence.id],
        |row| row.get(0),
    )?;

    let overdue_residents: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT profile_id) FROM fees
         WHERE residence_id = ?1 AND status != 'paid' AND due_date < ?2",
        params![residence.id, today],
        |row| row.get(0),
    )?;

    Ok(ResidenceSummary {
        residence_id: residence.id,
        billed_cents,
        collected_cents,
        outstanding_cents,
        expenses_cents,
        cash_balance_cents: collected_cents - expenses_cents,
        expenses_by_category,
        resident_count,
        overdue_residents,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReminderReport {
    pub residents: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Overdue fees grouped by resident
fn overdue_fees(conn: &Connection, residence_id: Option<&str>, today: NaiveDate) -> AppResult<BTreeMap<String, Vec<Fee>>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM fees
         WHERE status != 'paid' AND due_date < ?1 AND (?2 IS NULL OR residence_id = ?2)
         ORDER BY due_date",
        crate::entities::fee::COLUMNS
    ))?;
    let fees = stmt
        .query_map(params![today, residence_id], Fee::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut grouped: BTreeMap<String, Vec<Fee>> = BTreeMap::new();
    for fee in fees {
        grouped.entry(fee.profile_id.clone()).or_default().push(fee);
    }
    Ok(grouped)
}

/// One reminder per resident with overdue fees. Delivery failures are
/// counted, never returned.
pub fn send_payment_reminders(
    conn: &Connection,
    mailer: &dyn Mailer,
    config: &Config,
    residence_id: Option<&str>,
    today: NaiveDate,
) -> AppResult<ReminderReport> {
    let mut report = ReminderReport::default();

    for (profile_id, fees) in overdue_fees(conn, residence_id, today)? {
        let Some(profile) = Profile::find(conn, &profile_id)? else {
            continue;
        };
        if !profile.is_active() || profile.role != Role::Resident {
            debug!(%profile_id, "skipping reminder for inactive profile");
            continue;
        }
        report.residents += 1;

        let lines: Vec<String> = fees
            .iter()
            .map(|fee| {
                format!(
                    "- {} (due {}): {}",
                    fee.title,
                    fee.due_date,
                    format_money(fee.remaining_cents(), &config.currency)
                )
            })
            .collect();
        let total: i64 = fees.iter().map(Fee::remaining_cents).sum();

        let email = reminder_email(
            &profile.email,
            &profile.full_name,
            &lines,
            &format_money(total, &config.currency),
        );
        if deliver(conn, mailer, email) {
            report.sent += 1;
        } else {
            report.failed += 1;
        }
    }

    info!(?report, %today, "payment reminders processed");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{new_id, setup_database};
    use crate::entities::{Expense, Payment, PaymentMethod, ProfileStatus};
    use crate::mailer::MemoryMailer;
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Setup {
        conn: Connection,
        residence: Residence,
        syndic: Identity,
        alice: Profile,
        bob: Profile,
    }

    fn member(conn: &Connection, residence: &Residence, email: &str, role: Role) -> Profile {
        let mut p = Profile::new(email, email, role, ProfileStatus::Active);
        p.residence_id = Some(residence.id.clone());
        p.insert(conn).unwrap();
        p
    }

    fn fee(conn: &Connection, profile: &Profile, amount: i64, paid: i64, due: NaiveDate) -> Fee {
        let fee = Fee {
            id: new_id(),
            residence_id: profile.residence_id.clone().unwrap(),
            profile_id: profile.id.clone(),
            contribution_id: None,
            title: format!("Fee due {due}"),
            amount_cents: amount,
            paid_cents: paid,
            due_date: due,
            period_start: None,
            period_end: None,
            status: FeeStatus::from_amounts(amount, paid),
            created_at: Utc::now(),
        };
        fee.insert(conn).unwrap();
        fee
    }

    fn setup() -> Setup {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let residence = Residence::new("Hay Riad", "Avenue Annakhil", "Rabat");
        residence.insert(&conn).unwrap();

        let syndic = member(&conn, &residence, "s@example.ma", Role::Syndic);
        let alice = member(&conn, &residence, "alice@example.ma", Role::Resident);
        let bob = member(&conn, &residence, "bob@example.ma", Role::Resident);

        Setup {
            conn,
            residence,
            syndic: Identity { session_id: "s".to_string(), profile: syndic },
            alice,
            bob,
        }
    }

    #[test]
    fn test_resident_balance() {
        let s = setup();
        fee(&s.conn, &s.alice, 10000, 10000, date(2024, 1, 1));
        fee(&s.conn, &s.alice, 10000, 4000, date(2024, 2, 1));
        fee(&s.conn, &s.alice, 10000, 0, date(2024, 3, 1));

        let balance = resident_balance(&s.conn, &s.syndic, &s.alice.id, date(2024, 2, 15)).unwrap();

        assert_eq!(balance.billed_cents, 30000);
        assert_eq!(balance.paid_cents, 14000);
        assert_eq!(balance.outstanding_cents, 16000);
        assert_eq!(balance.overdue_count, 1);
        assert_eq!(balance.overdue_cents, 6000);
        assert_eq!(balance.next_due_date, Some(date(2024, 2, 1)));
    }

    #[test]
    fn test_resident_cannot_see_neighbour_balance() {
        let s = setup();
        let alice = Identity { session_id: "a".to_string(), profile: s.alice.clone() };
        let result = resident_balance(&s.conn, &alice, &s.bob.id, date(2024, 1, 1));
        assert!(matches!(result, Err(crate::error::AppError::Forbidden(_))));
    }

    #[test]
    fn test_residence_summary() {
        let s = setup();
        let now = Utc::now();
        let f = fee(&s.conn, &s.alice, 20000, 15000, date(2024, 1, 1));
        fee(&s.conn, &s.bob, 20000, 0, date(2024, 1, 1));

        Payment {
            id: new_id(),
            fee_id: f.id.clone(),
            profile_id: s.alice.id.clone(),
            residence_id: s.residence.id.clone(),
            amount_cents: 15000,
            remaining_after_cents: 5000,
            method: PaymentMethod::Cash,
            receipt_number: "RCT-1".to_string(),
            note: None,
            paid_at: now,
            recorded_by: None,
            created_at: now,
        }
        .insert(&s.conn)
        .unwrap();

        for (category, amount) in [("Cleaning", 3000), ("Electricity", 5000), ("Cleaning", 3000)] {
            Expense {
                id: new_id(),
                residence_id: s.residence.id.clone(),
                category: category.to_string(),
                description: "Invoice".to_string(),
                amount_cents: amount,
                expense_date: date(2024, 1, 5),
                recorded_by: None,
                created_at: now,
            }
            .insert(&s.conn)
            .unwrap();
        }

        let summary = residence_summary(&s.conn, &s.syndic, &s.residence.id, date(2024, 2, 1)).unwrap();

        assert_eq!(summary.billed_cents, 40000);
        assert_eq!(summary.collected_cents, 15000);
        assert_eq!(summary.outstanding_cents, 25000);
        assert_eq!(summary.expenses_cents, 11000);
        assert_eq!(summary.cash_balance_cents, 4000);
        assert_eq!(
            summary.expenses_by_category,
            vec![
                CategoryTotal { category: "Cleaning".to_string(), total_cents: 6000 },
                CategoryTotal { category: "Electricity".to_string(), total_cents: 5000 },
            ]
        );
        assert_eq!(summary.resident_count, 2);
        assert_eq!(summary.overdue_residents, 2);
    }

    #[test]
    fn test_reminders_one_per_resident() {
        let s = setup();
        fee(&s.conn, &s.alice, 10000, 0, date(2024, 1, 1));
        fee(&s.conn, &s.alice, 12345, 0, date(2024, 2, 1));
        fee(&s.conn, &s.bob, 10000, 10000, date(2024, 1, 1));
        fee(&s.conn, &s.bob, 10000, 0, date(2024, 6, 1));

        let mailer = MemoryMailer::new();
        let report = send_payment_reminders(&s.conn, &mailer, &Config::default(), None, date(2024, 3, 1)).unwrap();

        assert_eq!(report, ReminderReport { residents: 1, sent: 1, failed: 0 });
        let email = mailer.last_to("alice@example.ma").unwrap();
        assert!(email.body.contains("Total due: 223.45 MAD"));
        assert!(mailer.last_to("bob@example.ma").is_none());
    }

    #[test]
    fn test_reminder_failures_are_counted() {
        let s = setup();
        fee(&s.conn, &s.alice, 10000, 0, date(2024, 1, 1));

        let report = send_payment_reminders(
            &s.conn,
            &MemoryMailer::failing(),
            &Config::default(),
            Some(&s.residence.id),
            date(2024, 3, 1),
        )
        .unwrap();
        assert_eq!(report, ReminderReport { residents: 1, sent: 0, failed: 1 });
    }
}
