// 💳 Payments - money received against fees
//
// A payment and the fee's new paid amount are written in one transaction.
// The receipt e-mail goes out afterwards and may fail without undoing
// anything.

use crate::auth::Identity;
use crate::config::Config;
use crate::db::{new_id, record_event};
use crate::entities::payment::receipt_number;
use crate::entities::{Fee, FeeStatus, Payment, PaymentMethod, Profile, Role};
use crate::error::{AppError, AppResult};
use crate::mailer::{deliver, receipt_email, Mailer};
use crate::entities::profile::clean_optional;
use crate::receipts::Receipt;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentInput {
    pub amount_cents: i64,
    pub method: PaymentMethod,
    #[serde(default)]
    pub note: Option<String>,
    /// Defaults to now; lets a syndic back-date a cash payment
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedPayment {
    pub payment: Payment,
    pub fee: Fee,
    pub receipt_sent: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentFilter {
    pub profile_id: Option<String>,
    pub fee_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub fn record_payment(
    conn: &Connection,
    mailer: &dyn Mailer,
    config: &Config,
    actor: &Identity,
    fee_id: &str,
    input: PaymentInput,
    now: DateTime<Utc>,
) -> AppResult<RecordedPayment> {
    let mut fee = Fee::get(conn, fee_id)?;
    actor.ensure_manages(&fee.residence_id)?;

    if fee.status == FeeStatus::Paid {
        return Err(AppError::conflict("This fee is already fully paid"));
    }
    if input.amount_cents <= 0 {
        return Err(AppError::validation("amount_cents must be greater than zero"));
    }
    if input.amount_cents > fee.remaining_cents() {
        return Err(AppError::validation(format!(
            "amount_cents exceeds the remaining {} cents",
            fee.remaining_cents()
        )));
    }

    let paid_at = input.paid_at.unwrap_or(now);
    let payment = Payment {
        id: new_id(),
        fee_id: fee.id.clone(),
        profile_id: fee.profile_id.clone(),
        residence_id: fee.residence_id.clone(),
        amount_cents: input.amount_cents,
        remaining_after_cents: fee.remaining_cents() - input.amount_cents,
        method: input.method,
        receipt_number: receipt_number(paid_at),
        note: clean_optional(input.note),
        paid_at,
        recorded_by: Some(actor.id().to_string()),
        created_at: now,
    };

    let tx = conn.unchecked_transaction()?;
    payment.insert(&tx)?;
    fee.apply_payment(payment.amount_cents);
    fee.save_amounts(&tx)?;
    record_event(
        &tx,
        "payment_recorded",
        "fee",
        &fee.id,
        serde_json::json!({
            "payment_id": payment.id,
            "amount_cents": payment.amount_cents,
            "method": payment.method,
            "receipt_number": payment.receipt_number,
        }),
        actor.id(),
    );
    tx.commit()?;

    info!(fee_id = %fee.id, amount_cents = payment.amount_cents, status = %fee.status, "payment recorded");

    let receipt = Receipt::load(conn, &payment, &config.currency)
        .and_then(|receipt| Ok((receipt, Profile::get(conn, &payment.profile_id)?)));
    let receipt_sent = match receipt {
        Ok((receipt, resident)) => deliver(
            conn,
            mailer,
            receipt_email(&resident.email, &payment.receipt_number, receipt.render()),
        ),
        Err(e) => {
            warn!(payment_id = %payment.id, error = %e, "could not build receipt");
            false
        }
    };

    Ok(RecordedPayment { payment, fee, receipt_sent })
}

/// Undo a payment: the fee goes back to partial or unpaid
pub fn void_payment(conn: &Connection, actor: &Identity, payment_id: &str) -> AppResult<Fee> {
    let payment = Payment::get(conn, payment_id)?;
    actor.ensure_manages(&payment.residence_id)?;
    let mut fee = Fee::get(conn, &payment.fee_id)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM payments WHERE id = ?1", [&payment.id])?;
    fee.apply_payment(-payment.amount_cents);
    fee.save_amounts(&tx)?;
    record_event(
        &tx,
        "payment_voided",
        "fee",
        &fee.id,
        serde_json::json!({
            "payment_id": payment.id,
            "amount_cents": payment.amount_cents,
            "receipt_number": payment.receipt_number,
        }),
        actor.id(),
    );
    tx.commit()?;

    info!(fee_id = %fee.id, payment_id, "payment voided");
    Ok(fee)
}

pub fn list_payments(conn: &Connection, actor: &Identity, mut filter: PaymentFilter) -> AppResult<Vec<Payment>> {
    let residence_id = actor.residence_id()?.to_string();
    match actor.role() {
        Role::Syndic => {}
        Role::Resident => filter.profile_id = Some(actor.id().to_string()),
        _ => return Err(AppError::forbidden("You cannot view payments")),
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM payments
         WHERE residence_id = ?1
           AND (?2 IS NULL OR profile_id = ?2)
           AND (?3 IS NULL OR fee_id = ?3)
           AND (?4 IS NULL OR date(paid_at) >= ?4)
           AND (?5 IS NULL OR date(paid_at) <= ?5)
         ORDER BY paid_at DESC",
        crate::entities::payment::COLUMNS
    ))?;
    let payments = stmt
        .query_map(
            params![residence_id, filter.profile_id, filter.fee_id, filter.from, filter.to],
            Payment::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(payments)
}

/// The payer or whoever manages the residence
pub fn get_payment(conn: &Connection, actor: &Identity, payment_id: &str) -> AppResult<Payment> {
    let payment = Payment::get(conn, payment_id)?;
    if payment.profile_id != actor.id() {
        actor.ensure_manages(&payment.residence_id)?;
    }
    Ok(payment)
}

pub fn payment_receipt(conn: &Connection, config: &Config, actor: &Identity, payment_id: &str) -> AppResult<Receipt> {
    let payment = get_payment(conn, actor, payment_id)?;
    Receipt::load(conn, &payment, &config.currency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, setup_database};
    use crate::entities::{ProfileStatus, Residence};
    use crate::mailer::MemoryMailer;

    struct Setup {
        conn: Connection,
        syndic: Identity,
        resident: Profile,
        fee: Fee,
    }

    fn setup() -> Setup {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let residence = Residence::new("Atlas", "5 Av Hassan II", "Agadir");
        residence.insert(&conn).unwrap();

        let mut syndic = Profile::new("s@example.ma", "Syndic", Role::Syndic, ProfileStatus::Active);
        syndic.residence_id = Some(residence.id.clone());
        syndic.insert(&conn).unwrap();

        let mut resident = Profile::new("r@example.ma", "Nadia", Role::Resident, ProfileStatus::Active);
        resident.residence_id = Some(residence.id.clone());
        resident.apartment_number = Some("7".to_string());
        resident.insert(&conn).unwrap();

        let fee = Fee {
            id: new_id(),
            residence_id: residence.id.clone(),
            profile_id: resident.id.clone(),
            contribution_id: None,
            title: "Charges".to_string(),
            amount_cents: 30000,
            paid_cents: 0,
            due_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            period_start: None,
            period_end: None,
            status: FeeStatus::Unpaid,
            created_at: Utc::now(),
        };
        fee.insert(&conn).unwrap();

        Setup {
            conn,
            syndic: Identity { session_id: "s".to_string(), profile: syndic },
            resident,
            fee,
        }
    }

    fn cash(amount_cents: i64) -> PaymentInput {
        PaymentInput { amount_cents, method: PaymentMethod::Cash, note: None, paid_at: None }
    }

    #[test]
    fn test_partial_then_full_payment() {
        let s = setup();
        let mailer = MemoryMailer::new();
        let config = Config::default();

        let first = record_payment(&s.conn, &mailer, &config, &s.syndic, &s.fee.id, cash(10000), Utc::now()).unwrap();
        assert_eq!(first.fee.status, FeeStatus::Partial);
        assert!(first.receipt_sent);
        assert!(mailer.last_to("r@example.ma").unwrap().body.contains("100.00 MAD"));

        let second = record_payment(&s.conn, &mailer, &config, &s.syndic, &s.fee.id, cash(20000), Utc::now()).unwrap();
        assert_eq!(second.fee.status, FeeStatus::Paid);
        assert_eq!(Fee::get(&s.conn, &s.fee.id).unwrap().paid_cents, 30000);

        let again = record_payment(&s.conn, &mailer, &config, &s.syndic, &s.fee.id, cash(1), Utc::now());
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_amount_bounds() {
        let s = setup();
        let mailer = MemoryMailer::new();
        let config = Config::default();

        for amount in [0, -5, 30001] {
            let result = record_payment(&s.conn, &mailer, &config, &s.syndic, &s.fee.id, cash(amount), Utc::now());
            assert!(matches!(result, Err(AppError::Validation(_))), "amount {amount}");
        }
        assert_eq!(count_rows(&s.conn, "payments").unwrap(), 0);
    }

    #[test]
    fn test_email_failure_does_not_fail_payment() {
        let s = setup();
        let mailer = MemoryMailer::failing();

        let recorded = record_payment(&s.conn, &mailer, &Config::default(), &s.syndic, &s.fee.id, cash(30000), Utc::now()).unwrap();

        assert!(!recorded.receipt_sent);
        assert_eq!(recorded.fee.status, FeeStatus::Paid);
        assert_eq!(count_rows(&s.conn, "payments").unwrap(), 1);

        let status: String = s
            .conn
            .query_row("SELECT status FROM email_outbox WHERE kind = 'receipt'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(status, "failed");
    }

    #[test]
    fn test_void_reverts_status() {
        let s = setup();
        let mailer = MemoryMailer::new();
        let config = Config::default();

        record_payment(&s.conn, &mailer, &config, &s.syndic, &s.fee.id, cash(10000), Utc::now()).unwrap();
        let full = record_payment(&s.conn, &mailer, &config, &s.syndic, &s.fee.id, cash(20000), Utc::now()).unwrap();

        let fee = void_payment(&s.conn, &s.syndic, &full.payment.id).unwrap();
        assert_eq!(fee.status, FeeStatus::Partial);
        assert_eq!(fee.paid_cents, 10000);
        assert!(matches!(Payment::get(&s.conn, &full.payment.id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_resident_sees_own_payments_and_receipt() {
        let s = setup();
        let config = Config::default();
        let recorded = record_payment(&s.conn, &MemoryMailer::new(), &config, &s.syndic, &s.fee.id, cash(5000), Utc::now()).unwrap();

        let me = Identity { session_id: "r".to_string(), profile: s.resident.clone() };
        let payments = list_payments(&s.conn, &me, PaymentFilter::default()).unwrap();
        assert_eq!(payments.len(), 1);

        let receipt = payment_receipt(&s.conn, &config, &me, &recorded.payment.id).unwrap();
        assert_eq!(receipt.resident_name, "Nadia");
        assert_eq!(receipt.remaining_cents, 25000);

        // Later payments do not rewrite an earlier receipt
        record_payment(&s.conn, &MemoryMailer::new(), &config, &s.syndic, &s.fee.id, cash(25000), Utc::now()).unwrap();
        let receipt = payment_receipt(&s.conn, &config, &me, &recorded.payment.id).unwrap();
        assert_eq!(receipt.remaining_cents, 25000);
        assert!(receipt.render().contains("Remaining:     250.00 MAD"));

        let result = record_payment(&s.conn, &MemoryMailer::new(), &config, &me, &s.fee.id, cash(100), Utc::now());
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
