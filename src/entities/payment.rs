// 💵 Payment Entity - money received against a fee

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

text_enum! {
    PaymentMethod {
        Cash => "cash",
        Transfer => "transfer",
        Card => "card",
        Check => "check",
    }
}

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Transfer => "Bank transfer",
            PaymentMethod::Card => "Card",
            PaymentMethod::Check => "Check",
        }
    }
}

pub const COLUMNS: &str = "id, fee_id, profile_id, residence_id, amount_cents, remaining_after_cents, \
                           method, receipt_number, note, paid_at, recorded_by, created_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub fee_id: String,
    pub profile_id: String,
    pub residence_id: String,
    pub amount_cents: i64,
    /// What was still owed on the fee right after this payment; receipts quote it
    pub remaining_after_cents: i64,
    pub method: PaymentMethod,
    pub receipt_number: String,
    pub note: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub recorded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Payment {
            id: row.get(0)?,
            fee_id: row.get(1)?,
            profile_id: row.get(2)?,
            residence_id: row.get(3)?,
            amount_cents: row.get(4)?,
            remaining_after_cents: row.get(5)?,
            method: row.get(6)?,
            receipt_number: row.get(7)?,
            note: row.get(8)?,
            paid_at: row.get(9)?,
            recorded_by: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    pub fn insert(&self, conn: &Connection) -> AppResult<()> {
        conn.execute(
            "INSERT INTO payments (
                id, fee_id, profile_id, residence_id, amount_cents, remaining_after_cents,
                method, receipt_number, note, paid_at, recorded_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                self.id,
                self.fee_id,
                self.profile_id,
                self.residence_id,
                self.amount_cents,
                self.remaining_after_cents,
                self.method,
                self.receipt_number,
                self.note,
                self.paid_at,
                self.recorded_by,
                self.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn find(conn: &Connection, id: &str) -> AppResult<Option<Self>> {
        let payment = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM payments WHERE id = ?1"),
                [id],
                Payment::from_row,
            )
            .optional()?;
        Ok(payment)
    }

    pub fn get(conn: &Connection, id: &str) -> AppResult<Self> {
        Payment::find(conn, id)?.ok_or(AppError::NotFound("Payment"))
    }

    pub fn count_for_fee(conn: &Connection, fee_id: &str) -> AppResult<i64> {
        let count =
            conn.query_row("SELECT COUNT(*) FROM payments WHERE fee_id = ?1", [fee_id], |row| {
                row.get(0)
            })?;
        Ok(count)
    }
}

/// Receipt number: "RCT-" + payment date + 8 random hex digits
pub fn receipt_number(paid_at: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("RCT-{}-{:08X}", paid_at.format("%Y%m%d"), suffix)
}
