// 🧾 Fee Entity - an amount one resident owes
//
// Generated fees carry their contribution and coverage period; one-off fees
// leave those empty.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

text_enum! {
    FeeStatus {
        Unpaid => "unpaid",
        Partial => "partial",
        Paid => "paid",
    }
}

impl FeeStatus {
    /// Status implied by the amounts; the only way status is ever computed
    pub fn from_amounts(amount_cents: i64, paid_cents: i64) -> Self {
        if paid_cents <= 0 {
            FeeStatus::Unpaid
        } else if paid_cents < amount_cents {
            FeeStatus::Partial
        } else {
            FeeStatus::Paid
        }
    }
}

pub const COLUMNS: &str = "id, residence_id, profile_id, contribution_id, title, amount_cents, \
                           paid_cents, due_date, period_start, period_end, status, created_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    pub id: String,
    pub residence_id: String,
    pub profile_id: String,
    pub contribution_id: Option<String>,
    pub title: String,
    pub amount_cents: i64,
    pub paid_cents: i64,
    pub due_date: NaiveDate,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub status: FeeStatus,
    pub created_at: DateTime<Utc>,
}

impl Fee {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Fee {
            id: row.get(0)?,
            residence_id: row.get(1)?,
            profile_id: row.get(2)?,
            contribution_id: row.get(3)?,
            title: row.get(4)?,
            amount_cents: row.get(5)?,
            paid_cents: row.get(6)?,
            due_date: row.get(7)?,
            period_start: row.get(8)?,
            period_end: row.get(9)?,
            status: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    pub fn insert(&self, conn: &Connection) -> AppResult<()> {
        self.write(conn, "INSERT")?;
        Ok(())
    }

    /// Generated fees only; false when the (contribution, profile, period) key already exists
    pub fn insert_generated(&self, conn: &Connection) -> AppResult<bool> {
        Ok(self.write(conn, "INSERT OR IGNORE")? == 1)
    }

    fn write(&self, conn: &Connection, verb: &str) -> AppResult<usize> {
        let written = conn.execute(
            &format!(
                "{verb} INTO fees (
                    id, residence_id, profile_id, contribution_id, title, amount_cents,
                    paid_cents, due_date, period_start, period_end, status, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                self.id,
                self.residence_id,
                self.profile_id,
                self.contribution_id,
                self.title,
                self.amount_cents,
                self.paid_cents,
                self.due_date,
                self.period_start,
                self.period_end,
                self.status,
                self.created_at,
            ],
        )?;
        Ok(written)
    }

    pub fn find(conn: &Connection, id: &str) -> AppResult<Option<Self>> {
        let fee = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM fees WHERE id = ?1"),
                [id],
                Fee::from_row,
            )
            .optional()?;
        Ok(fee)
    }

    pub fn get(conn: &Connection, id: &str) -> AppResult<Self> {
        Fee::find(conn, id)?.ok_or(AppError::NotFound("Fee"))
    }

    pub fn list_for_profile(conn: &Connection, profile_id: &str) -> AppResult<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM fees WHERE profile_id = ?1 ORDER BY due_date, title"
        ))?;
        let fees = stmt
            .query_map([profile_id], Fee::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(fees)
    }

    /// Persist amount/paid/status after a change
    pub fn save_amounts(&self, conn: &Connection) -> AppResult<()> {
        conn.execute(
            "UPDATE fees SET title = ?1, amount_cents = ?2, paid_cents = ?3, due_date = ?4, status = ?5
             WHERE id = ?6",
            params![
                self.title,
                self.amount_cents,
                self.paid_cents,
                self.due_date,
                self.status,
                self.id
            ],
        )?;
        Ok(())
    }

    pub fn remaining_cents(&self) -> i64 {
        (self.amount_cents - self.paid_cents).max(0)
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status != FeeStatus::Paid && self.due_date < today
    }

    /// Apply a payment (positive) or a reversal (negative) and recompute status
    pub fn apply_payment(&mut self, delta_cents: i64) {
        self.paid_cents = (self.paid_cents + delta_cents).max(0);
        self.status = FeeStatus::from_amounts(self.amount_cents, self.paid_cents);
    }
}
