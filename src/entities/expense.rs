use crate::error::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

pub const COLUMNS: &str =
    "id, residence_id, category, description, amount_cents, expense_date, recorded_by, created_at";

/// Money spent by the residence (cleaning, elevator, electricity, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub residence_id: String,
    pub category: String,
    pub description: String,
    pub amount_cents: i64,
    pub expense_date: NaiveDate,
    pub recorded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Expense {
            id: row.get(0)?,
            residence_id: row.get(1)?,
            category: row.get(2)?,
            description: row.get(3)?,
            amount_cents: row.get(4)?,
            expense_date: row.get(5)?,
            recorded_by: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    pub fn insert(&self, conn: &Connection) -> AppResult<()> {
        conn.execute(
            "INSERT INTO expenses (
                id, residence_id, category, description, amount_cents, expense_date,
                recorded_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                self.id,
                self.residence_id,
                self.category,
                self.description,
                self.amount_cents,
                self.expense_date,
                self.recorded_by,
                self.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn find(conn: &Connection, id: &str) -> AppResult<Option<Self>> {
        let expense = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM expenses WHERE id = ?1"),
                [id],
                Expense::from_row,
            )
            .optional()?;
        Ok(expense)
    }

    pub fn get(conn: &Connection, id: &str) -> AppResult<Self> {
        Expense::find(conn, id)?.ok_or(AppError::NotFound("Expense"))
    }

    pub fn save(&self, conn: &Connection) -> AppResult<()> {
        conn.execute(
            "UPDATE expenses SET category = ?1, description = ?2, amount_cents = ?3, expense_date = ?4
             WHERE id = ?5",
            params![
                self.category,
                self.description,
                self.amount_cents,
                self.expense_date,
                self.id
            ],
        )?;
        Ok(())
    }
}
