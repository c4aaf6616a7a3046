// 🔁 Contribution Entity - a recurring charge plan for a residence
//
// A contribution never stores "last generated"; the periods are derived from
// start_date every time, so generation can be replayed safely.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

text_enum! {
    Frequency {
        Monthly => "monthly",
        Quarterly => "quarterly",
        Yearly => "yearly",
    }
}

impl Frequency {
    pub fn months(&self) -> u32 {
        match self {
            Frequency::Monthly => 1,
            Frequency::Quarterly => 3,
            Frequency::Yearly => 12,
        }
    }
}

pub const COLUMNS: &str = "id, residence_id, title, amount_cents, frequency, start_date, \
                           end_date, active, created_by, created_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: String,
    pub residence_id: String,
    pub title: String,
    pub amount_cents: i64,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One billing period: both bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Contribution {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Contribution {
            id: row.get(0)?,
            residence_id: row.get(1)?,
            title: row.get(2)?,
            amount_cents: row.get(3)?,
            frequency: row.get(4)?,
            start_date: row.get(5)?,
            end_date: row.get(6)?,
            active: row.get(7)?,
            created_by: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    pub fn insert(&self, conn: &Connection) -> AppResult<()> {
        conn.execute(
            "INSERT INTO contributions (
                id, residence_id, title, amount_cents, frequency, start_date,
                end_date, active, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                self.id,
                self.residence_id,
                self.title,
                self.amount_cents,
                self.frequency,
                self.start_date,
                self.end_date,
                self.active,
                self.created_by,
                self.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn find(conn: &Connection, id: &str) -> AppResult<Option<Self>> {
        let contribution = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM contributions WHERE id = ?1"),
                [id],
                Contribution::from_row,
            )
            .optional()?;
        Ok(contribution)
    }

    pub fn get(conn: &Connection, id: &str) -> AppResult<Self> {
        Contribution::find(conn, id)?.ok_or(AppError::NotFound("Contribution"))
    }

    pub fn save(&self, conn: &Connection) -> AppResult<()> {
        conn.execute(
            "UPDATE contributions SET title = ?1, amount_cents = ?2, end_date = ?3, active = ?4
             WHERE id = ?5",
            params![self.title, self.amount_cents, self.end_date, self.active, self.id],
        )?;
        Ok(())
    }

    /// Start of the k-th period, always measured from start_date so that a
    /// contribution starting on the 31st lands on each month's last day
    /// instead of drifting to the 28th.
    pub fn period_start(&self, index: u32) -> Option<NaiveDate> {
        let months = index.checked_mul(self.frequency.months())?;
        self.start_date.checked_add_months(Months::new(months))
    }

    /// Periods whose start is on or before `as_of` (and not after end_date)
    pub fn periods_until(&self, as_of: NaiveDate) -> Vec<Period> {
        let mut periods = Vec::new();
        let mut index = 0;

        while let Some(start) = self.period_start(index) {
            if start > as_of {
                break;
            }
            if let Some(end_date) = self.end_date {
                if start > end_date {
                    break;
                }
            }

            let mut end = match self.period_start(index + 1) {
                Some(next) => next.checked_sub_days(Days::new(1)).unwrap_or(next),
                None => break,
            };
            if let Some(end_date) = self.end_date {
                end = end.min(end_date);
            }

            periods.push(Period { start, end });
            index += 1;
        }

        periods
    }
}
