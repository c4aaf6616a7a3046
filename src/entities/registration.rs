// 📝 Registration Request - a prospective resident asking to join

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

text_enum! {
    RequestStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

pub const COLUMNS: &str = "id, residence_id, email, full_name, phone, apartment_number, status, \
                           rejection_reason, reviewed_by, reviewed_at, created_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub id: String,
    pub residence_id: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub apartment_number: String,
    pub status: RequestStatus,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RegistrationRequest {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RegistrationRequest {
            id: row.get(0)?,
            residence_id: row.get(1)?,
            email: row.get(2)?,
            full_name: row.get(3)?,
            phone: row.get(4)?,
            apartment_number: row.get(5)?,
            status: row.get(6)?,
            rejection_reason: row.get(7)?,
            reviewed_by: row.get(8)?,
            reviewed_at: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    pub fn insert(&self, conn: &Connection) -> AppResult<()> {
        conn.execute(
            "INSERT INTO registration_requests (
                id, residence_id, email, full_name, phone, apartment_number, status,
                rejection_reason, reviewed_by, reviewed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                self.id,
                self.residence_id,
                self.email,
                self.full_name,
                self.phone,
                self.apartment_number,
                self.status,
                self.rejection_reason,
                self.reviewed_by,
                self.reviewed_at,
                self.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn find(conn: &Connection, id: &str) -> AppResult<Option<Self>> {
        let request = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM registration_requests WHERE id = ?1"),
                [id],
                RegistrationRequest::from_row,
            )
            .optional()?;
        Ok(request)
    }

    pub fn get(conn: &Connection, id: &str) -> AppResult<Self> {
        RegistrationRequest::find(conn, id)?.ok_or(AppError::NotFound("Registration request"))
    }

    /// Record the review outcome
    pub fn save_review(&self, conn: &Connection) -> AppResult<()> {
        conn.execute(
            "UPDATE registration_requests
             SET status = ?1, rejection_reason = ?2, reviewed_by = ?3, reviewed_at = ?4
             WHERE id = ?5",
            params![
                self.status,
                self.rejection_reason,
                self.reviewed_by,
                self.reviewed_at,
                self.id
            ],
        )?;
        Ok(())
    }
}
