// 🔑 Onboarding Code - an invitation to claim an account
//
// Only the hash of the code is stored; the plain code exists once, in the
// invitation e-mail and in the response to whoever issued it.

use crate::error::AppResult;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::Role;

text_enum! {
    OnboardingPurpose {
        Resident => "resident",
        Guard => "guard",
        Syndic => "syndic",
    }
}

impl OnboardingPurpose {
    /// Role the claimed profile receives
    pub fn role(&self) -> Role {
        match self {
            OnboardingPurpose::Resident => Role::Resident,
            OnboardingPurpose::Guard => Role::Guard,
            OnboardingPurpose::Syndic => Role::Syndic,
        }
    }
}

pub const COLUMNS: &str = "id, residence_id, email, full_name, apartment_number, phone, purpose, \
                           created_by, expires_at, consumed_at, created_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingCode {
    pub id: String,
    pub residence_id: String,
    pub email: String,
    pub full_name: String,
    pub apartment_number: Option<String>,
    pub phone: Option<String>,
    pub purpose: OnboardingPurpose,
    pub created_by: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OnboardingCode {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(OnboardingCode {
            id: row.get(0)?,
            residence_id: row.get(1)?,
            email: row.get(2)?,
            full_name: row.get(3)?,
            apartment_number: row.get(4)?,
            phone: row.get(5)?,
            purpose: row.get(6)?,
            created_by: row.get(7)?,
            expires_at: row.get(8)?,
            consumed_at: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    pub fn insert(&self, conn: &Connection, code_hash: &str) -> AppResult<()> {
        conn.execute(
            "INSERT INTO onboarding_codes (
                id, code_hash, residence_id, email, full_name, apartment_number, phone,
                purpose, created_by, expires_at, consumed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                self.id,
                code_hash,
                self.residence_id,
                self.email,
                self.full_name,
                self.apartment_number,
                self.phone,
                self.purpose,
                self.created_by,
                self.expires_at,
                self.consumed_at,
                self.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn find(conn: &Connection, id: &str) -> AppResult<Option<Self>> {
        let code = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM onboarding_codes WHERE id = ?1"),
                [id],
                OnboardingCode::from_row,
            )
            .optional()?;
        Ok(code)
    }

    pub fn find_by_hash(conn: &Connection, code_hash: &str) -> AppResult<Option<Self>> {
        let code = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM onboarding_codes WHERE code_hash = ?1"),
                [code_hash],
                OnboardingCode::from_row,
            )
            .optional()?;
        Ok(code)
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && self.expires_at > now
    }
}
