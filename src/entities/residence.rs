// 🏢 Residence Entity - the tenant boundary
// Every other row hangs off a residence; a residence has at most one syndic.

use crate::db::new_id;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

pub const COLUMNS: &str = "id, name, address, city, syndic_id, created_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Residence {
    pub id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    /// Profile currently managing the residence
    pub syndic_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Residence {
    pub fn new(name: &str, address: &str, city: &str) -> Self {
        Residence {
            id: new_id(),
            name: name.trim().to_string(),
            address: address.trim().to_string(),
            city: city.trim().to_string(),
            syndic_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Residence {
            id: row.get(0)?,
            name: row.get(1)?,
            address: row.get(2)?,
            city: row.get(3)?,
            syndic_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub fn insert(&self, conn: &Connection) -> AppResult<()> {
        conn.execute(
            "INSERT INTO residences (id, name, address, city, syndic_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.id,
                self.name,
                self.address,
                self.city,
                self.syndic_id,
                self.created_at
            ],
        )?;
        Ok(())
    }

    pub fn find(conn: &Connection, id: &str) -> AppResult<Option<Self>> {
        let residence = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM residences WHERE id = ?1"),
                [id],
                Residence::from_row,
            )
            .optional()?;
        Ok(residence)
    }

    pub fn get(conn: &Connection, id: &str) -> AppResult<Self> {
        Residence::find(conn, id)?.ok_or(AppError::NotFound("Residence"))
    }

    pub fn set_syndic(conn: &Connection, id: &str, syndic_id: Option<&str>) -> AppResult<()> {
        conn.execute(
            "UPDATE residences SET syndic_id = ?1 WHERE id = ?2",
            params![syndic_id, id],
        )?;
        Ok(())
    }
}
