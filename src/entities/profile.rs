// 👤 Profile Entity - one row per person, whatever their role
//
// Identity: UUID. E-mail is unique across the whole system, so one person
// belongs to at most one residence.

use crate::db::new_id;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

text_enum! {
    /// What a profile is allowed to do
    Role {
        Admin => "admin",
        Syndic => "syndic",
        Resident => "resident",
        Guard => "guard",
    }
}

text_enum! {
    /// Syndic applications start pending; everyone else is created active
    ProfileStatus {
        Pending => "pending",
        Active => "active",
        Rejected => "rejected",
    }
}

pub const COLUMNS: &str = "id, email, full_name, phone, role, status, residence_id, \
                           apartment_number, access_code, created_at";

/// Alphabet for access codes: no 0/O/1/I so codes survive being read aloud
const ACCESS_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub status: ProfileStatus,
    pub residence_id: Option<String>,
    pub apartment_number: Option<String>,
    /// Payload of the resident's QR code; only exposed through its own endpoint
    #[serde(skip_serializing, default)]
    pub access_code: String,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(email: &str, full_name: &str, role: Role, status: ProfileStatus) -> Self {
        Profile {
            id: new_id(),
            email: normalize_email(email),
            full_name: full_name.trim().to_string(),
            phone: None,
            role,
            status,
            residence_id: None,
            apartment_number: None,
            access_code: generate_access_code(),
            created_at: Utc::now(),
        }
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Profile {
            id: row.get(0)?,
            email: row.get(1)?,
            full_name: row.get(2)?,
            phone: row.get(3)?,
            role: row.get(4)?,
            status: row.get(5)?,
            residence_id: row.get(6)?,
            apartment_number: row.get(7)?,
            access_code: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    pub fn insert(&self, conn: &Connection) -> AppResult<()> {
        let result = conn.execute(
            "INSERT INTO profiles (
                id, email, full_name, phone, role, status, residence_id,
                apartment_number, access_code, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                self.id,
                self.email,
                self.full_name,
                self.phone,
                self.role,
                self.status,
                self.residence_id,
                self.apartment_number,
                self.access_code,
                self.created_at,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, Some(message)))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    && message.contains("profiles.email") =>
            {
                Err(AppError::conflict("An account with this email already exists"))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn find(conn: &Connection, id: &str) -> AppResult<Option<Self>> {
        let profile = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM profiles WHERE id = ?1"),
                [id],
                Profile::from_row,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn get(conn: &Connection, id: &str) -> AppResult<Self> {
        Profile::find(conn, id)?.ok_or(AppError::NotFound("Profile"))
    }

    pub fn find_by_email(conn: &Connection, email: &str) -> AppResult<Option<Self>> {
        let profile = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM profiles WHERE email = ?1"),
                [normalize_email(email)],
                Profile::from_row,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn find_by_access_code(conn: &Connection, code: &str) -> AppResult<Option<Self>> {
        let profile = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM profiles WHERE access_code = ?1"),
                [code.trim().to_uppercase()],
                Profile::from_row,
            )
            .optional()?;
        Ok(profile)
    }

    /// Profiles of a residence with the given role, ordered by apartment
    pub fn list_for_residence(
        conn: &Connection,
        residence_id: &str,
        role: Role,
    ) -> AppResult<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM profiles
             WHERE residence_id = ?1 AND role = ?2
             ORDER BY apartment_number, full_name"
        ))?;
        let profiles = stmt
            .query_map(params![residence_id, role], Profile::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(profiles)
    }

    pub fn is_active(&self) -> bool {
        self.status == ProfileStatus::Active
    }
}

/// E-mails compare case-insensitively everywhere
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trimmed text, or None when nothing is left
pub fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Minimal shape check; deliverability is the mail provider's problem
pub fn validate_email(email: &str) -> AppResult<String> {
    let email = normalize_email(email);
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };

    if valid && !email.contains(char::is_whitespace) {
        Ok(email)
    } else {
        Err(AppError::validation("A valid email address is required"))
    }
}

/// Opaque identifier a resident shows at the gate: "SKN-" + 12 characters
pub fn generate_access_code() -> String {
    let mut rng = rand::thread_rng();
    let body: String = (0..12)
        .map(|_| ACCESS_ALPHABET[rng.gen_range(0..ACCESS_ALPHABET.len())] as char)
        .collect();
    format!("SKN-{body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    #[test]
    fn test_role_round_trips_through_text() {
        assert_eq!(Role::parse("syndic"), Some(Role::Syndic));
        assert_eq!(Role::Guard.as_str(), "guard");
        assert_eq!(Role::parse("owner"), None);
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email("  Karim@Example.ma ").unwrap(), "karim@example.ma");
        assert!(validate_email("karim").is_err());
        assert!(validate_email("@example.ma").is_err());
        assert!(validate_email("karim@localhost").is_err());
        assert!(validate_email("ka rim@example.ma").is_err());
    }

    #[test]
    fn test_clean_optional() {
        assert_eq!(clean_optional(Some("  B4 ".to_string())), Some("B4".to_string()));
        assert_eq!(clean_optional(Some("   ".to_string())), None);
        assert_eq!(clean_optional(None), None);
    }

    #[test]
    fn test_access_code_shape() {
        let code = generate_access_code();
        assert!(code.starts_with("SKN-"));
        assert_eq!(code.len(), 16);
        assert!(!code[4..].contains('O'));
        assert!(!code[4..].contains('0'));
    }

    #[test]
    fn test_duplicate_email_is_conflict() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let first = Profile::new("amina@example.ma", "Amina", Role::Admin, ProfileStatus::Active);
        first.insert(&conn).unwrap();

        let second = Profile::new("AMINA@example.ma", "Amina B", Role::Admin, ProfileStatus::Active);
        let err = second.insert(&conn).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let found = Profile::find_by_email(&conn, "Amina@Example.ma").unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert_eq!(found.role, Role::Admin);
    }

    #[test]
    fn test_other_constraint_failures_stay_database_errors() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let first = Profile::new("amina@example.ma", "Amina", Role::Admin, ProfileStatus::Active);
        first.insert(&conn).unwrap();

        let mut same_code = Profile::new("omar@example.ma", "Omar", Role::Admin, ProfileStatus::Active);
        same_code.access_code = first.access_code.clone();
        assert!(matches!(same_code.insert(&conn).unwrap_err(), AppError::Database(_)));

        let mut orphan = Profile::new("hind@example.ma", "Hind", Role::Resident, ProfileStatus::Active);
        orphan.residence_id = Some("no-such-residence".to_string());
        assert!(matches!(orphan.insert(&conn).unwrap_err(), AppError::Database(_)));
    }
}
