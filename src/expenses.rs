// 📉 Expenses - money spent by a residence

use crate::auth::Identity;
use crate::db::{new_id, record_event};
use crate::entities::Expense;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseInput {
    pub category: String,
    pub description: String,
    pub amount_cents: i64,
    pub expense_date: NaiveDate,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseUpdate {
    pub category: Option<String>,
    pub description: Option<String>,
    pub amount_cents: Option<i64>,
    pub expense_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpenseFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub category: Option<String>,
}

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn positive(amount_cents: i64) -> AppResult<i64> {
    if amount_cents <= 0 {
        return Err(AppError::validation("amount_cents must be greater than zero"));
    }
    Ok(amount_cents)
}

pub fn create_expense(
    conn: &Connection,
    actor: &Identity,
    residence_id: &str,
    input: ExpenseInput,
    now: DateTime<Utc>,
) -> AppResult<Expense> {
    actor.ensure_manages(residence_id)?;

    let expense = Expense {
        id: new_id(),
        residence_id: residence_id.to_string(),
        category: required("category", &input.category)?,
        description: required("description", &input.description)?,
        amount_cents: positive(input.amount_cents)?,
        expense_date: input.expense_date,
        recorded_by: Some(actor.id().to_string()),
        created_at: now,
    };
    expense.insert(conn)?;

    record_event(
        conn,
        "expense_created",
        "expense",
        &expense.id,
        serde_json::json!({ "category": expense.category, "amount_cents": expense.amount_cents }),
        actor.id(),
    );
    Ok(expense)
}

/// Residents see their residence's expenses too; the books are shared.
pub fn list_expenses(
    conn: &Connection,
    actor: &Identity,
    residence_id: &str,
    filter: &ExpenseFilter,
) -> AppResult<Vec<Expense>> {
    if actor.profile.residence_id.as_deref() != Some(residence_id) {
        actor.ensure_manages(residence_id)?;
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM expenses
         WHERE residence_id = ?1
           AND (?2 IS NULL OR expense_date >= ?2)
           AND (?3 IS NULL OR expense_date <= ?3)
           AND (?4 IS NULL OR category = ?4)
         ORDER BY expense_date DESC, created_at DESC",
        crate::entities::expense::COLUMNS
    ))?;
    let expenses = stmt
        .query_map(
            params![residence_id, filter.from, filter.to, filter.category],
            Expense::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(expenses)
}

pub fn update_expense(conn: &Connection, actor: &Identity, id: &str, update: ExpenseUpdate) -> AppResult<Expense> {
    let mut expense = Expense::get(conn, id)?;
    actor.ensure_manages(&expense.residence_id)?;

    if let Some(category) = update.category {
        expense.category = required("category", &category)?;
    }
    if let Some(description) = update.description {
        expense.description = required("description", &description)?;
    }
    if let Some(amount_cents) = update.amount_cents {
        expense.amount_cents = positive(amount_cents)?;
    }
    if let Some(expense_date) = update.expense_date {
        expense.expense_date = expense_date;
    }

    expense.save(conn)?;
    record_event(conn, "expense_updated", "expense", &expense.id, serde_json::json!({}), actor.id());
    Ok(expense)
}

pub fn delete_expense(conn: &Connection, actor: &Identity, id: &str) -> AppResult<()> {
    let expense = Expense::get(conn, id)?;
    actor.ensure_manages(&expense.residence_id)?;

    conn.execute("DELETE FROM expenses WHERE id = ?1", [id])?;
    record_event(
        conn,
        "expense_deleted",
        "expense",
        id,
        serde_json::json!({ "amount_cents": expense.amount_cents }),
        actor.id(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::entities::{Profile, ProfileStatus, Residence, Role};

    fn setup() -> (Connection, Residence, Identity) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let residence = Residence::new("Corniche", "Bd de la Corniche", "Casablanca");
        residence.insert(&conn).unwrap();

        let mut syndic = Profile::new("s@example.ma", "Omar", Role::Syndic, ProfileStatus::Active);
        syndic.residence_id = Some(residence.id.clone());
        syndic.insert(&conn).unwrap();

        (conn, residence, Identity { session_id: "s".to_string(), profile: syndic })
    }

    fn input(category: &str, amount_cents: i64, day: u32) -> ExpenseInput {
        ExpenseInput {
            category: category.to_string(),
            description: "Monthly invoice".to_string(),
            amount_cents,
            expense_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
        }
    }

    #[test]
    fn test_create_and_filter_by_date() {
        let (conn, residence, syndic) = setup();
        let now = Utc::now();

        create_expense(&conn, &syndic, &residence.id, input("Cleaning", 40000, 1), now).unwrap();
        create_expense(&conn, &syndic, &residence.id, input("Electricity", 25000, 15), now).unwrap();
        create_expense(&conn, &syndic, &residence.id, input("Cleaning", 40000, 28), now).unwrap();

        let all = list_expenses(&conn, &syndic, &residence.id, &ExpenseFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].expense_date.to_string(), "2024-03-28");

        let window = ExpenseFilter {
            from: NaiveDate::from_ymd_opt(2024, 3, 10),
            to: NaiveDate::from_ymd_opt(2024, 3, 28),
            category: None,
        };
        assert_eq!(list_expenses(&conn, &syndic, &residence.id, &window).unwrap().len(), 2);

        let cleaning = ExpenseFilter { category: Some("Cleaning".to_string()), ..Default::default() };
        assert_eq!(list_expenses(&conn, &syndic, &residence.id, &cleaning).unwrap().len(), 2);
    }

    #[test]
    fn test_validation() {
        let (conn, residence, syndic) = setup();
        let now = Utc::now();

        let zero = create_expense(&conn, &syndic, &residence.id, input("Cleaning", 0, 1), now);
        assert!(matches!(zero, Err(AppError::Validation(_))));

        let blank = create_expense(&conn, &syndic, &residence.id, input("  ", 100, 1), now);
        assert!(matches!(blank, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_update_and_delete() {
        let (conn, residence, syndic) = setup();
        let expense = create_expense(&conn, &syndic, &residence.id, input("Garden", 9000, 2), Utc::now()).unwrap();

        let updated = update_expense(
            &conn,
            &syndic,
            &expense.id,
            ExpenseUpdate { amount_cents: Some(9500), ..Default::default() },
        )
        .unwrap();
        assert_eq!(updated.amount_cents, 9500);
        assert_eq!(updated.category, "Garden");

        delete_expense(&conn, &syndic, &expense.id).unwrap();
        assert!(matches!(Expense::get(&conn, &expense.id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_other_residence_is_forbidden() {
        let (conn, residence, mut stranger) = setup();
        stranger.profile.residence_id = Some("elsewhere".to_string());

        let result = create_expense(&conn, &stranger, &residence.id, input("Cleaning", 100, 1), Utc::now());
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
