// Fees, contributions, payments, expenses and the residence books

use super::{ok, target_residence, ApiJson, ApiQuery, ApiResult, AppState, Message, ResidenceQuery};
use crate::auth::Identity;
use crate::balances::{self, ReminderReport, ResidenceSummary};
use crate::entities::{Contribution, Expense, Fee, Payment, Residence};
use crate::expenses::{self, ExpenseFilter, ExpenseInput, ExpenseUpdate};
use crate::fees::{self, ContributionInput, ContributionUpdate, FeeFilter, FeeInput, FeeUpdate, GenerationReport};
use crate::payments::{self, PaymentFilter, PaymentInput, RecordedPayment};
use crate::receipts::Receipt;
use crate::residences::{self, ResidenceUpdate};
use axum::extract::{Path, State};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseQuery {
    pub residence_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReceiptView {
    #[serde(flatten)]
    pub receipt: Receipt,
    pub text: String,
}

// ============================================================================
// FEES
// ============================================================================

/// GET /api/fees - the residence's fees for a syndic, own fees for a resident
pub async fn list_fees(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(filter): ApiQuery<FeeFilter>,
) -> ApiResult<Vec<Fee>> {
    let conn = state.db()?;
    ok(fees::list_fees_for(&conn, &identity, filter, Utc::now().date_naive())?)
}

/// POST /api/fees
pub async fn create_fee(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<ResidenceQuery>,
    ApiJson(body): ApiJson<FeeInput>,
) -> ApiResult<Vec<Fee>> {
    let residence_id = target_residence(&identity, query)?;
    let conn = state.db()?;
    ok(fees::create_fee(&conn, &identity, &residence_id, body, Utc::now())?)
}

/// PATCH /api/fees/:id
pub async fn update_fee(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<FeeUpdate>,
) -> ApiResult<Fee> {
    let conn = state.db()?;
    ok(fees::update_fee(&conn, &identity, &id, body)?)
}

/// DELETE /api/fees/:id
pub async fn delete_fee(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Message> {
    let conn = state.db()?;
    fees::delete_fee(&conn, &identity, &id)?;
    ok(Message { message: "Fee deleted" })
}

/// POST /api/fees/:id/payments
pub async fn record_payment(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PaymentInput>,
) -> ApiResult<RecordedPayment> {
    let conn = state.db()?;
    ok(payments::record_payment(
        &conn,
        state.mailer.as_ref(),
        &state.config,
        &identity,
        &id,
        body,
        Utc::now(),
    )?)
}

// ============================================================================
// CONTRIBUTIONS
// ============================================================================

/// GET /api/contributions
pub async fn list_contributions(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<ResidenceQuery>,
) -> ApiResult<Vec<Contribution>> {
    // residents read their own residence's plans
    let residence_id = match (identity.is_admin(), query.residence_id) {
        (true, Some(residence_id)) => residence_id,
        _ => identity.residence_id()?.to_string(),
    };
    let conn = state.db()?;
    ok(fees::list_contributions(&conn, &identity, &residence_id)?)
}

/// POST /api/contributions
pub async fn create_contribution(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<ResidenceQuery>,
    ApiJson(body): ApiJson<ContributionInput>,
) -> ApiResult<Contribution> {
    let residence_id = target_residence(&identity, query)?;
    let conn = state.db()?;
    ok(fees::create_contribution(&conn, &identity, &residence_id, body, Utc::now())?)
}

/// PATCH /api/contributions/:id
pub async fn update_contribution(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ContributionUpdate>,
) -> ApiResult<Contribution> {
    let conn = state.db()?;
    ok(fees::update_contribution(&conn, &identity, &id, body)?)
}

/// DELETE /api/contributions/:id
pub async fn delete_contribution(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Message> {
    let conn = state.db()?;
    fees::delete_contribution(&conn, &identity, &id)?;
    ok(Message { message: "Contribution deleted" })
}

/// POST /api/contributions/generate - catch up the residence's recurring fees.
/// The body is optional; without one, fees are generated up to today.
pub async fn generate_fees(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<ResidenceQuery>,
    body: Option<ApiJson<GenerateBody>>,
) -> ApiResult<GenerationReport> {
    let residence_id = target_residence(&identity, query)?;
    let now = Utc::now();
    let as_of = body
        .and_then(|ApiJson(body)| body.as_of)
        .unwrap_or_else(|| now.date_naive());

    let conn = state.db()?;
    ok(fees::generate_contribution_fees(&conn, Some(&residence_id), as_of, now)?)
}

// ============================================================================
// PAYMENTS
// ============================================================================

/// GET /api/payments
pub async fn list_payments(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(filter): ApiQuery<PaymentFilter>,
) -> ApiResult<Vec<Payment>> {
    let conn = state.db()?;
    ok(payments::list_payments(&conn, &identity, filter)?)
}

/// GET /api/payments/:id/receipt
pub async fn receipt(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<ReceiptView> {
    let conn = state.db()?;
    let receipt = payments::payment_receipt(&conn, &state.config, &identity, &id)?;
    let text = receipt.render();
    ok(ReceiptView { receipt, text })
}

/// DELETE /api/payments/:id - void
pub async fn void_payment(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Fee> {
    let conn = state.db()?;
    ok(payments::void_payment(&conn, &identity, &id)?)
}

// ============================================================================
// EXPENSES
// ============================================================================

/// GET /api/expenses
pub async fn list_expenses(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<ExpenseQuery>,
) -> ApiResult<Vec<Expense>> {
    let residence_id = match (identity.is_admin(), query.residence_id) {
        (true, Some(residence_id)) => residence_id,
        _ => identity.residence_id()?.to_string(),
    };
    let filter = ExpenseFilter { from: query.from, to: query.to, category: query.category };

    let conn = state.db()?;
    ok(expenses::list_expenses(&conn, &identity, &residence_id, &filter)?)
}

/// POST /api/expenses
pub async fn create_expense(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<ResidenceQuery>,
    ApiJson(body): ApiJson<ExpenseInput>,
) -> ApiResult<Expense> {
    let residence_id = target_residence(&identity, query)?;
    let conn = state.db()?;
    ok(expenses::create_expense(&conn, &identity, &residence_id, body, Utc::now())?)
}

/// PATCH /api/expenses/:id
pub async fn update_expense(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ExpenseUpdate>,
) -> ApiResult<Expense> {
    let conn = state.db()?;
    ok(expenses::update_expense(&conn, &identity, &id, body)?)
}

/// DELETE /api/expenses/:id
pub async fn delete_expense(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Message> {
    let conn = state.db()?;
    expenses::delete_expense(&conn, &identity, &id)?;
    ok(Message { message: "Expense deleted" })
}

// ============================================================================
// RESIDENCE
// ============================================================================

/// GET /api/residence - the caller's residence
pub async fn get_residence(State(state): State<AppState>, identity: Identity) -> ApiResult<Residence> {
    let residence_id = identity.residence_id()?.to_string();
    let conn = state.db()?;
    ok(residences::get_residence(&conn, &identity, &residence_id)?)
}

/// PATCH /api/residence
pub async fn update_residence(
    State(state): State<AppState>,
    identity: Identity,
    ApiJson(body): ApiJson<ResidenceUpdate>,
) -> ApiResult<Residence> {
    let residence_id = identity.residence_id()?.to_string();
    let conn = state.db()?;
    ok(residences::update_residence(&conn, &identity, &residence_id, body)?)
}

/// GET /api/residence/summary
pub async fn residence_summary(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<ResidenceQuery>,
) -> ApiResult<ResidenceSummary> {
    let residence_id = target_residence(&identity, query)?;
    let conn = state.db()?;
    ok(balances::residence_summary(&conn, &identity, &residence_id, Utc::now().date_naive())?)
}

/// POST /api/reminders
pub async fn send_reminders(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<ResidenceQuery>,
) -> ApiResult<ReminderReport> {
    let residence_id = target_residence(&identity, query)?;
    let conn = state.db()?;
    ok(balances::send_payment_reminders(
        &conn,
        state.mailer.as_ref(),
        &state.config,
        Some(&residence_id),
        Utc::now().date_naive(),
    )?)
}
