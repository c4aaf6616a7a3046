// Onboarding codes, registration requests, residents, guards

use super::{ok, target_residence, ApiJson, ApiQuery, ApiResult, AppState, Message, ResidenceQuery};
use crate::access::{self, AccessCheck};
use crate::auth::Identity;
use crate::balances::{self, ResidentBalance};
use crate::deletion::DeletionReport;
use crate::entities::{OnboardingCode, Profile, RegistrationRequest, RequestStatus};
use crate::onboarding::{self, InviteInput, IssuedCode};
use crate::registration::{self, RegistrationInput};
use crate::residents::{self, ImportReport, ResidentUpdate};
use axum::extract::{Path, State};
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RegistrationQuery {
    pub residence_id: Option<String>,
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
    pub code: String,
}

/// GET /api/onboarding/codes
pub async fn list_codes(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<ResidenceQuery>,
) -> ApiResult<Vec<OnboardingCode>> {
    let residence_id = target_residence(&identity, query)?;
    let conn = state.db()?;
    ok(onboarding::list_pending_codes(&conn, &residence_id, Utc::now())?)
}

/// POST /api/onboarding/codes - the plain code is only ever returned here
pub async fn issue_code(
    State(state): State<AppState>,
    identity: Identity,
    ApiJson(body): ApiJson<InviteInput>,
) -> ApiResult<IssuedCode> {
    let conn = state.db()?;
    ok(onboarding::issue_code(&conn, state.mailer.as_ref(), &state.config, &identity, body, Utc::now())?)
}

/// DELETE /api/onboarding/codes/:id
pub async fn revoke_code(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Message> {
    let conn = state.db()?;
    onboarding::revoke_code(&conn, &identity, &id)?;
    ok(Message { message: "Code revoked" })
}

/// POST /api/residences/:id/registrations - public
pub async fn submit_registration(
    State(state): State<AppState>,
    Path(residence_id): Path<String>,
    ApiJson(body): ApiJson<RegistrationInput>,
) -> ApiResult<RegistrationRequest> {
    let conn = state.db()?;
    ok(registration::submit_request(&conn, &residence_id, body, Utc::now())?)
}

/// GET /api/registrations
pub async fn list_registrations(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<RegistrationQuery>,
) -> ApiResult<Vec<RegistrationRequest>> {
    let residence_id = target_residence(&identity, ResidenceQuery { residence_id: query.residence_id })?;
    let conn = state.db()?;
    ok(registration::list_requests(&conn, &identity, &residence_id, query.status)?)
}

/// POST /api/registrations/:id/approve
pub async fn approve_registration(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Profile> {
    let conn = state.db()?;
    ok(registration::approve_request(&conn, state.mailer.as_ref(), &identity, &id, Utc::now())?)
}

/// POST /api/registrations/:id/reject
pub async fn reject_registration(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RejectBody>,
) -> ApiResult<RegistrationRequest> {
    let conn = state.db()?;
    ok(registration::reject_request(&conn, state.mailer.as_ref(), &identity, &id, body.reason, Utc::now())?)
}

/// GET /api/residents
pub async fn list_residents(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<ResidenceQuery>,
) -> ApiResult<Vec<Profile>> {
    let residence_id = target_residence(&identity, query)?;
    let conn = state.db()?;
    ok(residents::list_residents(&conn, &identity, &residence_id)?)
}

/// GET /api/guards
pub async fn list_guards(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<ResidenceQuery>,
) -> ApiResult<Vec<Profile>> {
    let residence_id = target_residence(&identity, query)?;
    let conn = state.db()?;
    ok(residents::list_guards(&conn, &identity, &residence_id)?)
}

/// GET /api/residents/:id
pub async fn get_resident(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Profile> {
    let conn = state.db()?;
    ok(residents::get_resident(&conn, &identity, &id)?)
}

/// PATCH /api/residents/:id
pub async fn update_resident(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ResidentUpdate>,
) -> ApiResult<Profile> {
    let conn = state.db()?;
    ok(residents::update_resident(&conn, &identity, &id, body)?)
}

/// DELETE /api/residents/:id
pub async fn remove_resident(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<DeletionReport> {
    let conn = state.db()?;
    ok(residents::remove_resident(&conn, &identity, &id)?)
}

/// GET /api/residents/:id/balance
pub async fn resident_balance(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<ResidentBalance> {
    let conn = state.db()?;
    ok(balances::resident_balance(&conn, &identity, &id, Utc::now().date_naive())?)
}

/// POST /api/residents/import - text/csv body
pub async fn import_residents(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<ResidenceQuery>,
    body: String,
) -> ApiResult<ImportReport> {
    let conn = state.db()?;
    ok(residents::import_residents_csv(
        &conn,
        state.mailer.as_ref(),
        &state.config,
        &identity,
        query.residence_id,
        body.as_bytes(),
        Utc::now(),
    )?)
}

/// POST /api/guard/verify
pub async fn verify_access_code(
    State(state): State<AppState>,
    identity: Identity,
    ApiJson(body): ApiJson<VerifyBody>,
) -> ApiResult<AccessCheck> {
    let conn = state.db()?;
    ok(access::verify_access_code(&conn, &identity, &body.code, Utc::now().date_naive())?)
}
