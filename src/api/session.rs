// Login, logout and the caller's own account

use super::{ok, ApiJson, ApiResponse, ApiResult, AppState, Message};
use crate::access::{self, AccessCard};
use crate::auth::{self, Client, Identity, SESSION_COOKIE};
use crate::balances::{self, ResidentBalance};
use crate::config::Config;
use crate::deletion::DeletionReport;
use crate::entities::{Profile, Residence};
use crate::error::AppError;
use crate::onboarding;
use crate::residences::{self, SyndicSignup};
use crate::residents::{self, ResidentUpdate};
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerify {
    pub email: String,
    pub code: String,
    #[serde(default = "default_client")]
    pub client: Client,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub code: String,
    pub email: String,
    #[serde(default = "default_client")]
    pub client: Client,
}

fn default_client() -> Client {
    Client::Web
}

/// Web clients get the token as a cookie only; mobile clients in the body
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub profile: Profile,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub profile: Profile,
    pub residence: Residence,
}

pub(crate) fn session_cookie(config: &Config, token: &str, max_age_seconds: i64) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_seconds}");
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn login_response(config: &Config, client: Client, token: String, profile: Profile) -> Response {
    match client {
        Client::Web => {
            let cookie = session_cookie(config, &token, config.session_ttl_hours * 3600);
            let body = LoginResponse { token: None, profile };
            ([(SET_COOKIE, cookie)], Json(ApiResponse::ok(body))).into_response()
        }
        Client::Mobile => {
            let body = LoginResponse { token: Some(token), profile };
            Json(ApiResponse::ok(body)).into_response()
        }
    }
}

/// POST /api/auth/otp/request - always answers the same for unknown e-mails
pub async fn request_code(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<OtpRequest>,
) -> ApiResult<Message> {
    let conn = state.db()?;
    auth::request_otp(&conn, state.mailer.as_ref(), &state.config, &body.email, Utc::now())?;
    ok(Message { message: "If this account exists, a login code has been sent" })
}

/// POST /api/auth/otp/verify
pub async fn verify_code(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<OtpVerify>,
) -> Result<Response, AppError> {
    let conn = state.db()?;
    let (token, profile) =
        auth::verify_otp(&conn, &state.config, &body.email, &body.code, body.client, Utc::now())?;
    Ok(login_response(&state.config, body.client, token, profile))
}

/// POST /api/onboarding/claim
pub async fn claim(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ClaimRequest>,
) -> Result<Response, AppError> {
    let conn = state.db()?;
    let (token, profile) =
        onboarding::claim_code(&conn, &state.config, &body.code, &body.email, body.client, Utc::now())?;

    Ok(login_response(&state.config, body.client, token, profile))
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>, identity: Identity) -> Result<Response, AppError> {
    let conn = state.db()?;
    auth::revoke_session(&conn, &identity.session_id)?;

    let cookie = session_cookie(&state.config, "", 0);
    Ok(([(SET_COOKIE, cookie)], Json(ApiResponse::ok(Message { message: "Signed out" }))).into_response())
}

/// POST /api/auth/signup - a syndic applies with their residence
pub async fn signup(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SyndicSignup>,
) -> ApiResult<SignupResponse> {
    let conn = state.db()?;
    let (profile, residence) = residences::signup_syndic(&conn, state.mailer.as_ref(), body)?;
    ok(SignupResponse { profile, residence })
}

/// GET /api/me
pub async fn me(identity: Identity) -> ApiResult<Profile> {
    ok(identity.profile)
}

/// PATCH /api/me
pub async fn update_me(
    State(state): State<AppState>,
    identity: Identity,
    ApiJson(body): ApiJson<ResidentUpdate>,
) -> ApiResult<Profile> {
    let conn = state.db()?;
    ok(residents::update_me(&conn, &identity, body)?)
}

/// DELETE /api/me
pub async fn delete_me(State(state): State<AppState>, identity: Identity) -> Result<Response, AppError> {
    let conn = state.db()?;
    let report: DeletionReport = residents::delete_me(&conn, &identity)?;

    let cookie = session_cookie(&state.config, "", 0);
    Ok(([(SET_COOKIE, cookie)], Json(ApiResponse::ok(report))).into_response())
}

/// GET /api/me/balance
pub async fn my_balance(State(state): State<AppState>, identity: Identity) -> ApiResult<ResidentBalance> {
    let conn = state.db()?;
    ok(balances::resident_balance(&conn, &identity, identity.id(), Utc::now().date_naive())?)
}

/// GET /api/me/access-code
pub async fn my_access_code(State(state): State<AppState>, identity: Identity) -> ApiResult<AccessCard> {
    let conn = state.db()?;
    ok(access::my_access_code(&conn, &identity)?)
}

/// POST /api/me/access-code/regenerate
pub async fn regenerate_access_code(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<AccessCard> {
    let conn = state.db()?;
    ok(access::regenerate_access_code(&conn, &identity)?)
}
