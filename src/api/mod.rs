// 🌐 HTTP API
//
// Thin axum layer over the library: each handler locks the connection, calls
// one operation and wraps the result in the `{success, data, error}` envelope.
// The lock is never held across an await.

mod admin;
mod extract;
mod finance;
mod members;
mod session;

pub use extract::{session_token, ApiJson, ApiQuery};

use crate::auth::Identity;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::mailer::Mailer;
use anyhow::anyhow;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: Arc<Config>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(conn: Connection, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
            mailer,
        }
    }

    pub fn db(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal(anyhow!("database lock poisoned")))
    }
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

pub(crate) fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

#[derive(Debug, Serialize)]
pub(crate) struct Message {
    pub message: &'static str,
}

/// `?residence_id=` for admins; everyone else is pinned to their own residence
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResidenceQuery {
    pub residence_id: Option<String>,
}

pub(crate) fn target_residence(identity: &Identity, query: ResidenceQuery) -> AppResult<String> {
    let residence_id = if identity.is_admin() {
        query
            .residence_id
            .ok_or_else(|| AppError::validation("residence_id is required"))?
    } else {
        identity.residence_id()?.to_string()
    };
    identity.ensure_manages(&residence_id)?;
    Ok(residence_id)
}

/// GET /api/health - Health check
async fn health_check() -> ApiResult<serde_json::Value> {
    ok(serde_json::json!({ "status": "ok", "version": crate::VERSION }))
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        // Session
        .route("/auth/otp/request", post(session::request_code))
        .route("/auth/otp/verify", post(session::verify_code))
        .route("/auth/logout", post(session::logout))
        .route("/auth/signup", post(session::signup))
        .route("/me", get(session::me).patch(session::update_me).delete(session::delete_me))
        .route("/me/balance", get(session::my_balance))
        .route("/me/access-code", get(session::my_access_code))
        .route("/me/access-code/regenerate", post(session::regenerate_access_code))
        .route("/onboarding/claim", post(session::claim))
        // People
        .route("/onboarding/codes", get(members::list_codes).post(members::issue_code))
        .route("/onboarding/codes/:id", delete(members::revoke_code))
        .route("/residences/:id/registrations", post(members::submit_registration))
        .route("/registrations", get(members::list_registrations))
        .route("/registrations/:id/approve", post(members::approve_registration))
        .route("/registrations/:id/reject", post(members::reject_registration))
        .route("/residents", get(members::list_residents))
        .route("/residents/import", post(members::import_residents))
        .route(
            "/residents/:id",
            get(members::get_resident)
                .patch(members::update_resident)
                .delete(members::remove_resident),
        )
        .route("/residents/:id/balance", get(members::resident_balance))
        .route("/guards", get(members::list_guards))
        .route("/guard/verify", post(members::verify_access_code))
        // Money
        .route("/fees", get(finance::list_fees).post(finance::create_fee))
        .route("/fees/:id", patch(finance::update_fee).delete(finance::delete_fee))
        .route("/fees/:id/payments", post(finance::record_payment))
        .route("/contributions", get(finance::list_contributions).post(finance::create_contribution))
        .route("/contributions/generate", post(finance::generate_fees))
        .route(
            "/contributions/:id",
            patch(finance::update_contribution).delete(finance::delete_contribution),
        )
        .route("/payments", get(finance::list_payments))
        .route("/payments/:id", delete(finance::void_payment))
        .route("/payments/:id/receipt", get(finance::receipt))
        .route("/expenses", get(finance::list_expenses).post(finance::create_expense))
        .route("/expenses/:id", patch(finance::update_expense).delete(finance::delete_expense))
        .route("/residence", get(finance::get_residence).patch(finance::update_residence))
        .route("/residence/summary", get(finance::residence_summary))
        .route("/reminders", post(finance::send_reminders))
        // Back-office
        .route("/admin/residences", get(admin::list_residences).post(admin::create_residence))
        .route("/admin/residences/:id", delete(admin::delete_residence))
        .route("/admin/syndics", get(admin::list_syndics))
        .route("/admin/syndics/:id/approve", post(admin::approve_syndic))
        .route("/admin/syndics/:id/reject", post(admin::reject_syndic))
        .route("/admin/stats", get(admin::stats))
        .route("/admin/events", get(admin::events));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
