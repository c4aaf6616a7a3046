// Admin back-office

use super::members::RejectBody;
use super::{ok, ApiJson, ApiQuery, ApiResult, AppState, Message};
use crate::auth::Identity;
use crate::db::{get_events_for_entity, get_recent_events, Event};
use crate::entities::{Profile, ProfileStatus, Residence, Role};
use crate::error::AppError;
use crate::residences::{self, AdminStats, ResidenceInput, ResidenceOverview};
use axum::extract::{Path, State};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SyndicQuery {
    pub status: Option<ProfileStatus>,
}

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/admin/residences
pub async fn list_residences(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<Vec<ResidenceOverview>> {
    let conn = state.db()?;
    ok(residences::list_residences(&conn, &identity)?)
}

/// POST /api/admin/residences
pub async fn create_residence(
    State(state): State<AppState>,
    identity: Identity,
    ApiJson(body): ApiJson<ResidenceInput>,
) -> ApiResult<Residence> {
    let conn = state.db()?;
    ok(residences::create_residence(&conn, &identity, body)?)
}

/// DELETE /api/admin/residences/:id
pub async fn delete_residence(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Message> {
    let conn = state.db()?;
    residences::delete_residence(&conn, &identity, &id)?;
    ok(Message { message: "Residence deleted" })
}

/// GET /api/admin/syndics
pub async fn list_syndics(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<SyndicQuery>,
) -> ApiResult<Vec<Profile>> {
    let conn = state.db()?;
    ok(residences::list_syndics(&conn, &identity, query.status)?)
}

/// POST /api/admin/syndics/:id/approve
pub async fn approve_syndic(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Profile> {
    let conn = state.db()?;
    ok(residences::approve_syndic(&conn, state.mailer.as_ref(), &identity, &id)?)
}

/// POST /api/admin/syndics/:id/reject
pub async fn reject_syndic(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RejectBody>,
) -> ApiResult<Profile> {
    let conn = state.db()?;
    ok(residences::reject_syndic(&conn, state.mailer.as_ref(), &identity, &id, body.reason)?)
}

/// GET /api/admin/stats
pub async fn stats(State(state): State<AppState>, identity: Identity) -> ApiResult<AdminStats> {
    let conn = state.db()?;
    ok(residences::admin_stats(&conn, &identity)?)
}

/// GET /api/admin/events - audit trail, one entity or the latest overall
pub async fn events(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<EventQuery>,
) -> ApiResult<Vec<Event>> {
    identity.require_role(&[Role::Admin])?;
    let conn = state.db()?;

    let events = match (query.entity_type, query.entity_id) {
        (Some(entity_type), Some(entity_id)) => get_events_for_entity(&conn, &entity_type, &entity_id)?,
        (None, None) => get_recent_events(&conn, query.limit.unwrap_or(100).min(1000))?,
        _ => return Err(AppError::validation("entity_type and entity_id go together")),
    };
    ok(events)
}
