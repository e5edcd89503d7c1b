//! Read access to the audit trail.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use store::{ActivityLog, ActivityQuery, EntityType, MarketStore, Page};
use uuid::Uuid;

use crate::actor::CurrentActor;
use crate::error::ApiError;
use crate::state::AppState;

use super::PageParams;

/// GET /activity/{entity_type}/{entity_id}: oldest first, admins only.
#[tracing::instrument(skip(state, params))]
pub async fn trail<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentActor(actor): CurrentActor,
    Path((entity_type, entity_id)): Path<(String, String)>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<Vec<ActivityLog>>, ApiError> {
    let Query(params) = params?;

    let entity_type: EntityType = entity_type
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let entity_id = Uuid::parse_str(&entity_id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;

    let mut query = ActivityQuery::new();
    query.limit = params.limit.map(|limit| limit.min(Page::MAX_LIMIT));
    query.offset = params.offset;

    let rows = state
        .activity
        .trail(&actor, entity_type, entity_id, query)
        .await?;
    Ok(Json(rows))
}

/// GET /activity/export: the whole log as NDJSON, admins only.
///
/// Rows are encoded as they arrive from the store.
#[tracing::instrument(skip(state))]
pub async fn export<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentActor(actor): CurrentActor,
) -> Result<Response, ApiError> {
    let rows = state.activity.export(&actor).await?;

    let lines = rows
        .map_err(std::io::Error::other)
        .and_then(|row| async move {
            let mut line = serde_json::to_vec(&row)?;
            line.push(b'\n');
            Ok(line)
        })
        .inspect_err(|e| tracing::error!(error = %e, "activity export aborted"));

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}
