//! Item listing endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CategoryId, ItemCondition, ItemId, ItemStatus, Money, UserId};
use domain::NewItem;
use serde::{Deserialize, Serialize};
use store::{Item, MarketStore};

use crate::actor::CurrentActor;
use crate::error::ApiError;
use crate::state::AppState;

use super::parse_id;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub category_id: CategoryId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub condition: ItemCondition,
    pub price_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemStatusRequest {
    pub status: ItemStatus,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub id: ItemId,
    pub owner_id: UserId,
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
    pub condition: ItemCondition,
    pub price_cents: i64,
    pub status: ItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Item> for ItemResponse {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            owner_id: item.owner_id,
            category_id: item.category_id,
            title: item.title,
            description: item.description,
            condition: item.condition,
            price_cents: item.price.cents(),
            status: item.status,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

// -- Handlers --

/// POST /items: list a new item owned by the caller.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentActor(actor): CurrentActor,
    payload: Result<Json<CreateItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ItemResponse>), ApiError> {
    let Json(req) = payload?;

    let item = state
        .items
        .create(
            &actor,
            NewItem {
                category_id: req.category_id,
                title: req.title,
                description: req.description,
                condition: req.condition,
                price: Money::from_cents(req.price_cents),
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(item.into())))
}

/// GET /items/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ItemResponse>, ApiError> {
    let item_id: ItemId = parse_id(&id)?;
    let item = state.items.get(item_id).await?;
    Ok(Json(item.into()))
}

/// PUT /items/{id}/status: explicit owner edit of availability.
#[tracing::instrument(skip(state, payload))]
pub async fn update_status<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    payload: Result<Json<UpdateItemStatusRequest>, JsonRejection>,
) -> Result<Json<ItemResponse>, ApiError> {
    let item_id: ItemId = parse_id(&id)?;
    let Json(req) = payload?;

    let item = state
        .items
        .update_status(&actor, item_id, req.status)
        .await?;
    Ok(Json(item.into()))
}
