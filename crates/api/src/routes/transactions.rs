//! Order endpoints: create, read, list and status transitions.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{ItemId, ItemStatus, Money, TransactionId, TransactionStatus, UserId};
use serde::{Deserialize, Serialize};
use store::{Item, MarketStore, Transaction};

use crate::actor::CurrentActor;
use crate::error::ApiError;
use crate::state::AppState;

use super::{PageParams, parse_id};

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub item_id: ItemId,
    pub offered_price_cents: i64,
}

/// Body of `PUT /transactions/{id}`.
///
/// `status` is kept as a string so the legacy names `ITEM_SENT` and
/// `RECEIVED` are accepted and unknown names are reported as an invalid
/// transition instead of a decoding error.
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    pub description: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct ItemSummary {
    pub id: ItemId,
    pub title: String,
    pub status: ItemStatus,
    pub price_cents: i64,
}

impl From<Item> for ItemSummary {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            title: item.title,
            status: item.status,
            price_cents: item.price.cents(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: TransactionId,
    pub item_id: ItemId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub offered_price_cents: i64,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionResponse {
    pub fn with_item(mut self, item: Item) -> Self {
        self.item = Some(item.into());
        self
    }
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            item_id: tx.item_id,
            buyer_id: tx.buyer_id,
            seller_id: tx.seller_id,
            offered_price_cents: tx.offered_price.cents(),
            status: tx.status,
            item: None,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

/// Builds the detailed representation with the item resolved.
pub(crate) async fn resolved<S: MarketStore + 'static>(
    state: &AppState<S>,
    tx: Transaction,
) -> Result<TransactionResponse, ApiError> {
    let item = state.items.get(tx.item_id).await?;
    Ok(TransactionResponse::from(tx).with_item(item))
}

// -- Handlers --

/// POST /transactions: place an offer on an item.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentActor(actor): CurrentActor,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let Json(req) = payload?;

    let tx = state
        .orders
        .create_transaction(&actor, req.item_id, Money::from_cents(req.offered_price_cents))
        .await?;

    Ok((StatusCode::CREATED, Json(resolved(&state, tx).await?)))
}

/// GET /transactions: the caller's orders as buyer or seller, newest first.
#[tracing::instrument(skip(state, params))]
pub async fn list<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentActor(actor): CurrentActor,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let Query(params) = params?;

    let transactions = state.orders.list_for_user(&actor, params.into()).await?;
    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}

/// GET /transactions/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let transaction_id: TransactionId = parse_id(&id)?;

    let tx = state.orders.get_transaction(&actor, transaction_id).await?;
    Ok(Json(resolved(&state, tx).await?))
}

/// PUT /transactions/{id}: request a status transition.
#[tracing::instrument(skip(state, payload))]
pub async fn transition<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    payload: Result<Json<TransitionRequest>, JsonRejection>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let transaction_id: TransactionId = parse_id(&id)?;
    let Json(req) = payload?;

    let note = req.description.filter(|d| !d.trim().is_empty());

    let tx = state
        .orders
        .request_transition(transaction_id, &req.status, &actor, note)
        .await?;

    Ok(Json(resolved(&state, tx).await?))
}
