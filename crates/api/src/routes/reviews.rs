use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{ItemId, ReviewId, TransactionId, UserId};
use serde::{Deserialize, Serialize};
use store::{MarketStore, Review};

use crate::actor::CurrentActor;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub transaction_id: TransactionId,
    pub rating: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewFilter {
    pub item_id: Option<ItemId>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: ReviewId,
    pub transaction_id: TransactionId,
    pub item_id: ItemId,
    pub reviewer_id: UserId,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Review> for ReviewResponse {
    fn from(r: Review) -> Self {
        Self {
            id: r.id,
            transaction_id: r.transaction_id,
            item_id: r.item_id,
            reviewer_id: r.reviewer_id,
            rating: r.rating,
            comment: r.comment,
            created_at: r.created_at,
        }
    }
}

/// POST /reviews
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentActor(actor): CurrentActor,
    payload: Result<Json<CreateReviewRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReviewResponse>), ApiError> {
    let Json(req) = payload?;

    // Out-of-range values fall through to the 1..=5 check.
    let rating = u8::try_from(req.rating).unwrap_or(0);

    let review = state
        .reviews
        .create(&actor, req.transaction_id, rating, req.comment)
        .await?;

    Ok((StatusCode::CREATED, Json(review.into())))
}

/// GET /reviews?item_id=
#[tracing::instrument(skip(state, filter))]
pub async fn list<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    filter: Result<Query<ReviewFilter>, QueryRejection>,
) -> Result<Json<Vec<ReviewResponse>>, ApiError> {
    let Query(filter) = filter?;

    let reviews = state.reviews.list(filter.item_id).await?;
    Ok(Json(reviews.into_iter().map(Into::into).collect()))
}
