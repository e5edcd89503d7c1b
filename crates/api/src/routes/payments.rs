//! Checkout and the payment provider webhook.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{PaymentId, PaymentStatus, TransactionId};
use domain::{PaymentOutcome, ProviderStatus};
use serde::{Deserialize, Serialize};
use store::{MarketStore, Payment};

use crate::actor::CurrentActor;
use crate::error::ApiError;
use crate::state::AppState;

use super::parse_id;
use super::transactions::{TransactionResponse, resolved};

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    pub method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackRequest {
    pub status: Option<String>,
    pub method: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: PaymentId,
    pub transaction_id: TransactionId,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: Option<String>,
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            transaction_id: p.transaction_id,
            amount_cents: p.amount.cents(),
            currency: p.currency,
            status: p.status,
            method: p.method,
            external_reference: p.external_reference,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub message: &'static str,
    pub payment_id: PaymentId,
    pub amount_cents: i64,
    pub currency: String,
    pub redirect_url: String,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub message: &'static str,
    pub payment: PaymentResponse,
    pub transaction: TransactionResponse,
}

/// Decodes an optional JSON body; an empty body yields the default.
fn optional_json<T>(body: &Bytes) -> Result<T, ApiError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

// -- Handlers --

/// POST /transactions/{id}/checkout: open a pending payment.
#[tracing::instrument(skip(state, body))]
pub async fn checkout<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let transaction_id: TransactionId = parse_id(&id)?;
    let req: CheckoutRequest = optional_json(&body)?;

    let payment = state
        .payments
        .checkout(transaction_id, &actor, req.method)
        .await?;

    Ok(Json(CheckoutResponse {
        message: "Checkout session created",
        payment_id: payment.id,
        amount_cents: payment.amount.cents(),
        currency: payment.currency,
        redirect_url: format!("/mock-payment/{}", payment.id),
    }))
}

/// GET /transactions/{id}/payments
#[tracing::instrument(skip(state))]
pub async fn list_for_transaction<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<Vec<PaymentResponse>>, ApiError> {
    let transaction_id: TransactionId = parse_id(&id)?;

    let payments = state.payments.payments_for(transaction_id, &actor).await?;
    Ok(Json(payments.into_iter().map(Into::into).collect()))
}

/// POST /payments/{id}/callback: provider webhook. A missing status counts
/// as success; anything other than `success` is a failure.
#[tracing::instrument(skip(state, body))]
pub async fn callback<S: MarketStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<CallbackResponse>, ApiError> {
    let payment_id: PaymentId = parse_id(&id)?;
    let req: CallbackRequest = optional_json(&body)?;

    let status = match req.status.as_deref().map(str::trim) {
        None => ProviderStatus::Success,
        Some(s) if s.eq_ignore_ascii_case("success") => ProviderStatus::Success,
        Some(_) => ProviderStatus::Failed,
    };

    match state.payments.callback(payment_id, status, req.method).await? {
        PaymentOutcome::Paid {
            payment,
            transaction,
        } => Ok(Json(CallbackResponse {
            message: "Payment successful and order advanced.",
            payment: payment.into(),
            transaction: resolved(&state, transaction).await?,
        })),
        PaymentOutcome::Failed { .. } => Err(ApiError::BadRequest("Payment failed.".to_string())),
    }
}
