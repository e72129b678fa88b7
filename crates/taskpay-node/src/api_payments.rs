//! Payment-gateway proxy endpoints.
//!
//! Thin validation layer in front of the provider: the browser client never
//! sees provider credentials, and malformed requests are rejected before
//! any upstream call is made.

use crate::api::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskpay_payments::{PushRequest, TransactionStatus};
use taskpay_types::phone;
use tracing::{info, warn};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBody {
    phone_number: Option<String>,
    amount: Option<f64>,
    reference: Option<String>,
    description: Option<String>,
}

#[derive(Serialize)]
pub struct PushProxyResponse {
    pub success: bool,
    pub reference: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_reference: Option<String>,
}

#[derive(Serialize)]
pub struct ProxyError {
    pub success: bool,
    pub error: String,
}

fn reject(status: StatusCode, error: &str) -> (StatusCode, Json<ProxyError>) {
    (
        status,
        Json(ProxyError {
            success: false,
            error: error.to_string(),
        }),
    )
}

pub async fn push_payment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PushBody>,
) -> Result<Json<PushProxyResponse>, (StatusCode, Json<ProxyError>)> {
    let (Some(phone_number), Some(amount), Some(reference)) =
        (body.phone_number, body.amount, body.reference)
    else {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Missing phoneNumber, amount, or reference",
        ));
    };

    let Some(msisdn) = phone::normalize_msisdn(&phone_number) else {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Invalid phone number format. Use 07XXXXXXXX or 254XXXXXXXXX",
        ));
    };

    if !amount.is_finite() || amount <= 0.0 {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Amount must be a positive number",
        ));
    }

    info!(
        reference = %reference,
        amount,
        "Push payment requested via proxy"
    );
    state.metrics.payments_initiated.inc();

    let request = PushRequest {
        phone: msisdn,
        amount_kes: amount.round() as u64,
        reference: reference.clone(),
        description: body.description,
    };

    match state.node.gateway.initiate_push(&request).await {
        Ok(ack) => Ok(Json(PushProxyResponse {
            success: true,
            // Always hand the client back its own reference
            reference,
            message: "Push payment initiated".to_string(),
            provider_reference: ack.provider_reference,
        })),
        Err(e) => {
            warn!(reference = %reference, error = %e, "Push initiation failed upstream");
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))
        }
    }
}

#[derive(Deserialize)]
pub struct StatusQuery {
    reference: Option<String>,
}

#[derive(Serialize)]
pub struct StatusProxyResponse {
    pub success: bool,
    pub status: TransactionStatus,
}

pub async fn payment_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusProxyResponse>, (StatusCode, Json<ProxyError>)> {
    let Some(reference) = query.reference else {
        return Err(reject(StatusCode::BAD_REQUEST, "Missing reference"));
    };

    match state.node.gateway.transaction_status(&reference).await {
        Ok(status) => Ok(Json(StatusProxyResponse {
            success: true,
            status,
        })),
        Err(e) => {
            warn!(reference = %reference, error = %e, "Status lookup failed upstream");
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))
        }
    }
}
