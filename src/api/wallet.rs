//! Wallet API endpoints: balance and outgoing payments.

use axum::extract::State;

use super::{error, success, ApiJson, ApiResult};
use crate::capture::validate_invoice_text;
use crate::errors::AppError;
use crate::models::{BalanceReport, PayInvoiceRequest, PaymentReceipt, Worker};
use crate::AppState;

/// GET /api/wallet/balance - Current wallet balance.
///
/// Missing settings fail with a configuration error. A wallet that cannot be
/// reached yields a zero balance carrying the connectivity error.
pub async fn get_balance(State(state): State<AppState>) -> ApiResult<BalanceReport> {
    let revision_id = state.ledger.revision_id().await;

    let creds = match state.ledger.settings().await.credentials() {
        Ok(creds) => creds,
        Err(e) => return error(e, revision_id),
    };

    success(state.wallet.balance_report(&creds).await, revision_id)
}

/// POST /api/payments - Pay a bolt11 invoice, optionally on behalf of a worker.
pub async fn pay_invoice(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<PayInvoiceRequest>,
) -> ApiResult<PaymentReceipt> {
    let revision_id = state.ledger.revision_id().await;

    let worker = match request.worker_id {
        Some(id) => match state.ledger.worker(id).await {
            Some(worker) => Some(worker),
            None => {
                return error(
                    AppError::NotFound(format!("Worker {} not found", id)),
                    revision_id,
                )
            }
        },
        None => None,
    };

    match pay_decoded(&state, &request.bolt11, worker.as_ref()).await {
        Ok(receipt) => success(receipt, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// Validate a decoded or pasted payload and pay it.
pub(crate) async fn pay_decoded(
    state: &AppState,
    text: &str,
    worker: Option<&Worker>,
) -> Result<PaymentReceipt, AppError> {
    let bolt11 = validate_invoice_text(text)?;
    let creds = state.ledger.settings().await.credentials()?;
    state.wallet.pay_and_refresh(&creds, bolt11, worker).await
}
