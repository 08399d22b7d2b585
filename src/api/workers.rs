//! Worker API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};

use super::wallet::pay_decoded;
use super::{error, success, ApiJson, ApiResult, ConfirmQuery};
use crate::errors::{AppError, AppErrorWithRevision};
use crate::invoices::render_qr_svg;
use crate::models::{
    CreateWorkerRequest, CreateWorkerResult, DeleteWorkerResult, PayInvoiceRequest,
    PaymentReceipt, Worker,
};
use crate::AppState;

/// GET /api/workers - List workers in insertion order.
pub async fn list_workers(State(state): State<AppState>) -> ApiResult<Vec<Worker>> {
    let revision_id = state.ledger.revision_id().await;
    success(state.ledger.workers().await, revision_id)
}

/// POST /api/workers - Add a worker and return the updated list.
pub async fn create_worker(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateWorkerRequest>,
) -> ApiResult<CreateWorkerResult> {
    let revision_id = state.ledger.revision_id().await;

    match state.ledger.add_worker(&request).await {
        Ok((worker, workers, new_revision)) => {
            success(CreateWorkerResult { worker, workers }, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/workers/:id?confirm=true - Delete a worker.
pub async fn delete_worker(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(confirm): Query<ConfirmQuery>,
) -> ApiResult<DeleteWorkerResult> {
    let revision_id = state.ledger.revision_id().await;

    if let Err(e) = confirm.require("deleting this worker") {
        return error(e, revision_id);
    }

    match state.ledger.delete_worker(id).await {
        Ok((removed, workers, new_revision)) => {
            success(DeleteWorkerResult { removed, workers }, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/workers/:id/pay - Pay an invoice attributed to a worker.
pub async fn pay_worker(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(request): ApiJson<PayInvoiceRequest>,
) -> ApiResult<PaymentReceipt> {
    let revision_id = state.ledger.revision_id().await;

    let Some(worker) = state.ledger.worker(id).await else {
        return error(
            AppError::NotFound(format!("Worker {} not found", id)),
            revision_id,
        );
    };

    match pay_decoded(&state, &request.bolt11, Some(&worker)).await {
        Ok(receipt) => success(receipt, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/workers/:id/qr - The worker's Lightning address as an SVG QR code.
pub async fn get_worker_qr(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppErrorWithRevision> {
    let revision_id = state.ledger.revision_id().await;
    let with_revision = |error| AppErrorWithRevision { error, revision_id };

    let worker = state
        .ledger
        .worker(id)
        .await
        .ok_or_else(|| with_revision(AppError::NotFound(format!("Worker {} not found", id))))?;
    let address = worker.address.as_deref().ok_or_else(|| {
        with_revision(AppError::NotFound(format!(
            "Worker {} has no Lightning address",
            id
        )))
    })?;
    let svg = render_qr_svg(address).map_err(with_revision)?;

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}
