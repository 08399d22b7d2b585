//! Invoice API endpoints.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};

use super::{error, success, ApiJson, ApiResult, ConfirmQuery};
use crate::errors::{AppError, AppErrorWithRevision};
use crate::invoices::render_qr_svg;
use crate::models::{CreateInvoiceRequest, InvoiceView, PendingInvoice};
use crate::AppState;

fn view(state: &AppState, invoice: PendingInvoice) -> InvoiceView {
    let poll = state.poller.status(invoice.id);
    InvoiceView::new(invoice, poll)
}

fn invoice_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Invoice {} not found", id))
}

/// GET /api/invoices - List pending invoices, newest first.
pub async fn list_invoices(State(state): State<AppState>) -> ApiResult<Vec<InvoiceView>> {
    let revision_id = state.ledger.revision_id().await;
    let invoices = state
        .ledger
        .invoices()
        .await
        .into_iter()
        .map(|invoice| view(&state, invoice))
        .collect();
    success(invoices, revision_id)
}

/// POST /api/invoices - Create an invoice and start following its payment.
pub async fn create_invoice(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateInvoiceRequest>,
) -> ApiResult<InvoiceView> {
    let revision_id = state.ledger.revision_id().await;

    // Validate before touching the wallet
    let amount = match u64::try_from(request.amount) {
        Ok(amount) if amount > 0 => amount,
        _ => {
            return error(
                AppError::Validation("Amount must be a whole number greater than 0".to_string()),
                revision_id,
            )
        }
    };
    let memo = request.memo.unwrap_or_default().trim().to_string();

    let creds = match state.ledger.settings().await.credentials() {
        Ok(creds) => creds,
        Err(e) => return error(e, revision_id),
    };

    let created = match state.wallet.create_invoice(&creds, amount, &memo).await {
        Ok(created) => created,
        Err(e) => return error(e, revision_id),
    };

    match state.ledger.record_invoice(created, amount, memo).await {
        Ok((invoice, new_revision)) => {
            let poll = state.poller.start(&invoice);
            success(InvoiceView::new(invoice, poll), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/invoices/:id - Get an invoice with its poll status.
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<InvoiceView> {
    let revision_id = state.ledger.revision_id().await;

    match state.ledger.invoice(id).await {
        Some(invoice) => success(view(&state, invoice), revision_id),
        None => error(invoice_not_found(id), revision_id),
    }
}

/// DELETE /api/invoices/:id?confirm=true - Delete an unpaid invoice.
pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(confirm): Query<ConfirmQuery>,
) -> ApiResult<PendingInvoice> {
    let revision_id = state.ledger.revision_id().await;

    if let Err(e) = confirm.require("deleting this invoice") {
        return error(e, revision_id);
    }

    match state.ledger.delete_invoice(id).await {
        Ok((invoice, new_revision)) => {
            state.poller.forget(id);
            success(invoice, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/invoices/:id/qr - The payment request as an SVG QR code.
pub async fn get_invoice_qr(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppErrorWithRevision> {
    let revision_id = state.ledger.revision_id().await;
    let with_revision = |error| AppErrorWithRevision { error, revision_id };

    let invoice = state
        .ledger
        .invoice(id)
        .await
        .ok_or_else(|| with_revision(invoice_not_found(id)))?;
    let svg = render_qr_svg(&invoice.bolt11).map_err(with_revision)?;

    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

/// POST /api/invoices/:id/poll - Follow an invoice again with a fresh attempt budget.
pub async fn start_invoice_poll(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<InvoiceView> {
    let revision_id = state.ledger.revision_id().await;

    match state.ledger.invoice(id).await {
        Some(invoice) => {
            let poll = state.poller.start(&invoice);
            success(InvoiceView::new(invoice, poll), revision_id)
        }
        None => error(invoice_not_found(id), revision_id),
    }
}

/// DELETE /api/invoices/:id/poll - Stop following an invoice.
pub async fn cancel_invoice_poll(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<InvoiceView> {
    let revision_id = state.ledger.revision_id().await;

    match state.ledger.invoice(id).await {
        Some(invoice) => {
            state.poller.cancel(id);
            success(view(&state, invoice), revision_id)
        }
        None => error(invoice_not_found(id), revision_id),
    }
}
