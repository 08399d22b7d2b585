//! QR capture API endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
};
use uuid::Uuid;

use super::wallet::pay_decoded;
use super::{error, success, ApiJson, ApiResult};
use crate::capture::decode_qr;
use crate::errors::AppError;
use crate::models::{CaptureOutcome, CaptureSessionView, OpenCaptureRequest};
use crate::AppState;

/// POST /api/capture - Open the capture surface, optionally for a worker.
pub async fn open_capture(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<OpenCaptureRequest>,
) -> ApiResult<CaptureSessionView> {
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

    success(state.capture.open(worker), revision_id)
}

/// GET /api/capture/:id - Inspect the open capture.
pub async fn get_capture(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CaptureSessionView> {
    let revision_id = state.ledger.revision_id().await;

    match state.capture.view(id) {
        Ok(view) => success(view, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/capture/:id - Stop the camera and close the surface.
pub async fn close_capture(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CaptureSessionView> {
    let revision_id = state.ledger.revision_id().await;

    match state.capture.close(id) {
        Ok(view) => success(view, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/capture/:id/frame - Submit a camera frame.
///
/// A frame without a readable QR code keeps the capture scanning.
pub async fn submit_frame(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<CaptureOutcome> {
    let revision_id = state.ledger.revision_id().await;

    if let Err(e) = state.capture.view(id) {
        return error(e, revision_id);
    }

    match decode_in_background(body).await {
        Ok(text) => pay_capture(&state, id, &text, revision_id).await,
        Err(AppError::Decode(reason)) => {
            tracing::trace!(session = %id, %reason, "Frame without QR code");
            match state.capture.record_miss(id) {
                Ok(session) => success(CaptureOutcome::Scanning { session }, revision_id),
                Err(e) => error(e, revision_id),
            }
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/capture/:id/upload - Submit an image file.
///
/// An image without a readable QR code fails this attempt; the capture stays
/// open so another file can be tried.
pub async fn submit_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<CaptureOutcome> {
    let revision_id = state.ledger.revision_id().await;

    if let Err(e) = state.capture.view(id) {
        return error(e, revision_id);
    }

    match decode_in_background(body).await {
        Ok(text) => pay_capture(&state, id, &text, revision_id).await,
        Err(AppError::Decode(reason)) => {
            tracing::info!(session = %id, %reason, "Uploaded image without QR code");
            error(
                AppError::Decode("Could not read the QR from the image".to_string()),
                revision_id,
            )
        }
        Err(e) => error(e, revision_id),
    }
}

/// Close the capture and pay what it decoded.
async fn pay_capture(
    state: &AppState,
    id: Uuid,
    text: &str,
    revision_id: i64,
) -> ApiResult<CaptureOutcome> {
    let worker = match state.capture.take_for_payment(id) {
        Ok(worker) => worker,
        Err(e) => return error(e, revision_id),
    };

    match pay_decoded(state, text, worker.as_ref()).await {
        Ok(receipt) => success(CaptureOutcome::Paid { receipt }, revision_id),
        Err(e) => error(e, revision_id),
    }
}

async fn decode_in_background(bytes: Bytes) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || decode_qr(&bytes))
        .await
        .map_err(|e| AppError::Internal(format!("QR decoding task failed: {}", e)))?
}
