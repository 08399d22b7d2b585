//! QR capture surface models.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PaymentReceipt;

/// Camera stream state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CameraState {
    Starting,
    Scanning,
    Stopped,
}

/// Request body for opening the capture surface.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenCaptureRequest {
    /// Worker the scanned invoice will be attributed to
    #[serde(default)]
    pub worker_id: Option<i64>,
}

/// Snapshot of the capture surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSessionView {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
    pub camera: CameraState,
    pub status_line: String,
    pub open: bool,
}

/// What happened to a submitted camera frame or image.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CaptureOutcome {
    /// Nothing decoded; the camera keeps scanning
    Scanning { session: CaptureSessionView },
    /// An invoice was decoded and paid; the surface is closed
    Paid { receipt: PaymentReceipt },
}
