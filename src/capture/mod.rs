//! QR capture surface.
//!
//! There is a single capture surface. It is fed either camera frames, where a
//! frame without a QR code just keeps the camera scanning, or an uploaded
//! image, where a failed read ends that attempt. A decoded payload closes the
//! surface and goes to the payment path once it passes prefix validation.

use std::io::Cursor;
use std::sync::{Mutex, MutexGuard};

use image::{ImageError, ImageReader, Limits};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{CameraState, CaptureSessionView, Worker};

/// Prefix every accepted Lightning invoice starts with (case-insensitive).
pub const INVOICE_PREFIX: &str = "lnbc";

/// Largest image accepted for a frame or upload.
pub const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

/// Largest width or height decoded from a frame or upload.
pub const MAX_IMAGE_DIMENSION: u32 = 4096;

const STATUS_STARTING: &str = "Starting camera...";
const STATUS_SCANNING: &str = "Point the camera at the QR...";
const STATUS_DETECTED: &str = "Invoice detected! Processing payment...";
const STATUS_CLOSED: &str = "Capture closed.";

/// Accept `text` only if it looks like a Lightning invoice.
pub fn validate_invoice_text(text: &str) -> Result<&str, AppError> {
    let text = text.trim();
    let has_prefix = text
        .get(..INVOICE_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(INVOICE_PREFIX));

    if has_prefix {
        Ok(text)
    } else {
        Err(AppError::Validation(
            "The scanned QR is not a valid Lightning invoice".to_string(),
        ))
    }
}

/// Decode the first readable QR code in an encoded image.
pub fn decode_qr(bytes: &[u8]) -> Result<String, AppError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::Decode(format!("Unreadable image: {}", e)))?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    reader.limits(limits);

    let image = reader
        .decode()
        .map_err(|e| match e {
            ImageError::Limits(_) => AppError::Decode(format!(
                "Image is larger than {0}x{0} pixels",
                MAX_IMAGE_DIMENSION
            )),
            other => AppError::Decode(format!("Unsupported image: {}", other)),
        })?
        .to_luma8();

    let (width, height) = image.dimensions();
    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
            image.get_pixel(x as u32, y as u32).0[0]
        });

    prepared
        .detect_grids()
        .into_iter()
        .find_map(|grid| grid.decode().ok().map(|(_, content)| content))
        .ok_or_else(|| AppError::Decode("No QR code found in the image".to_string()))
}

struct CaptureSession {
    id: Uuid,
    worker: Option<Worker>,
    camera: CameraState,
    status_line: String,
}

impl CaptureSession {
    fn view(&self, open: bool) -> CaptureSessionView {
        CaptureSessionView {
            id: self.id,
            worker_id: self.worker.as_ref().map(|w| w.id),
            worker_name: self.worker.as_ref().map(|w| w.name.clone()),
            camera: self.camera,
            status_line: self.status_line.clone(),
            open,
        }
    }

    fn stop_camera(&mut self) {
        if self.camera != CameraState::Stopped {
            self.camera = CameraState::Stopped;
            tracing::debug!(session = %self.id, "Camera stream stopped");
        }
    }
}

/// The one capture surface of the application.
#[derive(Default)]
pub struct CaptureSurface {
    slot: Mutex<Option<CaptureSession>>,
}

impl CaptureSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<CaptureSession>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open the surface, replacing (and stopping) any capture already open.
    pub fn open(&self, worker: Option<Worker>) -> CaptureSessionView {
        let mut slot = self.lock();
        if let Some(previous) = slot.as_mut() {
            previous.stop_camera();
            tracing::debug!(session = %previous.id, "Replaced open capture");
        }

        let session = CaptureSession {
            id: Uuid::new_v4(),
            worker,
            camera: CameraState::Starting,
            status_line: STATUS_STARTING.to_string(),
        };
        let view = session.view(true);
        tracing::info!(session = %session.id, worker_id = ?view.worker_id, "Capture opened");
        *slot = Some(session);
        view
    }

    /// Snapshot of the open capture with this id.
    pub fn view(&self, id: Uuid) -> Result<CaptureSessionView, AppError> {
        let slot = self.lock();
        match slot.as_ref() {
            Some(session) if session.id == id => Ok(session.view(true)),
            _ => Err(capture_not_found(id)),
        }
    }

    /// A camera frame held no QR code; keep scanning.
    pub fn record_miss(&self, id: Uuid) -> Result<CaptureSessionView, AppError> {
        let mut slot = self.lock();
        match slot.as_mut() {
            Some(session) if session.id == id => {
                session.camera = CameraState::Scanning;
                session.status_line = STATUS_SCANNING.to_string();
                Ok(session.view(true))
            }
            _ => Err(capture_not_found(id)),
        }
    }

    /// Something was decoded: stop the camera, close the surface and hand
    /// back the worker the payment is for.
    pub fn take_for_payment(&self, id: Uuid) -> Result<Option<Worker>, AppError> {
        let mut slot = self.lock();
        match slot.take() {
            Some(mut session) if session.id == id => {
                session.status_line = STATUS_DETECTED.to_string();
                session.stop_camera();
                tracing::info!(session = %id, "Capture closed after decode");
                Ok(session.worker)
            }
            other => {
                *slot = other;
                Err(capture_not_found(id))
            }
        }
    }

    /// Close the surface. The camera is stopped before the surface goes away.
    pub fn close(&self, id: Uuid) -> Result<CaptureSessionView, AppError> {
        let mut slot = self.lock();
        match slot.as_mut() {
            Some(session) if session.id == id => session.stop_camera(),
            _ => return Err(capture_not_found(id)),
        }

        let Some(mut session) = slot.take() else {
            return Err(capture_not_found(id));
        };
        session.worker = None;
        session.status_line = STATUS_CLOSED.to_string();
        tracing::info!(session = %id, "Capture closed");
        Ok(session.view(false))
    }
}

fn capture_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Capture {} is not open", id))
}
