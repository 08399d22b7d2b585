//! Invoice lifecycle: creation, display and payment polling.

mod poller;

pub use poller::*;

use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};

use crate::errors::AppError;

/// Render a payment request as a scannable SVG QR code.
pub fn render_qr_svg(payment_request: &str) -> Result<String, AppError> {
    let code = QrCode::with_error_correction_level(payment_request.as_bytes(), EcLevel::H)
        .map_err(|e| AppError::Internal(format!("Failed to encode QR code: {}", e)))?;

    Ok(code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}
