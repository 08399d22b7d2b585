//! REST API module.
//!
//! One handler module per surface: settings, workers, notes, wallet, invoices and capture.

mod capture;
mod invoices;
mod notes;
mod revision;
mod settings;
mod wallet;
mod workers;

pub use capture::*;
pub use invoices::*;
pub use notes::*;
pub use revision::*;
pub use settings::*;
pub use wallet::*;
pub use workers::*;

use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::errors::{AppError, AppErrorWithRevision};
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: AppError, revision_id: i64) -> ApiResult<T> {
    Err(AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// JSON body extractor whose rejections use the error envelope.
///
/// A body that is missing, malformed or of the wrong shape is a
/// `VALIDATION_ERROR`, like any other rejected input.
pub struct ApiJson<T>(pub T);

impl<T> FromRequest<AppState> for ApiJson<T>
where
    T: DeserializeOwned + Send,
{
    type Rejection = AppErrorWithRevision;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection.body_text(), "Rejected request body");
                Err(AppErrorWithRevision {
                    error: AppError::Validation(rejection.body_text()),
                    revision_id: state.ledger.revision_id().await,
                })
            }
        }
    }
}

/// Query flag guarding destructive actions.
#[derive(Debug, Default, Deserialize)]
pub struct ConfirmQuery {
    #[serde(default)]
    pub confirm: bool,
}

impl ConfirmQuery {
    /// Fail unless the caller explicitly confirmed `action`.
    pub fn require(&self, action: &str) -> Result<(), AppError> {
        if self.confirm {
            Ok(())
        } else {
            Err(AppError::ConfirmationRequired(format!(
                "Confirm {} by repeating the request with ?confirm=true",
                action
            )))
        }
    }
}
