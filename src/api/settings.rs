//! Settings API endpoints.

use axum::extract::State;

use super::{error, success, ApiJson, ApiResult};
use crate::models::{SaveSettingsRequest, SettingsView};
use crate::AppState;

/// GET /api/settings - Load the settings, or the defaults when none were saved.
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<SettingsView> {
    let revision_id = state.ledger.revision_id().await;
    let settings = state.ledger.settings().await;
    success(SettingsView::from(&settings), revision_id)
}

/// PUT /api/settings - Replace the settings record.
pub async fn save_settings(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SaveSettingsRequest>,
) -> ApiResult<SettingsView> {
    let revision_id = state.ledger.revision_id().await;

    let settings = match request.into_settings() {
        Ok(settings) => settings,
        Err(e) => return error(e, revision_id),
    };

    match state.ledger.save_settings(settings).await {
        Ok((saved, new_revision)) => success(SettingsView::from(&saved), new_revision),
        Err(e) => error(e, revision_id),
    }
}
