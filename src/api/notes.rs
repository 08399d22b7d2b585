//! Worker notes API endpoints.

use axum::extract::{Path, State};

use super::{error, success, ApiJson, ApiResult};
use crate::models::{NotesOverviewEntry, SaveNoteRequest, WorkerNote};
use crate::AppState;

/// GET /api/notes - Every worker with its summary and whether it has a note.
pub async fn list_notes(State(state): State<AppState>) -> ApiResult<Vec<NotesOverviewEntry>> {
    let revision_id = state.ledger.revision_id().await;

    match state.ledger.notes_overview().await {
        Ok(entries) => success(entries, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/workers/:id/notes - Load a worker's note.
pub async fn get_note(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<WorkerNote> {
    let revision_id = state.ledger.revision_id().await;

    match state.ledger.note(id).await {
        Ok(note) => success(note, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/workers/:id/notes - Replace a worker's note.
pub async fn save_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(request): ApiJson<SaveNoteRequest>,
) -> ApiResult<WorkerNote> {
    let revision_id = state.ledger.revision_id().await;

    match state.ledger.save_note(id, request.text).await {
        Ok((note, new_revision)) => success(note, new_revision),
        Err(e) => error(e, revision_id),
    }
}
