use axum::{extract::State, http::StatusCode, Json};

use crate::dto::{EntryHookRequest, EntryHookResponse};
use crate::AppState;

/// Entry-mutation notification from the CRUD layer. Always answers 202; the
/// streak recompute happens on the background worker.
pub async fn entry_changed(
    State(state): State<AppState>,
    Json(body): Json<EntryHookRequest>,
) -> (StatusCode, Json<EntryHookResponse>) {
    let queued = state.streak_updater.notify(body.user_id, body.event);
    (StatusCode::ACCEPTED, Json(EntryHookResponse { queued }))
}
