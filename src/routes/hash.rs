//! Hash lookup route

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::error::Result;
use crate::state::AppState;
use crate::store::VersionRecord;

/// Create the hash router
pub fn router() -> Router<AppState> {
    Router::new().route("/:hash", get(get_by_hash))
}

/// GET /hash/:hash
///
/// Matches either the SHA-1 or the MD5 of a stored version.
async fn get_by_hash(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<VersionRecord>> {
    let record = state.store().find_by_hash(&hash.to_ascii_lowercase()).await?;
    Ok(Json(record))
}
