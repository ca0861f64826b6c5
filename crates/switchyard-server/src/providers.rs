use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use switchyard_health::ProviderStateRegistry;

/// Current runtime state of every provider seen so far, sorted by id
pub async fn providers_handler(State(registry): State<Arc<ProviderStateRegistry>>) -> impl IntoResponse {
    Json(registry.all())
}
