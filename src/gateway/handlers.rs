use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::protocol::{ErrorBody, KeyValue, ProcessorMetadata};
use crate::router::{KeyRouter, LookupError};

/// Status code for a failed lookup.
pub fn status_for(error: &LookupError) -> StatusCode {
    match error {
        LookupError::NotFound => StatusCode::NOT_FOUND,
        LookupError::Unavailable(_) | LookupError::NotOwner { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        LookupError::RemoteUnreachable { source, .. } if source.is_timeout() => {
            StatusCode::GATEWAY_TIMEOUT
        }
        LookupError::RemoteUnreachable { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn respond(result: Result<KeyValue, LookupError>) -> Response {
    match result {
        Ok(kv) => (StatusCode::OK, Json(kv)).into_response(),
        Err(e) => (
            status_for(&e),
            Json(ErrorBody {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

pub async fn handle_get(
    Extension(router): Extension<Arc<KeyRouter>>,
    Path(key): Path<String>,
) -> Response {
    respond(router.route(&key).await)
}

pub async fn handle_get_local(
    Extension(router): Extension<Arc<KeyRouter>>,
    Path(key): Path<String>,
) -> Response {
    let result = router.route_local(&key);
    if let Err(LookupError::NotOwner { owner }) = &result {
        tracing::warn!(
            "Forwarded lookup for {} arrived here, but {} owns it",
            key,
            owner
        );
    }
    respond(result)
}

pub async fn handle_processors(
    Extension(router): Extension<Arc<KeyRouter>>,
) -> (StatusCode, Json<Vec<ProcessorMetadata>>) {
    let processors = router
        .list_members()
        .into_iter()
        .map(ProcessorMetadata::from)
        .collect();

    (StatusCode::OK, Json(processors))
}
