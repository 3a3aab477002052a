//! Query Gateway
//!
//! HTTP entry point of a member. Translates requests into `KeyRouter` calls
//! and outcomes into status codes; nothing else.
//!
//! ## Routes
//! - `GET /messages/processors`: members and their partitions.
//! - `GET /messages/:key`: lookup, forwarded to the owner when needed.
//! - `GET /internal/messages/:key`: lookup answered from the local store only,
//!   used by peers when forwarding.

pub mod handlers;
pub mod protocol;


use anyhow::Result;
use axum::{Extension, Router, routing::get};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::router::KeyRouter;
use handlers::{handle_get, handle_get_local, handle_processors};
use protocol::{ENDPOINT_GET, ENDPOINT_GET_LOCAL, ENDPOINT_PROCESSORS};

/// The gateway's route table.
pub fn routes(key_router: Arc<KeyRouter>) -> Router {
    Router::new()
        .route(ENDPOINT_PROCESSORS, get(handle_processors))
        .route(ENDPOINT_GET, get(handle_get))
        .route(ENDPOINT_GET_LOCAL, get(handle_get_local))
        .layer(Extension(key_router))
}

/// Serves the gateway on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, key_router: Arc<KeyRouter>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let member = key_router.local_member().clone();
    tracing::info!(
        "Query gateway for {} listening on {}",
        member,
        listener.local_addr()?
    );

    axum::serve(listener, routes(key_router))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Query gateway for {} stopped", member);
    Ok(())
}
