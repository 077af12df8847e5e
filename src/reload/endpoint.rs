//! Hot-reload HTTP endpoints.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Router,
};
use futures_util::stream;

use crate::reload::registry::{HotReloadRegistry, RELOAD_MESSAGE};

pub const STREAM_PATH: &str = "/__hot-reload__";
pub const CLIENT_SCRIPT_PATH: &str = "/__hot-reload__/client.js";

const CLIENT_SCRIPT: &str = include_str!("assets/hot-reload-client.js");

/// Routes served on every port whose registry exists.
pub fn routes(registry: Arc<HotReloadRegistry>) -> Router {
    Router::new()
        .route(STREAM_PATH, get(stream_reloads))
        .route(CLIENT_SCRIPT_PATH, get(client_script))
        .with_state(registry)
}

async fn stream_reloads(State(registry): State<Arc<HotReloadRegistry>>) -> Response {
    let Some(subscription) = registry.subscribe() else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let events = stream::unfold(subscription, |mut sub| async move {
        sub.next_reload().await?;
        Some((Ok::<_, Infallible>(Event::default().data(RELOAD_MESSAGE)), sub))
    });

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn client_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        CLIENT_SCRIPT,
    )
}
