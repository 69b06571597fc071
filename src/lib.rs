use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{self, Method},
    middleware,
    response::IntoResponse,
    routing::{any, get},
};
use std::{collections::HashMap, sync::Arc};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::debug;

use crate::{
    metrics::{metrics_handler, metrics_middleware},
    socket::chat_socket,
    state::AppState,
};

pub mod actors;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod metrics;
pub mod model;
pub mod rate_limit;
pub mod socket;
pub mod state;

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(token) = params.get("token") else {
        return "Missing token".into_response();
    };

    // Identity is bound before the upgrade; a bad token never becomes a
    // session.
    let identity = match state.identities.resolve(token) {
        Ok(identity) => identity,
        Err(e) => {
            debug!("rejected connection: {e}");
            return "Invalid token".into_response();
        }
    };

    ws.on_upgrade(move |socket| chat_socket(socket, identity, state))
}

pub fn huddle_route(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            http::header::ACCEPT,
            http::header::CONTENT_TYPE,
            http::header::AUTHORIZATION,
            http::header::ORIGIN,
        ])
        .allow_origin(AllowOrigin::any());

    Router::new()
        .route("/ws", any(ws_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(cors)
        .with_state(state)
}
