//! Router for the ceremony endpoints

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use passkey_rp::ServiceContext;
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::passkey::{begin_login, begin_registration, finish_login, finish_registration};

/// Create the router for the registration and login endpoints
///
/// - GET  /register/begin/{username}
/// - POST /register/finish/{username}
/// - GET  /login/begin/{username}
/// - POST /login/finish/{username}
pub fn passkey_router(ctx: Arc<ServiceContext>) -> Router {
    passkey_router_no_trace(ctx).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(
                DefaultOnResponse::new()
                    .level(Level::INFO)
                    .latency_unit(LatencyUnit::Millis),
            ),
    )
}

/// Same as `passkey_router()` but without the HTTP tracing middleware.
pub fn passkey_router_no_trace(ctx: Arc<ServiceContext>) -> Router {
    Router::new()
        .route("/register/begin/{username}", get(begin_registration))
        .route("/register/finish/{username}", post(finish_registration))
        .route("/login/begin/{username}", get(begin_login))
        .route("/login/finish/{username}", post(finish_login))
        .with_state(ctx)
}
