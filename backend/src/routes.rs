use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware, state::AppState};

/// Full application router. Layers run outermost first: tracing, request id,
/// identity, threat guards, then error-response auditing.
///
/// `identify` sits outside the guards so their events carry the caller's
/// identity. It only verifies the token signature locally and never rejects,
/// so a blocked address still reaches the blocklist check without any store
/// access beforehand.
pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/api/security/dashboard", get(handlers::security::dashboard))
        .route("/api/security/export", get(handlers::security::export))
        .route("/api/security/block-ip", post(handlers::security::block_ip))
        .route(
            "/api/security/alerts/{id}",
            patch(handlers::security::update_alert_status),
        )
        .route_layer(axum_middleware::from_fn(middleware::require_staff));

    Router::new()
        .route("/health", get(handlers::security::health))
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(middleware::request_id))
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    middleware::identify,
                ))
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    middleware::threat_guard,
                ))
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    middleware::audit_error_responses,
                )),
        )
        .with_state(state)
}
