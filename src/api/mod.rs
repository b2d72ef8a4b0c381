use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod admin;
pub mod auth;
pub mod handlers;
pub mod registration;

/// Build the full HTTP application. Authentication is enforced per handler
/// through the `CurrentAccount` / `AdminAccount` extractors.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        // Public
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/register", post(registration::register))
        .route("/check-email", post(registration::check_email))
        // Any logged-in account
        .route("/dashboard", get(handlers::dashboard))
        .route(
            "/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .route("/change-password", post(handlers::change_password))
        .route("/link-token", post(handlers::create_link_token))
        .route("/link-status", get(handlers::link_status))
        // Administrators
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/requests", get(admin::list_requests))
        .route("/admin/requests/:id/approve", post(admin::approve_request))
        .route("/admin/requests/:id/reject", post(admin::reject_request))
        .route(
            "/communities",
            get(handlers::list_communities).post(handlers::create_community),
        )
        .route("/members", get(handlers::list_members));

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/logout", get(handlers::logout_redirect))
        .nest("/api", api)
        .fallback(fallback_404)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(security_headers))
}

async fn fallback_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": {
                "message": "route not found",
                "type": "not_found_error",
                "code": "not_found",
            }
        })),
    )
}

/// Injects security headers into every response.
async fn security_headers(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    // session cookies and link tokens must not be cached
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");

    resp
}
