//! HTTP server and routes.

mod extract;
mod guard;
mod handlers;
mod state;

pub use extract::{ApiJson, ApiPath};
pub use guard::{
    ActiveSession, MaybeSession, RequireAdmin, RequireAuth, has_admin_role, is_admin,
    is_authenticated,
};
pub use state::AppState;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/users", get(handlers::admin_list_users))
        .route("/users/{id}/role", put(handlers::admin_update_user_role))
        .route("/stats", get(handlers::admin_stats))
        .route("/feedback", get(handlers::admin_list_feedback))
        .route(
            "/feedback/{id}/status",
            put(handlers::admin_update_feedback_status),
        );

    let user_routes = Router::new()
        .route("/profile-data", get(handlers::profile_data))
        .route("/profile", put(handlers::update_profile))
        .route("/remove", post(handlers::remove_entry));

    let reading_routes = Router::new()
        .route("/start", post(handlers::reading_start))
        .route("/progress", post(handlers::reading_progress))
        .route("/pause", post(handlers::reading_pause))
        .route("/complete", post(handlers::reading_complete));

    let api_routes = Router::new()
        // Auth
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/whoami", get(handlers::whoami))
        // Catalog
        .route("/books", get(handlers::list_books))
        .route(
            "/books/category/{category}",
            get(handlers::list_books_by_category),
        )
        // Feedback
        .route(
            "/feedback",
            post(handlers::submit_feedback).get(handlers::list_feedback),
        )
        .route("/ranking/reading-time", get(handlers::reading_ranking))
        .nest("/admin", admin_routes)
        .nest("/user", user_routes)
        .nest("/reading", reading_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
