use crate::config::AppConfig;
use crate::db::DbConnection;
use crate::handlers;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub db: DbConnection,
    pub config: Arc<AppConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route("/logout", get(handlers::logout))
        .route(
            "/forgot-password",
            get(handlers::forgot_password_page).post(handlers::forgot_password),
        )
        .route(
            "/reset-password/:token",
            get(handlers::reset_password_page).post(handlers::reset_password),
        )
        .route("/", get(handlers::home))
        .route("/search", get(handlers::search_page))
        .route("/add", post(handlers::add_file))
        .route(
            "/edit_file/:file_code",
            get(handlers::edit_file_page).post(handlers::edit_file),
        )
        .route("/api/search", get(handlers::search_files))
        .route("/export", get(handlers::export_excel))
        .route("/import", post(handlers::import_excel))
        .route("/delete_file", post(handlers::delete_file))
        .route("/recycle_bin", get(handlers::get_recycle_bin))
        .route("/restore_file", post(handlers::restore_file))
        .route("/empty_recycle_bin", delete(handlers::empty_recycle_bin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
