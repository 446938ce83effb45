use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};

use crate::handlers::{auth as auth_handlers, posts as post_handlers};
use crate::storage::UploadStore;
use crate::{Config, DbPool};

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub uploads: UploadStore,
}

pub fn create_router(db: DbPool, config: Config, uploads: UploadStore) -> Router {
    let upload_dir = uploads.dir().to_path_buf();
    let state = AppState {
        db,
        config,
        uploads,
    };

    // Account routes. register/login/search are public; me and avatar
    // authenticate through the AuthUser extractor in their handlers.
    let auth_routes = Router::new()
        .route("/register", post(auth_handlers::register))
        .route("/login", post(auth_handlers::login))
        .route("/search", get(auth_handlers::search_users))
        .route("/me", get(auth_handlers::me))
        .route("/avatar", put(auth_handlers::update_avatar));

    // Feed routes. Reading is public, every mutation takes AuthUser.
    let post_routes = Router::new()
        .route(
            "/",
            get(post_handlers::list_posts).post(post_handlers::create_post),
        )
        .route("/:id/like", put(post_handlers::toggle_like))
        .route("/:id/comment", post(post_handlers::add_comment))
        .route("/:id", delete(post_handlers::delete_post));

    Router::new()
        .route("/health", get(health_check))
        .nest("/auth", auth_routes)
        .nest("/posts", post_routes)
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
