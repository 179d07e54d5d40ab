use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::handlers::{get_progress, health_check, list_files, upload_file};
use crate::middleware::{add_security_headers, no_store};
use crate::state::AppState;
use crate::utils::shutdown_signal;

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// build the application router: upload api plus static front end
pub fn build_router(state: Arc<AppState>, config: &Config) -> Router {
    tracing::debug!(
        "Building router with max upload size: {} bytes, static dir: {:?}",
        config.max_upload_size,
        config.public_dir
    );

    Router::new()
        .route("/upload", post(upload_file))
        .route("/progress/:upload_id", get(get_progress).layer(from_fn(no_store)))
        .route("/files", get(list_files))
        .route("/health", get(health_check))
        // the multipart extractor would otherwise cap bodies at 2MB
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_size))
        .with_state(state)
        .fallback_service(
            ServeDir::new(&config.public_dir)
                .append_index_html_on_directories(true)
                .precompressed_gzip()
                .precompressed_br(),
        )
        .layer(from_fn(add_security_headers))
        .layer(CompressionLayer::new().gzip(true).br(true).zstd(true))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
}

/// serve `app` on `addr` until a shutdown signal arrives
pub async fn start_server(app: Router, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::debug!("Listener bound to {}", addr);

    tracing::info!("Server running and ready to accept connections");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .tcp_nodelay(true)
    .await
}

/// print startup banner with server info
pub fn print_startup_banner(config: &Config) {
    tracing::info!("upload-progress starting...");
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("📡 UPLOAD SERVER: http://{}:{}", config.host, config.port);
    tracing::info!("📁 Storing uploads in: {:?}", config.files_dir.canonicalize().unwrap_or(config.files_dir.clone()));
    tracing::info!("🌐 Serving static files from: {:?}", config.public_dir);
    tracing::info!("⌛ Progress records kept for {:?} after completion", config.progress_ttl);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
