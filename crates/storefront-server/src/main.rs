mod auth;
mod gateway;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use storefront_messaging::db_store::DbStore;
use storefront_messaging::surface::MessagingSurface;
use storefront_types::api::GatewayQuery;

#[derive(Clone)]
struct ServerState {
    store: DbStore,
    jwt_secret: Arc<str>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("STOREFRONT_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("STOREFRONT_DB_PATH").unwrap_or_else(|_| "storefront.db".into());
    let host = std::env::var("STOREFRONT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("STOREFRONT_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = storefront_db::Database::open(&PathBuf::from(&db_path))?;

    let state = ServerState {
        store: DbStore::new(db),
        jwt_secret: jwt_secret.into(),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/gateway", get(ws_upgrade))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Storefront messaging listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Authenticate at the HTTP upgrade, then hand the socket a fresh surface.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let viewer = auth::verify_token(&query.token, &state.jwt_secret).inspect_err(|_| {
        warn!("Rejected gateway upgrade with invalid token");
    })?;

    let store = Arc::new(state.store.clone());
    let surface = MessagingSurface::new(viewer, store.clone(), store);

    Ok(ws.on_upgrade(move |socket| gateway::handle_connection(socket, surface)))
}
