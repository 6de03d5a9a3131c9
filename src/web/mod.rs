//! Browser-facing side: routes, sessions and templates.

use std::num::NonZeroU16;
use std::sync::Arc;

use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tracing::{error, info};

use crate::constants::SESSION_IDLE_MINUTES;
use crate::generator::ImageGenerator;
use crate::raster::CardRasterizer;
use crate::studio::StudioRegistry;

mod card;
mod csrf;
mod prelude;
mod session;
mod views;

use card::{choose_suggestion_handler, download_handler, generate_handler, update_card_handler};
use views::home_handler;

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    studios: Arc<StudioRegistry>,
}

impl AppState {
    fn new(generator: Arc<dyn ImageGenerator>, rasterizer: Arc<dyn CardRasterizer>) -> Self {
        let idle = std::time::Duration::from_secs(SESSION_IDLE_MINUTES.unsigned_abs() * 60);
        Self {
            studios: Arc::new(StudioRegistry::new(generator, rasterizer, idle)),
        }
    }
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::get(home_handler))
        .route("/static/styles.css", axum::routing::get(styles_handler))
        .route("/card", axum::routing::post(update_card_handler))
        .route(
            "/card/suggestions/{number}",
            axum::routing::post(choose_suggestion_handler),
        )
        .route("/card/generate", axum::routing::post(generate_handler))
        .route("/card/download", axum::routing::get(download_handler))
}

/// The full application with sessions and request tracing.
fn build_app(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(SESSION_IDLE_MINUTES)));

    create_router()
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(CONTENT_TYPE, "text/css")], STYLES)
}

/// Serves the card generator until the listener fails.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    generator: Arc<dyn ImageGenerator>,
    rasterizer: Arc<dyn CardRasterizer>,
) -> Result<(), anyhow::Error> {
    let app = build_app(AppState::new(generator, rasterizer));

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {}", err);
    }
    Ok(())
}
