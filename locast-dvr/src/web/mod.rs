//! HTTP server emulating an HDHomeRun tuner.

pub mod device;
pub mod error;
pub mod state;
pub mod watch;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::WebError;
pub use state::DvrState;

/// Route table for one tuner instance.
pub fn build_router(state: Arc<DvrState>) -> Router {
    let verbose = state.verbose;

    let app = Router::new()
        // Device discovery
        .route("/", get(device::device_xml))
        .route("/device.xml", get(device::device_xml))
        .route("/discover.json", get(device::discover))
        // Lineup
        .route("/lineup_status.json", get(device::lineup_status))
        .route("/lineup.m3u", get(device::lineup_m3u))
        .route("/tuner.m3u", get(device::lineup_m3u))
        .route("/lineup.json", get(device::lineup_json))
        .route("/lineup.xml", get(device::lineup_xml))
        .route(
            "/lineup.post",
            get(device::lineup_post).post(device::lineup_post),
        )
        // Guide
        .route("/epg", get(device::epg))
        .route("/epg.xml", get(device::epg_xml))
        .route("/config", get(device::config))
        // Streams
        .route("/watch/:channel_id", get(watch::watch))
        .with_state(state)
        .layer(CorsLayer::permissive());

    if verbose {
        app.layer(TraceLayer::new_for_http())
    } else {
        app
    }
}

/// Serve one tuner instance until `shutdown` is cancelled.
pub async fn start_web_server(
    listen_addr: SocketAddr,
    state: Arc<DvrState>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let name = state.identity.friendly_name.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("{} listening on http://{}", name, listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    log::info!("{} stopped", name);
    Ok(())
}
