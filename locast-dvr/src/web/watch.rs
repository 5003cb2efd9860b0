//! Stream endpoints.
//!
//! `/watch/<id>.m3u` redirects the client to the upstream playlist.
//! `/watch/<id>` takes a tuner slot, starts ffmpeg and relays its output.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{
        header::{CONTENT_TYPE, LOCATION},
        StatusCode,
    },
    response::{IntoResponse, Response},
};
use log::info;

use super::error::WebError;
use super::state::DvrState;
use crate::transcoder::StreamRelay;
use crate::upstream::UpstreamError;

/// Content type of the relayed transport stream.
pub const STREAM_CONTENT_TYPE: &str = "video/mpeg; codecs=\"avc1.4D401E\"";

const PLAYLIST_SUFFIX: &str = ".m3u";

/// `GET /watch/<id>` and `GET /watch/<id>.m3u`
pub async fn watch(
    State(state): State<Arc<DvrState>>,
    Path(channel_id): Path<String>,
) -> Result<Response, WebError> {
    match channel_id.strip_suffix(PLAYLIST_SUFFIX) {
        Some(id) => watch_playlist(&state, id).await,
        None => watch_direct(&state, &channel_id).await,
    }
}

async fn resolve(state: &DvrState, channel_id: &str) -> Result<String, WebError> {
    match tokio::time::timeout(state.upstream_timeout, state.source.stream_uri(channel_id)).await {
        Ok(uri) => Ok(uri?),
        Err(_) => Err(UpstreamError::Timeout.into()),
    }
}

async fn watch_playlist(state: &DvrState, channel_id: &str) -> Result<Response, WebError> {
    let uri = resolve(state, channel_id).await?;
    info!("Redirecting channel {} to {}", channel_id, uri);
    Ok((StatusCode::FOUND, [(LOCATION, uri)]).into_response())
}

/// A tuner slot is taken before the channel is looked up, so a busy
/// device answers 503 even for channels that do not exist.
async fn watch_direct(state: &DvrState, channel_id: &str) -> Result<Response, WebError> {
    let slot = state.admission.try_acquire()?;
    let uri = resolve(state, channel_id).await?;
    let transcoder = state.runner.start(&uri).await?;
    info!(
        "Streaming channel {} ({}/{} tuners in use)",
        channel_id,
        state.admission.active(),
        state.admission.capacity()
    );

    let relay = StreamRelay::start(
        transcoder,
        channel_id,
        &uri,
        Some(slot),
        state.chunk_size,
        state.verbose,
    );
    let body = Body::from_stream(relay.into_body_stream());
    Ok(([(CONTENT_TYPE, STREAM_CONTENT_TYPE)], body).into_response())
}
