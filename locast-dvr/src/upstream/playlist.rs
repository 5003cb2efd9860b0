//! Stream URL resolution for HLS master playlists.

use hls_m3u8::{tags::VariantStream, MasterPlaylist};
use log::{debug, warn};
use url::Url;

use super::UpstreamError;

const MASTER_TAG: &str = "#EXT-X-STREAM-INF";

/// Pick the highest resolution variant from a master playlist.
///
/// Returns `None` when `body` is a media playlist or has no usable
/// variants, in which case the playlist URL itself should be streamed.
/// Variant URIs are resolved against `playlist_url`.
pub fn best_variant(playlist_url: &str, body: &str) -> Option<String> {
    if !body.contains(MASTER_TAG) {
        return None;
    }

    let master = match MasterPlaylist::try_from(body) {
        Ok(master) => master,
        Err(e) => {
            warn!("Failed to parse master playlist {}: {}", playlist_url, e);
            return None;
        }
    };

    let best = master
        .variant_streams
        .iter()
        .filter_map(|variant| match variant {
            VariantStream::ExtXStreamInf {
                uri, stream_data, ..
            } => Some((uri.to_string(), stream_data.resolution())),
            VariantStream::ExtXIFrame { .. } => None,
        })
        .max_by_key(|variant| variant.1)?;

    let absolute = match Url::parse(playlist_url).and_then(|base| base.join(&best.0)) {
        Ok(url) => url.to_string(),
        Err(_) => best.0,
    };
    debug!("Selected variant {} from {}", absolute, playlist_url);
    Some(absolute)
}

/// Fetch `stream_url` and resolve it to the best playable URI.
pub async fn resolve_stream(
    client: &reqwest::Client,
    stream_url: &str,
) -> Result<String, UpstreamError> {
    let body = client
        .get(stream_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    Ok(best_variant(stream_url, &body).unwrap_or_else(|| stream_url.to_string()))
}
