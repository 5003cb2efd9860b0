//! Device emulation, lineup and guide endpoints.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use locast_dvr_lineup::{
    lineup_entries, render_device_xml, render_lineup_xml, render_m3u, render_xmltv,
    DiscoverDocument,
};
use log::info;
use serde::Deserialize;

use super::error::WebError;
use super::state::DvrState;

const XML: &str = "text/xml";
const TEXT: &str = "text/plain";

fn typed(content_type: &'static str, body: String) -> Response {
    ([(CONTENT_TYPE, content_type)], body).into_response()
}

/// `GET /` and `GET /device.xml`
pub async fn device_xml(State(state): State<Arc<DvrState>>) -> Result<Response, WebError> {
    Ok(typed(XML, render_device_xml(&state.identity)?))
}

/// `GET /discover.json`
pub async fn discover(State(state): State<Arc<DvrState>>) -> Json<DiscoverDocument> {
    Json(DiscoverDocument::from(&state.identity))
}

/// `GET /lineup_status.json`
pub async fn lineup_status(State(state): State<Arc<DvrState>>) -> impl IntoResponse {
    Json(state.admission.scan_status())
}

/// `GET /lineup.m3u` and `GET /tuner.m3u`
pub async fn lineup_m3u(State(state): State<Arc<DvrState>>) -> Result<Response, WebError> {
    let stations = state.source.stations().await?;
    Ok(typed(
        TEXT,
        render_m3u(&stations, &state.base_url(), state.multiplex),
    ))
}

/// `GET /lineup.json`
pub async fn lineup_json(State(state): State<Arc<DvrState>>) -> Result<Response, WebError> {
    let stations = state.source.stations().await?;
    Ok(Json(lineup_entries(&stations, &state.base_url())).into_response())
}

/// `GET /lineup.xml`
pub async fn lineup_xml(State(state): State<Arc<DvrState>>) -> Result<Response, WebError> {
    let stations = state.source.stations().await?;
    let entries = lineup_entries(&stations, &state.base_url());
    Ok(typed(XML, render_lineup_xml(&entries)?))
}

/// `GET /epg`: station objects as received from upstream.
pub async fn epg(State(state): State<Arc<DvrState>>) -> Result<Response, WebError> {
    let stations = state.source.stations().await?;
    Ok(Json(stations).into_response())
}

/// `GET /epg.xml`: always fetched fresh.
pub async fn epg_xml(State(state): State<Arc<DvrState>>) -> Result<Response, WebError> {
    let stations = state.source.refresh_stations().await?;
    Ok(typed(XML, render_xmltv(&stations, &state.base_url())?))
}

/// `GET /config`
pub async fn config(State(state): State<Arc<DvrState>>) -> impl IntoResponse {
    Json(state.config.clone())
}

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    scan: Option<String>,
}

/// `GET|POST /lineup.post?scan=start`
pub async fn lineup_post(
    State(state): State<Arc<DvrState>>,
    Query(query): Query<ScanQuery>,
) -> Result<StatusCode, WebError> {
    let command = query.scan.unwrap_or_default();
    if command != "start" {
        return Err(WebError::InvalidScanCommand(command));
    }

    let guard = state.admission.begin_scan();
    let stations = state.source.refresh_stations().await?;
    info!("Channel scan for {} found {} stations", state.identity.friendly_name, stations.len());
    guard.finish(stations.len());
    Ok(StatusCode::NO_CONTENT)
}
