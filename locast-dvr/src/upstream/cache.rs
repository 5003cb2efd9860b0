//! Time based station cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use locast_dvr_lineup::Station;
use log::debug;
use tokio::sync::Mutex;

use super::{StationSource, UpstreamError};

struct Snapshot {
    fetched_at: Instant,
    stations: Vec<Station>,
}

/// Serves stations from memory for `ttl` after each upstream fetch.
///
/// With caching disabled every read goes upstream. Stream URIs are only
/// resolved for channels present in the current station list.
pub struct CachedSource {
    inner: Arc<dyn StationSource>,
    ttl: Duration,
    enabled: bool,
    snapshot: Mutex<Option<Snapshot>>,
}

impl CachedSource {
    pub fn new(inner: Arc<dyn StationSource>, ttl: Duration, enabled: bool) -> Self {
        Self {
            inner,
            ttl,
            enabled,
            snapshot: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<Vec<Station>, UpstreamError> {
        let stations = self.inner.refresh_stations().await?;
        *self.snapshot.lock().await = Some(Snapshot {
            fetched_at: Instant::now(),
            stations: stations.clone(),
        });
        Ok(stations)
    }
}

#[async_trait]
impl StationSource for CachedSource {
    fn city(&self) -> String {
        self.inner.city()
    }

    async fn stations(&self) -> Result<Vec<Station>, UpstreamError> {
        if self.enabled {
            if let Some(snapshot) = self.snapshot.lock().await.as_ref() {
                if snapshot.fetched_at.elapsed() < self.ttl {
                    debug!("Serving {} cached stations for {}", snapshot.stations.len(), self.inner.city());
                    return Ok(snapshot.stations.clone());
                }
            }
        }
        self.fetch().await
    }

    async fn refresh_stations(&self) -> Result<Vec<Station>, UpstreamError> {
        self.fetch().await
    }

    async fn stream_uri(&self, channel_id: &str) -> Result<String, UpstreamError> {
        let stations = self.stations().await?;
        if !stations.iter().any(|s| s.id.matches(channel_id)) {
            return Err(UpstreamError::NotFound(channel_id.to_string()));
        }
        self.inner.stream_uri(channel_id).await
    }
}
