//! Several station sources presented as one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use locast_dvr_lineup::Station;
use log::info;
use tokio::sync::RwLock;

use super::{StationSource, UpstreamError};

/// Name the multiplexed tuner reports as its city.
pub const MULTIPLEXER_CITY: &str = "Multiplexer";

/// Aggregates the stations of all registered sources.
///
/// Every station list fetch rebuilds the map from station id to owning
/// source, which stream URI lookups are routed through.
pub struct Multiplexer {
    sources: Vec<Arc<dyn StationSource>>,
    remap: bool,
    owners: RwLock<HashMap<String, usize>>,
}

impl Multiplexer {
    pub fn new(sources: Vec<Arc<dyn StationSource>>, remap: bool) -> Self {
        for source in &sources {
            info!("Registering {}", source.city());
        }
        Self {
            sources,
            remap,
            owners: RwLock::new(HashMap::new()),
        }
    }

    async fn collect(&self, fresh: bool) -> Result<Vec<Station>, UpstreamError> {
        let mut stations = Vec::new();
        let mut owners = HashMap::new();

        for (index, source) in self.sources.iter().enumerate() {
            let batch = if fresh {
                source.refresh_stations().await?
            } else {
                source.stations().await?
            };
            for mut station in batch {
                if self.remap {
                    remap(&mut station, index);
                }
                owners.insert(station.id.to_string(), index);
                stations.push(station);
            }
        }

        info!(
            "Got {} stations from {} sources",
            stations.len(),
            self.sources.len()
        );
        *self.owners.write().await = owners;
        Ok(stations)
    }
}

/// Shift the channel number by `100 * index` so markets do not collide.
///
/// `"4.1"` from the third source becomes `"204.1"`; the call sign has the
/// old number replaced by the new one.
pub fn remap(station: &mut Station, index: usize) {
    let Some(channel) = station.channel.clone() else {
        return;
    };
    let offset = 100 * index as u64;
    let (major, minor) = match channel.split_once('.') {
        Some((major, minor)) => (major, Some(minor)),
        None => (channel.as_str(), None),
    };
    let Ok(major) = major.parse::<u64>() else {
        return;
    };

    let remapped = match minor {
        Some(minor) => format!("{}.{}", major + offset, minor),
        None => (major + offset).to_string(),
    };
    let call_sign = station.call_sign.as_deref().unwrap_or(&station.name);
    station.call_sign_remapped = Some(call_sign.replace(&channel, &remapped));
    station.channel_remapped = Some(remapped);
}

#[async_trait]
impl StationSource for Multiplexer {
    fn city(&self) -> String {
        MULTIPLEXER_CITY.to_string()
    }

    async fn stations(&self) -> Result<Vec<Station>, UpstreamError> {
        self.collect(false).await
    }

    async fn refresh_stations(&self) -> Result<Vec<Station>, UpstreamError> {
        self.collect(true).await
    }

    async fn stream_uri(&self, channel_id: &str) -> Result<String, UpstreamError> {
        self.collect(false).await?;
        let owner = self.owners.read().await.get(channel_id).copied();
        match owner.and_then(|index| self.sources.get(index)) {
            Some(source) => source.stream_uri(channel_id).await,
            None => Err(UpstreamError::NotFound(channel_id.to_string())),
        }
    }
}
