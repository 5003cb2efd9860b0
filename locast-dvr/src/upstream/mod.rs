//! Upstream station catalog.
//!
//! Everything the HTTP layer knows about stations goes through
//! [`StationSource`]. The Locast client, the station cache and the
//! multiplexer all implement it.

pub mod cache;
pub mod locast;
pub mod multiplexer;
pub mod playlist;

use std::fmt;

use async_trait::async_trait;
use locast_dvr_lineup::Station;
use thiserror::Error;

pub use cache::CachedSource;
pub use locast::{LocastService, LocastSession};
pub use multiplexer::Multiplexer;

/// Where a tuner is located.
#[derive(Debug, Clone, PartialEq)]
pub enum Geo {
    Zipcode(String),
    LatLon { latitude: f64, longitude: f64 },
    /// Located by the public IP address of this host.
    Ip,
}

impl fmt::Display for Geo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Geo::Zipcode(zip) => write!(f, "zipcode {}", zip),
            Geo::LatLon {
                latitude,
                longitude,
            } => write!(f, "{},{}", latitude, longitude),
            Geo::Ip => f.write_str("IP address"),
        }
    }
}

/// Upstream errors, mapped to HTTP statuses by the watch handlers.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The channel does not exist for this source.
    #[error("Channel not found: {0}")]
    NotFound(String),

    /// Upstream answered with an error or could not be reached.
    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    /// Upstream did not answer in time.
    #[error("Upstream request timed out")]
    Timeout,

    /// Login failed or the account may not stream.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The configured location is not served.
    #[error("Invalid location: {0}")]
    InvalidLocation(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Unavailable(e.to_string())
        }
    }
}

/// A catalog of stations that can resolve stream URIs.
#[async_trait]
pub trait StationSource: Send + Sync {
    /// Human readable market name, used as the device friendly name.
    fn city(&self) -> String;

    /// Current stations. Implementations may serve these from a cache.
    async fn stations(&self) -> Result<Vec<Station>, UpstreamError>;

    /// Stations fetched fresh from upstream, refreshing any cache.
    async fn refresh_stations(&self) -> Result<Vec<Station>, UpstreamError>;

    /// Playable URI for a channel. Unknown channels yield
    /// [`UpstreamError::NotFound`].
    async fn stream_uri(&self, channel_id: &str) -> Result<String, UpstreamError>;
}
