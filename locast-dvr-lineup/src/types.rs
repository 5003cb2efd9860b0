//! Station and device types shared by the lineup renderers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Call signs that are grouped under "Network" in playlists.
pub const NETWORK_CALL_SIGNS: [&str; 6] = ["ABC", "CBS", "NBC", "FOX", "CW", "PBS"];

/// Station identifier as delivered by the upstream catalog.
///
/// The catalog uses numbers, but identifiers coming back from the
/// URL path are strings, so both forms are accepted and compared by
/// their text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StationId {
    Number(i64),
    Text(String),
}

impl StationId {
    /// Whether this identifier matches the given path segment.
    pub fn matches(&self, other: &str) -> bool {
        match self {
            StationId::Number(n) => other.parse::<i64>().map(|o| o == *n).unwrap_or(false),
            StationId::Text(s) => s == other,
        }
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationId::Number(n) => write!(f, "{}", n),
            StationId::Text(s) => f.write_str(s),
        }
    }
}

impl PartialEq for StationId {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for StationId {}

impl From<&str> for StationId {
    fn from(value: &str) -> Self {
        StationId::Text(value.to_string())
    }
}

impl From<i64> for StationId {
    fn from(value: i64) -> Self {
        StationId::Number(value)
    }
}

/// A broadcast station with its program listings.
///
/// Field names follow the upstream catalog so the raw objects can be
/// echoed back unchanged. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "callSign", default, skip_serializing_if = "Option::is_none")]
    pub call_sign: Option<String>,

    /// Call sign rewritten by the multiplexer.
    #[serde(rename = "callSign_remapped", default, skip_serializing_if = "Option::is_none")]
    pub call_sign_remapped: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Channel number rewritten by the multiplexer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_remapped: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(rename = "logoUrl", default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,

    #[serde(rename = "logo226Url", default, skip_serializing_if = "Option::is_none")]
    pub logo_226_url: Option<String>,

    /// IANA time zone name, e.g. `America/Chicago`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(default)]
    pub listings: Vec<Listing>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Station {
    /// Create a station with only the required fields set.
    pub fn new(id: impl Into<StationId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            call_sign: None,
            call_sign_remapped: None,
            channel: None,
            channel_remapped: None,
            city: None,
            logo_url: None,
            logo_226_url: None,
            timezone: None,
            listings: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Channel number as presented to clients, preferring the remapped one.
    pub fn guide_number(&self) -> &str {
        self.channel_remapped
            .as_deref()
            .or(self.channel.as_deref())
            .unwrap_or_default()
    }

    /// Raw call sign as presented to clients, preferring the remapped one,
    /// then the plain call sign, then the station name.
    pub fn display_call_sign(&self) -> &str {
        self.call_sign_remapped
            .as_deref()
            .or(self.call_sign.as_deref())
            .unwrap_or(&self.name)
    }

    /// Logo URL, falling back to the 226px variant.
    pub fn logo(&self) -> &str {
        self.logo_url
            .as_deref()
            .or(self.logo_226_url.as_deref())
            .unwrap_or_default()
    }
}

/// A single program airing on a station.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Start time in milliseconds since the Unix epoch.
    pub start_time: i64,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Original release date in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<i64>,
    /// Comma separated genre list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_image_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_image_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_number: Option<u32>,
    /// Free-form video flags, e.g. `CC, HD 720p, HDTV, Stereo`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_properties: Option<String>,
    /// Air date in seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airdate: Option<i64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Identity of one emulated tuner device.
///
/// Built once per listening instance at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub unique_id: String,
    pub model: String,
    pub firmware_name: String,
    pub firmware_version: String,
    pub tuner_count: u32,
    pub friendly_name: String,
    pub bind_host: String,
    pub bind_port: u16,
}

impl DeviceIdentity {
    /// `host:port` the device is reachable on.
    pub fn host_and_port(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }

    /// Base URL used in every document that links back to this device.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.host_and_port())
    }
}
