//! Locast API client.
//!
//! One [`LocastSession`] holds the login token for the whole process and
//! is shared by every [`LocastService`], of which there is one per
//! location.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use locast_dvr_lineup::Station;
use log::{debug, info, warn};
use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::playlist::resolve_stream;
use super::{Geo, StationSource, UpstreamError};

/// Production API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.locastnet.org";

/// Tokens are renewed after this long.
const TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// The watch endpoint rejects unknown clients.
const WATCH_USER_AGENT: &str = "curl/7.64.1";

/// First channel number handed out to stations without one.
const FAKE_CHANNEL_START: u32 = 1000;

struct Token {
    value: String,
    obtained_at: Instant,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserInfo {
    #[serde(default)]
    did_donate: bool,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    donation_expire: Option<i64>,
}

#[derive(Deserialize)]
struct DmaResponse {
    latitude: f64,
    longitude: f64,
    #[serde(rename = "DMA")]
    dma: Value,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchResponse {
    stream_url: String,
}

/// Authenticated connection to the Locast API.
pub struct LocastSession {
    client: reqwest::Client,
    api_base: String,
    username: String,
    password: String,
    token: Mutex<Option<Token>>,
}

impl LocastSession {
    /// Create a session against the production API.
    pub fn new(username: &str, password: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        Self::with_api_base(username, password, timeout, DEFAULT_API_BASE)
    }

    /// Create a session against a custom API endpoint.
    pub fn with_api_base(
        username: &str,
        password: &str,
        timeout: Duration,
        api_base: &str,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Log in and validate the account, replacing any current token.
    pub async fn login(&self) -> Result<(), UpstreamError> {
        let mut guard = self.token.lock().await;
        *guard = Some(self.fetch_token().await?);
        Ok(())
    }

    /// A valid bearer token, logging in again when the current one expired.
    pub async fn token(&self) -> Result<String, UpstreamError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.obtained_at.elapsed() < TOKEN_LIFETIME {
                return Ok(token.value.clone());
            }
            info!("Login token expired");
        }
        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    async fn fetch_token(&self) -> Result<Token, UpstreamError> {
        info!("Logging in with {}", self.username);
        let response = self
            .client
            .post(self.url("/api/user/login"))
            .json(&serde_json::json!({
                "username": self.username,
                "password": self.password,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(UpstreamError::Unauthorized(format!(
                "Login failed: {}",
                response.status()
            )));
        }
        let login: LoginResponse = response.json().await?;

        self.validate_user(&login.token).await?;
        info!("Locast login successful");

        Ok(Token {
            value: login.token,
            obtained_at: Instant::now(),
        })
    }

    async fn validate_user(&self, token: &str) -> Result<(), UpstreamError> {
        let user: UserInfo = self
            .client
            .get(self.url("/api/user/me"))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !user.did_donate {
            return Err(UpstreamError::Unauthorized("User didn't donate".to_string()));
        }
        if let Some(expire) = user.donation_expire {
            if Utc::now().timestamp_millis() > expire {
                return Err(UpstreamError::Unauthorized("Donation expired".to_string()));
            }
        }
        Ok(())
    }
}

/// Market a service was located in.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub dma: String,
    pub city: String,
}

/// Locast stations for one location.
pub struct LocastService {
    session: Arc<LocastSession>,
    geo: Geo,
    location: Location,
    days: u32,
}

impl LocastService {
    /// Look up `geo` and fail if Locast does not serve it.
    pub async fn connect(
        session: Arc<LocastSession>,
        geo: Geo,
        days: u32,
    ) -> Result<Self, UpstreamError> {
        let url = match &geo {
            Geo::LatLon {
                latitude,
                longitude,
            } => session.url(&format!("/api/watch/dma/{}/{}", latitude, longitude)),
            Geo::Zipcode(zip) => session.url(&format!("/api/watch/dma/zip/{}", zip)),
            Geo::Ip => session.url("/api/watch/dma/ip"),
        };

        let response = session.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(UpstreamError::InvalidLocation(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        if response.status() == StatusCode::NO_CONTENT {
            return Err(UpstreamError::InvalidLocation(format!("Geo not found for {}", url)));
        }

        let dma: DmaResponse = response.json().await?;
        if !dma.active {
            return Err(UpstreamError::InvalidLocation(format!(
                "Locast not available in {}",
                dma.name
            )));
        }

        let location = Location {
            latitude: dma.latitude,
            longitude: dma.longitude,
            dma: match dma.dma {
                Value::String(s) => s,
                other => other.to_string(),
            },
            city: dma.name,
        };
        debug!("Located {} in {} (DMA {})", geo, location.city, location.dma);

        Ok(Self {
            session,
            geo,
            location,
            days,
        })
    }

    pub fn geo(&self) -> &Geo {
        &self.geo
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    async fn fetch_stations(&self) -> Result<Vec<Station>, UpstreamError> {
        let token = self.session.token().await?;
        let hours = (self.days * 24).to_string();
        let start_time = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();

        let mut stations: Vec<Station> = self
            .session
            .client
            .get(self.session.url(&format!("/api/watch/epg/{}", self.location.dma)))
            .query(&[("startTime", start_time.as_str()), ("hours", hours.as_str())])
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        assign_channels(&mut stations, &self.location.city);
        info!("Got {} stations for {}", stations.len(), self.location.city);
        Ok(stations)
    }
}

fn channel_in_call_sign() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+\.\d+) .+").expect("static regex"))
}

/// Set city and channel number on freshly fetched stations.
///
/// The channel comes from an `"X.Y Name"` call sign. Stations without one
/// get sequential numbers from 1000 so they stay addressable.
pub fn assign_channels(stations: &mut [Station], city: &str) {
    let mut fake_channel = FAKE_CHANNEL_START;
    for station in stations.iter_mut() {
        station.city = Some(city.to_string());

        let call_sign = station.call_sign.as_deref().unwrap_or(&station.name);
        if let Some(channel) = channel_in_call_sign()
            .captures(call_sign)
            .and_then(|c| c.get(1))
        {
            station.channel = Some(channel.as_str().to_string());
            continue;
        }

        warn!(
            "Channel (name: {}, callSign: {}) not found. Assigning {}",
            station.name, call_sign, fake_channel
        );
        station.channel = Some(fake_channel.to_string());
        fake_channel += 1;
    }
}

#[async_trait]
impl StationSource for LocastService {
    fn city(&self) -> String {
        self.location.city.clone()
    }

    async fn stations(&self) -> Result<Vec<Station>, UpstreamError> {
        self.fetch_stations().await
    }

    async fn refresh_stations(&self) -> Result<Vec<Station>, UpstreamError> {
        self.fetch_stations().await
    }

    async fn stream_uri(&self, channel_id: &str) -> Result<String, UpstreamError> {
        let token = self.session.token().await?;
        let url = self.session.url(&format!(
            "/api/watch/station/{}/{}/{}",
            channel_id, self.location.latitude, self.location.longitude
        ));

        let response = self
            .session
            .client
            .get(&url)
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, WATCH_USER_AGENT)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(UpstreamError::NotFound(channel_id.to_string()));
        }
        let watch: WatchResponse = response.error_for_status()?.json().await?;

        resolve_stream(&self.session.client, &watch.stream_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_login(server: &MockServer, did_donate: bool, expire: i64) {
        Mock::given(method("POST"))
            .and(path("/api/user/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "TOKEN"})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/user/me"))
            .and(header("authorization", "Bearer TOKEN"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "didDonate": did_donate,
                "donationExpire": expire
            })))
            .mount(server)
            .await;
    }

    fn session(server: &MockServer) -> Arc<LocastSession> {
        Arc::new(
            LocastSession::with_api_base("user", "pass", Duration::from_secs(5), &server.uri())
                .unwrap(),
        )
    }

    fn far_future() -> i64 {
        Utc::now().timestamp_millis() + 86_400_000
    }

    #[tokio::test]
    async fn test_login_success() {
        let server = MockServer::start().await;
        mock_login(&server, true, far_future()).await;
        let session = session(&server);
        session.login().await.unwrap();
        assert_eq!(session.token().await.unwrap(), "TOKEN");
    }

    #[tokio::test]
    async fn test_login_rejects_non_donor() {
        let server = MockServer::start().await;
        mock_login(&server, false, 0).await;
        let err = session(&server).login().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_login_rejects_expired_donation() {
        let server = MockServer::start().await;
        mock_login(&server, true, 1000).await;
        let err = session(&server).login().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unauthorized(ref m) if m == "Donation expired"));
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/user/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let err = session(&server).login().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_connect_by_zipcode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/watch/dma/zip/60601"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "latitude": 41.88,
                "longitude": -87.63,
                "DMA": "602",
                "active": true,
                "name": "Chicago"
            })))
            .mount(&server)
            .await;

        let service = LocastService::connect(session(&server), Geo::Zipcode("60601".into()), 8)
            .await
            .unwrap();
        assert_eq!(service.city(), "Chicago");
        assert_eq!(service.location().dma, "602");
    }

    #[tokio::test]
    async fn test_connect_unknown_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/watch/dma/ip"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        let err = LocastService::connect(session(&server), Geo::Ip, 8)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, UpstreamError::InvalidLocation(_)));
    }

    #[tokio::test]
    async fn test_connect_inactive_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/watch/dma/[-0-9.]+/[-0-9.]+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "latitude": 1.0,
                "longitude": 2.0,
                "DMA": 999,
                "active": false,
                "name": "Nowhere"
            })))
            .mount(&server)
            .await;
        let geo = Geo::LatLon {
            latitude: 1.0,
            longitude: 2.0,
        };
        let err = LocastService::connect(session(&server), geo, 8)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, UpstreamError::InvalidLocation(ref m) if m.contains("Nowhere")));
    }

    async fn connected_service(server: &MockServer) -> LocastService {
        mock_login(server, true, far_future()).await;
        Mock::given(method("GET"))
            .and(path("/api/watch/dma/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "latitude": 41.88,
                "longitude": -87.63,
                "DMA": 602,
                "active": true,
                "name": "Chicago"
            })))
            .mount(server)
            .await;
        LocastService::connect(session(server), Geo::Ip, 1).await.unwrap()
    }

    #[tokio::test]
    async fn test_stations_get_channels() {
        let server = MockServer::start().await;
        let service = connected_service(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/watch/epg/602"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "name": "WBBMDT", "callSign": "2.1 CBS", "listings": []},
                {"id": 2, "name": "WXYZ", "callSign": "WXYZ"},
                {"id": 3, "name": "OTHER", "callSign": "OTHER"}
            ])))
            .mount(&server)
            .await;

        let stations = service.stations().await.unwrap();
        assert_eq!(stations[0].channel.as_deref(), Some("2.1"));
        assert_eq!(stations[1].channel.as_deref(), Some("1000"));
        assert_eq!(stations[2].channel.as_deref(), Some("1001"));
        assert!(stations.iter().all(|s| s.city.as_deref() == Some("Chicago")));
    }

    #[tokio::test]
    async fn test_stream_uri_unknown_station() {
        let server = MockServer::start().await;
        let service = connected_service(&server).await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/watch/station/42/.*"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = service.stream_uri("42").await.unwrap_err();
        assert!(matches!(err, UpstreamError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stream_uri_plain_url() {
        let server = MockServer::start().await;
        let service = connected_service(&server).await;
        let stream_url = format!("{}/live/1.m3u8", server.uri());
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/watch/station/1/.*"))
            .and(header("user-agent", WATCH_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"streamUrl": stream_url})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/live/1.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n#EXTINF:6.0,\na.ts\n"))
            .mount(&server)
            .await;

        assert_eq!(service.stream_uri("1").await.unwrap(), stream_url);
    }

    #[test]
    fn test_assign_channels_uses_name_without_call_sign() {
        let mut stations = vec![Station::new("1", "4.1 NAME")];
        assign_channels(&mut stations, "Denver");
        assert_eq!(stations[0].channel.as_deref(), Some("4.1"));
        assert_eq!(stations[0].city.as_deref(), Some("Denver"));
    }
}
