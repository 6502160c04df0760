use crate::config::{GeocoderConfig, GeocoderProvider};
use crate::metrics::{GEOCODE_DURATION_SEC, GEOCODE_TOTAL};
use async_trait::async_trait;
use devcamper_core::{GeoPoint, Location};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeResult {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zipcode: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl GeocodeResult {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    pub fn to_location(&self) -> Location {
        Location {
            formatted_address: self.formatted_address.clone(),
            street: self.street.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            zipcode: self.zipcode.clone(),
            country: self.country.clone(),
            ..Location::point(self.point())
        }
    }
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoder timed out after {0:?}")]
    Timeout(Duration),
    #[error("geocoder transport error: {0}")]
    Transport(String),
    #[error("geocoder response could not be decoded: {0}")]
    Decode(String),
    #[error("geocoder returned status {0}")]
    Status(u16),
}

impl From<reqwest::Error> for GeocodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("request timed out: {e}"))
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Resolves a free-form address or postal code. An empty result means the
/// location is unknown.
#[async_trait]
pub trait Geocoder: Send + Sync + 'static {
    async fn geocode(&self, query: &str) -> Result<Vec<GeocodeResult>, GeocodeError>;

    fn name(&self) -> &'static str;
}

/// Runs `geocoder` bounded by `timeout` and records the outcome.
pub async fn lookup(
    geocoder: &dyn Geocoder,
    query: &str,
    timeout: Duration,
) -> Result<Vec<GeocodeResult>, GeocodeError> {
    let timer = GEOCODE_DURATION_SEC.start_timer();
    let res = match tokio::time::timeout(timeout, geocoder.geocode(query)).await {
        Ok(res) => res,
        Err(_) => Err(GeocodeError::Timeout(timeout)),
    };
    timer.observe_duration();
    let label = match &res {
        Ok(found) if found.is_empty() => "empty",
        Ok(_) => "ok",
        Err(GeocodeError::Timeout(_)) => "timeout",
        Err(_) => "error",
    };
    GEOCODE_TOTAL.with_label_values(&[label]).inc();
    debug!(provider = geocoder.name(), query, result = label, "geocode");
    res
}

pub struct MapQuestGeocoder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl MapQuestGeocoder {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/geocoding/v1/address", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct MqResponse {
    #[serde(default)]
    info: Option<MqInfo>,
    #[serde(default)]
    results: Vec<MqResult>,
}

#[derive(Debug, Deserialize)]
struct MqInfo {
    #[serde(default)]
    statuscode: u16,
}

#[derive(Debug, Deserialize)]
struct MqResult {
    #[serde(default)]
    locations: Vec<MqLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MqLocation {
    lat_lng: MqLatLng,
    #[serde(default)]
    street: Option<String>,
    #[serde(default)]
    admin_area5: Option<String>,
    #[serde(default)]
    admin_area3: Option<String>,
    #[serde(default)]
    admin_area1: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MqLatLng {
    lat: f64,
    lng: f64,
}

fn present(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

impl From<MqLocation> for GeocodeResult {
    fn from(l: MqLocation) -> Self {
        let street = present(l.street);
        let city = present(l.admin_area5);
        let state = present(l.admin_area3);
        let zipcode = present(l.postal_code);
        let country = present(l.admin_area1);
        let state_zip = [state.as_deref(), zipcode.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let parts: Vec<&str> = [
            street.as_deref(),
            city.as_deref(),
            Some(state_zip.as_str()).filter(|s| !s.is_empty()),
            country.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();
        Self {
            latitude: l.lat_lng.lat,
            longitude: l.lat_lng.lng,
            formatted_address: (!parts.is_empty()).then(|| parts.join(", ")),
            street,
            city,
            state,
            zipcode,
            country,
        }
    }
}

/// Decodes a MapQuest `geocoding/v1/address` body.
pub fn parse_mapquest(body: &[u8]) -> Result<Vec<GeocodeResult>, GeocodeError> {
    let resp: MqResponse =
        serde_json::from_slice(body).map_err(|e| GeocodeError::Decode(e.to_string()))?;
    if let Some(info) = &resp.info {
        if info.statuscode != 0 {
            return Err(GeocodeError::Status(info.statuscode));
        }
    }
    Ok(resp
        .results
        .into_iter()
        .flat_map(|r| r.locations)
        .map(GeocodeResult::from)
        .collect())
}

#[async_trait]
impl Geocoder for MapQuestGeocoder {
    async fn geocode(&self, query: &str) -> Result<Vec<GeocodeResult>, GeocodeError> {
        let resp = self
            .client
            .get(self.endpoint())
            .query(&[("key", self.api_key.as_str()), ("location", query)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(GeocodeError::Status(resp.status().as_u16()));
        }
        let body = resp.bytes().await?;
        parse_mapquest(&body)
    }

    fn name(&self) -> &'static str {
        "mapquest"
    }
}

/// Fixed lookup table, keyed case-insensitively on the trimmed query.
#[derive(Debug, Clone, Default)]
pub struct StaticGeocoder {
    entries: HashMap<String, GeocodeResult>,
}

fn normalize(query: &str) -> String {
    query.trim().to_lowercase()
}

impl StaticGeocoder {
    pub fn from_entries<K: AsRef<str>>(entries: impl IntoIterator<Item = (K, GeocodeResult)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (normalize(k.as_ref()), v))
                .collect(),
        }
    }

    /// Reads a JSON object mapping query to result.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read(path)?;
        let entries: HashMap<String, GeocodeResult> = serde_json::from_slice(&raw)?;
        Ok(Self::from_entries(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, query: &str) -> Result<Vec<GeocodeResult>, GeocodeError> {
        Ok(self.entries.get(&normalize(query)).cloned().into_iter().collect())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

pub fn from_config(cfg: &GeocoderConfig) -> anyhow::Result<Arc<dyn Geocoder>> {
    match cfg.provider {
        GeocoderProvider::MapQuest => {
            let key = cfg
                .api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("mapquest geocoder needs GEOCODER_API_KEY"))?;
            info!(base_url = %cfg.base_url, "using mapquest geocoder");
            Ok(Arc::new(MapQuestGeocoder::new(key, cfg.base_url.clone(), cfg.timeout)?))
        }
        GeocoderProvider::Static => {
            let geo = match &cfg.fixtures {
                Some(path) => StaticGeocoder::from_file(path).map_err(|e| {
                    anyhow::anyhow!("reading geocoder fixtures {}: {e}", path.display())
                })?,
                None => {
                    warn!("static geocoder without GEOCODER_FIXTURES resolves nothing");
                    StaticGeocoder::default()
                }
            };
            info!(entries = geo.len(), "using static geocoder");
            Ok(Arc::new(geo))
        }
    }
}
