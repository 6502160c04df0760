use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_GEOCODER_BASE_URL: &str = "https://www.mapquestapi.com";
pub const DEFAULT_GEOCODER_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeocoderProvider {
    MapQuest,
    Static,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeocoderConfig {
    pub provider: GeocoderProvider,
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub fixtures: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    pub snapshot_interval: Duration,
    pub geocoder: GeocoderConfig,
    pub tls: Option<TlsConfig>,
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "invalid value, using default");
            default
        }),
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_key = non_empty(&lookup, "GEOCODER_API_KEY");
        let provider = match lookup("GEOCODER_PROVIDER").as_deref().map(str::trim) {
            None | Some("mapquest") => GeocoderProvider::MapQuest,
            Some("static") => GeocoderProvider::Static,
            Some(other) => {
                warn!(provider = other, "unknown geocoder provider, using mapquest");
                GeocoderProvider::MapQuest
            }
        };
        let provider = if provider == GeocoderProvider::MapQuest && api_key.is_none() {
            warn!("GEOCODER_API_KEY not set, falling back to static geocoder");
            GeocoderProvider::Static
        } else {
            provider
        };
        let tls = match (
            non_empty(&lookup, "TLS_CERT_PATH"),
            non_empty(&lookup, "TLS_KEY_PATH"),
        ) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: cert.into(),
                key_path: key.into(),
            }),
            (None, None) => None,
            _ => {
                warn!("TLS_CERT_PATH and TLS_KEY_PATH must both be set, serving plain HTTP");
                None
            }
        };
        Self {
            bind_addr: non_empty(&lookup, "BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            data_dir: non_empty(&lookup, "DATA_DIR").map(PathBuf::from),
            snapshot_interval: Duration::from_secs(
                parse_or(&lookup, "SNAPSHOT_INTERVAL_SECS", DEFAULT_SNAPSHOT_INTERVAL_SECS).max(1),
            ),
            geocoder: GeocoderConfig {
                provider,
                api_key,
                base_url: non_empty(&lookup, "GEOCODER_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_GEOCODER_BASE_URL.into()),
                timeout: Duration::from_millis(parse_or(
                    &lookup,
                    "GEOCODER_TIMEOUT_MS",
                    DEFAULT_GEOCODER_TIMEOUT_MS,
                )),
                fixtures: non_empty(&lookup, "GEOCODER_FIXTURES").map(PathBuf::from),
            },
            tls,
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.bind_addr, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("invalid bind address {addr}: {e}"))
    }
}
