use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Sqlite,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(CacheBackend::Sqlite),
            "memory" => Ok(CacheBackend::Memory),
            other => Err(anyhow::anyhow!("unknown route cache backend: {other}")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub tmap_api_key: String,
    pub tmap_base_url: String,
    pub tmap_pedestrian_path: String,
    pub tmap_transit_path: String,
    pub tmap_transit_count: u32,
    pub kakao_rest_api_key: String,
    pub kakao_base_url: String,
    pub kakao_keyword_path: String,
    pub upstream_timeout: Duration,
    pub database_url: String,
    pub route_cache_backend: CacheBackend,
    pub route_cache_ttl: Duration,
    pub route_cache_sweep: Duration,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            tmap_api_key: env::var("TMAP_API_KEY")
                .map_err(|_| anyhow::anyhow!("TMAP_API_KEY not set"))?,
            tmap_base_url: env::var("TMAP_BASE_URL")
                .unwrap_or_else(|_| "https://apis.openapi.sk.com".to_string()),
            tmap_pedestrian_path: env::var("TMAP_PEDESTRIAN_PATH")
                .unwrap_or_else(|_| "/tmap/routes/pedestrian?version=1".to_string()),
            tmap_transit_path: env::var("TMAP_TRANSIT_PATH")
                .unwrap_or_else(|_| "/transit/routes".to_string()),
            tmap_transit_count: parsed_var("TMAP_TRANSIT_COUNT", 1)?,
            kakao_rest_api_key: env::var("KAKAO_REST_API_KEY")
                .map_err(|_| anyhow::anyhow!("KAKAO_REST_API_KEY not set"))?,
            kakao_base_url: env::var("KAKAO_BASE_URL")
                .unwrap_or_else(|_| "https://dapi.kakao.com".to_string()),
            kakao_keyword_path: env::var("KAKAO_KEYWORD_PATH")
                .unwrap_or_else(|_| "/v2/local/search/keyword.json".to_string()),
            upstream_timeout: Duration::from_secs(parsed_var("UPSTREAM_TIMEOUT_SECS", 10)?),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./route_cache.db?mode=rwc".to_string()),
            route_cache_backend: parsed_var("ROUTE_CACHE_BACKEND", CacheBackend::Sqlite)?,
            route_cache_ttl: Duration::from_secs(parsed_var("ROUTE_CACHE_TTL_SECS", 7 * 24 * 3600)?), // 7 days
            route_cache_sweep: Duration::from_secs(parsed_var("ROUTE_CACHE_SWEEP_SECS", 3600)?),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
        })
    }
}

/// Reads an optional variable, falling back to `default` when unset.
/// A set but unparsable value is a startup error rather than a silent default.
fn parsed_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {key} value {raw:?}: {e}")),
        Err(_) => {
            tracing::debug!("{key} not set, using default: {default:?}");
            Ok(default)
        }
    }
}
