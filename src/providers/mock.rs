use super::types::{KeywordSearchRequest, PlaceDocument};
use super::{PlaceSearchProvider, ProviderError, RouteProvider};
use crate::config::{CacheBackend, Config};
use crate::geokey::{Coordinate, TransportType};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted routing provider that counts calls.
pub struct MockRouteProvider {
    calls: AtomicUsize,
    failure: Mutex<Option<(u16, Value)>>,
    delay: Duration,
}

impl MockRouteProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every following call answers with this status and body until cleared.
    pub fn fail_with(&self, status: u16, body: Value) {
        *self.failure.lock().unwrap() = Some((status, body));
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouteProvider for MockRouteProvider {
    async fn fetch_route(
        &self,
        transport: TransportType,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Value, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failure = self.failure.lock().unwrap().clone();
        if let Some((status, body)) = failure {
            return Err(ProviderError::Status { status, body });
        }

        Ok(json!({
            "mode": transport.as_str(),
            "start": [origin.x, origin.y],
            "end": [destination.x, destination.y],
            "call": call,
            "features": [],
        }))
    }
}

/// Scripted keyword search returning a fixed result list.
pub struct MockPlaceSearch {
    documents: Vec<PlaceDocument>,
    calls: AtomicUsize,
    last_request: Mutex<Option<KeywordSearchRequest>>,
    failure: Option<(u16, Value)>,
}

impl MockPlaceSearch {
    pub fn new(documents: Vec<PlaceDocument>) -> Self {
        Self {
            documents,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
            failure: None,
        }
    }

    pub fn failing(status: u16, body: Value) -> Self {
        Self {
            failure: Some((status, body)),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<KeywordSearchRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaceSearchProvider for MockPlaceSearch {
    async fn keyword_search(
        &self,
        request: &KeywordSearchRequest,
    ) -> Result<Vec<PlaceDocument>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        if let Some((status, body)) = &self.failure {
            return Err(ProviderError::Status {
                status: *status,
                body: body.clone(),
            });
        }

        // the provider honours its own size cap
        Ok(self
            .documents
            .iter()
            .take(request.size as usize)
            .cloned()
            .collect())
    }
}

pub fn place(id: &str, name: &str, category: &str, distance: u32) -> PlaceDocument {
    PlaceDocument {
        id: id.to_string(),
        place_name: name.to_string(),
        category_name: category.to_string(),
        address_name: format!("서울 중구 {id}"),
        road_address_name: String::new(),
        phone: String::new(),
        x: "126.978".to_string(),
        y: "37.5665".to_string(),
        distance: distance.to_string(),
        place_url: format!("http://place.map.kakao.com/{id}"),
    }
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Configuration pointing both providers at `base_url`.
pub fn stub_config(base_url: &str, upstream_timeout: Duration) -> Config {
    Config {
        tmap_api_key: "tmap-test-key".to_string(),
        tmap_base_url: base_url.to_string(),
        tmap_pedestrian_path: "/tmap/routes/pedestrian?version=1".to_string(),
        tmap_transit_path: "/transit/routes".to_string(),
        tmap_transit_count: 1,
        kakao_rest_api_key: "kakao-test-key".to_string(),
        kakao_base_url: base_url.to_string(),
        kakao_keyword_path: "/v2/local/search/keyword.json".to_string(),
        upstream_timeout,
        database_url: "sqlite::memory:".to_string(),
        route_cache_backend: CacheBackend::Memory,
        route_cache_ttl: Duration::from_secs(3600),
        route_cache_sweep: Duration::from_secs(3600),
        bind_addr: "127.0.0.1:0".to_string(),
    }
}
