use super::types::{PedestrianRouteRequest, TransitRouteRequest};
use super::{send_json, ProviderError, RouteProvider};
use crate::config::Config;
use crate::geokey::{Coordinate, TransportType};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

/// Walking and transit directions from the Tmap APIs.
pub struct TmapClient {
    client: Client,
    config: Config,
}

impl TmapClient {
    pub fn new(config: Config) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent("GeoProxyServer/1.0")
            .timeout(config.upstream_timeout)
            .build()
            .map_err(ProviderError::Request)?;

        Ok(Self { client, config })
    }

    pub async fn pedestrian_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Value, ProviderError> {
        let body = PedestrianRouteRequest::new(origin, destination);
        let payload = self.post_route(&self.config.tmap_pedestrian_path, &body).await?;
        check_envelope(TransportType::Walk, payload)
    }

    pub async fn transit_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Value, ProviderError> {
        let body = TransitRouteRequest {
            start_x: origin.x,
            start_y: origin.y,
            end_x: destination.x,
            end_y: destination.y,
            count: self.config.tmap_transit_count,
        };
        let payload = self.post_route(&self.config.tmap_transit_path, &body).await?;
        check_envelope(TransportType::Transit, payload)
    }

    async fn post_route<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, ProviderError> {
        let url = format!("{}{}", self.config.tmap_base_url, path);
        let request = self
            .client
            .post(&url)
            .header("accept", "application/json")
            .header("appKey", &self.config.tmap_api_key)
            .json(body);

        send_json(request, self.config.upstream_timeout).await
    }
}

#[async_trait]
impl RouteProvider for TmapClient {
    async fn fetch_route(
        &self,
        transport: TransportType,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<Value, ProviderError> {
        match transport {
            TransportType::Walk => self.pedestrian_route(origin, destination).await,
            TransportType::Transit => self.transit_route(origin, destination).await,
        }
    }
}

/// Tmap answers some failures with a 2xx status, so the body shape decides.
///
/// Walking errors arrive as `{"error": {..}}`. Transit reports "no route" and
/// similar outcomes as `{"result": {"status": .., "message": ..}}` instead of a
/// `metaData` plan. Neither may be cached as a route.
fn check_envelope(transport: TransportType, payload: Value) -> Result<Value, ProviderError> {
    let is_route = match (&payload, transport) {
        (Value::Object(map), _) if map.contains_key("error") => false,
        (Value::Object(map), TransportType::Walk) => map.get("features").is_some_and(Value::is_array),
        (Value::Object(map), TransportType::Transit) => {
            map.get("metaData").is_some_and(Value::is_object)
                && map.get("result").and_then(|r| r.get("status")).is_none()
        }
        _ => false,
    };
    if is_route {
        Ok(payload)
    } else {
        Err(ProviderError::Rejected(payload))
    }
}
