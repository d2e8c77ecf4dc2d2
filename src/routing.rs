use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::database::{PutOutcome, RouteCacheEntry, RouteCacheStore};
use crate::geokey::{self, Coordinate, CoordinateValue, GeoKeyError, RouteKey, TransportType};
use crate::providers::{ProviderError, RouteProvider};

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Origin and destination coordinates are required")]
    MissingCoordinates,
    #[error(transparent)]
    InvalidCoordinate(#[from] GeoKeyError),
    #[error("{transport} route lookup failed: {source}")]
    Upstream {
        transport: TransportType,
        #[source]
        source: ProviderError,
    },
    #[error("Route lookup was interrupted: {0}")]
    Interrupted(String),
}

/// Raw endpoints of a route request; any component may be missing or malformed.
#[derive(Debug, Clone, Default)]
pub struct RoutePoints {
    pub start_x: Option<CoordinateValue>,
    pub start_y: Option<CoordinateValue>,
    pub end_x: Option<CoordinateValue>,
    pub end_y: Option<CoordinateValue>,
}

impl RoutePoints {
    pub fn new(
        start_x: impl Into<CoordinateValue>,
        start_y: impl Into<CoordinateValue>,
        end_x: impl Into<CoordinateValue>,
        end_y: impl Into<CoordinateValue>,
    ) -> Self {
        Self {
            start_x: Some(start_x.into()),
            start_y: Some(start_y.into()),
            end_x: Some(end_x.into()),
            end_y: Some(end_y.into()),
        }
    }

    pub fn into_coordinates(self) -> Result<(Coordinate, Coordinate), RouteError> {
        let parts = [
            ("startX", self.start_x),
            ("startY", self.start_y),
            ("endX", self.end_x),
            ("endY", self.end_y),
        ];
        if parts
            .iter()
            .any(|(_, v)| v.as_ref().map_or(true, CoordinateValue::is_blank))
        {
            return Err(RouteError::MissingCoordinates);
        }

        let mut values = [0.0_f64; 4];
        for (slot, (field, value)) in values.iter_mut().zip(parts.iter()) {
            if let Some(value) = value {
                *slot = value.to_f64(*field)?;
            }
        }
        let [sx, sy, ex, ey] = values;

        Ok((Coordinate::from_lon_lat(sx, sy)?, Coordinate::from_lon_lat(ex, ey)?))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteResult {
    pub data: Value,
    pub served_from_cache: bool,
}

/// Cache-aside resolver in front of the routing provider.
///
/// Concurrent misses on one key are not coalesced: each may call upstream and
/// the store's append-if-absent `put` keeps the first result. The cost is an
/// occasional duplicate billed call under a race, in exchange for no locking.
pub struct RouteResolver {
    store: Arc<dyn RouteCacheStore>,
    provider: Arc<dyn RouteProvider>,
}

impl RouteResolver {
    pub fn new(store: Arc<dyn RouteCacheStore>, provider: Arc<dyn RouteProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn resolve_route(
        &self,
        points: RoutePoints,
        transport: TransportType,
    ) -> Result<RouteResult, RouteError> {
        let (origin, destination) = points.into_coordinates()?;
        let route_key = geokey::route_key(&origin, &destination, transport)?;

        match self.store.get(&route_key, transport).await {
            Ok(Some(entry)) => {
                tracing::debug!(route_key = %route_key, transport = %transport, "Route served from cache");
                return Ok(RouteResult {
                    data: entry.route_data,
                    served_from_cache: true,
                });
            }
            Ok(None) => {
                tracing::debug!(route_key = %route_key, transport = %transport, "Route cache miss");
            }
            Err(e) => {
                tracing::warn!(route_key = %route_key, "Route cache read failed, fetching upstream: {}", e);
            }
        }

        // The fetch runs detached so a billed call still completes and gets cached
        // if the caller goes away mid-flight.
        let task = tokio::spawn(fetch_and_store(
            Arc::clone(&self.store),
            Arc::clone(&self.provider),
            route_key,
            transport,
            origin,
            destination,
        ));

        task.await
            .map_err(|e| RouteError::Interrupted(e.to_string()))?
    }
}

async fn fetch_and_store(
    store: Arc<dyn RouteCacheStore>,
    provider: Arc<dyn RouteProvider>,
    route_key: RouteKey,
    transport: TransportType,
    origin: Coordinate,
    destination: Coordinate,
) -> Result<RouteResult, RouteError> {
    tracing::info!(route_key = %route_key, transport = %transport, "Calling routing provider");

    let data = provider
        .fetch_route(transport, origin, destination)
        .await
        .map_err(|source| {
            tracing::error!(route_key = %route_key, transport = %transport, "Routing provider failed: {}", source);
            RouteError::Upstream { transport, source }
        })?;

    let entry = RouteCacheEntry {
        route_key: route_key.clone(),
        transport_type: transport,
        origin,
        destination,
        route_data: data.clone(),
        created_at: Utc::now(),
    };

    // A concurrent request that stored first wins; serve its payload so racers agree.
    let data = match store.put(entry).await {
        Ok(PutOutcome::Inserted) => {
            tracing::debug!(route_key = %route_key, "Route cached");
            data
        }
        Ok(PutOutcome::Kept(existing)) => {
            tracing::debug!(route_key = %route_key, "Route already cached by a concurrent request");
            existing.route_data
        }
        Err(e) => {
            tracing::warn!(route_key = %route_key, "Route cache write failed: {}", e);
            data
        }
    };

    Ok(RouteResult {
        data,
        served_from_cache: false,
    })
}
