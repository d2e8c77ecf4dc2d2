use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::{
    database::RouteCacheStore,
    error::{ApiError, ErrorBody},
    geokey::{Coordinate, CoordinateValue, TransportType},
    providers::types::Place,
    recommend::{parse_center, parse_size, NearbyQuery, RecommendationResolver},
    routing::{RoutePoints, RouteResolver},
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub route_resolver: Arc<RouteResolver>,
    pub recommendations: Arc<RecommendationResolver>,
    pub store: Arc<dyn RouteCacheStore>,
}

// Request/Response types
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct RouteQuery {
    /// Origin longitude
    pub start_x: Option<String>,
    /// Origin latitude
    pub start_y: Option<String>,
    /// Destination longitude
    pub end_x: Option<String>,
    /// Destination latitude
    pub end_y: Option<String>,
}

impl From<RouteQuery> for RoutePoints {
    fn from(query: RouteQuery) -> Self {
        RoutePoints {
            start_x: query.start_x.map(CoordinateValue::from),
            start_y: query.start_y.map(CoordinateValue::from),
            end_x: query.end_x.map(CoordinateValue::from),
            end_y: query.end_y.map(CoordinateValue::from),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NearbyParams {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    /// `restaurant`, `cafe`, `attraction`, or any literal keyword
    pub category: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoadMoreParams {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub category: Option<String>,
    /// How many results the client already shows
    pub loaded: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    pub keyword: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RouteResponse {
    pub success: bool,
    /// Provider payload, stored and returned verbatim
    #[schema(value_type = Object)]
    pub data: Value,
    pub cached: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlacesResponse {
    pub success: bool,
    pub data: Vec<Place>,
    pub count: usize,
}

impl PlacesResponse {
    fn new(data: Vec<Place>) -> Self {
        Self {
            success: true,
            count: data.len(),
            data,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

// Route handlers
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service status", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = match state.store.health_check().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!("Route cache health check failed: {}", e);
            "unavailable"
        }
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        store: store.to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/api/routes/walk",
    params(RouteQuery),
    responses(
        (status = 200, description = "Walking directions", body = RouteResponse),
        (status = 400, description = "Missing or invalid coordinates", body = ErrorBody),
        (status = 502, description = "Routing provider failed", body = ErrorBody),
        (status = 504, description = "Routing provider timed out", body = ErrorBody)
    )
)]
pub async fn walk_route(
    State(state): State<AppState>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<RouteResponse>, ApiError> {
    route(&state, query, TransportType::Walk).await
}

#[utoipa::path(
    get,
    path = "/api/routes/transit",
    params(RouteQuery),
    responses(
        (status = 200, description = "Transit itineraries", body = RouteResponse),
        (status = 400, description = "Missing or invalid coordinates", body = ErrorBody),
        (status = 502, description = "Routing provider failed", body = ErrorBody),
        (status = 504, description = "Routing provider timed out", body = ErrorBody)
    )
)]
pub async fn transit_route(
    State(state): State<AppState>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<RouteResponse>, ApiError> {
    route(&state, query, TransportType::Transit).await
}

async fn route(
    state: &AppState,
    query: RouteQuery,
    transport: TransportType,
) -> Result<Json<RouteResponse>, ApiError> {
    let result = state
        .route_resolver
        .resolve_route(query.into(), transport)
        .await?;

    Ok(Json(RouteResponse {
        success: true,
        data: result.data,
        cached: result.served_from_cache,
    }))
}

#[utoipa::path(
    get,
    path = "/api/recommendations/nearby",
    params(NearbyParams),
    responses(
        (status = 200, description = "Places nearest first", body = PlacesResponse),
        (status = 400, description = "Missing or invalid parameters", body = ErrorBody),
        (status = 502, description = "Search provider failed", body = ErrorBody)
    )
)]
pub async fn nearby(
    State(state): State<AppState>,
    Query(params): Query<NearbyParams>,
) -> Result<Json<PlacesResponse>, ApiError> {
    let query = NearbyQuery::parse(
        params.latitude.as_deref(),
        params.longitude.as_deref(),
        params.category.as_deref(),
        params.size.as_deref(),
        state.recommendations.config().default_nearby_size,
    )?;

    let places = state.recommendations.find_nearby(&query).await?;
    Ok(Json(PlacesResponse::new(places)))
}

#[utoipa::path(
    get,
    path = "/api/recommendations/more",
    params(LoadMoreParams),
    responses(
        (status = 200, description = "The same query with one more page", body = PlacesResponse),
        (status = 400, description = "Missing or invalid parameters", body = ErrorBody),
        (status = 502, description = "Search provider failed", body = ErrorBody)
    )
)]
pub async fn load_more(
    State(state): State<AppState>,
    Query(params): Query<LoadMoreParams>,
) -> Result<Json<PlacesResponse>, ApiError> {
    let config = state.recommendations.config();
    let loaded = parse_size(params.loaded.as_deref(), config.default_nearby_size)?;
    let query = NearbyQuery::parse(
        params.latitude.as_deref(),
        params.longitude.as_deref(),
        params.category.as_deref(),
        None,
        loaded,
    )?;

    let places = state.recommendations.load_more(&query, loaded).await?;
    Ok(Json(PlacesResponse::new(places)))
}

#[utoipa::path(
    get,
    path = "/api/recommendations/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Keyword search results", body = PlacesResponse),
        (status = 400, description = "Missing keyword or invalid parameters", body = ErrorBody),
        (status = 502, description = "Search provider failed", body = ErrorBody)
    )
)]
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<PlacesResponse>, ApiError> {
    let keyword = params.keyword.unwrap_or_default();
    let config = state.recommendations.config();
    let size = parse_size(params.size.as_deref(), config.default_search_size)?;

    // a center is only used when both halves are present
    let center: Option<Coordinate> = match (params.latitude.as_deref(), params.longitude.as_deref()) {
        (Some(lat), Some(lon)) if !lat.trim().is_empty() && !lon.trim().is_empty() => {
            Some(parse_center(lat.trim(), lon.trim())?)
        }
        _ => None,
    };

    let places = state.recommendations.search(&keyword, center, size).await?;
    Ok(Json(PlacesResponse::new(places)))
}

#[derive(OpenApi)]
#[openapi(
    paths(health, walk_route, transit_route, nearby, load_more, search),
    components(schemas(
        RouteResponse,
        PlacesResponse,
        HealthResponse,
        ErrorBody,
        Place,
        Coordinate
    )),
    tags((name = "geo-proxy", description = "Cached routing and place recommendations"))
)]
pub struct ApiDoc;

// Create the router
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/routes/walk", get(walk_route))
        .route("/routes/transit", get(transit_route))
        .route("/recommendations/nearby", get(nearby))
        .route("/recommendations/more", get(load_more))
        .route("/recommendations/search", get(search));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(state)
}
