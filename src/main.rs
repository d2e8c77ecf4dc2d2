use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod database;
mod error;
mod geokey;
mod providers;
mod recommend;
mod routes;
mod routing;

use config::{CacheBackend, Config};
use database::{MemoryRouteCache, RouteCacheStore, SqliteRouteCache};
use providers::{kakao::KakaoLocalClient, tmap::TmapClient};
use recommend::{RecommendationConfig, RecommendationResolver};
use routes::{create_router, ApiDoc, AppState};
use routing::RouteResolver;

const MEMORY_CACHE_CAPACITY: u64 = 10_000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geo_proxy_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize route cache
    let store: Arc<dyn RouteCacheStore> = match config.route_cache_backend {
        CacheBackend::Sqlite => {
            let pool = sqlx::SqlitePool::connect(&config.database_url).await?;
            let cache = SqliteRouteCache::new(pool, config.route_cache_ttl);
            cache.init_tables().await?;
            tracing::info!("Route cache backed by {}", config.database_url);
            Arc::new(cache)
        }
        CacheBackend::Memory => {
            tracing::info!("Route cache held in memory");
            Arc::new(MemoryRouteCache::new(config.route_cache_ttl, MEMORY_CACHE_CAPACITY))
        }
    };
    database::spawn_expiry_sweep(Arc::clone(&store), config.route_cache_sweep);

    // Initialize upstream clients
    let tmap_client = Arc::new(TmapClient::new(config.clone())?);
    let kakao_client = Arc::new(KakaoLocalClient::new(config.clone())?);

    let state = AppState {
        route_resolver: Arc::new(RouteResolver::new(Arc::clone(&store), tmap_client)),
        recommendations: Arc::new(RecommendationResolver::new(
            kakao_client,
            RecommendationConfig::default(),
        )),
        store,
    };

    let app = create_router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server starting on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
