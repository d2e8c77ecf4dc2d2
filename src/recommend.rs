use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::geokey::Coordinate;
use crate::providers::types::{KeywordSearchRequest, Place, SortOrder};
use crate::providers::{PlaceSearchProvider, ProviderError};

#[derive(Error, Debug)]
pub enum RecommendError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Place search failed: {0}")]
    Upstream(#[from] ProviderError),
}

/// Radius used when the requested size is at most `max_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadiusTier {
    pub max_size: u32,
    pub radius_m: u32,
}

/// Lookup tables for the recommendation resolver.
#[derive(Debug, Clone)]
pub struct RecommendationConfig {
    /// Client category to provider search keyword.
    pub category_keywords: HashMap<String, String>,
    /// Checked in order; the first tier that fits wins.
    pub radius_tiers: Vec<RadiusTier>,
    pub fallback_radius_m: u32,
    /// Label fragments the provider mislabels into a category, per category.
    pub category_exclusions: HashMap<String, Vec<String>>,
    /// Most results the provider returns from one call.
    pub result_cap: u32,
    pub default_nearby_size: u32,
    pub default_search_size: u32,
    pub search_radius_m: u32,
    pub load_more_increment: u32,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        let category_keywords = [
            ("restaurant", "맛집"),
            ("cafe", "카페"),
            ("attraction", "관광명소"),
        ]
        .into_iter()
        .map(|(category, keyword)| (category.to_string(), keyword.to_string()))
        .collect();

        let category_exclusions = HashMap::from([(
            "restaurant".to_string(),
            vec!["카페".to_string(), "cafe".to_string()],
        )]);

        Self {
            category_keywords,
            radius_tiers: vec![
                RadiusTier { max_size: 3, radius_m: 2000 },
                RadiusTier { max_size: 6, radius_m: 3000 },
            ],
            fallback_radius_m: 5000,
            category_exclusions,
            result_cap: 15,
            default_nearby_size: 3,
            default_search_size: 15,
            search_radius_m: 5000,
            load_more_increment: 3,
        }
    }
}

impl RecommendationConfig {
    /// Unknown categories are searched literally.
    pub fn keyword_for<'a>(&'a self, category: &'a str) -> &'a str {
        self.category_keywords
            .get(category)
            .map(String::as_str)
            .unwrap_or(category)
    }

    pub fn radius_for(&self, requested_size: u32) -> u32 {
        self.radius_tiers
            .iter()
            .find(|tier| requested_size <= tier.max_size)
            .map(|tier| tier.radius_m)
            .unwrap_or(self.fallback_radius_m)
    }

    pub fn exclusions_for(&self, category: &str) -> Option<&[String]> {
        self.category_exclusions.get(category).map(Vec::as_slice)
    }
}

/// True when `label` contains any of `markers`, ignoring case.
pub fn label_is_excluded(label: &str, markers: &[String]) -> bool {
    let label = label.to_lowercase();
    markers
        .iter()
        .any(|marker| label.contains(&marker.to_lowercase()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyQuery {
    pub center: Coordinate,
    pub category: String,
    pub requested_size: u32,
}

impl NearbyQuery {
    /// Builds a query from raw request parameters. `size` falls back to `default_size`.
    pub fn parse(
        latitude: Option<&str>,
        longitude: Option<&str>,
        category: Option<&str>,
        size: Option<&str>,
        default_size: u32,
    ) -> Result<Self, RecommendError> {
        let (Some(latitude), Some(longitude), Some(category)) = (
            non_blank(latitude),
            non_blank(longitude),
            non_blank(category),
        ) else {
            return Err(RecommendError::InvalidQuery(
                "latitude, longitude and category are required".to_string(),
            ));
        };

        Ok(Self {
            center: parse_center(latitude, longitude)?,
            category: category.to_string(),
            requested_size: parse_size(size, default_size)?,
        })
    }
}

pub fn parse_center(latitude: &str, longitude: &str) -> Result<Coordinate, RecommendError> {
    let lat = parse_f64("latitude", latitude)?;
    let lon = parse_f64("longitude", longitude)?;
    Coordinate::from_lon_lat(lon, lat).map_err(|e| RecommendError::InvalidQuery(e.to_string()))
}

pub fn parse_size(size: Option<&str>, default_size: u32) -> Result<u32, RecommendError> {
    match non_blank(size) {
        None => Ok(default_size),
        Some(raw) => match raw.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(n),
            _ => Err(RecommendError::InvalidQuery(format!(
                "size must be a positive integer, got {raw:?}"
            ))),
        },
    }
}

fn parse_f64(field: &str, raw: &str) -> Result<f64, RecommendError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RecommendError::InvalidQuery(format!("invalid {field}: {raw:?}")))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Nearby recommendations over a keyword-search provider.
///
/// Every call is a fresh bounded fetch. The provider has no stable cursor, so
/// "load more" re-issues the query with a larger size instead of paginating.
pub struct RecommendationResolver {
    provider: Arc<dyn PlaceSearchProvider>,
    config: RecommendationConfig,
}

impl RecommendationResolver {
    pub fn new(provider: Arc<dyn PlaceSearchProvider>, config: RecommendationConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &RecommendationConfig {
        &self.config
    }

    pub async fn find_nearby(&self, query: &NearbyQuery) -> Result<Vec<Place>, RecommendError> {
        if query.requested_size == 0 {
            return Err(RecommendError::InvalidQuery("size must be at least 1".to_string()));
        }

        let keyword = self.config.keyword_for(&query.category);
        let exclusions = self.config.exclusions_for(&query.category);
        let cap = self.config.result_cap;
        // filtering can only shrink the set, so filtered categories always ask for the cap
        let fetch_size = match exclusions {
            Some(_) => cap,
            None => query.requested_size.min(cap),
        };
        let radius_m = self.config.radius_for(query.requested_size);

        let request = KeywordSearchRequest {
            keyword: keyword.to_string(),
            center: Some(query.center),
            radius_m,
            size: fetch_size,
            sort: SortOrder::Distance,
        };
        tracing::debug!(
            category = %query.category,
            keyword,
            requested = query.requested_size,
            fetch_size,
            radius_m,
            "Searching nearby places"
        );

        let places = self.fetch_places(&request).await?;
        let fetched = places.len();

        let mut places: Vec<Place> = match exclusions {
            Some(markers) => places
                .into_iter()
                .filter(|place| !label_is_excluded(&place.category_label, markers))
                .collect(),
            None => places,
        };
        if exclusions.is_some() {
            tracing::debug!(fetched, kept = places.len(), "Applied category correction");
        }

        places.truncate(query.requested_size as usize);
        Ok(places)
    }

    /// Re-runs `query` asking for `loaded` plus one more page.
    pub async fn load_more(
        &self,
        query: &NearbyQuery,
        loaded: u32,
    ) -> Result<Vec<Place>, RecommendError> {
        let next = NearbyQuery {
            requested_size: loaded.saturating_add(self.config.load_more_increment),
            ..query.clone()
        };
        self.find_nearby(&next).await
    }

    pub async fn search(
        &self,
        keyword: &str,
        center: Option<Coordinate>,
        size: u32,
    ) -> Result<Vec<Place>, RecommendError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(RecommendError::InvalidQuery("keyword is required".to_string()));
        }

        let request = KeywordSearchRequest {
            keyword: keyword.to_string(),
            center,
            radius_m: self.config.search_radius_m,
            size: size.clamp(1, self.config.result_cap),
            sort: if center.is_some() {
                SortOrder::Distance
            } else {
                SortOrder::Accuracy
            },
        };
        self.fetch_places(&request).await
    }

    async fn fetch_places(&self, request: &KeywordSearchRequest) -> Result<Vec<Place>, RecommendError> {
        let documents = self.provider.keyword_search(request).await.map_err(|e| {
            tracing::error!(keyword = %request.keyword, "Place search failed: {}", e);
            e
        })?;

        let places = documents
            .into_iter()
            .map(Place::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(places)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{place, MockPlaceSearch};
    use serde_json::json;

    fn center() -> Coordinate {
        Coordinate { x: 126.978, y: 37.5665 }
    }

    fn nearby(category: &str, size: u32) -> NearbyQuery {
        NearbyQuery {
            center: center(),
            category: category.to_string(),
            requested_size: size,
        }
    }

    fn mixed_restaurant_results() -> Vec<crate::providers::types::PlaceDocument> {
        vec![
            place("1", "스타벅스", "음식점 > 카페 > 커피전문점", 80),
            place("2", "을지면옥", "음식점 > 한식 > 냉면", 120),
            place("3", "Blue Bottle", "음식점 > Cafe", 150),
            place("4", "우래옥", "음식점 > 한식 > 냉면", 210),
            place("5", "하동관", "음식점 > 한식 > 국밥", 260),
            place("6", "명동교자", "음식점 > 한식 > 국수", 330),
        ]
    }

    fn resolver(provider: Arc<MockPlaceSearch>) -> RecommendationResolver {
        RecommendationResolver::new(provider, RecommendationConfig::default())
    }

    #[test]
    fn test_radius_tiers() {
        let config = RecommendationConfig::default();
        assert_eq!(config.radius_for(1), 2000);
        assert_eq!(config.radius_for(3), 2000);
        assert_eq!(config.radius_for(4), 3000);
        assert_eq!(config.radius_for(6), 3000);
        assert_eq!(config.radius_for(7), 5000);
        assert_eq!(config.radius_for(40), 5000);
    }

    #[test]
    fn test_keyword_mapping_passes_unknown_through() {
        let config = RecommendationConfig::default();
        assert_eq!(config.keyword_for("restaurant"), "맛집");
        assert_eq!(config.keyword_for("attraction"), "관광명소");
        assert_eq!(config.keyword_for("서점"), "서점");
    }

    #[test]
    fn test_label_exclusion_ignores_case() {
        let markers = vec!["카페".to_string(), "cafe".to_string()];
        assert!(label_is_excluded("음식점 > 카페", &markers));
        assert!(label_is_excluded("음식점 > Cafe", &markers));
        assert!(label_is_excluded("CAFE & BAR", &markers));
        assert!(!label_is_excluded("음식점 > 한식", &markers));
    }

    #[tokio::test]
    async fn test_restaurants_exclude_cafes() {
        let provider = Arc::new(MockPlaceSearch::new(mixed_restaurant_results()));
        let resolver = resolver(provider.clone());

        let places = resolver.find_nearby(&nearby("restaurant", 3)).await.unwrap();

        let ids: Vec<_> = places.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["2", "4", "5"]);
        assert!(places
            .iter()
            .all(|p| !p.category_label.to_lowercase().contains("cafe")
                && !p.category_label.contains("카페")));

        let request = provider.last_request().unwrap();
        assert_eq!(request.keyword, "맛집");
        assert_eq!(request.size, 15);
        assert_eq!(request.radius_m, 2000);
        assert_eq!(request.sort, SortOrder::Distance);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_unfiltered_category_fetches_only_what_it_needs() {
        let provider = Arc::new(MockPlaceSearch::new(mixed_restaurant_results()));
        let resolver = resolver(provider.clone());

        let places = resolver.find_nearby(&nearby("cafe", 2)).await.unwrap();

        assert_eq!(places.len(), 2);
        let request = provider.last_request().unwrap();
        assert_eq!(request.keyword, "카페");
        assert_eq!(request.size, 2);
    }

    #[tokio::test]
    async fn test_results_are_bounded_and_nearest_first() {
        let provider = Arc::new(MockPlaceSearch::new(mixed_restaurant_results()));
        let resolver = resolver(provider);

        for size in 1..=20 {
            for category in ["restaurant", "cafe", "attraction"] {
                let places = resolver.find_nearby(&nearby(category, size)).await.unwrap();
                assert!(places.len() <= size as usize);
                assert!(places
                    .windows(2)
                    .all(|w| w[0].distance_meters <= w[1].distance_meters));
            }
        }
    }

    #[tokio::test]
    async fn test_large_requests_use_the_cap_and_wide_radius() {
        let provider = Arc::new(MockPlaceSearch::new(mixed_restaurant_results()));
        let resolver = resolver(provider.clone());

        resolver.find_nearby(&nearby("attraction", 30)).await.unwrap();

        let request = provider.last_request().unwrap();
        assert_eq!(request.size, 15);
        assert_eq!(request.radius_m, 5000);
    }

    #[tokio::test]
    async fn test_everything_filtered_is_an_empty_success() {
        let provider = Arc::new(MockPlaceSearch::new(vec![
            place("1", "스타벅스", "음식점 > 카페", 80),
            place("2", "투썸플레이스", "음식점 > 카페 > 커피전문점", 90),
        ]));
        let resolver = resolver(provider);

        let places = resolver.find_nearby(&nearby("restaurant", 3)).await.unwrap();
        assert!(places.is_empty());
    }

    #[tokio::test]
    async fn test_load_more_reissues_with_larger_size() {
        let provider = Arc::new(MockPlaceSearch::new(mixed_restaurant_results()));
        let resolver = resolver(provider.clone());

        let first = resolver.find_nearby(&nearby("restaurant", 3)).await.unwrap();
        let more = resolver.load_more(&nearby("restaurant", 3), 3).await.unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(more.len(), 4); // only four non-cafe results exist
        assert_eq!(&more[..3], &first[..]);
        assert_eq!(provider.last_request().unwrap().radius_m, 3000);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_upstream_failure_surfaces() {
        let provider = Arc::new(MockPlaceSearch::failing(
            401,
            json!({"errorType": "AccessDeniedError", "message": "wrong appKey"}),
        ));
        let resolver = resolver(provider.clone());

        let err = resolver.find_nearby(&nearby("cafe", 3)).await.unwrap_err();
        match err {
            RecommendError::Upstream(ProviderError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body["errorType"], "AccessDeniedError");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_search_without_center() {
        let provider = Arc::new(MockPlaceSearch::new(mixed_restaurant_results()));
        let resolver = resolver(provider.clone());

        let places = resolver.search("냉면", None, 40).await.unwrap();
        assert_eq!(places.len(), 6);
        let request = provider.last_request().unwrap();
        assert_eq!(request.center, None);
        assert_eq!(request.size, 15);
        assert_eq!(request.sort, SortOrder::Accuracy);

        assert!(matches!(
            resolver.search("  ", Some(center()), 5).await,
            Err(RecommendError::InvalidQuery(_))
        ));
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn test_query_parsing() {
        let query = NearbyQuery::parse(Some("37.5665"), Some("126.978"), Some("cafe"), None, 3)
            .unwrap();
        assert_eq!(query.center, center());
        assert_eq!(query.requested_size, 3);

        let sized = NearbyQuery::parse(Some("37.5"), Some("127.0"), Some("cafe"), Some("9"), 3)
            .unwrap();
        assert_eq!(sized.requested_size, 9);

        for (lat, lon, category, size) in [
            (None, Some("127.0"), Some("cafe"), None),
            (Some("37.5"), Some("127.0"), Some(""), None),
            (Some("north"), Some("127.0"), Some("cafe"), None),
            (Some("37.5"), Some("127.0"), Some("cafe"), Some("0")),
            (Some("37.5"), Some("127.0"), Some("cafe"), Some("many")),
            (Some("95.0"), Some("127.0"), Some("cafe"), None),
        ] {
            assert!(matches!(
                NearbyQuery::parse(lat, lon, category, size, 3),
                Err(RecommendError::InvalidQuery(_))
            ));
        }
    }
}
