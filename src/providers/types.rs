use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ProviderError;
use crate::geokey::Coordinate;

// Routing request bodies

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PedestrianRouteRequest {
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
    pub req_coord_type: &'static str,
    pub res_coord_type: &'static str,
    pub start_name: String,
    pub end_name: String,
}

impl PedestrianRouteRequest {
    pub fn new(origin: Coordinate, destination: Coordinate) -> Self {
        Self {
            start_x: origin.x,
            start_y: origin.y,
            end_x: destination.x,
            end_y: destination.y,
            req_coord_type: "WGS84GEO",
            res_coord_type: "WGS84GEO",
            start_name: "출발지".to_string(),
            end_name: "도착지".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitRouteRequest {
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
    pub count: u32,
}

// Keyword search

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Distance,
    Accuracy,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Distance => "distance",
            SortOrder::Accuracy => "accuracy",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordSearchRequest {
    pub keyword: String,
    /// Without a center the provider runs an unbounded keyword search.
    pub center: Option<Coordinate>,
    pub radius_m: u32,
    pub size: u32,
    pub sort: SortOrder,
}

impl KeywordSearchRequest {
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("query", self.keyword.clone()),
            ("size", self.size.to_string()),
            ("sort", self.sort.as_str().to_string()),
        ];
        if let Some(center) = self.center {
            params.push(("x", center.x.to_string()));
            params.push(("y", center.y.to_string()));
            params.push(("radius", self.radius_m.to_string()));
        }
        params
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeywordSearchResponse {
    pub documents: Vec<PlaceDocument>,
}

/// One search hit as the provider encodes it; every field arrives as text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlaceDocument {
    pub id: String,
    pub place_name: String,
    pub category_name: String,
    pub address_name: String,
    pub road_address_name: String,
    pub phone: String,
    pub x: String,
    pub y: String,
    pub distance: String,
    pub place_url: String,
}

/// A place as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Place {
    pub id: String,
    pub name: String,
    #[serde(rename = "category")]
    pub category_label: String,
    pub address: String,
    pub phone: Option<String>,
    pub coordinates: Coordinate,
    /// Metres from the query point; absent for searches without a center.
    #[serde(rename = "distance")]
    pub distance_meters: Option<u32>,
    #[serde(rename = "placeUrl")]
    pub provider_url: String,
}

impl TryFrom<PlaceDocument> for Place {
    type Error = ProviderError;

    fn try_from(doc: PlaceDocument) -> Result<Self, Self::Error> {
        let x = parse_number::<f64>(&doc, "x", &doc.x)?;
        let y = parse_number::<f64>(&doc, "y", &doc.y)?;
        let distance_meters = if doc.distance.trim().is_empty() {
            None
        } else {
            Some(parse_number::<u32>(&doc, "distance", &doc.distance)?)
        };
        let address = if doc.road_address_name.trim().is_empty() {
            doc.address_name
        } else {
            doc.road_address_name
        };
        let phone = Some(doc.phone).filter(|p| !p.trim().is_empty());

        Ok(Place {
            id: doc.id,
            name: doc.place_name,
            category_label: doc.category_name,
            address,
            phone,
            coordinates: Coordinate { x, y },
            distance_meters,
            provider_url: doc.place_url,
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    doc: &PlaceDocument,
    field: &str,
    raw: &str,
) -> Result<T, ProviderError> {
    raw.trim().parse::<T>().map_err(|_| {
        ProviderError::Rejected(serde_json::json!({
            "reason": format!("unparsable {field}"),
            "id": doc.id,
            "value": raw,
        }))
    })
}
