use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

/// 4 decimal places, roughly an 11 m grid.
const GRID_SCALE: f64 = 10_000.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoKeyError {
    #[error("Invalid coordinate for {field}: {value}")]
    InvalidCoordinate { field: &'static str, value: String },
}

impl GeoKeyError {
    fn invalid(field: &'static str, value: impl fmt::Display) -> Self {
        GeoKeyError::InvalidCoordinate {
            field,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportType {
    Walk,
    Transit,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Walk => "WALK",
            TransportType::Transit => "TRANSIT",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WALK" => Ok(TransportType::Walk),
            "TRANSIT" => Ok(TransportType::Transit),
            other => Err(format!("unknown transport type: {other}")),
        }
    }
}

/// WGS84 point in provider axis order: `x` is longitude, `y` is latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    /// Builds a point that is safe to send upstream: finite and inside WGS84 bounds.
    pub fn from_lon_lat(lon: f64, lat: f64) -> Result<Self, GeoKeyError> {
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(GeoKeyError::invalid("longitude", lon));
        }
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeoKeyError::invalid("latitude", lat));
        }
        Ok(Self { x: lon, y: lat })
    }
}

/// A coordinate component as callers hand it over: JSON numbers or query-string text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CoordinateValue {
    Number(f64),
    Text(String),
}

impl CoordinateValue {
    /// Empty text counts as absent.
    pub fn is_blank(&self) -> bool {
        matches!(self, CoordinateValue::Text(text) if text.trim().is_empty())
    }

    pub fn to_f64(&self, field: &'static str) -> Result<f64, GeoKeyError> {
        let value = match self {
            CoordinateValue::Number(n) => *n,
            CoordinateValue::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|_| GeoKeyError::invalid(field, text))?,
        };
        if !value.is_finite() {
            return Err(GeoKeyError::invalid(field, value));
        }
        Ok(value)
    }
}

impl From<f64> for CoordinateValue {
    fn from(value: f64) -> Self {
        CoordinateValue::Number(value)
    }
}

impl From<&str> for CoordinateValue {
    fn from(value: &str) -> Self {
        CoordinateValue::Text(value.to_string())
    }
}

impl From<String> for CoordinateValue {
    fn from(value: String) -> Self {
        CoordinateValue::Text(value)
    }
}

/// Cache identity of a route: quantized endpoints plus transport mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteKey(String);

impl RouteKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps a key read back from storage; no re-quantization happens.
    pub fn from_stored(raw: String) -> Self {
        RouteKey(raw)
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quantizes both endpoints onto the 4-decimal grid and renders
/// `"ox,oy_dx,dy_TRANSPORT"`.
pub fn normalize(
    origin_lon: f64,
    origin_lat: f64,
    dest_lon: f64,
    dest_lat: f64,
    transport: TransportType,
) -> Result<RouteKey, GeoKeyError> {
    let ox = quantize("startX", origin_lon)?;
    let oy = quantize("startY", origin_lat)?;
    let dx = quantize("endX", dest_lon)?;
    let dy = quantize("endY", dest_lat)?;

    Ok(RouteKey(format!("{ox},{oy}_{dx},{dy}_{transport}")))
}

pub fn route_key(
    origin: &Coordinate,
    destination: &Coordinate,
    transport: TransportType,
) -> Result<RouteKey, GeoKeyError> {
    normalize(origin.x, origin.y, destination.x, destination.y, transport)
}

fn quantize(field: &'static str, value: f64) -> Result<f64, GeoKeyError> {
    if !value.is_finite() {
        return Err(GeoKeyError::invalid(field, value));
    }
    let rounded = (value * GRID_SCALE).round() / GRID_SCALE;
    // fold -0.0 into 0.0 so both render as "0"
    Ok(rounded + 0.0)
}
