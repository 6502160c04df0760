use crate::errors::{Result, StoreError};
use crate::query::{Condition, Filter};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in miles. Distances throughout the API are miles.
pub const EARTH_RADIUS_MILES: f64 = 3_963.0;

/// Field holding the `[longitude, latitude]` pair of a bootcamp.
pub const LOCATION_COORDINATES: &str = "location.coordinates";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Store coordinate-pair order: longitude first.
    pub fn lng_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }

    pub fn from_lng_lat(pair: [f64; 2]) -> Self {
        Self {
            latitude: pair[1],
            longitude: pair[0],
        }
    }

    /// Great-circle distance to `other` in radians (haversine).
    pub fn angular_distance(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.longitude - self.longitude).to_radians();
        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * h.sqrt().min(1.0).asin()
    }
}

/// Converts a distance in miles to an angular radius on the Earth sphere.
pub fn angular_radius(distance_miles: f64) -> Result<f64> {
    if !distance_miles.is_finite() || distance_miles < 0.0 {
        return Err(StoreError::malformed(format!(
            "distance must be a non-negative number of miles, got {distance_miles}"
        )));
    }
    Ok(distance_miles / EARTH_RADIUS_MILES)
}

pub fn parse_distance(raw: &str) -> Result<f64> {
    let d = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| StoreError::malformed(format!("distance '{raw}' is not a number")))?;
    angular_radius(d)?;
    Ok(d)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadiusQuery {
    pub postal_code: String,
    pub distance: f64,
    pub center: GeoPoint,
    pub radius: f64,
}

impl RadiusQuery {
    pub fn new(postal_code: impl Into<String>, distance: f64, center: GeoPoint) -> Result<Self> {
        Ok(Self {
            postal_code: postal_code.into(),
            distance,
            center,
            radius: angular_radius(distance)?,
        })
    }

    /// `location.coordinates` within `radius` of `center`.
    pub fn filter(&self) -> Filter {
        Filter::all().with_term(
            LOCATION_COORDINATES,
            Condition::WithinSphere {
                center: self.center.lng_lat(),
                radius: self.radius,
            },
        )
    }
}
