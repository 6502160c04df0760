use crate::error::ApiError;
use crate::geocoder::{lookup, Geocoder};
use devcamper_core::{parse_distance, Document, RadiusQuery, BOOTCAMPS};
use devcamper_storage::{DocumentStore, FindOptions};
use std::time::Duration;
use tracing::debug;

/// Turns a postal code and a distance in miles into a spherical
/// containment query and runs it against the bootcamps.
pub struct RadiusResolver<'a> {
    geocoder: &'a dyn Geocoder,
    timeout: Duration,
}

impl<'a> RadiusResolver<'a> {
    pub fn new(geocoder: &'a dyn Geocoder, timeout: Duration) -> Self {
        Self { geocoder, timeout }
    }

    /// The distance is validated before the geocoder is called.
    pub async fn resolve(&self, postal_code: &str, distance: &str) -> Result<RadiusQuery, ApiError> {
        let distance = parse_distance(distance)?;
        let found = lookup(self.geocoder, postal_code, self.timeout).await?;
        let first = found.first().ok_or_else(|| {
            ApiError::NotFound(format!("no location found for postal code {postal_code}"))
        })?;
        Ok(RadiusQuery::new(postal_code, distance, first.point())?)
    }

    /// Matching bootcamps in insertion order, unpaginated.
    pub async fn search(
        &self,
        store: &dyn DocumentStore,
        postal_code: &str,
        distance: &str,
    ) -> Result<Vec<Document>, ApiError> {
        let query = self.resolve(postal_code, distance).await?;
        let filter = query.filter();
        debug!(filter = %filter.to_json(), "radius search");
        Ok(store.find(BOOTCAMPS, &filter, FindOptions::default()).await?)
    }
}
