use crate::{Error, Result, Vector};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

pub type ListingId = u64;

/// Mean earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// A rental listing with the attributes the similarity engine reads.
///
/// `id` and `price` stay the first two fields: stores may decode just that prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: ListingId,
    /// Nightly price. Values below 1 (including 0) count as 1 for price-band checks.
    pub price: f64,
    pub neighbourhood_group: String,
    /// Cleansed neighbourhood name
    pub neighbourhood: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub beds: Option<u32>,
    #[serde(default)]
    pub bathrooms_text: Option<String>,
    #[serde(default)]
    pub accommodates: Option<u32>,
    #[serde(default)]
    pub listing_url: Option<String>,
    /// Text handed to the vector provider when no embedding is stored yet.
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vector>,
    /// Most similar first; never contains `id`.
    #[serde(default)]
    pub similar_listings: Vec<ListingId>,
}

impl Listing {
    #[must_use]
    pub fn new(
        id: ListingId,
        price: f64,
        neighbourhood_group: impl Into<String>,
        neighbourhood: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id,
            price,
            neighbourhood_group: neighbourhood_group.into(),
            neighbourhood: neighbourhood.into(),
            latitude: Some(latitude),
            longitude: Some(longitude),
            room_type: None,
            property_type: None,
            bedrooms: None,
            beds: None,
            bathrooms_text: None,
            accommodates: None,
            listing_url: None,
            summary: None,
            embedding: None,
            similar_listings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vector) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    #[must_use]
    pub fn with_room_type(mut self, room_type: impl Into<String>) -> Self {
        self.room_type = Some(room_type.into());
        self
    }

    #[must_use]
    pub fn with_bedrooms(mut self, bedrooms: u32) -> Self {
        self.bedrooms = Some(bedrooms);
        self
    }

    /// Price used by the price band: anything below 1 is lifted to 1.
    #[inline]
    pub fn effective_price(&self) -> f64 {
        self.price.max(1.0)
    }

    #[inline]
    pub fn log_price(&self) -> f64 {
        self.effective_price().log10()
    }

    pub fn geo(&self) -> Result<GeoPoint> {
        let (lat, lon) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return Err(Error::invalid(self.id, "missing latitude/longitude")),
        };
        if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
            return Err(Error::invalid(
                self.id,
                format!("coordinates out of range: ({}, {})", lat, lon),
            ));
        }
        Ok(GeoPoint::new(lat, lon))
    }

    /// Check the required attributes. Optional ones are never inspected here.
    pub fn validate(&self) -> Result<()> {
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(Error::invalid(self.id, format!("invalid price {}", self.price)));
        }
        if self.neighbourhood.trim().is_empty() {
            return Err(Error::invalid(self.id, "empty neighbourhood"));
        }
        self.geo()?;
        if let Some(embedding) = &self.embedding {
            check_embedding(self.id, embedding, None)?;
        }
        Ok(())
    }
}

/// Reject empty, non-finite or zero embeddings and (optionally) a dimension mismatch.
pub(crate) fn check_embedding(id: ListingId, embedding: &Vector, dim: Option<usize>) -> Result<()> {
    if embedding.is_empty() {
        return Err(Error::invalid(id, "empty embedding"));
    }
    if let Some(expected) = dim {
        if embedding.dim() != expected {
            return Err(Error::invalid(
                id,
                format!("embedding dimension {} (expected {})", embedding.dim(), expected),
            ));
        }
    }
    if !embedding.is_finite() {
        return Err(Error::invalid(id, "embedding contains non-finite values"));
    }
    if embedding.norm() <= f32::EPSILON {
        return Err(Error::invalid(id, "zero embedding"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    #[inline]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Great-circle distance in miles (haversine).
    pub fn haversine_miles(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_MILES * a.sqrt().min(1.0).asin()
    }
}

/// Pre-digested attributes that the filters and the selector read.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFeatures {
    pub id: ListingId,
    pub log_price: f64,
    pub neighbourhood: u32,
    pub room_type: Option<u32>,
    pub bedrooms: Option<u32>,
    pub geo: GeoPoint,
}

/// Features for a pool of listings, with neighbourhood and room type strings interned so
/// pairwise checks compare integers.
#[derive(Debug, Default)]
pub struct FeatureTable {
    features: Vec<ListingFeatures>,
    symbols: AHashMap<String, u32>,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            features: Vec::with_capacity(capacity),
            symbols: AHashMap::new(),
        }
    }

    fn intern(&mut self, value: &str) -> u32 {
        if let Some(&symbol) = self.symbols.get(value) {
            return symbol;
        }
        let symbol = self.symbols.len() as u32;
        self.symbols.insert(value.to_string(), symbol);
        symbol
    }

    /// Digest a listing without adding it to the pool. Reference listings of online
    /// queries go through here so they share the pool's symbols.
    pub fn describe(&mut self, listing: &Listing) -> Result<ListingFeatures> {
        listing.validate()?;
        let geo = listing.geo()?;
        let neighbourhood = self.intern(listing.neighbourhood.trim());
        let room_type = listing
            .room_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| self.intern(s));
        Ok(ListingFeatures {
            id: listing.id,
            log_price: listing.log_price(),
            neighbourhood,
            room_type,
            bedrooms: listing.bedrooms,
            geo,
        })
    }

    /// Digest and append; returns the pool index.
    pub fn push(&mut self, listing: &Listing) -> Result<usize> {
        let features = self.describe(listing)?;
        self.features.push(features);
        Ok(self.features.len() - 1)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> &ListingFeatures {
        &self.features[index]
    }

    #[inline]
    pub fn as_slice(&self) -> &[ListingFeatures] {
        &self.features
    }
}
