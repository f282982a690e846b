//! Geometry types for proximity queries.
//!
//! This module provides the validated geographic types the engine works
//! with:
//! - `GeoPoint`: a latitude/longitude pair, range-checked at construction
//! - `GeoBounds`: a latitude/longitude aligned bounding box (a geohash cell)
//! - `Region`: a circular query region (center + radius in meters)
//!
//! Distance is great-circle distance via the Haversine formula, which is
//! accurate enough for radius membership tests at the scales the engine
//! targets (meters to a few hundred kilometers).

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::sync::Arc;

use crate::errors::{ErrorKind, GeoNearError, GeoNearResult};

/// Earth's mean radius in meters (WGS84)
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Meters spanned by one degree of latitude, and by one degree of longitude
/// at the equator.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// A geographic point with validated latitude and longitude coordinates.
///
/// This type provides explicit type safety for geographic coordinates,
/// validating that:
/// - Latitude is between -90 and 90 degrees
/// - Longitude is between -180 and 180 degrees
///
/// Out-of-range values are rejected at construction with
/// `ErrorKind::InvalidCoordinate` and are never stored anywhere in the
/// engine.
///
/// ## Example
///
/// ```rust
/// use geonear::geometry::GeoPoint;
///
/// let minneapolis = GeoPoint::new(45.0, -93.265).unwrap();
/// assert_eq!(minneapolis.latitude(), 45.0);
/// assert_eq!(minneapolis.longitude(), -93.265);
///
/// assert!(GeoPoint::new(91.0, 0.0).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct GeoPoint {
    inner: Arc<GeoPointInner>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GeoPointInner {
    latitude: f64,
    longitude: f64,
}

impl PartialEq for GeoPoint {
    fn eq(&self, other: &Self) -> bool {
        self.inner.latitude == other.inner.latitude
            && self.inner.longitude == other.inner.longitude
    }
}

impl Serialize for GeoPoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.inner.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GeoPoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let inner = GeoPointInner::deserialize(deserializer)?;
        Ok(GeoPoint {
            inner: Arc::new(inner),
        })
    }
}

impl GeoPoint {
    /// Creates a new GeoPoint with validated geographic coordinates.
    ///
    /// # Arguments
    /// * `latitude` - Latitude in degrees (-90 to 90)
    /// * `longitude` - Longitude in degrees (-180 to 180)
    ///
    /// # Errors
    /// Returns `ErrorKind::InvalidCoordinate` if either value is out of range
    /// or not finite.
    pub fn new(latitude: f64, longitude: f64) -> GeoNearResult<Self> {
        Self::validate_coordinates(latitude, longitude)?;
        Ok(Self {
            inner: Arc::new(GeoPointInner {
                latitude,
                longitude,
            }),
        })
    }

    fn validate_coordinates(latitude: f64, longitude: f64) -> GeoNearResult<()> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoNearError::new(
                &format!(
                    "Latitude must be between -90 and 90 degrees, got: {}",
                    latitude
                ),
                ErrorKind::InvalidCoordinate,
            ));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoNearError::new(
                &format!(
                    "Longitude must be between -180 and 180 degrees, got: {}",
                    longitude
                ),
                ErrorKind::InvalidCoordinate,
            ));
        }
        Ok(())
    }

    /// Gets the latitude in degrees.
    pub fn latitude(&self) -> f64 {
        self.inner.latitude
    }

    /// Gets the longitude in degrees.
    pub fn longitude(&self) -> f64 {
        self.inner.longitude
    }

    /// Calculates the geodesic distance to another point in meters.
    /// Uses the Haversine formula which is accurate for most purposes.
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        haversine_distance(
            self.inner.latitude,
            self.inner.longitude,
            other.inner.latitude,
            other.inner.longitude,
        )
    }
}

impl Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GeoPoint(lat={:.6}, lon={:.6})",
            self.inner.latitude, self.inner.longitude
        )
    }
}

/// Calculates the great-circle distance between two points using the
/// Haversine formula.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_METERS * c
}

/// Converts a distance in meters into degrees of latitude.
pub fn meters_to_latitude_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

/// Converts a distance in meters into degrees of longitude at the given
/// latitude. One degree of longitude shrinks with the cosine of the
/// latitude; the result is capped at a full circle, which any span beyond
/// 360 degrees collapses to.
pub fn meters_to_longitude_degrees(meters: f64, latitude: f64) -> f64 {
    let meters_per_degree_lon = METERS_PER_DEGREE * latitude.to_radians().cos();
    if meters_per_degree_lon <= 0.0 {
        return 360.0;
    }
    (meters / meters_per_degree_lon).min(360.0)
}

/// Wraps a longitude into the [-180, 180] range, crossing the antimeridian
/// as needed.
pub fn wrap_longitude(longitude: f64) -> f64 {
    let mut lon = longitude;
    while lon > 180.0 {
        lon -= 360.0;
    }
    while lon < -180.0 {
        lon += 360.0;
    }
    lon
}

/// A latitude/longitude aligned bounding box.
///
/// `GeoBounds` describes the rectangular cell a geohash decodes to: the
/// south/west corner is inclusive, the north/east corner exclusive in the
/// encoding sense, though membership tests here are closed on all edges
/// since callers re-test exact distance anyway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// Southern latitude edge in degrees
    pub south: f64,
    /// Western longitude edge in degrees
    pub west: f64,
    /// Northern latitude edge in degrees
    pub north: f64,
    /// Eastern longitude edge in degrees
    pub east: f64,
}

impl GeoBounds {
    /// Creates a new bounding box from its edges.
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> GeoBounds {
        GeoBounds {
            south,
            west,
            north,
            east,
        }
    }

    /// Returns the latitude span of the box in degrees.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Returns the longitude span of the box in degrees.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Returns the center of the box as (latitude, longitude).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Checks whether a point lies within the box (edges included).
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.latitude() >= self.south
            && point.latitude() <= self.north
            && point.longitude() >= self.west
            && point.longitude() <= self.east
    }
}

impl Display for GeoBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GeoBounds(south={}, west={}, north={}, east={})",
            self.south, self.west, self.north, self.east
        )
    }
}

/// A circular query region: a center point and a radius in meters.
///
/// A radius of zero is a point query. Negative or non-finite radii are
/// rejected at construction with `ErrorKind::InvalidRadius`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    center: GeoPoint,
    radius_meters: f64,
}

impl Region {
    /// Creates a new query region.
    ///
    /// # Errors
    /// Returns `ErrorKind::InvalidRadius` if the radius is negative or not
    /// finite.
    pub fn new(center: GeoPoint, radius_meters: f64) -> GeoNearResult<Self> {
        if !radius_meters.is_finite() || radius_meters < 0.0 {
            return Err(GeoNearError::new(
                &format!("Radius must be a non-negative number of meters, got: {}", radius_meters),
                ErrorKind::InvalidRadius,
            ));
        }
        Ok(Region {
            center,
            radius_meters,
        })
    }

    /// Gets the center of the region.
    pub fn center(&self) -> &GeoPoint {
        &self.center
    }

    /// Gets the radius of the region in meters.
    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }

    /// Checks whether a point is a true member of the region, i.e. its
    /// great-circle distance from the center does not exceed the radius.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.center.distance_meters(point) <= self.radius_meters
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Region(center={}, radius={}m)", self.center, self.radius_meters)
    }
}
