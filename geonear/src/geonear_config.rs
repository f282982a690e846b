use crate::errors::GeoNearResult;
use crate::geocode;

/// Geohash precision used by default for the location index: 6 characters,
/// cells of roughly 1.2 km x 0.6 km, a good fit for neighborhood-scale
/// proximity queries.
pub const DEFAULT_PRECISION: usize = 6;

/// Configuration for a [`crate::geonear::GeoNear`] engine.
///
/// Currently the only tunable is the index precision: the geohash length
/// entities are stored at, which also caps the precision of query covering
/// prefixes. Finer precision means smaller buckets and tighter scans but
/// more prefixes per query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoNearConfig {
    precision: usize,
}

impl GeoNearConfig {
    /// Creates a configuration with the given index precision.
    ///
    /// # Errors
    /// Returns `ErrorKind::InvalidPrecision` if the precision is outside
    /// the supported range.
    pub fn new(precision: usize) -> GeoNearResult<Self> {
        geocode::validate_precision(precision)?;
        Ok(GeoNearConfig { precision })
    }

    /// The geohash length entities are indexed at.
    pub fn precision(&self) -> usize {
        self.precision
    }
}

impl Default for GeoNearConfig {
    fn default() -> Self {
        GeoNearConfig {
            precision: DEFAULT_PRECISION,
        }
    }
}
