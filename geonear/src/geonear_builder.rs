use crate::errors::GeoNearResult;
use crate::geonear::GeoNear;
use crate::geonear_config::{GeoNearConfig, DEFAULT_PRECISION};
use crate::store::{InMemoryProximityStore, ProximityStore};

/// Builder for configuring and opening a [`GeoNear`] engine.
///
/// # Examples
///
/// ```rust
/// use geonear::geonear::GeoNear;
///
/// // Default engine: in-memory store, precision 6
/// let engine = GeoNear::builder().open().unwrap();
/// engine.close().unwrap();
///
/// // Custom precision
/// let engine = GeoNear::builder().precision(7).open().unwrap();
/// engine.close().unwrap();
/// ```
///
/// A custom store backend (the shipped product's cloud database, a test
/// stub) can be supplied with [`GeoNearBuilder::store`]; when omitted the
/// engine opens over a bundled [`InMemoryProximityStore`] at the configured
/// precision.
#[derive(Default)]
pub struct GeoNearBuilder {
    precision: Option<usize>,
    store: Option<ProximityStore>,
}

impl GeoNearBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        GeoNearBuilder {
            precision: None,
            store: None,
        }
    }

    /// Sets the geohash index precision (1 to 12).
    pub fn precision(mut self, precision: usize) -> Self {
        self.precision = Some(precision);
        self
    }

    /// Sets a custom proximity store backend.
    pub fn store(mut self, store: ProximityStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Validates the configuration and opens the engine.
    ///
    /// # Errors
    /// Returns `ErrorKind::InvalidPrecision` if the configured precision is
    /// outside the supported range.
    pub fn open(self) -> GeoNearResult<GeoNear> {
        let precision = self.precision.unwrap_or(DEFAULT_PRECISION);
        let config = GeoNearConfig::new(precision)?;
        let store = match self.store {
            Some(store) => store,
            None => ProximityStore::new(InMemoryProximityStore::new(precision)?),
        };
        Ok(GeoNear::new(config, store))
    }
}
