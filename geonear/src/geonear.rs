use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{ErrorKind, GeoNearError, GeoNearResult};
use crate::geometry::{GeoPoint, Region};
use crate::geonear_builder::GeoNearBuilder;
use crate::geonear_config::GeoNearConfig;
use crate::query::{QueryEventListener, QueryId, QueryManager};
use crate::store::ProximityStore;

/// The proximity query engine.
///
/// `GeoNear` is the entry point for the hosting application. It provides
/// the command surface the UI layer drives:
/// - standing region queries over the entity population
///   (`create_query`, `update_region`, `cancel_query`)
/// - the entity lifecycle the "report a sighting" flow needs
///   (`report_entity`, `entity_location`, `remove_entity`)
///
/// `GeoNear` uses the PIMPL (Pointer to Implementation) design pattern
/// internally: instances are cheap to clone, thread-safe, and all clones
/// share the same store and query registry.
///
/// # Examples
///
/// ```rust
/// use geonear::geometry::{GeoPoint, Region};
/// use geonear::geonear::GeoNear;
/// use geonear::query::QueryEventListener;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = GeoNear::builder().open()?;
///
/// // Observe a 1km circle around the origin
/// let region = Region::new(GeoPoint::new(0.0, 0.0)?, 1000.0)?;
/// let listener = QueryEventListener::new(|event| {
///     println!("{:?}: {}", event.kind(), event.key());
///     Ok(())
/// });
/// let query_id = engine.create_query(region, listener)?;
///
/// // A sighting appears ~157m from the center: the query emits Entered
/// engine.report_entity("42", GeoPoint::new(0.001, 0.001)?)?;
///
/// engine.cancel_query(&query_id)?;
/// engine.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GeoNear {
    inner: Arc<GeoNearInner>,
}

impl GeoNear {
    /// Creates a new [`GeoNearBuilder`] for configuring and opening an
    /// engine.
    pub fn builder() -> GeoNearBuilder {
        GeoNearBuilder::new()
    }

    pub(crate) fn new(config: GeoNearConfig, store: ProximityStore) -> Self {
        let manager = QueryManager::new(store.clone(), config.precision());
        GeoNear {
            inner: Arc::new(GeoNearInner {
                config,
                store,
                manager,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &GeoNearConfig {
        &self.inner.config
    }

    /// The underlying proximity store.
    pub fn store(&self) -> ProximityStore {
        self.inner.store.clone()
    }

    /// Allocates and starts a live query over a region; membership events
    /// are delivered to the listener, starting with an `Entered` event per
    /// entity already inside the region.
    pub fn create_query(
        &self,
        region: Region,
        listener: QueryEventListener,
    ) -> GeoNearResult<QueryId> {
        self.check_opened()?;
        self.inner.manager.create_query(region, listener)
    }

    /// Redefines the region of an active query, e.g. as the viewport pans
    /// or zooms. Fails with `NotFound` for unknown or released ids.
    pub fn update_region(&self, id: &QueryId, region: Region) -> GeoNearResult<()> {
        self.check_opened()?;
        self.inner.manager.update_region(id, region)
    }

    /// Cancels and releases a query. Idempotent.
    pub fn cancel_query(&self, id: &QueryId) -> GeoNearResult<()> {
        self.check_opened()?;
        self.inner.manager.cancel_query(id)
    }

    /// Reports an entity at a location, creating or relocating it. Active
    /// queries covering the location observe the change incrementally.
    pub fn report_entity(&self, key: &str, location: GeoPoint) -> GeoNearResult<()> {
        self.check_opened()?;
        self.inner.store.put(key, location)
    }

    /// Looks up the last reported location of an entity.
    pub fn entity_location(&self, key: &str) -> GeoNearResult<Option<GeoPoint>> {
        self.check_opened()?;
        self.inner.store.get(key)
    }

    /// Removes an entity's location. Returns `Ok(false)` if the key had no
    /// location.
    pub fn remove_entity(&self, key: &str) -> GeoNearResult<bool> {
        self.check_opened()?;
        self.inner.store.remove(key)
    }

    /// Number of currently active queries.
    pub fn active_queries(&self) -> usize {
        self.inner.manager.active_count()
    }

    /// Closes the engine, cancelling every active query. Further commands
    /// fail with `InvalidState`. Idempotent.
    pub fn close(&self) -> GeoNearResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::debug!("Closing engine with {} active queries", self.inner.manager.active_count());
        self.inner.manager.cancel_all()
    }

    fn check_opened(&self) -> GeoNearResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            log::error!("Engine is closed");
            return Err(GeoNearError::new(
                "Engine is closed",
                ErrorKind::InvalidState,
            ));
        }
        Ok(())
    }
}

struct GeoNearInner {
    config: GeoNearConfig,
    store: ProximityStore,
    manager: QueryManager,
    closed: AtomicBool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryEventKind;
    use std::sync::Mutex as StdMutex;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    fn region(lat: f64, lon: f64, radius: f64) -> Region {
        Region::new(point(lat, lon), radius).unwrap()
    }

    #[test]
    fn test_report_and_lookup_entity() {
        let engine = GeoNear::builder().open().unwrap();

        engine.report_entity("42", point(0.001, 0.001)).unwrap();
        assert_eq!(
            engine.entity_location("42").unwrap(),
            Some(point(0.001, 0.001))
        );

        assert!(engine.remove_entity("42").unwrap());
        assert_eq!(engine.entity_location("42").unwrap(), None);
    }

    #[test]
    fn test_report_entity_feeds_active_queries() {
        let engine = GeoNear::builder().open().unwrap();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let _id = engine
            .create_query(
                region(0.0, 0.0, 1000.0),
                QueryEventListener::new(move |event| {
                    seen_clone.lock().unwrap().push((event.kind(), event.key().to_string()));
                    Ok(())
                }),
            )
            .unwrap();

        engine.report_entity("42", point(0.001, 0.001)).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(QueryEventKind::Entered, "42".to_string())]
        );
    }

    #[test]
    fn test_close_cancels_queries_and_blocks_commands() {
        let engine = GeoNear::builder().open().unwrap();
        let _id = engine
            .create_query(region(0.0, 0.0, 1000.0), QueryEventListener::new(|_| Ok(())))
            .unwrap();
        assert_eq!(engine.active_queries(), 1);

        engine.close().unwrap();
        assert_eq!(engine.active_queries(), 0);

        let err = engine.report_entity("42", point(0.0, 0.0)).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidState);
        let err = engine
            .create_query(region(0.0, 0.0, 1.0), QueryEventListener::new(|_| Ok(())))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidState);
    }

    #[test]
    fn test_close_is_idempotent() {
        let engine = GeoNear::builder().open().unwrap();
        engine.close().unwrap();
        engine.close().unwrap();
    }

    #[test]
    fn test_out_of_range_report_rejected() {
        let engine = GeoNear::builder().open().unwrap();
        // the invalid coordinate cannot even be constructed
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        // and the engine state is untouched
        assert_eq!(engine.entity_location("1").unwrap(), None);
    }
}
