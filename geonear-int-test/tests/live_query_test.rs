//! Integration tests for live query semantics against the full engine
//! stack: entering/exiting/relocation scenarios, event causality, and
//! recovery from an unavailable store.

use geonear::errors::ErrorKind;
use geonear::geometry::{GeoPoint, Region};
use geonear::query::{LiveQuery, QueryEventKind, QueryState};
use geonear::store::{ProximityStore, ProximityStoreProvider};
use geonear_int_test::test_util::{cleanup, create_test_context, drain, event_sink, run_test};

fn point(lat: f64, lon: f64) -> GeoPoint {
    GeoPoint::new(lat, lon).unwrap()
}

fn region(lat: f64, lon: f64, radius: f64) -> Region {
    Region::new(point(lat, lon), radius).unwrap()
}

#[test]
fn test_entering_scenario() {
    run_test(
        create_test_context,
        |ctx| {
            let engine = ctx.engine();
            let (listener, rx) = event_sink();
            let _id = engine.create_query(region(0.0, 0.0, 1000.0), listener)?;

            // key 42 appears ~157m from the center
            engine.report_entity("42", point(0.001, 0.001))?;

            let events = drain(&rx);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].kind(), QueryEventKind::Entered);
            assert_eq!(events[0].key(), "42");
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_exiting_on_radius_shrink() {
    run_test(
        create_test_context,
        |ctx| {
            let engine = ctx.engine();
            engine.report_entity("42", point(0.001, 0.001))?;

            let (listener, rx) = event_sink();
            let id = engine.create_query(region(0.0, 0.0, 1000.0), listener)?;
            let initial = drain(&rx);
            assert_eq!(initial.len(), 1);
            assert_eq!(initial[0].kind(), QueryEventKind::Entered);

            // 157m > 100m: shrinking the radius expels key 42
            engine.update_region(&id, region(0.0, 0.0, 100.0))?;

            let events = drain(&rx);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].kind(), QueryEventKind::Exited);
            assert_eq!(events[0].key(), "42");
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_relocation_inside_region_is_moved() {
    run_test(
        create_test_context,
        |ctx| {
            let engine = ctx.engine();
            engine.report_entity("42", point(0.001, 0.001))?;

            let (listener, rx) = event_sink();
            let _id = engine.create_query(region(0.0, 0.0, 1000.0), listener)?;
            drain(&rx);

            // still well inside the 1000m radius
            engine.report_entity("42", point(0.0005, 0.0005))?;

            let events = drain(&rx);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].kind(), QueryEventKind::Moved);
            assert_eq!(events[0].key(), "42");
            assert_eq!(events[0].location(), &point(0.0005, 0.0005));
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_out_of_range_rejection_leaves_engine_unchanged() {
    run_test(
        create_test_context,
        |ctx| {
            let engine = ctx.engine();
            let (listener, rx) = event_sink();
            let _id = engine.create_query(region(0.0, 0.0, 1000.0), listener)?;

            // (91, 0) is not a representable coordinate
            let result = GeoPoint::new(91.0, 0.0);
            assert!(result.is_err());
            assert_eq!(result.unwrap_err().kind(), &ErrorKind::InvalidCoordinate);

            assert!(engine.entity_location("1")?.is_none());
            assert!(drain(&rx).is_empty());
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_event_causality_per_key() {
    run_test(
        create_test_context,
        |ctx| {
            let engine = ctx.engine();
            let (listener, rx) = event_sink();
            let id = engine.create_query(region(0.0, 0.0, 1000.0), listener)?;

            // churn key 42 in and out of the region several times
            engine.report_entity("42", point(0.001, 0.001))?; // enter
            engine.report_entity("42", point(0.0005, 0.0005))?; // move
            engine.report_entity("42", point(0.5, 0.5))?; // exit (out of range)
            engine.report_entity("42", point(0.002, 0.002))?; // enter again
            engine.remove_entity("42")?; // exit
            engine.update_region(&id, region(0.0, 0.0, 900.0))?;
            engine.report_entity("42", point(0.001, 0.001))?; // enter again

            // for one key, the stream must alternate: an Exited or Moved is
            // only ever preceded by an unmatched Entered
            let mut inside = false;
            for event in drain(&rx).iter().filter(|e| e.key() == "42") {
                match event.kind() {
                    QueryEventKind::Entered => {
                        assert!(!inside, "duplicate Entered for key 42");
                        inside = true;
                    }
                    QueryEventKind::Exited => {
                        assert!(inside, "Exited without a preceding Entered");
                        inside = false;
                    }
                    QueryEventKind::Moved => {
                        assert!(inside, "Moved while outside the region");
                    }
                }
            }
            assert!(inside, "final Entered missing");
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_zero_radius_point_query() {
    run_test(
        create_test_context,
        |ctx| {
            let engine = ctx.engine();
            let (listener, rx) = event_sink();
            let _id = engine.create_query(region(10.0, 10.0, 0.0), listener)?;

            // the exact center matches a point query, anything else does not
            engine.report_entity("exact", point(10.0, 10.0))?;
            engine.report_entity("near", point(10.0001, 10.0))?;

            let events = drain(&rx);
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].key(), "exact");
            Ok(())
        },
        cleanup,
    )
}

#[test]
fn test_negative_radius_rejected() {
    run_test(
        create_test_context,
        |ctx| {
            let result = Region::new(point(0.0, 0.0), -5.0);
            assert!(result.is_err());
            assert_eq!(result.unwrap_err().kind(), &ErrorKind::InvalidRadius);
            assert_eq!(ctx.engine().active_queries(), 0);
            Ok(())
        },
        cleanup,
    )
}

/// A store wrapper whose scan/subscribe paths can be switched off, standing
/// in for a remote backend that loses connectivity.
mod flaky {
    use geonear::common::EntityKey;
    use geonear::errors::{ErrorKind, GeoNearError, GeoNearResult};
    use geonear::geometry::GeoPoint;
    use geonear::store::{
        ChangeSubscription, InMemoryProximityStore, ProximityStoreProvider, StoreChangeListener,
    };
    use indexmap::IndexMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Clone)]
    pub struct FlakyStore {
        backing: InMemoryProximityStore,
        down: Arc<AtomicBool>,
    }

    impl FlakyStore {
        pub fn new(precision: usize) -> GeoNearResult<Self> {
            Ok(FlakyStore {
                backing: InMemoryProximityStore::new(precision)?,
                down: Arc::new(AtomicBool::new(false)),
            })
        }

        pub fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        fn check_up(&self) -> GeoNearResult<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(GeoNearError::new(
                    "Backend unreachable",
                    ErrorKind::StoreUnavailable,
                ));
            }
            Ok(())
        }
    }

    impl ProximityStoreProvider for FlakyStore {
        fn put(&self, key: &str, location: GeoPoint) -> GeoNearResult<()> {
            self.backing.put(key, location)
        }

        fn get(&self, key: &str) -> GeoNearResult<Option<GeoPoint>> {
            self.backing.get(key)
        }

        fn remove(&self, key: &str) -> GeoNearResult<bool> {
            self.backing.remove(key)
        }

        fn scan(&self, prefixes: &[String]) -> GeoNearResult<IndexMap<EntityKey, GeoPoint>> {
            self.check_up()?;
            self.backing.scan(prefixes)
        }

        fn subscribe_changes(
            &self,
            prefixes: &[String],
            listener: StoreChangeListener,
        ) -> GeoNearResult<ChangeSubscription> {
            self.check_up()?;
            self.backing.subscribe_changes(prefixes, listener)
        }

        fn unsubscribe(&self, subscription: ChangeSubscription) -> GeoNearResult<()> {
            self.backing.unsubscribe(subscription)
        }

        fn is_available(&self) -> bool {
            !self.down.load(Ordering::SeqCst)
        }
    }
}

#[test]
fn test_store_unavailable_on_start_is_retryable() {
    let store_impl = flaky::FlakyStore::new(6).unwrap();
    store_impl.put("42", point(0.001, 0.001)).unwrap();
    let store = ProximityStore::new(store_impl.clone());

    let query = LiveQuery::new(store, 6);
    let (listener, rx) = event_sink();
    query.subscribe(listener).unwrap();

    store_impl.set_down(true);
    let err = query.start(region(0.0, 0.0, 1000.0)).unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::StoreUnavailable);
    assert_eq!(query.state(), QueryState::Uninitialized);
    assert!(drain(&rx).is_empty());

    // connectivity returns; the same query starts cleanly
    store_impl.set_down(false);
    query.start(region(0.0, 0.0, 1000.0)).unwrap();
    assert_eq!(query.state(), QueryState::Active);

    let events = drain(&rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), QueryEventKind::Entered);

    query.cancel().unwrap();
}

#[test]
fn test_store_unavailable_on_update_keeps_prior_state() {
    let store_impl = flaky::FlakyStore::new(6).unwrap();
    store_impl.put("42", point(0.001, 0.001)).unwrap();
    let store = ProximityStore::new(store_impl.clone());

    let query = LiveQuery::new(store, 6);
    let (listener, rx) = event_sink();
    query.subscribe(listener).unwrap();
    query.start(region(0.0, 0.0, 1000.0)).unwrap();
    drain(&rx);

    store_impl.set_down(true);
    let err = query.update_region(region(5.0, 5.0, 1000.0)).unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::StoreUnavailable);

    // last-known matching set and region are retained, no spurious events
    assert!(query.matching().contains_key("42"));
    assert_eq!(query.region(), Some(region(0.0, 0.0, 1000.0)));
    assert!(drain(&rx).is_empty());

    // and the original subscription is still live
    store_impl.put("43", point(0.002, 0.002)).unwrap();
    let events = drain(&rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key(), "43");

    // retry succeeds once connectivity returns
    store_impl.set_down(false);
    query.update_region(region(5.0, 5.0, 1000.0)).unwrap();
    assert!(query.matching().is_empty());

    query.cancel().unwrap();
}

#[test]
fn test_cancelled_query_drops_inflight_completions() {
    run_test(
        create_test_context,
        |ctx| {
            let engine = ctx.engine();
            let (listener, rx) = event_sink();
            let id = engine.create_query(region(0.0, 0.0, 1000.0), listener)?;

            engine.cancel_query(&id)?;
            engine.report_entity("late", point(0.001, 0.001))?;

            assert!(drain(&rx).is_empty());
            let err = engine.update_region(&id, region(0.0, 0.0, 500.0)).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::NotFound);
            Ok(())
        },
        cleanup,
    )
}
