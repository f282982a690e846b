use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use crate::common::{EntityKey, GeoNearEventBus, SubscriberRef};
use crate::errors::{ErrorKind, GeoNearError, GeoNearResult};
use crate::geocode;
use crate::geometry::{GeoPoint, Region};
use crate::query::event::{QueryEventInfo, QueryEventKind, QueryEventListener};
use crate::query::QueryId;
use crate::store::event::{ChangeSubscription, StoreChangeInfo, StoreChangeKind};
use crate::store::ProximityStore;

/// Lifecycle state of a [`LiveQuery`].
///
/// A query moves `Uninitialized -> Active -> Cancelled`; `Cancelled` is
/// terminal, a new query must be created to observe the region again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Uninitialized,
    Active,
    Cancelled,
}

/// A standing region query that keeps its result set live.
///
/// # Purpose
/// `LiveQuery` owns one circular region, resolves it to a covering geohash
/// prefix set, subscribes to store changes under those prefixes, and emits
/// incremental `Entered` / `Exited` / `Moved` events as the matching set
/// changes or as the region itself is redefined. Callers never re-diff full
/// result sets.
///
/// # Consistency
/// Incremental change notifications keep the set responsive, but they are
/// an optimization, not the source of truth: `start` and every
/// `update_region` recompute the authoritative matching set from a fresh
/// prefix scan plus an exact-distance filter, so incremental diffs can
/// never diverge from ground truth.
///
/// # Concurrency
/// All state transitions of one query serialize on a single internal mutex,
/// including change notifications arriving from writer threads; distinct
/// queries are fully independent. `cancel` is safe to call while a
/// notification is in flight: the delivery completes against the mutex and
/// is then observed and discarded.
///
/// Event listeners run on whichever thread triggered the transition and
/// must not invoke query or store operations from inside the callback.
#[derive(Clone)]
pub struct LiveQuery {
    inner: Arc<LiveQueryInner>,
}

impl LiveQuery {
    /// Creates a query in the `Uninitialized` state against the given
    /// store. `max_precision` caps covering prefixes at the store's index
    /// precision so prefixes always match stored hashes.
    pub fn new(store: ProximityStore, max_precision: usize) -> Self {
        LiveQuery {
            inner: Arc::new(LiveQueryInner {
                id: QueryId::new(),
                store,
                max_precision,
                event_bus: GeoNearEventBus::new(),
                core: Mutex::new(QueryCore {
                    state: QueryState::Uninitialized,
                    region: None,
                    prefixes: Vec::new(),
                    matching: IndexMap::new(),
                    subscription: None,
                }),
            }),
        }
    }

    /// The query's identifier.
    pub fn id(&self) -> &QueryId {
        &self.inner.id
    }

    /// The query's current lifecycle state.
    pub fn state(&self) -> QueryState {
        self.inner.core.lock().state
    }

    /// The region currently being observed, if the query has started.
    pub fn region(&self) -> Option<Region> {
        self.inner.core.lock().region.clone()
    }

    /// Snapshot of the current matching set.
    pub fn matching(&self) -> IndexMap<EntityKey, GeoPoint> {
        self.inner.core.lock().matching.clone()
    }

    /// Registers a listener for this query's membership events.
    pub fn subscribe(&self, listener: QueryEventListener) -> GeoNearResult<Option<SubscriberRef>> {
        self.inner.event_bus.register(listener)
    }

    /// Deregisters a previously registered listener.
    pub fn unsubscribe(&self, subscriber: SubscriberRef) -> GeoNearResult<()> {
        self.inner.event_bus.deregister(subscriber)
    }

    /// Starts observing a region: `Uninitialized -> Active`.
    ///
    /// Computes the covering prefixes, subscribes to store changes under
    /// them, performs the one full scan of the query's lifetime, filters to
    /// true members by exact distance, and emits an `Entered` event for
    /// every initial member.
    ///
    /// # Errors
    /// - `InvalidState` if the query is already started or cancelled
    /// - `StoreUnavailable` if the store fails the subscription or the
    ///   scan; the query stays `Uninitialized` and the call may be retried
    pub fn start(&self, region: Region) -> GeoNearResult<()> {
        let mut core = self.inner.core.lock();
        match core.state {
            QueryState::Uninitialized => {}
            QueryState::Active => {
                log::error!("Query {} is already started", self.inner.id);
                return Err(GeoNearError::new(
                    &format!("Query {} is already started", self.inner.id),
                    ErrorKind::InvalidState,
                ));
            }
            QueryState::Cancelled => {
                log::error!("Query {} is cancelled", self.inner.id);
                return Err(GeoNearError::new(
                    &format!("Query {} is cancelled and cannot be restarted", self.inner.id),
                    ErrorKind::InvalidState,
                ));
            }
        }

        let prefixes = geocode::covering_prefixes(&region, self.inner.max_precision)?;
        let subscription = self
            .inner
            .store
            .subscribe_changes(&prefixes, LiveQueryInner::change_listener(&self.inner))
            .map_err(|e| store_unavailable("Failed to subscribe to store changes", e))?;

        let scanned = match self.inner.store.scan(&prefixes) {
            Ok(scanned) => scanned,
            Err(e) => {
                // release the query mutex before unsubscribing: the store
                // serializes unsubscription with change dispatch, and a
                // dispatch in flight may be waiting on this query
                drop(core);
                if let Err(unsub_err) = self.inner.store.unsubscribe(subscription) {
                    log::warn!(
                        "Query {} failed to roll back subscription: {}",
                        self.inner.id,
                        unsub_err
                    );
                }
                return Err(store_unavailable("Failed to scan store for initial members", e));
            }
        };

        let mut matching = IndexMap::new();
        for (key, location) in scanned {
            if region.contains(&location) {
                matching.insert(key, location);
            }
        }

        log::debug!(
            "Query {} started over {} prefixes with {} initial members",
            self.inner.id,
            prefixes.len(),
            matching.len()
        );

        core.state = QueryState::Active;
        core.region = Some(region);
        core.prefixes = prefixes;
        core.subscription = Some(subscription);
        core.matching = matching;

        for (key, location) in core.matching.clone() {
            self.inner.emit(QueryEventKind::Entered, &key, &location);
        }
        Ok(())
    }

    /// Redefines the observed region: `Active -> Active`.
    ///
    /// Recomputes the covering prefixes and, when they differ, replaces the
    /// store subscription (the new prefix set is subscribed before the old
    /// one is dropped, so no change falls in a gap). The matching set is
    /// reconciled from an authoritative rescan: members no longer within
    /// the new region emit `Exited`, new members emit `Entered`, and
    /// surviving members whose location changed emit `Moved`.
    ///
    /// # Errors
    /// - `InvalidState` if the query was never started or is cancelled
    /// - `StoreUnavailable` if the store fails; the prior subscription,
    ///   region, and matching set are all retained and the call may be
    ///   retried
    pub fn update_region(&self, region: Region) -> GeoNearResult<()> {
        let mut core = self.inner.core.lock();
        match core.state {
            QueryState::Active => {}
            QueryState::Uninitialized => {
                log::error!("Query {} is not started", self.inner.id);
                return Err(GeoNearError::new(
                    &format!("Query {} has not been started", self.inner.id),
                    ErrorKind::InvalidState,
                ));
            }
            QueryState::Cancelled => {
                log::error!("Query {} is cancelled", self.inner.id);
                return Err(GeoNearError::new(
                    &format!("Query {} is cancelled", self.inner.id),
                    ErrorKind::InvalidState,
                ));
            }
        }

        let prefixes = geocode::covering_prefixes(&region, self.inner.max_precision)?;
        let prefixes_changed = prefixes != core.prefixes;

        let new_subscription = if prefixes_changed {
            Some(
                self.inner
                    .store
                    .subscribe_changes(&prefixes, LiveQueryInner::change_listener(&self.inner))
                    .map_err(|e| store_unavailable("Failed to re-subscribe to store changes", e))?,
            )
        } else {
            None
        };

        let scanned = match self.inner.store.scan(&prefixes) {
            Ok(scanned) => scanned,
            Err(e) => {
                drop(core);
                if let Some(subscription) = new_subscription {
                    if let Err(unsub_err) = self.inner.store.unsubscribe(subscription) {
                        log::warn!(
                            "Query {} failed to roll back subscription: {}",
                            self.inner.id,
                            unsub_err
                        );
                    }
                }
                return Err(store_unavailable("Failed to rescan store for region update", e));
            }
        };

        let mut fresh = IndexMap::new();
        for (key, location) in scanned {
            if region.contains(&location) {
                fresh.insert(key, location);
            }
        }

        let old = std::mem::take(&mut core.matching);
        for (key, location) in &old {
            if !fresh.contains_key(key) {
                self.inner.emit(QueryEventKind::Exited, key, location);
            }
        }
        for (key, location) in &fresh {
            match old.get(key) {
                None => self.inner.emit(QueryEventKind::Entered, key, location),
                Some(previous) if previous != location => {
                    self.inner.emit(QueryEventKind::Moved, key, location)
                }
                _ => {}
            }
        }

        core.matching = fresh;
        core.region = Some(region);

        let mut stale_subscription = None;
        if prefixes_changed {
            log::debug!(
                "Query {} covering prefixes changed ({} -> {})",
                self.inner.id,
                core.prefixes.len(),
                prefixes.len()
            );
            stale_subscription = core.subscription.take();
            core.subscription = new_subscription;
            core.prefixes = prefixes;
        }
        drop(core);

        // dropped outside the query mutex; until then both subscriptions
        // deliver and duplicate notifications are idempotent
        if let Some(subscription) = stale_subscription {
            if let Err(e) = self.inner.store.unsubscribe(subscription) {
                log::warn!("Query {} failed to drop old subscription: {}", self.inner.id, e);
            }
        }
        Ok(())
    }

    /// Cancels the query: `-> Cancelled`, terminal.
    ///
    /// Unsubscribes from the store; notifications still in flight complete
    /// against the query's mutex and are then discarded, so no event is
    /// delivered after this returns. Idempotent.
    pub fn cancel(&self) -> GeoNearResult<()> {
        let mut core = self.inner.core.lock();
        if core.state == QueryState::Cancelled {
            return Ok(());
        }
        core.state = QueryState::Cancelled;
        core.region = None;
        core.matching.clear();
        core.prefixes.clear();
        let subscription = core.subscription.take();
        drop(core);

        if let Some(subscription) = subscription {
            if let Err(e) = self.inner.store.unsubscribe(subscription) {
                log::warn!("Query {} failed to unsubscribe on cancel: {}", self.inner.id, e);
            }
        }
        log::debug!("Query {} cancelled", self.inner.id);
        Ok(())
    }
}

struct LiveQueryInner {
    id: QueryId,
    store: ProximityStore,
    max_precision: usize,
    event_bus: GeoNearEventBus<QueryEventInfo, QueryEventListener>,
    core: Mutex<QueryCore>,
}

struct QueryCore {
    state: QueryState,
    region: Option<Region>,
    prefixes: Vec<String>,
    matching: IndexMap<EntityKey, GeoPoint>,
    subscription: Option<ChangeSubscription>,
}

impl LiveQueryInner {
    /// Builds the store listener for a query. The listener holds a weak
    /// reference so an abandoned query does not keep itself alive through
    /// the store's subscriber registry.
    fn change_listener(inner: &Arc<LiveQueryInner>) -> crate::store::StoreChangeListener {
        let weak: Weak<LiveQueryInner> = Arc::downgrade(inner);
        crate::store::StoreChangeListener::new(move |info| {
            if let Some(inner) = weak.upgrade() {
                inner.on_store_change(info);
            }
            Ok(())
        })
    }

    /// Applies one store change to the matching set. Only `Active` queries
    /// process changes; anything delivered after cancellation is discarded.
    fn on_store_change(&self, info: StoreChangeInfo) {
        let mut core = self.core.lock();
        if core.state != QueryState::Active {
            log::debug!(
                "Query {} dropping change for {} delivered after cancellation",
                self.id,
                info.key()
            );
            return;
        }
        let Some(region) = core.region.clone() else {
            return;
        };

        let key = info.key().to_string();
        let location = info.location().clone();
        let inside = match info.kind() {
            StoreChangeKind::Removed => false,
            StoreChangeKind::Added | StoreChangeKind::Relocated => region.contains(&location),
        };
        let was_member = core.matching.contains_key(&key);

        match (was_member, inside) {
            (false, true) => {
                core.matching.insert(key.clone(), location.clone());
                self.emit(QueryEventKind::Entered, &key, &location);
            }
            (true, false) => {
                core.matching.shift_remove(&key);
                self.emit(QueryEventKind::Exited, &key, &location);
            }
            (true, true) => {
                let changed = core.matching.get(&key) != Some(&location);
                if changed {
                    core.matching.insert(key.clone(), location.clone());
                    self.emit(QueryEventKind::Moved, &key, &location);
                }
            }
            // outside -> outside: silently ignored
            (false, false) => {}
        }
    }

    fn emit(&self, kind: QueryEventKind, key: &str, location: &GeoPoint) {
        let info = QueryEventInfo::new(self.id.clone(), kind, key.to_string(), location.clone());
        if let Err(e) = self.event_bus.publish(info) {
            log::warn!("Query {} failed to publish {:?} for {}: {}", self.id, kind, key, e);
        }
    }
}

fn store_unavailable(message: &str, cause: GeoNearError) -> GeoNearError {
    GeoNearError::new_with_cause(message, ErrorKind::StoreUnavailable, cause)
}
