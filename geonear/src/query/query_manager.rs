use dashmap::DashMap;
use std::sync::Arc;

use crate::errors::{ErrorKind, GeoNearError, GeoNearResult};
use crate::geometry::Region;
use crate::query::event::QueryEventListener;
use crate::query::live_query::LiveQuery;
use crate::query::QueryId;
use crate::store::ProximityStore;

/// Registry and lifecycle owner of the active live queries.
///
/// # Purpose
/// `QueryManager` allocates one [`LiveQuery`] per active viewport/client,
/// addresses it by [`QueryId`], and routes region updates and cancellation
/// to it. Store change routing itself is handled by each query's
/// prefix-filtered store subscription.
///
/// # Usage pattern
/// As a viewport pans or zooms, callers are expected to call
/// `update_region` on the *same* `QueryId` rather than create a new query
/// per movement: updating preserves the incremental-diff protocol, while
/// re-creating forces a fresh full scan and a storm of `Entered` events.
///
/// # Characteristics
/// - **Thread-Safe**: clones share the registry; queries on different ids
///   proceed in parallel
/// - **Idempotent cancellation**: cancelling an unknown or already released
///   id is a no-op
#[derive(Clone)]
pub struct QueryManager {
    inner: Arc<QueryManagerInner>,
}

struct QueryManagerInner {
    store: ProximityStore,
    max_precision: usize,
    queries: DashMap<QueryId, LiveQuery>,
}

impl QueryManager {
    /// Creates a manager issuing queries against the given store, with
    /// covering prefixes capped at the store's index precision.
    pub fn new(store: ProximityStore, max_precision: usize) -> Self {
        QueryManager {
            inner: Arc::new(QueryManagerInner {
                store,
                max_precision,
                queries: DashMap::new(),
            }),
        }
    }

    /// Allocates and starts a live query over a region, delivering its
    /// membership events to the given listener. The listener is attached
    /// before the query starts, so the initial `Entered` events are
    /// observed.
    ///
    /// # Errors
    /// Propagates `StoreUnavailable` from the query start; the failed query
    /// is released and the caller may retry with a fresh `create_query`.
    pub fn create_query(
        &self,
        region: Region,
        listener: QueryEventListener,
    ) -> GeoNearResult<QueryId> {
        let query = LiveQuery::new(self.inner.store.clone(), self.inner.max_precision);
        query.subscribe(listener)?;

        let id = query.id().clone();
        self.inner.queries.insert(id.clone(), query.clone());

        if let Err(e) = query.start(region) {
            self.inner.queries.remove(&id);
            return Err(e);
        }
        log::debug!("Created query {}", id);
        Ok(id)
    }

    /// Redefines the region of an existing query.
    ///
    /// # Errors
    /// - `NotFound` if the id is unknown or already released
    /// - `InvalidState` if the query was cancelled out-of-band
    /// - `StoreUnavailable` from the underlying rescan; the query keeps its
    ///   prior state and the call may be retried
    pub fn update_region(&self, id: &QueryId, region: Region) -> GeoNearResult<()> {
        let query = self.inner.queries.get(id).map(|entry| entry.value().clone());
        match query {
            Some(query) => query.update_region(region),
            None => {
                log::error!("Query {} not found", id);
                Err(GeoNearError::new(
                    &format!("No active query with id {}", id),
                    ErrorKind::NotFound,
                ))
            }
        }
    }

    /// Cancels and releases a query. Unknown or already released ids are a
    /// no-op, making cancellation idempotent.
    pub fn cancel_query(&self, id: &QueryId) -> GeoNearResult<()> {
        if let Some((_, query)) = self.inner.queries.remove(id) {
            query.cancel()?;
        }
        Ok(())
    }

    /// Cancels every active query; used on engine shutdown.
    pub fn cancel_all(&self) -> GeoNearResult<()> {
        let ids: Vec<QueryId> = self
            .inner
            .queries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in ids {
            self.cancel_query(&id)?;
        }
        Ok(())
    }

    /// Returns a handle to an active query, if present.
    pub fn query(&self, id: &QueryId) -> Option<LiveQuery> {
        self.inner.queries.get(id).map(|entry| entry.value().clone())
    }

    /// Number of currently active queries.
    pub fn active_count(&self) -> usize {
        self.inner.queries.len()
    }
}
