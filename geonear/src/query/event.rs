use anyhow::Error;
use basu::error::BasuError;
use basu::event::Event;
use basu::Handle;
use std::fmt::Debug;
use std::sync::Arc;

use crate::common::{get_current_time_or_zero, EntityKey};
use crate::errors::GeoNearResult;
use crate::geometry::GeoPoint;
use crate::query::QueryId;

/// Membership transitions a live query can emit.
///
/// # Variants
/// - `Entered`: an entity became a member of the query region
/// - `Exited`: a member left the query region (moved out, was removed, or
///   the region shrank away from it)
/// - `Moved`: a member changed location while staying inside the region
///
/// Within one query's event stream, delivery per key is causal: a key's
/// `Exited` or `Moved` is never observed before its `Entered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEventKind {
    Entered,
    Exited,
    Moved,
}

/// Information about a membership transition in a live query's result set.
///
/// # Characteristics
/// - **Cloneable**: thread-safe sharing via Arc, cheap to pass to listeners
/// - **Immutable**: captured at event time
/// - **Timestamped**: records its creation time in milliseconds since epoch
///
/// # Usage
///
/// Event listeners receive `QueryEventInfo` instances when membership
/// changes:
/// ```ignore
/// query.subscribe(QueryEventListener::new(|event| {
///     match event.kind() {
///         QueryEventKind::Entered => println!("{} entered", event.key()),
///         QueryEventKind::Exited => println!("{} exited", event.key()),
///         QueryEventKind::Moved => println!("{} moved", event.key()),
///     }
///     Ok(())
/// }))?;
/// ```
#[derive(Clone)]
pub struct QueryEventInfo {
    inner: Arc<QueryEventInner>,
}

impl QueryEventInfo {
    /// Creates a new query event, timestamped with the current time.
    pub fn new(query_id: QueryId, kind: QueryEventKind, key: EntityKey, location: GeoPoint) -> Self {
        QueryEventInfo {
            inner: Arc::new(QueryEventInner {
                query_id,
                kind,
                key,
                location,
                timestamp: get_current_time_or_zero(),
            }),
        }
    }

    /// The query this event belongs to.
    pub fn query_id(&self) -> &QueryId {
        &self.inner.query_id
    }

    /// The kind of membership transition.
    pub fn kind(&self) -> QueryEventKind {
        self.inner.kind
    }

    /// The key of the entity whose membership changed.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The entity's location at event time: the new location for `Entered`
    /// and `Moved`, the last known location for `Exited`.
    pub fn location(&self) -> &GeoPoint {
        &self.inner.location
    }

    /// Milliseconds since the Unix epoch when this event was created.
    pub fn timestamp(&self) -> u128 {
        self.inner.timestamp
    }
}

impl Debug for QueryEventInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEventInfo")
            .field("query_id", &self.query_id())
            .field("kind", &self.kind())
            .field("key", &self.inner.key)
            .field("location", &self.inner.location)
            .field("timestamp", &self.inner.timestamp)
            .finish()
    }
}

struct QueryEventInner {
    query_id: QueryId,
    kind: QueryEventKind,
    key: EntityKey,
    location: GeoPoint,
    timestamp: u128,
}

/// Trait for closure-based query event handlers.
///
/// Any `Send + Sync` closure with the signature
/// `Fn(QueryEventInfo) -> GeoNearResult<()>` automatically implements this
/// trait.
pub trait QueryEventCallback: Send + Sync + Fn(QueryEventInfo) -> GeoNearResult<()> {}

impl<F> QueryEventCallback for F where F: Send + Sync + Fn(QueryEventInfo) -> GeoNearResult<()> {}

/// Listener for live query events.
///
/// Wraps an event handler callback and can be registered with a query to
/// receive membership notifications. Callbacks run on the thread that
/// triggered the transition and must not invoke query or store operations
/// from inside the callback.
///
/// # Usage
///
/// ```ignore
/// let listener = QueryEventListener::new(|event| {
///     println!("{:?} {}", event.kind(), event.key());
///     Ok(())
/// });
/// ```
#[derive(Clone)]
pub struct QueryEventListener {
    on_event: Arc<dyn QueryEventCallback>,
}

impl QueryEventListener {
    /// Creates a new event listener wrapping the provided callback.
    pub fn new(on_event: impl QueryEventCallback + 'static) -> Self {
        QueryEventListener {
            on_event: Arc::new(on_event),
        }
    }
}

impl Handle<QueryEventInfo> for QueryEventListener {
    fn handle(&self, event: &Event<QueryEventInfo>) -> Result<(), BasuError> {
        match (self.on_event)(event.data.clone()) {
            Ok(_) => Ok(()),
            Err(e) => Err(BasuError::HandlerError(Error::from(e))),
        }
    }
}

impl Debug for QueryEventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEventListener").finish()
    }
}
