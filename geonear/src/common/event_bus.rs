use crate::errors::{ErrorKind, GeoNearError, GeoNearResult};
use basu::error::BasuError;
use basu::event::Event;
use basu::{EventBus, Handle, HandlerId};
use std::error::Error;
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) const GEONEAR_EVENT: &str = "geonear-event";

/// Publishes and subscribes to events in the GeoNear system.
///
/// This struct manages an event bus that allows components to register
/// listeners and receive notifications about query events. It provides both
/// synchronous event publishing and listener management.
///
/// # Example
///
/// ```ignore
/// let event_bus: GeoNearEventBus<E, L> = GeoNearEventBus::new();
/// let subscriber = event_bus.register(listener)?;
///
/// // Publish an event
/// event_bus.publish(my_event)?;
///
/// // Deregister when done
/// event_bus.deregister(subscriber)?;
/// ```
pub struct GeoNearEventBus<E, L> {
    inner: Arc<GeoNearEventBusInner<E, L>>,
}

impl<E, L> Clone for GeoNearEventBus<E, L> {
    fn clone(&self) -> Self {
        GeoNearEventBus {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E, L> Default for GeoNearEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E, L> GeoNearEventBus<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    /// Creates a new event bus instance.
    pub fn new() -> Self {
        GeoNearEventBus {
            inner: Arc::new(GeoNearEventBusInner::new()),
        }
    }

    /// Registers an event listener with the bus.
    pub fn register(&self, listener: L) -> GeoNearResult<Option<SubscriberRef>> {
        self.inner.register(listener)
    }

    /// Deregisters a previously registered event listener.
    pub fn deregister(&self, subscriber: SubscriberRef) -> GeoNearResult<()> {
        self.inner.deregister(subscriber)
    }

    /// Publishes an event to all registered listeners.
    pub fn publish(&self, event: E) -> GeoNearResult<()> {
        self.inner.publish(event)
    }

    /// Closes the event bus and clears all registered listeners.
    pub fn close(&self) -> GeoNearResult<()> {
        self.inner.close()
    }

    /// Returns true if there are any registered listeners.
    pub fn has_listeners(&self) -> bool {
        self.inner.has_listeners()
    }
}

pub struct SubscriberRef {
    pub(crate) inner: HandlerId,
}

impl SubscriberRef {
    pub fn new(inner: HandlerId) -> Self {
        SubscriberRef { inner }
    }
}

/// Inner implementation of the event bus.
struct GeoNearEventBusInner<E, L> {
    event_bus: EventBus<E>,
    phantom_data: PhantomData<L>,
}

impl<E, L> GeoNearEventBusInner<E, L>
where
    L: Handle<E> + 'static,
    E: Send + Sync,
{
    fn new() -> Self {
        GeoNearEventBusInner {
            event_bus: EventBus::new(),
            phantom_data: PhantomData,
        }
    }

    pub fn register(&self, listener: L) -> GeoNearResult<Option<SubscriberRef>> {
        let subscriber = self.event_bus.subscribe(GEONEAR_EVENT, Box::new(listener));
        match subscriber {
            Ok(subscriber) => Ok(Some(SubscriberRef::new(subscriber))),
            Err(e) => Err(Self::geonear_error(e)),
        }
    }

    #[inline]
    pub fn deregister(&self, subscriber: SubscriberRef) -> GeoNearResult<()> {
        match self.event_bus.unsubscribe(GEONEAR_EVENT, &subscriber.inner) {
            Ok(_) => Ok(()),
            Err(e) => Err(Self::geonear_error(e)),
        }
    }

    #[inline]
    pub fn publish(&self, event: E) -> GeoNearResult<()> {
        // Fast path: check if there are listeners before creating event
        let handler_count = match self.event_bus.get_handler_count(GEONEAR_EVENT) {
            Ok(count) => count,
            Err(e) => {
                // If event type not found, no listeners - early return
                if matches!(e, BasuError::EventTypeNotFOUND) {
                    return Ok(());
                }
                return Err(Self::geonear_error(e));
            }
        };

        if handler_count == 0 {
            return Ok(());
        }

        let basu_event = Event::new(event);
        match self.event_bus.publish(GEONEAR_EVENT, &basu_event) {
            Ok(_) => Ok(()),
            Err(e) => Err(Self::geonear_error(e)),
        }
    }

    #[inline]
    pub fn close(&self) -> GeoNearResult<()> {
        match self.event_bus.clear() {
            Ok(_) => Ok(()),
            Err(e) => Err(Self::geonear_error(e)),
        }
    }

    #[inline]
    pub fn has_listeners(&self) -> bool {
        match self.event_bus.get_handler_count(GEONEAR_EVENT) {
            Ok(count) => count > 0,
            Err(e) => {
                if matches!(e, BasuError::EventTypeNotFOUND) {
                    false
                } else {
                    log::warn!("Failed to check listeners: {}, defaulting to false", e);
                    false
                }
            }
        }
    }

    #[inline]
    pub fn geonear_error(e: BasuError) -> GeoNearError {
        match e {
            BasuError::EventTypeNotFOUND => GeoNearError::new(
                "Event bus error: the requested event type is not registered",
                ErrorKind::EventError,
            ),
            BasuError::MutexPoisoned => GeoNearError::new(
                "Event bus error: internal mutex poisoned - the event bus may be in an inconsistent state",
                ErrorKind::EventError,
            ),
            BasuError::HandlerError(e) => {
                let error_message = e
                    .source()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "Unknown error in event handler".to_string());
                GeoNearError::new(
                    &format!("Event handler error: {}", error_message),
                    ErrorKind::EventError,
                )
            }
        }
    }
}
