use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::common::EntityKey;
use crate::errors::GeoNearResult;
use crate::geocode;
use crate::geometry::GeoPoint;
use crate::store::event::{
    ChangeSubscription, StoreChangeInfo, StoreChangeKind, StoreChangeListener,
};

/// An index record: the entity's key, its current location, and the geohash
/// bucket the location falls in at the index precision.
///
/// Entries are owned exclusively by the [`SpatialIndex`]: created on
/// `set_location`, replaced on relocation, destroyed on `remove_location`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    key: EntityKey,
    location: GeoPoint,
    hash: String,
}

impl IndexEntry {
    fn new(key: &str, location: GeoPoint, hash: String) -> Self {
        IndexEntry {
            key: key.to_string(),
            location,
            hash,
        }
    }

    /// The entity key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The entity's current location.
    pub fn location(&self) -> &GeoPoint {
        &self.location
    }

    /// The geohash bucket the entry lives in.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

/// Composite ordering key for the bucket skip list. Ordering by
/// (hash, entity key) keeps every bucket's members contiguous and every
/// prefix's buckets contiguous, so a prefix scan is one ordered range walk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct BucketKey {
    hash: String,
    key: EntityKey,
}

impl BucketKey {
    fn new(hash: &str, key: &str) -> Self {
        BucketKey {
            hash: hash.to_string(),
            key: key.to_string(),
        }
    }
}

/// The smallest string strictly greater than every string starting with
/// `prefix`, used as the exclusive upper bound of a prefix range scan.
fn prefix_successor(prefix: &str) -> Option<String> {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(last) = bytes.last_mut() {
        if *last < u8::MAX {
            *last += 1;
            return String::from_utf8(bytes).ok();
        }
        bytes.pop();
    }
    None
}

/// An ordered mapping from geohash bucket to entity membership, replacing a
/// linear scan over all entities with a handful of prefix range lookups.
///
/// # Purpose
/// `SpatialIndex` is the leaf data structure of the proximity engine. Every
/// entity's location is encoded at a fixed geohash precision and stored
/// under that hash; queries resolve a region to a covering prefix set and
/// scan only the matching ranges.
///
/// # Characteristics
/// - **Thread-Safe**: can be cloned and shared across threads; clones share
///   state
/// - **Ordered buckets**: a concurrent skip list keyed by (hash, key) makes
///   prefix scans ordered range walks that run lock-free
/// - **Atomic relocation**: mutations and change dispatch are serialized on
///   one mutex, so a relocation is observed as a single `Relocated` event,
///   never as a remove-then-add pair
/// - **Prefix-filtered subscriptions**: listeners register a prefix set and
///   only see changes whose old or new bucket matches
///
/// Change listeners run synchronously on the mutating thread and must not
/// mutate the index from inside the callback.
#[derive(Clone)]
pub struct SpatialIndex {
    inner: Arc<SpatialIndexInner>,
}

impl SpatialIndex {
    /// Creates an empty index storing hashes of the given precision.
    ///
    /// # Errors
    /// Returns `ErrorKind::InvalidPrecision` if the precision is outside the
    /// supported range.
    pub fn new(precision: usize) -> GeoNearResult<Self> {
        geocode::validate_precision(precision)?;
        Ok(SpatialIndex {
            inner: Arc::new(SpatialIndexInner {
                precision,
                buckets: SkipMap::new(),
                entries: DashMap::new(),
                subscribers: DashMap::new(),
                subscriber_seq: AtomicU64::new(0),
                mutation_lock: Mutex::new(()),
            }),
        })
    }

    /// The geohash precision entries are stored at.
    pub fn precision(&self) -> usize {
        self.inner.precision
    }

    /// Upserts an entity's location.
    ///
    /// A new key is observed by subscribers as `Added`. An existing key with
    /// a changed location is observed as a single `Relocated` event; its old
    /// bucket membership is removed and the new one added with no
    /// intermediate state visible to subscribers. Re-setting the identical
    /// location is a no-op and emits nothing.
    pub fn set_location(&self, key: &str, location: GeoPoint) -> GeoNearResult<()> {
        let hash = geocode::encode(&location, self.inner.precision)?;
        let _guard = self.inner.mutation_lock.lock();

        let prior = self.inner.entries.get(key).map(|e| e.clone());
        match prior {
            Some(old) if old.location == location => Ok(()),
            Some(old) => {
                // Insert the new membership before dropping the old one so a
                // concurrent scan never misses the key entirely; scans
                // deduplicate against the entry registry.
                self.inner
                    .buckets
                    .insert(BucketKey::new(&hash, key), location.clone());
                if old.hash != hash {
                    self.inner.buckets.remove(&BucketKey::new(&old.hash, key));
                }
                self.inner
                    .entries
                    .insert(key.to_string(), IndexEntry::new(key, location.clone(), hash.clone()));
                self.inner.dispatch(
                    key,
                    &location,
                    StoreChangeKind::Relocated,
                    &[&old.hash, &hash],
                );
                Ok(())
            }
            None => {
                self.inner
                    .buckets
                    .insert(BucketKey::new(&hash, key), location.clone());
                self.inner
                    .entries
                    .insert(key.to_string(), IndexEntry::new(key, location.clone(), hash.clone()));
                self.inner
                    .dispatch(key, &location, StoreChangeKind::Added, &[&hash]);
                Ok(())
            }
        }
    }

    /// Removes an entity's location. Returns `Ok(false)` without emitting
    /// anything if the key is absent.
    pub fn remove_location(&self, key: &str) -> GeoNearResult<bool> {
        let _guard = self.inner.mutation_lock.lock();

        match self.inner.entries.remove(key) {
            Some((_, entry)) => {
                self.inner.buckets.remove(&BucketKey::new(&entry.hash, key));
                self.inner
                    .dispatch(key, &entry.location, StoreChangeKind::Removed, &[&entry.hash]);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Looks up an entity's index entry.
    pub fn get(&self, key: &str) -> Option<IndexEntry> {
        self.inner.entries.get(key).map(|e| e.clone())
    }

    /// Returns every entity whose bucket hash starts with any of the given
    /// prefixes, keyed by entity with its current location.
    ///
    /// Iteration order is stable within a single call (bucket order, then
    /// key order); no ordering is guaranteed across calls that race
    /// mutations.
    pub fn scan(&self, prefixes: &[String]) -> GeoNearResult<IndexMap<EntityKey, GeoPoint>> {
        let mut result = IndexMap::new();
        for prefix in prefixes {
            let start = Included(BucketKey::new(prefix, ""));
            let end = match prefix_successor(prefix) {
                Some(upper) => Excluded(BucketKey::new(&upper, "")),
                None => Unbounded,
            };
            for bucket_entry in self.inner.buckets.range((start, end)) {
                let key = &bucket_entry.key().key;
                // The registry holds the authoritative current location; a
                // bucket record mid-relocation may be stale or already gone.
                if let Some(entry) = self.inner.entries.get(key) {
                    result.insert(key.clone(), entry.location().clone());
                }
            }
        }
        Ok(result)
    }

    /// Registers a listener for changes whose old or new bucket hash starts
    /// with any of the given prefixes. Returns the subscription handle used
    /// to stop delivery.
    pub fn subscribe(
        &self,
        prefixes: &[String],
        listener: StoreChangeListener,
    ) -> GeoNearResult<ChangeSubscription> {
        let id = self.inner.subscriber_seq.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.insert(
            id,
            ChangeSubscriber {
                prefixes: prefixes.to_vec(),
                listener,
            },
        );
        log::debug!("Registered change subscriber {} for {} prefixes", id, prefixes.len());
        Ok(ChangeSubscription::new(id))
    }

    /// Drops a change subscription. Serializes with mutation dispatch, so
    /// once this returns no further callback fires for the subscription.
    /// Must not be called from inside a change callback.
    pub fn unsubscribe(&self, subscription: ChangeSubscription) -> GeoNearResult<()> {
        let _guard = self.inner.mutation_lock.lock();
        self.inner.subscribers.remove(&subscription.id);
        log::debug!("Removed change subscriber {}", subscription.id);
        Ok(())
    }

    /// Number of indexed entities.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// True if no entities are indexed.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Removes every entry, notifying subscribers of each removal.
    pub fn clear(&self) -> GeoNearResult<()> {
        let keys: Vec<EntityKey> = self
            .inner
            .entries
            .iter()
            .map(|e| e.key().clone())
            .collect();
        for key in keys {
            self.remove_location(&key)?;
        }
        Ok(())
    }
}

struct SpatialIndexInner {
    precision: usize,
    buckets: SkipMap<BucketKey, GeoPoint>,
    entries: DashMap<EntityKey, IndexEntry>,
    subscribers: DashMap<u64, ChangeSubscriber>,
    subscriber_seq: AtomicU64,
    mutation_lock: Mutex<()>,
}

struct ChangeSubscriber {
    prefixes: Vec<String>,
    listener: StoreChangeListener,
}

impl SpatialIndexInner {
    /// Delivers a change to every subscriber whose prefix set matches any of
    /// the affected bucket hashes. Called with the mutation lock held, so
    /// dispatch order is mutation order and per-key delivery is causal.
    fn dispatch(&self, key: &str, location: &GeoPoint, kind: StoreChangeKind, hashes: &[&str]) {
        let listeners: Vec<StoreChangeListener> = self
            .subscribers
            .iter()
            .filter(|subscriber| {
                hashes.iter().any(|hash| {
                    subscriber
                        .value()
                        .prefixes
                        .iter()
                        .any(|prefix| hash.starts_with(prefix.as_str()))
                })
            })
            .map(|subscriber| subscriber.value().listener.clone())
            .collect();

        for listener in listeners {
            let info = StoreChangeInfo::new(key.to_string(), location.clone(), kind);
            if let Err(e) = listener.notify(info) {
                log::warn!("Change listener failed for key {}: {}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    fn collecting_listener() -> (StoreChangeListener, Arc<StdMutex<Vec<StoreChangeInfo>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let listener = StoreChangeListener::new(move |info| {
            seen_clone.lock().unwrap().push(info);
            Ok(())
        });
        (listener, seen)
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor("ezs"), Some("ezt".to_string()));
        assert_eq!(prefix_successor("9"), Some(":".to_string()));
        assert_eq!(prefix_successor(""), None);
    }

    #[test]
    fn test_new_rejects_invalid_precision() {
        assert!(SpatialIndex::new(0).is_err());
        assert!(SpatialIndex::new(13).is_err());
        assert!(SpatialIndex::new(6).is_ok());
    }

    #[test]
    fn test_set_and_get() {
        let index = SpatialIndex::new(6).unwrap();
        index.set_location("42", point(0.001, 0.001)).unwrap();

        let entry = index.get("42").unwrap();
        assert_eq!(entry.key(), "42");
        assert_eq!(entry.location(), &point(0.001, 0.001));
        assert_eq!(entry.hash().len(), 6);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_location() {
        let index = SpatialIndex::new(6).unwrap();
        index.set_location("42", point(0.0, 0.0)).unwrap();

        assert!(index.remove_location("42").unwrap());
        assert!(index.get("42").is_none());
        assert!(index.is_empty());

        // removing an absent key is a no-op
        assert!(!index.remove_location("42").unwrap());
    }

    #[test]
    fn test_scan_by_prefix() {
        let index = SpatialIndex::new(6).unwrap();
        index.set_location("near-1", point(0.001, 0.001)).unwrap();
        index.set_location("near-2", point(0.002, 0.002)).unwrap();
        index.set_location("far", point(45.0, 90.0)).unwrap();

        let near_hash = geocode::encode(&point(0.001, 0.001), 3).unwrap();
        let result = index.scan(&[near_hash]).unwrap();

        assert!(result.contains_key("near-1"));
        assert!(result.contains_key("near-2"));
        assert!(!result.contains_key("far"));
    }

    #[test]
    fn test_scan_union_of_prefixes() {
        let index = SpatialIndex::new(6).unwrap();
        index.set_location("a", point(0.001, 0.001)).unwrap();
        index.set_location("b", point(45.0, 90.0)).unwrap();

        let prefixes = vec![
            geocode::encode(&point(0.001, 0.001), 3).unwrap(),
            geocode::encode(&point(45.0, 90.0), 3).unwrap(),
        ];
        let result = index.scan(&prefixes).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_scan_with_full_hash_prefix() {
        let index = SpatialIndex::new(6).unwrap();
        index.set_location("a", point(10.0, 10.0)).unwrap();

        let full_hash = index.get("a").unwrap().hash().to_string();
        let result = index.scan(&[full_hash]).unwrap();
        assert!(result.contains_key("a"));
    }

    #[test]
    fn test_subscriber_sees_added_and_removed() {
        let index = SpatialIndex::new(6).unwrap();
        let (listener, seen) = collecting_listener();

        let prefix = geocode::encode(&point(0.001, 0.001), 3).unwrap();
        let subscription = index.subscribe(&[prefix], listener).unwrap();

        index.set_location("42", point(0.001, 0.001)).unwrap();
        index.remove_location("42").unwrap();

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), StoreChangeKind::Added);
        assert_eq!(events[1].kind(), StoreChangeKind::Removed);
        // the removal carries the last known location
        assert_eq!(events[1].location(), &point(0.001, 0.001));
        drop(events);

        index.unsubscribe(subscription).unwrap();
    }

    #[test]
    fn test_relocation_is_single_event() {
        let index = SpatialIndex::new(6).unwrap();
        let (listener, seen) = collecting_listener();

        let _subscription = index
            .subscribe(&[geocode::encode(&point(0.001, 0.001), 3).unwrap()], listener)
            .unwrap();

        index.set_location("42", point(0.001, 0.001)).unwrap();
        index.set_location("42", point(0.0005, 0.0005)).unwrap();

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), StoreChangeKind::Added);
        assert_eq!(events[1].kind(), StoreChangeKind::Relocated);
        assert_eq!(events[1].location(), &point(0.0005, 0.0005));
    }

    #[test]
    fn test_relocation_notifies_old_bucket_subscriber() {
        let index = SpatialIndex::new(6).unwrap();
        let (listener, seen) = collecting_listener();

        // Subscribe only to the original neighborhood
        let old_prefix = geocode::encode(&point(0.001, 0.001), 4).unwrap();
        let _subscription = index.subscribe(&[old_prefix], listener).unwrap();

        index.set_location("42", point(0.001, 0.001)).unwrap();
        // Move far away, out of the subscribed prefix entirely
        index.set_location("42", point(45.0, 90.0)).unwrap();

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind(), StoreChangeKind::Relocated);
        assert_eq!(events[1].location(), &point(45.0, 90.0));
    }

    #[test]
    fn test_subscriber_prefix_filtering() {
        let index = SpatialIndex::new(6).unwrap();
        let (listener, seen) = collecting_listener();

        let _subscription = index
            .subscribe(&[geocode::encode(&point(0.0, 0.0), 4).unwrap()], listener)
            .unwrap();

        // A change on the other side of the world is not delivered
        index.set_location("far", point(45.0, 90.0)).unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_same_location_is_noop() {
        let index = SpatialIndex::new(6).unwrap();
        let (listener, seen) = collecting_listener();

        let _subscription = index
            .subscribe(&[geocode::encode(&point(5.0, 5.0), 3).unwrap()], listener)
            .unwrap();

        index.set_location("42", point(5.0, 5.0)).unwrap();
        index.set_location("42", point(5.0, 5.0)).unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let index = SpatialIndex::new(6).unwrap();
        let (listener, seen) = collecting_listener();

        let subscription = index
            .subscribe(&[geocode::encode(&point(1.0, 1.0), 3).unwrap()], listener)
            .unwrap();
        index.set_location("a", point(1.0, 1.0)).unwrap();
        index.unsubscribe(subscription).unwrap();
        index.set_location("b", point(1.0, 1.0)).unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_clear_removes_and_notifies() {
        let index = SpatialIndex::new(6).unwrap();
        let (listener, seen) = collecting_listener();

        index.set_location("a", point(1.0, 1.0)).unwrap();
        index.set_location("b", point(2.0, 2.0)).unwrap();

        let _subscription = index
            .subscribe(
                &[
                    geocode::encode(&point(1.0, 1.0), 2).unwrap(),
                    geocode::encode(&point(2.0, 2.0), 2).unwrap(),
                ],
                listener,
            )
            .unwrap();

        index.clear().unwrap();
        assert!(index.is_empty());

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind() == StoreChangeKind::Removed));
    }

    #[test]
    fn test_scan_order_stable_within_call() {
        let index = SpatialIndex::new(6).unwrap();
        index.set_location("a", point(0.001, 0.001)).unwrap();
        index.set_location("b", point(0.002, 0.002)).unwrap();
        index.set_location("c", point(0.003, 0.003)).unwrap();

        let prefix = vec![geocode::encode(&point(0.001, 0.001), 2).unwrap()];
        let first: Vec<EntityKey> = index.scan(&prefix).unwrap().keys().cloned().collect();
        let second: Vec<EntityKey> = index.scan(&prefix).unwrap().keys().cloned().collect();
        assert_eq!(first, second);
    }
}
