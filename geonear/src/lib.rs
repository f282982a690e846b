#![allow(dead_code, unused_imports)]
//! # GeoNear - Live Geospatial Proximity Queries
//!
//! GeoNear is a geospatial proximity query engine. It indexes point
//! entities by location using geohash buckets, answers "which entities lie
//! within radius R of point C" with a handful of ordered prefix scans
//! instead of a full scan, and keeps standing queries *live*: as entities
//! appear, move, and disappear, or as the query region itself is
//! redefined, each query emits incremental `Entered` / `Exited` / `Moved`
//! membership events rather than forcing the caller to re-diff full result
//! sets.
//!
//! ## Key Features
//!
//! - **Geohash Index**: ordered, concurrent bucket index; a region query
//!   touches only the buckets under its covering prefixes
//! - **Live Queries**: standing region queries with incremental
//!   enter/exit/move events and causal per-key ordering
//! - **Authoritative Reconciliation**: region updates recompute membership
//!   from a fresh scan plus exact-distance filter, so incremental diffs
//!   never diverge from ground truth
//! - **Pluggable Store**: the durable backend is a trait; a thread-safe
//!   in-memory implementation is bundled
//! - **Validated Boundaries**: out-of-range coordinates, negative radii,
//!   and malformed hashes are rejected at the API boundary, never stored
//! - **Clean API**: PIMPL pattern provides stable, encapsulated interfaces
//!
//! ## Quick Start
//!
//! ```rust
//! use geonear::geometry::{GeoPoint, Region};
//! use geonear::geonear::GeoNear;
//! use geonear::query::QueryEventListener;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = GeoNear::builder().open()?;
//!
//! // One live query per viewport; update it as the viewport moves
//! let region = Region::new(GeoPoint::new(0.0, 0.0)?, 2500.0)?;
//! let query_id = engine.create_query(
//!     region,
//!     QueryEventListener::new(|event| {
//!         println!("{:?}: {} at {}", event.kind(), event.key(), event.location());
//!         Ok(())
//!     }),
//! )?;
//!
//! // Report a sighting; the query emits Entered if it is in range
//! engine.report_entity("42", GeoPoint::new(0.001, 0.001)?)?;
//!
//! // Pan the viewport: same query, new region, incremental diff
//! engine.update_region(&query_id, Region::new(GeoPoint::new(0.01, 0.01)?, 2500.0)?)?;
//!
//! engine.cancel_query(&query_id)?;
//! engine.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`common`] - Shared types, lock helpers, and the event bus
//! - [`errors`] - Error types and result definitions
//! - [`geocode`] - Geohash encoding, decoding, and region coverage
//! - [`geometry`] - Validated geographic points, bounds, and regions
//! - [`geonear`] - The engine facade and command surface
//! - [`geonear_builder`] - Engine builder for initialization
//! - [`geonear_config`] - Engine configuration
//! - [`index`] - The geohash-bucketed spatial index
//! - [`query`] - Live queries, the query manager, and query events
//! - [`store`] - Storage backend contract and the in-memory implementation

use crate::common::*;

pub mod common;
pub mod errors;
pub mod geocode;
pub mod geometry;
pub mod geonear;
pub mod geonear_builder;
pub mod geonear_config;
pub mod index;
pub mod query;
pub mod store;

// Re-export the types most hosts need
pub use crate::common::EntityKey;
pub use crate::errors::{ErrorKind, GeoNearError, GeoNearResult};
pub use crate::geometry::{GeoBounds, GeoPoint, Region};
pub use crate::geonear::GeoNear;
pub use crate::geonear_builder::GeoNearBuilder;
pub use crate::geonear_config::GeoNearConfig;
pub use crate::index::SpatialIndex;
pub use crate::query::{
    LiveQuery, QueryEventInfo, QueryEventKind, QueryEventListener, QueryId, QueryManager,
    QueryState,
};
pub use crate::store::{
    InMemoryProximityStore, ProximityStore, ProximityStoreProvider, StoreChangeInfo,
    StoreChangeKind, StoreChangeListener,
};
