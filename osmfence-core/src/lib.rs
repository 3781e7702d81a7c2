//! Core of the osmfence change-stream filter.
//!
//! The crate filters OpenStreetMap change streams to geographic areas and
//! splits one replication stream into independently sequenced per-region
//! streams:
//!
//! - [`AreaFilter`] decides, change by change, whether an entity belongs to
//!   an [`Area`], optionally pulling in referenced entities so ways and
//!   relations stay complete.
//! - [`RegionSplitter`] runs one filter per [`Region`] and batches the
//!   output into time-aligned intervals stored through a
//!   [`ReplicationStore`].
//!
//! File formats live in `osmfence-data`; this crate only defines the seams.

#![forbid(unsafe_code)]

mod area;
mod entity;
pub mod filter;
mod id_tracker;
pub mod record_store;
mod region;
pub mod replication;
mod sink;
mod task;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use area::{Area, BoundingBox, BoundingBoxError};
pub use entity::{
    Action, Change, Entity, EntityId, EntityKind, Member, Node, Relation, Tags, Way,
};
pub use filter::{AreaFilter, AreaFilterConfig, BoundingBoxFilter, Completeness};
pub use id_tracker::{
    BITSET_DENSE_LIMIT, BitSetIdTracker, DynamicIdTracker, IdTracker, IdTrackerType, ListIdTracker,
    ParseIdTrackerTypeError,
};
pub use record_store::{RecordStore, RecordStoreError, RecordStoreKind};
pub use region::{Region, RegionKeyError};
pub use replication::{
    RegionSplitter, ReplicationState, ReplicationStore, SplitError, SplitterConfig,
    align_to_interval, initial_timestamp, maximum_timestamp,
};
pub use sink::{ChangeSink, Metadata, SinkError};
pub use task::{Task, UnknownTaskError};
