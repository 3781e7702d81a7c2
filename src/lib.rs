//! Facade crate for the osmfence change-stream filter.
//!
//! This crate re-exports the core filtering and splitting types and exposes
//! the file-backed adapters behind the `file-store` feature.

#![forbid(unsafe_code)]

pub use osmfence_core::{
    Action, Area, AreaFilter, AreaFilterConfig, BoundingBox, BoundingBoxError, BoundingBoxFilter,
    Change, ChangeSink, Completeness, Entity, EntityId, EntityKind, IdTracker, IdTrackerType,
    Member, Metadata, Node, RecordStore, RecordStoreError, RecordStoreKind, Region,
    RegionKeyError, RegionSplitter, Relation, ReplicationState, ReplicationStore, SinkError,
    SplitError, SplitterConfig, Tags, Task, Way, align_to_interval,
};

#[cfg(feature = "file-store")]
pub use osmfence_data::{
    ChangeFileError, FileReplicationStore, JsonChangeWriter, RegionConfigError, ReplicateError,
    ReplicationStoreError, SplitSummary, WorkingDirectory, initialize_regions, load_regions,
    parse_regions, read_changes, split_replication,
};
