//! File adapters for the osmfence change-stream filter.
//!
//! Responsibilities:
//! - Load the region list (`area-list.json`).
//! - Read and write line-delimited JSON change files.
//! - Store replication streams as directories of numbered batches.
//! - Wire a working directory to the region splitter.
//!
//! Boundaries:
//! - Filtering and interval rules live in `osmfence-core`.
//! - Paths below a working directory are resolved through capability
//!   handles from `osmfence-fs`.

mod change_file;
mod regions;
mod replicate;
mod replication_store;

pub use change_file::{ChangeFileError, JsonChangeWriter, read_changes};
pub use regions::{REGION_LIST_FILE, RegionConfigError, load_regions, parse_regions};
pub use replicate::{
    ReplicateError, SplitSummary, WorkingDirectory, initialize_regions, split_replication,
};
pub use replication_store::{
    FileBatchWriter, FileReplicationStore, ReplicationStoreError, STATE_FILE, format_state,
    parse_state, sequence_path,
};
