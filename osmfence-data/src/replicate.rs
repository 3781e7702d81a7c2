//! Working-directory wiring of the region splitter.
//!
//! A working directory holds `area-list.json`, one stream folder per region
//! and `state.txt` recording how far the upstream stream has been consumed.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs_utf8::Dir;
use osmfence_core::{
    Region, RegionSplitter, ReplicationState, ReplicationStore, SplitError, SplitterConfig,
};
use thiserror::Error;

use crate::regions::{RegionConfigError, load_regions};
use crate::replication_store::{
    FileReplicationStore, ReplicationStoreError, STATE_FILE, read_state_file, write_state_file,
};

/// Errors raised while splitting a replication stream into region streams.
#[derive(Debug, Error)]
pub enum ReplicateError {
    /// The working directory could not be opened.
    #[error("failed to open working directory `{path}`: {source}")]
    Open {
        /// Working directory path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The region list is invalid.
    #[error(transparent)]
    Regions(#[from] RegionConfigError),
    /// Reading or writing a stream directory failed.
    #[error(transparent)]
    Store(#[from] ReplicationStoreError),
    /// The splitter failed.
    #[error(transparent)]
    Split(#[from] SplitError),
    /// A stream has no `state.txt`.
    #[error("`{path}` has no replication state")]
    Uninitialized {
        /// Stream directory lacking a state.
        path: Utf8PathBuf,
    },
    /// An upstream batch below the current state is missing.
    #[error("upstream `{path}` is missing {what} for sequence {sequence_number}")]
    MissingSequence {
        /// Upstream stream directory.
        path: Utf8PathBuf,
        /// Missing part.
        what: &'static str,
        /// Missing sequence number.
        sequence_number: u64,
    },
}

/// Outcome of one [`split_replication`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSummary {
    /// Number of upstream batches consumed.
    pub batches: u64,
    /// Upstream state reached locally.
    pub local: ReplicationState,
    /// State of every region after the run, by storage key.
    pub regions: Vec<(String, ReplicationState)>,
}

/// A directory holding the region list and region streams.
#[derive(Debug)]
pub struct WorkingDirectory {
    dir: Dir,
    path: Utf8PathBuf,
}

impl WorkingDirectory {
    /// Open an existing working directory.
    ///
    /// # Errors
    /// Returns [`ReplicateError::Open`] when the directory cannot be opened.
    pub fn open(path: &Utf8Path) -> Result<Self, ReplicateError> {
        let dir = osmfence_fs::open_dir_ambient(path, false).map_err(|source| ReplicateError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir,
            path: path.to_path_buf(),
        })
    }

    /// Path of the directory.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Regions listed in `area-list.json`.
    ///
    /// # Errors
    /// Returns [`ReplicateError::Regions`] when the list is missing or
    /// invalid.
    pub fn regions(&self) -> Result<Vec<Region>, ReplicateError> {
        Ok(load_regions(&self.dir)?)
    }

    /// Build a splitter over every region's stream folder.
    ///
    /// # Errors
    /// Returns [`ReplicateError`] when the region list is invalid, a folder
    /// cannot be opened or a region state cannot be read.
    pub fn open_splitter(
        &self,
        config: SplitterConfig,
    ) -> Result<RegionSplitter<FileReplicationStore>, ReplicateError> {
        let mut streams = Vec::new();
        for region in self.regions()? {
            let store = FileReplicationStore::open(&self.dir, region.key(), &self.path)?;
            streams.push((region, store));
        }
        Ok(RegionSplitter::new(config, streams)?)
    }

    /// Upstream state consumed so far, if any.
    ///
    /// # Errors
    /// Returns [`ReplicateError::Store`] when the state cannot be read.
    pub fn local_state(&self) -> Result<Option<ReplicationState>, ReplicateError> {
        Ok(read_state_file(&self.dir, Utf8Path::new(STATE_FILE), &self.path)?)
    }

    /// Record the upstream state consumed so far.
    ///
    /// # Errors
    /// Returns [`ReplicateError::Store`] when the state cannot be written.
    pub fn save_local_state(&self, state: &ReplicationState) -> Result<(), ReplicateError> {
        Ok(write_state_file(
            &self.dir,
            Utf8Path::new(STATE_FILE),
            &self.path,
            state,
        )?)
    }
}

fn upstream_state(upstream: &FileReplicationStore) -> Result<ReplicationState, ReplicateError> {
    upstream
        .current_state()?
        .ok_or_else(|| ReplicateError::Uninitialized {
            path: upstream.label().to_path_buf(),
        })
}

/// Write sequence `0` for every region and start consuming `upstream` at
/// its current state.
///
/// Returns the state recorded for the regions.
///
/// # Errors
/// Returns [`ReplicateError`] when the upstream stream has no state, the
/// region list is invalid or a state cannot be written.
pub fn initialize_regions(
    working: &WorkingDirectory,
    upstream: &FileReplicationStore,
    config: SplitterConfig,
) -> Result<ReplicationState, ReplicateError> {
    let server = upstream_state(upstream)?;
    let mut splitter = working.open_splitter(config)?;
    let initial = splitter.initialize_state(&server)?;
    working.save_local_state(&server)?;
    log::info!(
        "initialised {} regions at {} from upstream sequence {}",
        splitter.regions().count(),
        initial.timestamp,
        server.sequence_number
    );
    Ok(initial)
}

/// Consume every upstream batch not yet split, up to the maximum timestamp
/// allowed by the interval, and close the resulting region intervals.
///
/// # Errors
/// Returns [`ReplicateError`] when a state is missing, an upstream batch is
/// absent or malformed, or a region stream cannot be written. Open
/// intervals are released without being persisted.
pub fn split_replication(
    working: &WorkingDirectory,
    upstream: &FileReplicationStore,
    config: SplitterConfig,
) -> Result<SplitSummary, ReplicateError> {
    let server = upstream_state(upstream)?;
    let local = working
        .local_state()?
        .ok_or_else(|| ReplicateError::Uninitialized {
            path: working.path().to_path_buf(),
        })?;
    let mut splitter = working.open_splitter(config)?;
    let outcome = consume(&mut splitter, upstream, server, local);
    splitter.release();
    let (batches, reached) = outcome?;
    if batches > 0 {
        working.save_local_state(&reached)?;
    }
    let regions = splitter
        .regions()
        .filter_map(|region| {
            splitter
                .state(region.key())
                .map(|state| (region.key().to_owned(), state))
        })
        .collect();
    log::info!(
        "consumed {batches} upstream batches, local sequence {}",
        reached.sequence_number
    );
    Ok(SplitSummary {
        batches,
        local: reached,
        regions,
    })
}

fn consume(
    splitter: &mut RegionSplitter<FileReplicationStore>,
    upstream: &FileReplicationStore,
    server: ReplicationState,
    local: ReplicationState,
) -> Result<(u64, ReplicationState), ReplicateError> {
    let maximum = splitter.calculate_maximum_timestamp(server.timestamp, local.timestamp)?;
    let missing = |what, sequence_number| ReplicateError::MissingSequence {
        path: upstream.label().to_path_buf(),
        what,
        sequence_number,
    };
    let mut reached = local;
    let mut batches = 0;
    for sequence_number in local.sequence_number + 1..=server.sequence_number {
        let state = upstream
            .state_at(sequence_number)?
            .ok_or_else(|| missing("a state file", sequence_number))?;
        if state.timestamp > maximum {
            log::debug!("stopping before sequence {sequence_number} at {}", state.timestamp);
            break;
        }
        let changes = upstream
            .read_batch(sequence_number)?
            .ok_or_else(|| missing("a data file", sequence_number))?;
        log::debug!(
            "splitting upstream sequence {sequence_number} ({} changes)",
            changes.len()
        );
        splitter.process_changeset(&state, changes)?;
        reached = state;
        batches += 1;
    }
    splitter.complete()?;
    Ok((batches, reached))
}
