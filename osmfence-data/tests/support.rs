//! Shared helpers for building working and upstream directories on disk.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use osmfence_core::{Change, ChangeSink, Node, ReplicationState};
use osmfence_data::{JsonChangeWriter, format_state, sequence_path};
use tempfile::TempDir;

/// Scratch directory holding a working directory and an upstream stream.
pub struct Layout {
    _temp: TempDir,
    /// Working directory with the region list.
    pub working: Utf8PathBuf,
    /// Upstream replication directory.
    pub upstream: Utf8PathBuf,
}

impl Layout {
    /// Create empty working and upstream directories.
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap_or_else(|err| panic!("temporary directory: {err}"));
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("non-UTF-8 temporary path {path:?}"));
        let working = root.join("work");
        let upstream = root.join("upstream");
        for dir in [&working, &upstream] {
            fs::create_dir_all(dir).unwrap_or_else(|err| panic!("create {dir}: {err}"));
        }
        Self {
            _temp: temp,
            working,
            upstream,
        }
    }

    /// Write the region list.
    pub fn write_regions(&self, contents: &str) {
        let path = self.working.join("area-list.json");
        fs::write(&path, contents).unwrap_or_else(|err| panic!("write {path}: {err}"));
    }

    /// Write the upstream `state.txt`.
    pub fn write_upstream_state(&self, state: ReplicationState) {
        write_state(&self.upstream.join("state.txt"), state);
    }

    /// Write one upstream batch and its state file, and advance the
    /// upstream `state.txt` to it.
    pub fn write_upstream_batch(&self, state: ReplicationState, changes: Vec<Change>) {
        let data = self
            .upstream
            .join(sequence_path(state.sequence_number, "osc.json"));
        create_parent(&data);
        let mut writer = JsonChangeWriter::new(Vec::new());
        for change in changes {
            writer
                .process(change)
                .unwrap_or_else(|err| panic!("encode change: {err}"));
        }
        fs::write(&data, writer.into_inner()).unwrap_or_else(|err| panic!("write {data}: {err}"));
        write_state(
            &self
                .upstream
                .join(sequence_path(state.sequence_number, "state.txt")),
            state,
        );
        self.write_upstream_state(state);
    }
}

fn create_parent(path: &Utf8Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap_or_else(|err| panic!("create {parent}: {err}"));
    }
}

/// Write a state file at `path`.
pub fn write_state(path: &Utf8Path, state: ReplicationState) {
    create_parent(path);
    fs::write(path, format_state(&state)).unwrap_or_else(|err| panic!("write {path}: {err}"));
}

/// Midnight of 2024-05-01 plus `hours`.
pub fn hours(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("valid base timestamp"))
        + TimeDelta::hours(hours)
}

/// A node created at `lon`, `lat`.
pub fn node(id: u64, lon: f64, lat: f64) -> Change {
    Change::create(Node::new(id, 1, lon, lat))
}
