//! Test helpers for laying out change files and replication directories.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use osmfence_core::{Change, ChangeSink, Node, ReplicationState};
use osmfence_data::{JsonChangeWriter, format_state, sequence_path};
use tempfile::TempDir;

/// Scratch directory with UTF-8 paths.
pub(super) struct Scratch {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Scratch {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
        Self { _dir: dir, root }
    }

    pub(super) fn path(&self, relative: &str) -> Utf8PathBuf {
        self.root.join(relative)
    }
}

pub(super) fn node(id: u64, lon: f64, lat: f64) -> Change {
    Change::create(Node::new(id, 1, lon, lat))
}

pub(super) fn encode(changes: Vec<Change>) -> Vec<u8> {
    let mut writer = JsonChangeWriter::new(Vec::new());
    for change in changes {
        writer.process(change).expect("encode change");
    }
    writer.into_inner()
}

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent directories");
    }
    fs::write(path, contents).expect("write file");
}

pub(super) fn write_state(path: &Utf8Path, state: ReplicationState) {
    write_utf8(path, format_state(&state).as_bytes());
}

/// Write upstream batch `state.sequence_number` and advance `state.txt`.
pub(super) fn write_upstream_batch(upstream: &Utf8Path, state: ReplicationState, changes: Vec<Change>) {
    let sequence = state.sequence_number;
    write_utf8(&upstream.join(sequence_path(sequence, "osc.json")), &encode(changes));
    write_state(&upstream.join(sequence_path(sequence, "state.txt")), state);
    write_state(&upstream.join("state.txt"), state);
}

/// Midnight of 2024-05-01 plus `minutes`.
pub(super) fn minutes(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp")
        + TimeDelta::minutes(minutes)
}
