//! Replication streams stored as directories of numbered files.
//!
//! A stream directory holds `state.txt` with the current
//! [`ReplicationState`] and, per batch, `AAA/BBB/CCC.osc.json` with the
//! changes plus `AAA/BBB/CCC.state.txt` with the state reached after it.
//! `AAABBBCCC` is the nine-digit zero-padded sequence number.

use std::io::{self, BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs_utf8::{Dir, File};
use chrono::{DateTime, SecondsFormat, Utc};
use osmfence_core::{Change, ChangeSink, Metadata, ReplicationState, ReplicationStore, SinkError};
use thiserror::Error;

use crate::change_file::{ChangeFileError, JsonChangeWriter, read_changes};

/// Name of the current-state file of a stream.
pub const STATE_FILE: &str = "state.txt";

const DATA_EXTENSION: &str = "osc.json";
const STATE_EXTENSION: &str = "state.txt";
const SEQUENCE_KEY: &str = "sequenceNumber";
const TIMESTAMP_KEY: &str = "timestamp";

/// Errors raised by a [`FileReplicationStore`].
#[derive(Debug, Error)]
pub enum ReplicationStoreError {
    /// A filesystem operation failed.
    #[error("failed to {operation} `{path}`: {source}")]
    Io {
        /// Description of the failed operation.
        operation: &'static str,
        /// Path the operation concerned.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A state file does not hold a valid state.
    #[error("malformed replication state `{path}`: {message}")]
    MalformedState {
        /// Path of the state file.
        path: Utf8PathBuf,
        /// What is wrong with it.
        message: String,
    },
    /// A batch data file holds a malformed change.
    #[error("malformed batch `{path}`: {source}")]
    Batch {
        /// Path of the data file.
        path: Utf8PathBuf,
        /// Underlying read error.
        #[source]
        source: ChangeFileError,
    },
}

/// Relative path of the file for `sequence_number` with `extension`.
///
/// ```
/// use osmfence_data::sequence_path;
///
/// assert_eq!(sequence_path(1_234_567, "osc.json"), "001/234/567.osc.json");
/// ```
#[must_use]
pub fn sequence_path(sequence_number: u64, extension: &str) -> Utf8PathBuf {
    let top = sequence_number.div_euclid(1_000_000);
    let middle = sequence_number.div_euclid(1_000).rem_euclid(1_000);
    let bottom = sequence_number.rem_euclid(1_000);
    Utf8PathBuf::from(format!("{top:03}/{middle:03}/{bottom:03}.{extension}"))
}

/// Render a state in `key=value` form with escaped colons.
///
/// Sub-second precision is kept so a saved state reloads unchanged.
#[must_use]
pub fn format_state(state: &ReplicationState) -> String {
    let timestamp = state
        .timestamp
        .to_rfc3339_opts(SecondsFormat::AutoSi, true)
        .replace(':', "\\:");
    format!(
        "{SEQUENCE_KEY}={}\n{TIMESTAMP_KEY}={timestamp}\n",
        state.sequence_number
    )
}

/// Parse a `key=value` state document.
///
/// Comment lines starting with `#` and unknown keys are ignored; colons in
/// values may be escaped with a backslash.
///
/// # Errors
/// Returns a description of the problem when a key is missing or a value
/// cannot be parsed.
pub fn parse_state(contents: &str) -> Result<ReplicationState, String> {
    let mut sequence_number = None;
    let mut timestamp = None;
    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, raw)) = line.split_once('=') else {
            return Err(format!("line `{line}` is not a key=value pair"));
        };
        let value = raw.trim().replace("\\:", ":");
        match key.trim() {
            SEQUENCE_KEY => {
                let parsed = value
                    .parse::<u64>()
                    .map_err(|err| format!("invalid {SEQUENCE_KEY} `{value}`: {err}"))?;
                sequence_number = Some(parsed);
            }
            TIMESTAMP_KEY => {
                let parsed = DateTime::parse_from_rfc3339(&value)
                    .map_err(|err| format!("invalid {TIMESTAMP_KEY} `{value}`: {err}"))?;
                timestamp = Some(parsed.with_timezone(&Utc));
            }
            _ => {}
        }
    }
    match (sequence_number, timestamp) {
        (Some(sequence), Some(instant)) => Ok(ReplicationState::new(sequence, instant)),
        (None, _) => Err(format!("missing {SEQUENCE_KEY}")),
        (_, None) => Err(format!("missing {TIMESTAMP_KEY}")),
    }
}

/// Read the state file at `path` below `dir`, if present.
pub(crate) fn read_state_file(
    dir: &Dir,
    path: &Utf8Path,
    label: &Utf8Path,
) -> Result<Option<ReplicationState>, ReplicationStoreError> {
    let contents =
        osmfence_fs::read_optional(dir, path).map_err(|source| ReplicationStoreError::Io {
            operation: "read replication state",
            path: label.join(path),
            source,
        })?;
    contents
        .map(|text| {
            parse_state(&text).map_err(|message| ReplicationStoreError::MalformedState {
                path: label.join(path),
                message,
            })
        })
        .transpose()
}

/// Atomically write `state` to `path` below `dir`.
pub(crate) fn write_state_file(
    dir: &Dir,
    path: &Utf8Path,
    label: &Utf8Path,
    state: &ReplicationState,
) -> Result<(), ReplicationStoreError> {
    osmfence_fs::write_atomic(dir, path, format_state(state).as_bytes()).map_err(|source| {
        ReplicationStoreError::Io {
            operation: "write replication state",
            path: label.join(path),
            source,
        }
    })
}

/// A replication stream in a directory.
#[derive(Debug)]
pub struct FileReplicationStore {
    dir: Dir,
    label: Utf8PathBuf,
}

impl FileReplicationStore {
    /// Open the stream in `folder` below `parent`, creating the folder.
    ///
    /// # Errors
    /// Returns [`ReplicationStoreError::Io`] when the folder cannot be
    /// created or opened.
    pub fn open(parent: &Dir, folder: &str, label: &Utf8Path) -> Result<Self, ReplicationStoreError> {
        let path = label.join(folder);
        parent
            .create_dir_all(folder)
            .and_then(|()| parent.open_dir(folder))
            .map(|dir| Self {
                dir,
                label: path.clone(),
            })
            .map_err(|source| ReplicationStoreError::Io {
                operation: "open replication directory",
                path,
                source,
            })
    }

    /// Open an existing stream directory by ambient path.
    ///
    /// # Errors
    /// Returns [`ReplicationStoreError::Io`] when the directory cannot be
    /// opened.
    pub fn open_ambient(path: &Utf8Path) -> Result<Self, ReplicationStoreError> {
        osmfence_fs::open_dir_ambient(path, false)
            .map(|dir| Self {
                dir,
                label: path.to_path_buf(),
            })
            .map_err(|source| ReplicationStoreError::Io {
                operation: "open replication directory",
                path: path.to_path_buf(),
                source,
            })
    }

    /// Path used in diagnostics.
    #[must_use]
    pub fn label(&self) -> &Utf8Path {
        &self.label
    }

    /// State recorded beside batch `sequence_number`, if present.
    ///
    /// # Errors
    /// Returns [`ReplicationStoreError`] when the file exists but cannot be
    /// read or parsed.
    pub fn state_at(&self, sequence_number: u64) -> Result<Option<ReplicationState>, ReplicationStoreError> {
        read_state_file(
            &self.dir,
            &sequence_path(sequence_number, STATE_EXTENSION),
            &self.label,
        )
    }

    /// Changes of batch `sequence_number`, if present.
    ///
    /// # Errors
    /// Returns [`ReplicationStoreError`] when the file exists but cannot be
    /// read or holds a malformed change.
    pub fn read_batch(&self, sequence_number: u64) -> Result<Option<Vec<Change>>, ReplicationStoreError> {
        let path = sequence_path(sequence_number, DATA_EXTENSION);
        let file = match self.dir.open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ReplicationStoreError::Io {
                    operation: "open batch",
                    path: self.label.join(&path),
                    source,
                });
            }
        };
        read_changes(BufReader::new(file))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(|source| ReplicationStoreError::Batch {
                path: self.label.join(&path),
                source,
            })
    }
}

impl ReplicationStore for FileReplicationStore {
    type Writer = FileBatchWriter;
    type Error = ReplicationStoreError;

    fn current_state(&self) -> Result<Option<ReplicationState>, Self::Error> {
        read_state_file(&self.dir, Utf8Path::new(STATE_FILE), &self.label)
    }

    fn save_state(&mut self, state: &ReplicationState) -> Result<(), Self::Error> {
        write_state_file(
            &self.dir,
            &sequence_path(state.sequence_number, STATE_EXTENSION),
            &self.label,
            state,
        )?;
        write_state_file(&self.dir, Utf8Path::new(STATE_FILE), &self.label, state)
    }

    fn open_writer(&mut self, sequence_number: u64) -> Result<Self::Writer, Self::Error> {
        let path = sequence_path(sequence_number, DATA_EXTENSION);
        let staging = match path.file_name() {
            Some(name) => path.with_file_name(format!(".{name}.tmp")),
            None => path.with_extension("tmp"),
        };
        let io_error = |operation, source| ReplicationStoreError::Io {
            operation,
            path: self.label.join(&staging),
            source,
        };
        let dir = self
            .dir
            .try_clone()
            .map_err(|source| io_error("clone directory handle for", source))?;
        let file = osmfence_fs::create_file(&dir, &staging)
            .map_err(|source| io_error("create batch", source))?;
        Ok(FileBatchWriter {
            dir,
            path,
            staging,
            out: Some(JsonChangeWriter::new(BufWriter::new(file))),
            committed: false,
        })
    }
}

/// Writer of one batch data file.
///
/// Changes go to a hidden staging file that is renamed into place by
/// `complete`; releasing an uncommitted writer removes it.
#[derive(Debug)]
pub struct FileBatchWriter {
    dir: Dir,
    path: Utf8PathBuf,
    staging: Utf8PathBuf,
    out: Option<JsonChangeWriter<BufWriter<File>>>,
    committed: bool,
}

impl FileBatchWriter {
    fn output(&mut self) -> Result<&mut JsonChangeWriter<BufWriter<File>>, SinkError> {
        self.out.as_mut().ok_or_else(|| SinkError::Io {
            operation: "write to a closed batch",
            source: io::Error::other("batch writer already closed"),
        })
    }
}

impl ChangeSink for FileBatchWriter {
    fn initialize(&mut self, metadata: &Metadata) -> Result<(), SinkError> {
        self.output()?.initialize(metadata)
    }

    fn process(&mut self, change: Change) -> Result<(), SinkError> {
        self.output()?.process(change)
    }

    fn complete(&mut self) -> Result<(), SinkError> {
        let mut out = self.out.take().ok_or_else(|| SinkError::Io {
            operation: "complete a closed batch",
            source: io::Error::other("batch writer already closed"),
        })?;
        out.complete()?;
        let mut file = out
            .into_inner()
            .into_inner()
            .map_err(|err| SinkError::Io {
                operation: "flush batch",
                source: err.into_error(),
            })?;
        file.flush()
            .and_then(|()| file.sync_all())
            .map_err(|source| SinkError::Io {
                operation: "sync batch",
                source,
            })?;
        drop(file);
        self.dir
            .rename(&self.staging, &self.dir, &self.path)
            .map_err(|source| SinkError::Io {
                operation: "commit batch",
                source,
            })?;
        self.committed = true;
        Ok(())
    }

    fn release(&mut self) {
        self.out = None;
        if !self.committed {
            self.committed = true;
            if let Err(err) = self.dir.remove_file(&self.staging) {
                if err.kind() != io::ErrorKind::NotFound {
                    log::warn!("failed to remove staging batch `{}`: {err}", self.staging);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use osmfence_core::Node;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    fn day(offset: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1 + offset, 0, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[fixture]
    fn scratch() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().expect("temporary directory");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 path");
        (temp, root)
    }

    #[rstest]
    #[case(0, "000/000/000.state.txt")]
    #[case(7, "000/000/007.state.txt")]
    #[case(123_456_789, "123/456/789.state.txt")]
    #[case(1_000_000_000, "1000/000/000.state.txt")]
    fn sequence_paths_split_into_groups(#[case] sequence: u64, #[case] expected: &str) {
        assert_eq!(sequence_path(sequence, STATE_EXTENSION), expected);
    }

    #[rstest]
    fn state_text_escapes_colons() {
        let text = format_state(&ReplicationState::new(42, day(0)));
        assert_eq!(text, "sequenceNumber=42\ntimestamp=2024-05-01T00\\:00\\:00Z\n");
        assert_eq!(parse_state(&text), Ok(ReplicationState::new(42, day(0))));
    }

    #[rstest]
    fn fractional_seconds_survive_a_reload() {
        let state = ReplicationState::new(9, day(0) + chrono::TimeDelta::milliseconds(1_250));
        let text = format_state(&state);
        assert!(text.contains("timestamp=2024-05-01T00\\:00\\:01.250Z"), "{text}");
        assert_eq!(parse_state(&text), Ok(state));
    }

    #[rstest]
    fn parses_unescaped_states_with_comments() {
        let text = "#Wed May 01 00:00:00 UTC 2024\ntxnMaxQueried=9\ntimestamp=2024-05-02T00:00:00Z\nsequenceNumber=3\n";
        assert_eq!(parse_state(text), Ok(ReplicationState::new(3, day(1))));
    }

    #[rstest]
    #[case("timestamp=2024-05-01T00:00:00Z", "missing sequenceNumber")]
    #[case("sequenceNumber=1", "missing timestamp")]
    #[case("sequenceNumber=one\ntimestamp=2024-05-01T00:00:00Z", "invalid sequenceNumber")]
    #[case("sequenceNumber", "not a key=value pair")]
    fn rejects_incomplete_states(#[case] text: &str, #[case] fragment: &str) {
        let message = parse_state(text).expect_err("malformed state");
        assert!(message.contains(fragment), "{message}");
    }

    #[rstest]
    fn saved_states_land_in_both_files(scratch: (TempDir, Utf8PathBuf)) {
        let (_temp, root) = scratch;
        let parent = osmfence_fs::open_dir_ambient(&root, false).expect("open root");
        let mut store = FileReplicationStore::open(&parent, "region", &root).expect("open store");
        assert_eq!(store.current_state().expect("read state"), None);

        let state = ReplicationState::new(5, day(2));
        store.save_state(&state).expect("save state");
        assert_eq!(store.current_state().expect("read state"), Some(state));
        assert_eq!(store.state_at(5).expect("read sequence state"), Some(state));
        assert_eq!(store.state_at(4).expect("read sequence state"), None);
    }

    #[rstest]
    fn completed_batches_are_committed(scratch: (TempDir, Utf8PathBuf)) {
        let (_temp, root) = scratch;
        let parent = osmfence_fs::open_dir_ambient(&root, false).expect("open root");
        let mut store = FileReplicationStore::open(&parent, "region", &root).expect("open store");
        let mut writer = store.open_writer(1).expect("open writer");
        writer.initialize(&Metadata::new()).expect("initialize");
        writer
            .process(Change::create(Node::new(1, 1, 0.0, 0.0)))
            .expect("process");
        assert_eq!(store.read_batch(1).expect("read batch"), None, "not visible before complete");
        writer.complete().expect("complete");
        writer.release();

        let batch = store.read_batch(1).expect("read batch").expect("batch present");
        assert_eq!(batch, vec![Change::create(Node::new(1, 1, 0.0, 0.0))]);
        assert!(!root.join("region/000/000/.001.osc.json.tmp").exists());
    }

    #[rstest]
    fn released_batches_leave_nothing_behind(scratch: (TempDir, Utf8PathBuf)) {
        let (_temp, root) = scratch;
        let parent = osmfence_fs::open_dir_ambient(&root, false).expect("open root");
        let mut store = FileReplicationStore::open(&parent, "region", &root).expect("open store");
        let mut writer = store.open_writer(2).expect("open writer");
        writer
            .process(Change::create(Node::new(1, 1, 0.0, 0.0)))
            .expect("process");
        writer.release();
        writer.release();

        assert_eq!(store.read_batch(2).expect("read batch"), None);
        assert!(!root.join("region/000/000/.002.osc.json.tmp").exists());
        assert!(matches!(
            writer.process(Change::create(Node::new(2, 1, 0.0, 0.0))),
            Err(SinkError::Io { .. })
        ));
    }

    #[rstest]
    fn malformed_state_files_name_their_path(scratch: (TempDir, Utf8PathBuf)) {
        let (_temp, root) = scratch;
        std::fs::create_dir_all(root.join("region")).expect("create region");
        std::fs::write(root.join("region/state.txt"), "sequenceNumber=x\n").expect("write state");
        let store = FileReplicationStore::open_ambient(&root.join("region")).expect("open store");
        let err = store.current_state().expect_err("malformed state");
        assert!(
            matches!(&err, ReplicationStoreError::MalformedState { path, .. } if path.ends_with("region/state.txt")),
            "{err}"
        );
    }
}
