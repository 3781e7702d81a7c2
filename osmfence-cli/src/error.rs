//! Error types emitted by the osmfence CLI.

use std::sync::Arc;

use camino::Utf8PathBuf;
use osmfence_core::{BoundingBoxError, ParseIdTrackerTypeError, RecordStoreError, SinkError};
use osmfence_data::{ChangeFileError, ReplicateError, ReplicationStoreError};
use thiserror::Error;

/// Errors emitted by the osmfence CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// The bounding box edges do not form a valid box.
    #[error("invalid bounding box: {0}")]
    BoundingBox(#[from] BoundingBoxError),
    /// The identifier set backing is unknown.
    #[error(transparent)]
    IdTracker(#[from] ParseIdTrackerTypeError),
    /// The interval length is negative.
    #[error("interval must not be negative, got {seconds} seconds")]
    NegativeInterval { seconds: i64 },
    /// The change input could not be opened.
    #[error("failed to open change input {path:?}: {source}")]
    OpenInput {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The change output could not be created.
    #[error("failed to create change output {path:?}: {source}")]
    CreateOutput {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The change input holds a malformed line.
    #[error("failed to read changes: {0}")]
    ReadChanges(#[from] ChangeFileError),
    /// Allocating the filter's buffers failed.
    #[error("failed to prepare the area filter: {0}")]
    RecordStore(#[from] RecordStoreError),
    /// Filtering or writing changes failed.
    #[error("failed to filter changes: {0}")]
    Filter(#[from] SinkError),
    /// The upstream replication directory could not be opened.
    #[error("failed to open upstream replication: {0}")]
    Upstream(#[from] ReplicationStoreError),
    /// Splitting the replication stream failed.
    #[error("replication split failed: {0}")]
    Replicate(#[from] ReplicateError),
}
