//! Downstream consumers of change streams.
//!
//! Every stage follows the same lifecycle: `initialize` once, `process` any
//! number of times, `complete` once, then `release`. `release` must be safe
//! to call at any point, including after a failure part-way through.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use crate::Change;
use crate::record_store::RecordStoreError;

/// Free-form key/value metadata passed through `initialize`.
pub type Metadata = BTreeMap<String, String>;

/// Errors raised by a [`ChangeSink`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SinkError {
    /// A buffered record store failed.
    #[error(transparent)]
    Store(#[from] RecordStoreError),
    /// Writing output failed.
    #[error("failed to {operation}: {source}")]
    Io {
        /// Description of the failed operation.
        operation: &'static str,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A downstream stage failed for a reason specific to its implementation.
    #[error("{stage} failed: {source}")]
    Downstream {
        /// Name of the failing stage.
        stage: &'static str,
        /// Underlying error.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// A consumer of an ordered change stream.
pub trait ChangeSink {
    /// Prepare for processing; called once before any change.
    ///
    /// # Errors
    /// Implementations return [`SinkError`] when they cannot prepare output.
    fn initialize(&mut self, metadata: &Metadata) -> Result<(), SinkError>;

    /// Consume one change.
    ///
    /// # Errors
    /// Implementations return [`SinkError`] when the change cannot be
    /// buffered or written.
    fn process(&mut self, change: Change) -> Result<(), SinkError>;

    /// Flush everything; no further changes follow.
    ///
    /// # Errors
    /// Implementations return [`SinkError`] when flushing fails.
    fn complete(&mut self) -> Result<(), SinkError>;

    /// Free resources. Never fails and may be called more than once.
    fn release(&mut self);
}

impl<S: ChangeSink + ?Sized> ChangeSink for Box<S> {
    fn initialize(&mut self, metadata: &Metadata) -> Result<(), SinkError> {
        (**self).initialize(metadata)
    }

    fn process(&mut self, change: Change) -> Result<(), SinkError> {
        (**self).process(change)
    }

    fn complete(&mut self) -> Result<(), SinkError> {
        (**self).complete()
    }

    fn release(&mut self) {
        (**self).release();
    }
}

/// Collects changes in memory, mostly useful for inspection.
impl ChangeSink for Vec<Change> {
    fn initialize(&mut self, _metadata: &Metadata) -> Result<(), SinkError> {
        Ok(())
    }

    fn process(&mut self, change: Change) -> Result<(), SinkError> {
        self.push(change);
        Ok(())
    }

    fn complete(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn release(&mut self) {}
}
