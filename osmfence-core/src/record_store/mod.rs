//! Append-only record stores replayed in arrival order.
//!
//! Buffered filtering stores every change, decides availability afterwards,
//! and then replays the stored changes. [`RecordStore`] abstracts the
//! storage so the filter logic stays independent of where records live.

use std::fmt;
use std::io;

use thiserror::Error;

use crate::Change;

mod memory;
#[cfg(feature = "spill")]
mod spill;

pub use memory::MemoryRecordStore;
#[cfg(feature = "spill")]
pub use spill::TempFileRecordStore;

/// Iterator replaying stored records from the first one appended.
pub type Replay<'a, T> = Box<dyn Iterator<Item = Result<T, RecordStoreError>> + 'a>;

/// Append-only sequence of records with forward replay.
pub trait RecordStore<T>: fmt::Debug {
    /// Append a record.
    ///
    /// # Errors
    /// Returns [`RecordStoreError::Released`] after [`RecordStore::release`],
    /// or a storage error from the backing.
    fn add(&mut self, record: T) -> Result<(), RecordStoreError>;

    /// Replay every record in arrival order.
    ///
    /// Replay may be started any number of times before release.
    ///
    /// # Errors
    /// Returns [`RecordStoreError::Released`] after [`RecordStore::release`],
    /// or a storage error when the backing cannot be rewound.
    fn iterate(&mut self) -> Result<Replay<'_, T>, RecordStoreError>;

    /// Number of records appended so far.
    fn len(&self) -> usize;

    /// Whether no record has been appended.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reclaim storage. Idempotent.
    fn release(&mut self);
}

/// Errors raised by record stores.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordStoreError {
    /// The store was used after being released.
    #[error("record store used after release")]
    Released,
    /// The backing file could not be created, written or read.
    #[error("failed to {operation}: {source}")]
    Io {
        /// Description of the failed operation.
        operation: &'static str,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A record could not be encoded.
    #[cfg(feature = "spill")]
    #[error("failed to encode spilled record: {source}")]
    Encode {
        /// Encoder error returned by `bincode`.
        #[source]
        source: bincode::Error,
    },
    /// A record could not be decoded.
    #[cfg(feature = "spill")]
    #[error("failed to decode spilled record: {source}")]
    Decode {
        /// Decoder error returned by `bincode`.
        #[source]
        source: bincode::Error,
    },
}

/// Selects where buffered changes are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStoreKind {
    /// Keep records in memory.
    Memory,
    /// Spill records to an anonymous temporary file.
    #[cfg(feature = "spill")]
    TempFile,
}

#[cfg(feature = "spill")]
impl Default for RecordStoreKind {
    fn default() -> Self {
        Self::TempFile
    }
}

#[cfg(not(feature = "spill"))]
impl Default for RecordStoreKind {
    fn default() -> Self {
        Self::Memory
    }
}

impl RecordStoreKind {
    /// Allocate an empty change store of this kind.
    ///
    /// `label` prefixes temporary file names so spills are recognisable.
    ///
    /// # Errors
    /// Returns [`RecordStoreError::Io`] when a temporary file cannot be
    /// created.
    pub fn create(self, label: &str) -> Result<Box<dyn RecordStore<Change>>, RecordStoreError> {
        match self {
            Self::Memory => {
                log::trace!("buffering {label} changes in memory");
                Ok(Box::new(MemoryRecordStore::default()))
            }
            #[cfg(feature = "spill")]
            Self::TempFile => Ok(Box::new(TempFileRecordStore::new(label)?)),
        }
    }
}
