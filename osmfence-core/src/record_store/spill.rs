//! Record store spilling `bincode`-framed records to a temporary file.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::marker::PhantomData;

use bincode::{deserialize_from, serialize_into};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::{Builder, NamedTempFile};

use super::{RecordStore, RecordStoreError, Replay};

/// Record store backed by a temporary file deleted on release.
///
/// Records are appended through a buffered writer; each replay reopens the
/// file with an independent cursor so appends may continue afterwards.
pub struct TempFileRecordStore<T> {
    spill: Option<Spill>,
    count: usize,
    _records: PhantomData<fn() -> T>,
}

struct Spill {
    writer: BufWriter<File>,
    file: NamedTempFile,
}

impl<T> TempFileRecordStore<T> {
    /// Create an empty store in the system temporary directory.
    ///
    /// # Errors
    /// Returns [`RecordStoreError::Io`] when the file cannot be created.
    pub fn new(label: &str) -> Result<Self, RecordStoreError> {
        let file = Builder::new()
            .prefix(&format!("osmfence-{label}-"))
            .suffix(".spill")
            .tempfile()
            .map_err(|source| RecordStoreError::Io {
                operation: "create spill file",
                source,
            })?;
        let handle = file.reopen().map_err(|source| RecordStoreError::Io {
            operation: "open spill file for writing",
            source,
        })?;
        Ok(Self {
            spill: Some(Spill {
                writer: BufWriter::new(handle),
                file,
            }),
            count: 0,
            _records: PhantomData,
        })
    }
}

impl<T> fmt::Debug for TempFileRecordStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempFileRecordStore")
            .field("path", &self.spill.as_ref().map(|spill| spill.file.path()))
            .field("count", &self.count)
            .finish()
    }
}

impl<T> RecordStore<T> for TempFileRecordStore<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn add(&mut self, record: T) -> Result<(), RecordStoreError> {
        let spill = self.spill.as_mut().ok_or(RecordStoreError::Released)?;
        serialize_into(&mut spill.writer, &record)
            .map_err(|source| RecordStoreError::Encode { source })?;
        self.count += 1;
        Ok(())
    }

    fn iterate(&mut self) -> Result<Replay<'_, T>, RecordStoreError> {
        let spill = self.spill.as_mut().ok_or(RecordStoreError::Released)?;
        spill
            .writer
            .flush()
            .map_err(|source| RecordStoreError::Io {
                operation: "flush spill file",
                source,
            })?;
        let reader = spill.file.reopen().map_err(|source| RecordStoreError::Io {
            operation: "reopen spill file for replay",
            source,
        })?;
        Ok(Box::new(SpillReplay {
            reader: BufReader::new(reader),
            remaining: self.count,
            _records: PhantomData,
        }))
    }

    fn len(&self) -> usize {
        self.count
    }

    fn release(&mut self) {
        if let Some(spill) = self.spill.take() {
            let path = spill.file.path().to_path_buf();
            drop(spill.writer);
            if let Err(err) = spill.file.close() {
                log::warn!("failed to remove spill file {}: {err}", path.display());
            }
        }
    }
}

struct SpillReplay<T> {
    reader: BufReader<File>,
    remaining: usize,
    _records: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for SpillReplay<T> {
    type Item = Result<T, RecordStoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let record = deserialize_from(&mut self.reader).map_err(|source| {
            // Stop after the first decode failure; the stream position is lost.
            self.remaining = 0;
            RecordStoreError::Decode { source }
        });
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
