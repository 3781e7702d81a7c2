//! Line-delimited JSON change files.
//!
//! Each non-blank line holds one serialised [`Change`]. The format is used
//! for `bounding-box-change` input and output and for interval data files.

use std::io::{self, BufRead, Write};

use osmfence_core::{Change, ChangeSink, Metadata, SinkError};
use thiserror::Error;

/// Errors raised while reading a change file.
#[derive(Debug, Error)]
pub enum ChangeFileError {
    /// Reading from the underlying source failed.
    #[error("failed to read line {line}: {source}")]
    Io {
        /// One-based line number.
        line: usize,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A line is not a valid change.
    #[error("malformed change on line {line}: {source}")]
    Parse {
        /// One-based line number.
        line: usize,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Iterate over the changes of a line-delimited JSON source.
///
/// Blank lines are skipped. Iteration yields an error for the first
/// unreadable or malformed line; callers normally stop there.
///
/// # Examples
///
/// ```
/// use osmfence_core::EntityKind;
/// use osmfence_data::read_changes;
///
/// let input = br#"{"action":"create","entity":{"node":{"id":1,"version":1,"location":{"x":0.5,"y":0.5}}}}"#;
/// let changes: Vec<_> = read_changes(&input[..]).collect::<Result<_, _>>()?;
/// assert_eq!(changes[0].entity.kind(), EntityKind::Node);
/// # Ok::<(), osmfence_data::ChangeFileError>(())
/// ```
pub fn read_changes<R: BufRead>(reader: R) -> impl Iterator<Item = Result<Change, ChangeFileError>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let number = index + 1;
            match line {
                Ok(text) if text.trim().is_empty() => None,
                Ok(text) => Some(
                    serde_json::from_str(&text)
                        .map_err(|source| ChangeFileError::Parse { line: number, source }),
                ),
                Err(source) => Some(Err(ChangeFileError::Io { line: number, source })),
            }
        })
}

/// Sink writing every change as one JSON line.
#[derive(Debug)]
pub struct JsonChangeWriter<W: Write> {
    out: W,
    written: u64,
}

impl<W: Write> JsonChangeWriter<W> {
    /// Wrap an output stream.
    #[must_use]
    pub const fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    /// Number of changes written so far.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Recover the output stream.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ChangeSink for JsonChangeWriter<W> {
    fn initialize(&mut self, _metadata: &Metadata) -> Result<(), SinkError> {
        Ok(())
    }

    fn process(&mut self, change: Change) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.out, &change).map_err(|source| SinkError::Downstream {
            stage: "json change writer",
            source: Box::new(source),
        })?;
        self.out
            .write_all(b"\n")
            .map_err(|source| SinkError::Io {
                operation: "write change line",
                source,
            })?;
        self.written += 1;
        Ok(())
    }

    fn complete(&mut self) -> Result<(), SinkError> {
        self.out.flush().map_err(|source| SinkError::Io {
            operation: "flush change output",
            source,
        })
    }

    fn release(&mut self) {}
}
