//! Names of the pipeline tasks this crate provides.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A task exposed to the hosting pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Filter one change stream to a bounding box.
    BoundingBoxChange,
    /// Split a replication stream into per-region streams.
    SplitReplicationFiles,
    /// Write the initial state of every region stream.
    SplitReplicationFilesInit,
}

impl Task {
    /// Every task, in registration order.
    pub const ALL: [Self; 3] = [
        Self::BoundingBoxChange,
        Self::SplitReplicationFiles,
        Self::SplitReplicationFilesInit,
    ];

    /// Long task name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BoundingBoxChange => "bounding-box-change",
            Self::SplitReplicationFiles => "split-replication-files",
            Self::SplitReplicationFilesInit => "split-replication-files-init",
        }
    }

    /// Short alias.
    #[must_use]
    pub const fn alias(self) -> &'static str {
        match self {
            Self::BoundingBoxChange => "bbc",
            Self::SplitReplicationFiles => "srf",
            Self::SplitReplicationFilesInit => "srfi",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a task name is not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task `{name}`")]
pub struct UnknownTaskError {
    /// The rejected name.
    pub name: String,
}

impl FromStr for Task {
    type Err = UnknownTaskError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|task| task.name() == value || task.alias() == value)
            .ok_or_else(|| UnknownTaskError {
                name: value.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("bounding-box-change", Task::BoundingBoxChange)]
    #[case("bbc", Task::BoundingBoxChange)]
    #[case("split-replication-files", Task::SplitReplicationFiles)]
    #[case("srf", Task::SplitReplicationFiles)]
    #[case("split-replication-files-init", Task::SplitReplicationFilesInit)]
    #[case("srfi", Task::SplitReplicationFilesInit)]
    fn resolves_names_and_aliases(#[case] name: &str, #[case] expected: Task) {
        assert_eq!(name.parse::<Task>(), Ok(expected));
    }

    #[rstest]
    fn rejects_unknown_names() {
        let err = "merge-replication-files".parse::<Task>().expect_err("unknown task");
        assert_eq!(err.name, "merge-replication-files");
    }
}
