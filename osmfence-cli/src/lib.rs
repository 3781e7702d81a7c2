//! Command-line interface for osmfence's change-stream tasks.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use osmfence_core::Task;

mod bounding_box;
mod error;
mod split;

pub use error::CliError;

use bounding_box::{BoundingBoxArgs, run_bounding_box};
use split::{SplitArgs, run_split, run_split_init};

pub(crate) const ARG_LEFT: &str = "left";
pub(crate) const ARG_RIGHT: &str = "right";
pub(crate) const ARG_TOP: &str = "top";
pub(crate) const ARG_BOTTOM: &str = "bottom";
pub(crate) const ARG_ID_TRACKER: &str = "id-tracker";
pub(crate) const ARG_CLIP: &str = "clip-incomplete-entities";
pub(crate) const ARG_COMPLETE_WAYS: &str = "complete-ways";
pub(crate) const ARG_COMPLETE_RELATIONS: &str = "complete-relations";
pub(crate) const ARG_CASCADING_RELATIONS: &str = "cascading-relations";
pub(crate) const ARG_SPILL: &str = "spill";
pub(crate) const ARG_INPUT: &str = "input";
pub(crate) const ARG_OUTPUT: &str = "output";
pub(crate) const ARG_WORKING_DIR: &str = "working-dir";
pub(crate) const ARG_UPSTREAM: &str = "upstream";
pub(crate) const ARG_INTERVAL: &str = "interval";

pub(crate) const ENV_LEFT: &str = "OSMFENCE_CMDS_BOUNDING_BOX_CHANGE_LEFT";
pub(crate) const ENV_RIGHT: &str = "OSMFENCE_CMDS_BOUNDING_BOX_CHANGE_RIGHT";
pub(crate) const ENV_TOP: &str = "OSMFENCE_CMDS_BOUNDING_BOX_CHANGE_TOP";
pub(crate) const ENV_BOTTOM: &str = "OSMFENCE_CMDS_BOUNDING_BOX_CHANGE_BOTTOM";
pub(crate) const ENV_WORKING_DIR: &str = "OSMFENCE_CMDS_SPLIT_REPLICATION_FILES_WORKING_DIR";
pub(crate) const ENV_UPSTREAM: &str = "OSMFENCE_CMDS_SPLIT_REPLICATION_FILES_UPSTREAM";

/// Run the osmfence CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    execute(cli)
}

fn execute(cli: Cli) -> Result<(), CliError> {
    log::debug!("running task {}", cli.command.task());
    match cli.command {
        Command::BoundingBoxChange(args) => run_bounding_box(args).map(|written| {
            log::info!("wrote {written} changes");
        }),
        Command::SplitReplicationFiles(args) => run_split(args).map(|summary| {
            log::info!(
                "split {} upstream batches up to sequence {}",
                summary.batches,
                summary.local.sequence_number
            );
        }),
        Command::SplitReplicationFilesInit(args) => run_split_init(args).map(|state| {
            log::info!("region streams start at {}", state.timestamp);
        }),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "osmfence",
    about = "Filter OpenStreetMap change streams to geographic regions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Filter one change file to a bounding box.
    #[command(
        name = Task::BoundingBoxChange.name(),
        visible_alias = Task::BoundingBoxChange.alias()
    )]
    BoundingBoxChange(BoundingBoxArgs),
    /// Split an upstream replication directory into region streams.
    #[command(
        name = Task::SplitReplicationFiles.name(),
        visible_alias = Task::SplitReplicationFiles.alias()
    )]
    SplitReplicationFiles(SplitArgs),
    /// Write sequence 0 for every region stream.
    #[command(
        name = Task::SplitReplicationFilesInit.name(),
        visible_alias = Task::SplitReplicationFilesInit.alias()
    )]
    SplitReplicationFilesInit(SplitArgs),
}

impl Command {
    const fn task(&self) -> Task {
        match self {
            Self::BoundingBoxChange(_) => Task::BoundingBoxChange,
            Self::SplitReplicationFiles(_) => Task::SplitReplicationFiles,
            Self::SplitReplicationFilesInit(_) => Task::SplitReplicationFilesInit,
        }
    }
}

#[cfg(test)]
mod tests;
