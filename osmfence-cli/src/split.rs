//! `split-replication-files` and `split-replication-files-init` commands.

use camino::Utf8PathBuf;
use chrono::TimeDelta;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmfence_core::{ReplicationState, SplitterConfig};
use osmfence_data::{
    FileReplicationStore, SplitSummary, WorkingDirectory, initialize_regions, split_replication,
};
use serde::{Deserialize, Serialize};

use crate::{ARG_INTERVAL, ARG_UPSTREAM, ARG_WORKING_DIR, CliError, ENV_UPSTREAM, ENV_WORKING_DIR};

/// CLI arguments shared by the replication split commands.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "split-replication-files",
    long_about = "Split an upstream replication directory into one \
                 replication stream per region listed in the working \
                 directory's area-list.json.",
    about = "Split a replication directory by region"
)]
#[ortho_config(prefix = "OSMFENCE")]
pub(crate) struct SplitArgs {
    /// Directory holding area-list.json, state.txt and the region streams.
    #[arg(long = ARG_WORKING_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) working_dir: Option<Utf8PathBuf>,
    /// Upstream replication directory.
    #[arg(long = ARG_UPSTREAM, value_name = "dir")]
    #[serde(default)]
    pub(crate) upstream: Option<Utf8PathBuf>,
    /// Interval length in seconds; 0 writes one batch per run.
    #[arg(long = ARG_INTERVAL, value_name = "seconds")]
    #[serde(default)]
    pub(crate) interval: Option<i64>,
}

impl SplitArgs {
    pub(crate) fn into_config(self) -> Result<SplitConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        SplitConfig::try_from(merged)
    }
}

/// Resolved split configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SplitConfig {
    pub(crate) working_dir: Utf8PathBuf,
    pub(crate) upstream: Utf8PathBuf,
    pub(crate) splitter: SplitterConfig,
}

impl TryFrom<SplitArgs> for SplitConfig {
    type Error = CliError;

    fn try_from(args: SplitArgs) -> Result<Self, Self::Error> {
        let working_dir = args.working_dir.ok_or(CliError::MissingArgument {
            field: ARG_WORKING_DIR,
            env: ENV_WORKING_DIR,
        })?;
        let upstream = args.upstream.ok_or(CliError::MissingArgument {
            field: ARG_UPSTREAM,
            env: ENV_UPSTREAM,
        })?;
        let seconds = args.interval.unwrap_or(0);
        if seconds < 0 {
            return Err(CliError::NegativeInterval { seconds });
        }
        let interval = TimeDelta::try_seconds(seconds).filter(|length| !length.is_zero());
        Ok(Self {
            working_dir,
            upstream,
            splitter: SplitterConfig::new(interval),
        })
    }
}

impl SplitConfig {
    fn open(&self) -> Result<(WorkingDirectory, FileReplicationStore), CliError> {
        let working = WorkingDirectory::open(&self.working_dir)?;
        let upstream = FileReplicationStore::open_ambient(&self.upstream)?;
        Ok((working, upstream))
    }
}

pub(crate) fn run_split(args: SplitArgs) -> Result<SplitSummary, CliError> {
    let config = args.into_config()?;
    split_with(&config)
}

pub(crate) fn run_split_init(args: SplitArgs) -> Result<ReplicationState, CliError> {
    let config = args.into_config()?;
    initialize_with(&config)
}

pub(crate) fn split_with(config: &SplitConfig) -> Result<SplitSummary, CliError> {
    let (working, upstream) = config.open()?;
    Ok(split_replication(&working, &upstream, config.splitter)?)
}

pub(crate) fn initialize_with(config: &SplitConfig) -> Result<ReplicationState, CliError> {
    let (working, upstream) = config.open()?;
    Ok(initialize_regions(&working, &upstream, config.splitter)?)
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<SplitConfig, CliError> {
    let merged = SplitArgs::merge_from_layers(layers).map_err(CliError::from)?;
    SplitConfig::try_from(merged)
}
