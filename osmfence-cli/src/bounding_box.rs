//! `bounding-box-change` command implementation.

use std::io::{self, BufRead, BufReader, BufWriter, Write};

use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmfence_core::{
    AreaFilter, AreaFilterConfig, BoundingBox, ChangeSink, IdTrackerType, Metadata,
    RecordStoreKind,
};
use osmfence_data::{JsonChangeWriter, read_changes};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_BOTTOM, ARG_CASCADING_RELATIONS, ARG_CLIP, ARG_COMPLETE_RELATIONS, ARG_COMPLETE_WAYS,
    ARG_ID_TRACKER, ARG_INPUT, ARG_LEFT, ARG_OUTPUT, ARG_RIGHT, ARG_SPILL, ARG_TOP, CliError,
    ENV_BOTTOM, ENV_LEFT, ENV_RIGHT, ENV_TOP,
};

/// CLI arguments for the `bounding-box-change` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    name = "bounding-box-change",
    long_about = "Filter a line-delimited JSON change file to the entities \
                 inside a bounding box. Boolean options accept an explicit \
                 value (`--complete-ways=false`) so configuration files and \
                 environment variables can be overridden.",
    about = "Filter a change file to a bounding box"
)]
#[ortho_config(prefix = "OSMFENCE")]
pub(crate) struct BoundingBoxArgs {
    /// Western edge in degrees of longitude.
    #[arg(long = ARG_LEFT, value_name = "lon", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) left: Option<f64>,
    /// Eastern edge in degrees of longitude; smaller than `left` across the
    /// antimeridian.
    #[arg(long = ARG_RIGHT, value_name = "lon", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) right: Option<f64>,
    /// Northern edge in degrees of latitude.
    #[arg(long = ARG_TOP, value_name = "lat", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) top: Option<f64>,
    /// Southern edge in degrees of latitude.
    #[arg(long = ARG_BOTTOM, value_name = "lat", allow_negative_numbers = true)]
    #[serde(default)]
    pub(crate) bottom: Option<f64>,
    /// Identifier set backing: BitSet, IdList or Dynamic.
    #[arg(long = ARG_ID_TRACKER, value_name = "type")]
    #[serde(default)]
    pub(crate) id_tracker: Option<String>,
    /// Drop references to entities outside the box from emitted ways and
    /// relations.
    #[arg(long = ARG_CLIP, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) clip_incomplete_entities: Option<bool>,
    /// Emit every node of ways touching the box.
    #[arg(long = ARG_COMPLETE_WAYS, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) complete_ways: Option<bool>,
    /// Emit the direct members of relations touching the box.
    #[arg(long = ARG_COMPLETE_RELATIONS, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) complete_relations: Option<bool>,
    /// Emit relations whose member relations touch the box.
    #[arg(long = ARG_CASCADING_RELATIONS, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) cascading_relations: Option<bool>,
    /// Buffer changes in temporary files instead of memory (default true).
    #[arg(long = ARG_SPILL, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) spill: Option<bool>,
    /// Change file to read; standard input when omitted.
    #[arg(long = ARG_INPUT, value_name = "path")]
    #[serde(default)]
    pub(crate) input: Option<Utf8PathBuf>,
    /// Change file to write; standard output when omitted.
    #[arg(long = ARG_OUTPUT, value_name = "path")]
    #[serde(default)]
    pub(crate) output: Option<Utf8PathBuf>,
}

impl BoundingBoxArgs {
    pub(crate) fn into_config(self) -> Result<BoundingBoxConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        BoundingBoxConfig::try_from(merged)
    }
}

/// Resolved `bounding-box-change` configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundingBoxConfig {
    pub(crate) bound: BoundingBox,
    pub(crate) filter: AreaFilterConfig,
    pub(crate) input: Option<Utf8PathBuf>,
    pub(crate) output: Option<Utf8PathBuf>,
}

fn required(value: Option<f64>, field: &'static str, env: &'static str) -> Result<f64, CliError> {
    value.ok_or(CliError::MissingArgument { field, env })
}

impl TryFrom<BoundingBoxArgs> for BoundingBoxConfig {
    type Error = CliError;

    fn try_from(args: BoundingBoxArgs) -> Result<Self, Self::Error> {
        let bound = BoundingBox::new(
            required(args.left, ARG_LEFT, ENV_LEFT)?,
            required(args.right, ARG_RIGHT, ENV_RIGHT)?,
            required(args.top, ARG_TOP, ENV_TOP)?,
            required(args.bottom, ARG_BOTTOM, ENV_BOTTOM)?,
        )?;
        let id_tracker = match args.id_tracker.as_deref() {
            Some(name) => name.parse::<IdTrackerType>()?,
            None => IdTrackerType::default(),
        };
        let record_store = if args.spill.unwrap_or(true) {
            RecordStoreKind::default()
        } else {
            RecordStoreKind::Memory
        };
        Ok(Self {
            bound,
            filter: AreaFilterConfig {
                id_tracker,
                clip_incomplete_entities: args.clip_incomplete_entities.unwrap_or(false),
                complete_ways: args.complete_ways.unwrap_or(false),
                complete_relations: args.complete_relations.unwrap_or(false),
                cascading_relations: args.cascading_relations.unwrap_or(false),
                record_store,
            },
            input: args.input,
            output: args.output,
        })
    }
}

pub(crate) fn run_bounding_box(args: BoundingBoxArgs) -> Result<u64, CliError> {
    let config = args.into_config()?;
    let input: Box<dyn BufRead> = match &config.input {
        Some(path) => {
            let file = osmfence_fs::open_file_ambient(path).map_err(|source| {
                CliError::OpenInput {
                    path: path.clone(),
                    source,
                }
            })?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };
    let output: Box<dyn Write> = match &config.output {
        Some(path) => {
            let file = osmfence_fs::create_file_ambient(path).map_err(|source| {
                CliError::CreateOutput {
                    path: path.clone(),
                    source,
                }
            })?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    filter_changes(&config, input, output)
}

/// Filter every change of `input` into `output`, returning the number of
/// changes written.
pub(crate) fn filter_changes<R: BufRead, W: Write>(
    config: &BoundingBoxConfig,
    input: R,
    output: W,
) -> Result<u64, CliError> {
    let mut filter = AreaFilter::new(config.bound, config.filter, JsonChangeWriter::new(output))?;
    let outcome = drive(&mut filter, input);
    filter.release();
    outcome?;
    Ok(filter.sink().written())
}

fn drive<S: ChangeSink, R: BufRead>(
    filter: &mut AreaFilter<BoundingBox, S>,
    input: R,
) -> Result<(), CliError> {
    filter.initialize(&Metadata::new())?;
    for change in read_changes(input) {
        filter.process(change?)?;
    }
    filter.complete()?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<BoundingBoxConfig, CliError> {
    let merged = BoundingBoxArgs::merge_from_layers(layers).map_err(CliError::from)?;
    BoundingBoxConfig::try_from(merged)
}
