//! Fan-out of one replication stream into per-region streams.

use std::error::Error as StdError;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use super::{ReplicationState, ReplicationStore, align_to_interval, initial_timestamp};
use crate::filter::{AreaFilter, AreaFilterConfig};
use crate::{BoundingBox, Change, ChangeSink, IdTrackerType, Metadata, Region, SinkError};

/// Options for a [`RegionSplitter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    /// Length of one output interval. `None` writes one batch per run.
    pub interval: Option<TimeDelta>,
    /// Filter applied to every region.
    pub filter: AreaFilterConfig,
}

impl SplitterConfig {
    /// Configuration with the default region filter: dynamic identifier
    /// sets, complete ways and relations, no clipping.
    #[must_use]
    pub fn new(interval: Option<TimeDelta>) -> Self {
        Self {
            interval: interval.filter(|length| *length > TimeDelta::zero()),
            filter: AreaFilterConfig {
                id_tracker: IdTrackerType::Dynamic,
                clip_incomplete_entities: false,
                complete_ways: true,
                complete_relations: true,
                cascading_relations: false,
                ..AreaFilterConfig::default()
            },
        }
    }
}

impl SplitterConfig {
    /// The interval length when it is strictly positive.
    ///
    /// Zero or negative lengths mean no interval, whichever way the config
    /// was built.
    #[must_use]
    pub fn interval_length(&self) -> Option<TimeDelta> {
        self.interval.filter(|length| *length > TimeDelta::zero())
    }
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Errors raised by a [`RegionSplitter`].
#[derive(Debug, Error)]
pub enum SplitError {
    /// A region's replication state was never initialised.
    #[error("region `{region}` has no replication state; initialise it first")]
    Uninitialized {
        /// Storage key of the region.
        region: String,
    },
    /// A region's replication store failed.
    #[error("failed to {operation} for region `{region}`: {source}")]
    Store {
        /// Storage key of the region.
        region: String,
        /// Description of the failed operation.
        operation: &'static str,
        /// Underlying store error.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    /// Filtering or writing a region's interval failed.
    #[error("failed to write interval {sequence_number} of region `{region}`: {source}")]
    Interval {
        /// Storage key of the region.
        region: String,
        /// Sequence number of the interval being written.
        sequence_number: u64,
        /// Underlying sink error.
        #[source]
        source: SinkError,
    },
    /// An interval boundary fell outside the representable time range.
    #[error("interval boundary after {timestamp} for region `{region}` is out of range")]
    TimestampOutOfRange {
        /// Storage key of the region.
        region: String,
        /// Last representable boundary.
        timestamp: DateTime<Utc>,
    },
    /// The splitter has no regions.
    #[error("no regions configured")]
    NoRegions,
}

type IntervalWriter<S> = AreaFilter<BoundingBox, <S as ReplicationStore>::Writer>;

struct RegionSlot<S: ReplicationStore> {
    region: Region,
    store: S,
    state: Option<ReplicationState>,
    writer: Option<IntervalWriter<S>>,
}

impl<S: ReplicationStore> RegionSlot<S> {
    fn store_error(&self, operation: &'static str, source: S::Error) -> SplitError {
        SplitError::Store {
            region: self.region.key().to_owned(),
            operation,
            source: Box::new(source),
        }
    }

    fn interval_error(&self, sequence_number: u64, source: SinkError) -> SplitError {
        SplitError::Interval {
            region: self.region.key().to_owned(),
            sequence_number,
            source,
        }
    }

    fn state(&self) -> Result<ReplicationState, SplitError> {
        self.state.ok_or_else(|| SplitError::Uninitialized {
            region: self.region.key().to_owned(),
        })
    }

    fn next_boundary(&self, after: DateTime<Utc>, interval: TimeDelta) -> Result<DateTime<Utc>, SplitError> {
        after
            .checked_add_signed(interval)
            .ok_or_else(|| SplitError::TimestampOutOfRange {
                region: self.region.key().to_owned(),
                timestamp: after,
            })
    }

    fn open(&mut self, sequence_number: u64, config: &SplitterConfig) -> Result<(), SplitError> {
        log::debug!(
            "opening interval {sequence_number} for region `{}`",
            self.region.key()
        );
        let writer = self
            .store
            .open_writer(sequence_number)
            .map_err(|source| self.store_error("open interval writer", source))?;
        let mut filter = AreaFilter::new(*self.region.bound(), config.filter, writer)
            .map_err(|source| self.interval_error(sequence_number, source.into()))?;
        if let Err(source) = filter.initialize(&Metadata::new()) {
            filter.release();
            return Err(self.interval_error(sequence_number, source));
        }
        self.writer = Some(filter);
        Ok(())
    }

    /// Complete and release the open writer, then persist the state.
    fn close(&mut self) -> Result<(), SplitError> {
        let state = self.state()?;
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        log::debug!(
            "closing interval {} for region `{}`",
            state.sequence_number,
            self.region.key()
        );
        let completed = writer.complete();
        writer.release();
        completed.map_err(|source| self.interval_error(state.sequence_number, source))?;
        self.store
            .save_state(&state)
            .map_err(|source| self.store_error("save replication state", source))?;
        log::info!(
            "region `{}` at sequence {} ({})",
            self.region.key(),
            state.sequence_number,
            state.timestamp
        );
        Ok(())
    }

    /// Make sure the interval covering `upstream` is open.
    fn advance(&mut self, upstream: &ReplicationState, config: &SplitterConfig) -> Result<(), SplitError> {
        let mut state = self.state()?;
        let length = config.interval_length();
        if self.writer.is_none() {
            state.sequence_number += 1;
            if let Some(interval) = length {
                let end = self.next_boundary(state.timestamp, interval)?;
                state.timestamp = align_to_interval(end, interval);
            }
            self.state = Some(state);
            self.open(state.sequence_number, config)?;
        }
        let Some(interval) = length else {
            state.timestamp = upstream.timestamp;
            self.state = Some(state);
            return Ok(());
        };
        while upstream.timestamp > state.timestamp {
            self.close()?;
            state.sequence_number += 1;
            state.timestamp = self.next_boundary(state.timestamp, interval)?;
            self.state = Some(state);
            self.open(state.sequence_number, config)?;
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            writer.release();
        }
    }
}

/// Splits one change stream into independently sequenced per-region
/// streams, one batch per time interval.
///
/// Every region owns an [`AreaFilter`] per open interval and its own
/// [`ReplicationStore`]. Every change is offered to every region.
pub struct RegionSplitter<S: ReplicationStore> {
    config: SplitterConfig,
    slots: Vec<RegionSlot<S>>,
}

impl<S: ReplicationStore> RegionSplitter<S> {
    /// Create a splitter, reading the persisted state of every region.
    ///
    /// # Errors
    /// Returns [`SplitError::NoRegions`] for an empty region list and
    /// [`SplitError::Store`] when a persisted state cannot be read.
    pub fn new(config: SplitterConfig, regions: Vec<(Region, S)>) -> Result<Self, SplitError> {
        if regions.is_empty() {
            return Err(SplitError::NoRegions);
        }
        let mut slots = Vec::with_capacity(regions.len());
        for (region, store) in regions {
            let mut slot = RegionSlot {
                region,
                store,
                state: None,
                writer: None,
            };
            slot.state = slot
                .store
                .current_state()
                .map_err(|source| slot.store_error("read replication state", source))?;
            slots.push(slot);
        }
        Ok(Self { config, slots })
    }

    /// The splitter configuration.
    #[must_use]
    pub const fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Regions in configuration order.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.slots.iter().map(|slot| &slot.region)
    }

    /// Current state of the region with storage key `key`.
    #[must_use]
    pub fn state(&self, key: &str) -> Option<ReplicationState> {
        self.slots
            .iter()
            .find(|slot| slot.region.key() == key)
            .and_then(|slot| slot.state)
    }

    /// State of the least advanced region.
    ///
    /// # Errors
    /// Returns [`SplitError::Uninitialized`] when a region has no state.
    pub fn least_advanced_state(&self) -> Result<ReplicationState, SplitError> {
        let mut least: Option<ReplicationState> = None;
        for slot in &self.slots {
            let state = slot.state()?;
            least = Some(least.map_or(state, |current| current.min(state)));
        }
        least.ok_or(SplitError::NoRegions)
    }

    /// Upper bound of upstream data to consume in this run.
    ///
    /// See [`maximum_timestamp`](super::maximum_timestamp); the recorded
    /// state is that of the least advanced region.
    ///
    /// # Errors
    /// Returns [`SplitError::Uninitialized`] when a region has no state.
    pub fn calculate_maximum_timestamp(
        &self,
        candidate: DateTime<Utc>,
        local: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SplitError> {
        let recorded = self.least_advanced_state()?;
        Ok(super::maximum_timestamp(
            candidate,
            local,
            &recorded,
            self.config.interval_length(),
        ))
    }

    /// Record sequence `0` for every region from the upstream state.
    ///
    /// # Errors
    /// Returns [`SplitError::Store`] when a state cannot be saved.
    pub fn initialize_state(&mut self, upstream: &ReplicationState) -> Result<ReplicationState, SplitError> {
        let state = ReplicationState::new(0, initial_timestamp(upstream.timestamp, self.config.interval_length()));
        for slot in &mut self.slots {
            slot.store
                .save_state(&state)
                .map_err(|source| slot.store_error("save initial replication state", source))?;
            slot.state = Some(state);
            log::info!(
                "initialised region `{}` at {}",
                slot.region.key(),
                state.timestamp
            );
        }
        Ok(state)
    }

    /// Feed one upstream batch, described by `upstream`, to every region.
    ///
    /// Intervals ending before the upstream timestamp are closed and
    /// persisted first, so the batch lands in the interval covering it.
    ///
    /// # Errors
    /// Returns [`SplitError`] when a region is uninitialised or when a
    /// filter, writer or store fails. The splitter should then be released.
    pub fn process_changeset<I>(&mut self, upstream: &ReplicationState, changes: I) -> Result<(), SplitError>
    where
        I: IntoIterator<Item = Change>,
    {
        for slot in &mut self.slots {
            slot.advance(upstream, &self.config)?;
        }
        for change in changes {
            for slot in &mut self.slots {
                let Some(writer) = slot.writer.as_mut() else {
                    continue;
                };
                if let Err(source) = writer.process(change.clone()) {
                    let sequence_number = slot.state.map_or(0, |state| state.sequence_number);
                    return Err(slot.interval_error(sequence_number, source));
                }
            }
        }
        Ok(())
    }

    /// Close every open interval and persist its state.
    ///
    /// # Errors
    /// Returns [`SplitError`] when completing a writer or saving a state
    /// fails.
    pub fn complete(&mut self) -> Result<(), SplitError> {
        for slot in &mut self.slots {
            slot.close()?;
        }
        Ok(())
    }

    /// Release every open interval without persisting anything. Idempotent.
    pub fn release(&mut self) {
        for slot in &mut self.slots {
            slot.release();
        }
    }
}
