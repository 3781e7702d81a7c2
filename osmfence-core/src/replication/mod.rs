//! Replication state and interval arithmetic.
//!
//! A replication stream is a numbered sequence of change batches. Each batch
//! is described by a [`ReplicationState`]: its sequence number and the
//! instant up to which it is complete. Sequence `0` marks a stream that has
//! been initialised but holds no data yet.

use std::error::Error as StdError;

use chrono::{DateTime, TimeDelta, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ChangeSink;

mod splitter;

pub use splitter::{RegionSplitter, SplitError, SplitterConfig};

/// Progress marker of a replication stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReplicationState {
    /// Instant up to which the stream is complete.
    pub timestamp: DateTime<Utc>,
    /// Sequence number of the last batch; `0` before the first batch.
    pub sequence_number: u64,
}

impl ReplicationState {
    /// Pair a sequence number with a timestamp.
    #[must_use]
    pub const fn new(sequence_number: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            sequence_number,
        }
    }

    /// Whether no batch has been written yet.
    #[must_use]
    pub const fn is_initial(&self) -> bool {
        self.sequence_number == 0
    }
}

/// Persistent home of one replication stream.
///
/// A store keeps the current state and hands out one writer per sequence
/// number. The writer receives the batch through the [`ChangeSink`]
/// lifecycle; its data is final once `complete` returns.
pub trait ReplicationStore {
    /// Sink receiving the changes of one batch.
    type Writer: ChangeSink;
    /// Error raised by the backing storage.
    type Error: StdError + Send + Sync + 'static;

    /// The persisted state, or `None` when the stream was never initialised.
    ///
    /// # Errors
    /// Returns the backing error when the state exists but cannot be read.
    fn current_state(&self) -> Result<Option<ReplicationState>, Self::Error>;

    /// Persist `state` as the current state.
    ///
    /// # Errors
    /// Returns the backing error when the state cannot be written durably.
    fn save_state(&mut self, state: &ReplicationState) -> Result<(), Self::Error>;

    /// Open the writer for batch `sequence_number`.
    ///
    /// # Errors
    /// Returns the backing error when the batch cannot be created.
    fn open_writer(&mut self, sequence_number: u64) -> Result<Self::Writer, Self::Error>;
}

/// Round `timestamp` down to a multiple of `interval` since the Unix epoch.
///
/// Timestamps are handled at millisecond precision. Non-positive intervals
/// leave the timestamp unchanged.
///
/// # Examples
///
/// ```
/// use chrono::{TimeDelta, TimeZone, Utc};
/// use osmfence_core::align_to_interval;
///
/// let noon = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
/// let midnight = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
/// assert_eq!(align_to_interval(noon, TimeDelta::days(1)), midnight);
/// ```
#[must_use]
pub fn align_to_interval(timestamp: DateTime<Utc>, interval: TimeDelta) -> DateTime<Utc> {
    let length = interval.num_milliseconds();
    if length <= 0 {
        return timestamp;
    }
    let millis = timestamp.timestamp_millis();
    let remainder = millis.rem_euclid(length);
    if remainder == 0 {
        return timestamp;
    }
    DateTime::from_timestamp_millis(millis - remainder).unwrap_or(timestamp)
}

/// Timestamp recorded for sequence `0` when a stream is initialised from
/// `upstream`.
///
/// The upstream timestamp is aligned down; if that moved it backwards it is
/// advanced by one interval so the stream never claims a period it has not
/// received data for.
#[must_use]
pub fn initial_timestamp(upstream: DateTime<Utc>, interval: Option<TimeDelta>) -> DateTime<Utc> {
    let Some(length) = interval.filter(|length| *length > TimeDelta::zero()) else {
        return upstream;
    };
    let aligned = align_to_interval(upstream, length);
    if aligned < upstream {
        aligned.checked_add_signed(length).unwrap_or(aligned)
    } else {
        aligned
    }
}

/// Upper bound of upstream data to consume in the next run.
///
/// `candidate` is the bound proposed by the downloader, `local` the
/// timestamp reached locally and `recorded` the persisted state of the
/// output stream.
///
/// The candidate is aligned down to an interval boundary. On the first
/// interval it steps back one interval if it would not pass the recorded
/// timestamp. Finally, a bound beyond `local` that does not pass the
/// recorded timestamp is clamped to `local`, so no interval is opened
/// without enough data to fill it.
#[must_use]
pub fn maximum_timestamp(
    candidate: DateTime<Utc>,
    local: DateTime<Utc>,
    recorded: &ReplicationState,
    interval: Option<TimeDelta>,
) -> DateTime<Utc> {
    let mut maximum = candidate;
    if let Some(length) = interval.filter(|length| *length > TimeDelta::zero()) {
        maximum = align_to_interval(maximum, length);
        if recorded.is_initial() && maximum <= recorded.timestamp {
            maximum = maximum.checked_sub_signed(length).unwrap_or(maximum);
        }
    }
    if maximum > local && maximum <= recorded.timestamp {
        maximum = local;
    }
    log::debug!("maximum timestamp is {maximum}");
    maximum
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rstest::rstest;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    #[rstest]
    #[case(at(12, 30), TimeDelta::hours(1), at(12, 0))]
    #[case(at(12, 0), TimeDelta::hours(1), at(12, 0))]
    #[case(at(12, 30), TimeDelta::zero(), at(12, 30))]
    #[case(at(23, 59), TimeDelta::days(1), at(0, 0))]
    fn aligns_down(
        #[case] timestamp: DateTime<Utc>,
        #[case] interval: TimeDelta,
        #[case] expected: DateTime<Utc>,
    ) {
        assert_eq!(align_to_interval(timestamp, interval), expected);
    }

    #[rstest]
    #[case(at(12, 30), Some(TimeDelta::hours(1)), at(13, 0))]
    #[case(at(12, 0), Some(TimeDelta::hours(1)), at(12, 0))]
    #[case(at(12, 30), None, at(12, 30))]
    fn initial_timestamp_never_precedes_upstream(
        #[case] upstream: DateTime<Utc>,
        #[case] interval: Option<TimeDelta>,
        #[case] expected: DateTime<Utc>,
    ) {
        assert_eq!(initial_timestamp(upstream, interval), expected);
    }

    #[rstest]
    fn first_interval_steps_back_when_not_ahead_of_recorded_data() {
        let recorded = ReplicationState::new(0, at(12, 0));
        let maximum = maximum_timestamp(at(12, 40), at(11, 0), &recorded, Some(TimeDelta::hours(1)));
        // Aligned to 12:00, which does not pass the recorded 12:00, so one
        // interval back; 11:00 does not exceed local, so no clamp.
        assert_eq!(maximum, at(11, 0));
    }

    #[rstest]
    fn later_intervals_keep_aligned_candidate() {
        let recorded = ReplicationState::new(4, at(12, 0));
        let maximum = maximum_timestamp(at(14, 20), at(12, 0), &recorded, Some(TimeDelta::hours(1)));
        assert_eq!(maximum, at(14, 0));
    }

    #[rstest]
    fn clamps_to_local_when_recorded_data_is_ahead() {
        let recorded = ReplicationState::new(3, at(15, 0));
        let maximum = maximum_timestamp(at(14, 20), at(12, 0), &recorded, Some(TimeDelta::hours(1)));
        assert_eq!(maximum, at(12, 0));
    }

    #[rstest]
    fn without_interval_only_clamps() {
        let recorded = ReplicationState::new(3, at(15, 0));
        assert_eq!(maximum_timestamp(at(14, 20), at(12, 0), &recorded, None), at(12, 0));
        assert_eq!(maximum_timestamp(at(16, 20), at(12, 0), &recorded, None), at(16, 20));
    }

    proptest! {
        #[test]
        fn repeated_interval_steps_do_not_drift(
            start_hours in 0_i64..1_000_000,
            interval_minutes in 1_i64..10_000,
            steps in 0_i32..500,
        ) {
            let interval = TimeDelta::minutes(interval_minutes);
            let start = DateTime::from_timestamp(start_hours * 3_600, 0).expect("in range");
            let origin = align_to_interval(start, interval);
            let mut end = origin;
            for _ in 0..steps {
                end = align_to_interval(end + interval, interval);
            }
            prop_assert_eq!(end, origin + interval * steps);
            prop_assert_eq!(align_to_interval(end, interval), end);
        }
    }
}
