//! Identifier sets used to track available and required entities.
//!
//! Three interchangeable backings are offered. They differ only in memory
//! profile:
//! - [`BitSetIdTracker`] keeps one bit per identifier up to the largest id
//!   seen, which suits dense planet-scale runs. Identifiers above
//!   [`BITSET_DENSE_LIMIT`] fall back to a sparse overflow set.
//! - [`ListIdTracker`] keeps a sorted set, which suits small extracts.
//! - [`DynamicIdTracker`] allocates fixed-size bit segments on demand, which
//!   suits clustered identifiers spread over a large range.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use log::warn;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EntityId;

const WORD_SHIFT: u32 = 6;
const WORD_BITS: u64 = 1 << WORD_SHIFT;
const SEGMENT_SHIFT: u32 = WORD_SHIFT + 10;
const SEGMENT_WORDS: usize = 1 << (SEGMENT_SHIFT - WORD_SHIFT);
const SEGMENT_BITS: u64 = 1 << SEGMENT_SHIFT;

/// Largest identifier [`BitSetIdTracker`] stores in its dense bit range.
pub const BITSET_DENSE_LIMIT: EntityId = 0x7FFF_FFFF;

/// A set of non-negative entity identifiers.
pub trait IdTracker: fmt::Debug {
    /// Mark `id` as present.
    fn set(&mut self, id: EntityId);

    /// Whether `id` is present.
    fn get(&self, id: EntityId) -> bool;

    /// Iterate over all present identifiers in ascending order.
    fn ids(&self) -> Box<dyn Iterator<Item = EntityId> + '_>;

    /// Number of present identifiers.
    fn len(&self) -> usize;

    /// Whether no identifier is present.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add every identifier present in `other`.
    fn set_all(&mut self, other: &dyn IdTracker) {
        for id in other.ids() {
            self.set(id);
        }
    }
}

/// Selects the backing used for identifier sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IdTrackerType {
    /// Dense bit-indexed set.
    BitSet,
    /// Sparse sorted set.
    IdList,
    /// Segmented bitsets allocated on demand.
    #[default]
    Dynamic,
}

impl IdTrackerType {
    /// Create an empty identifier set with this backing.
    ///
    /// # Examples
    ///
    /// ```
    /// use osmfence_core::IdTrackerType;
    ///
    /// let mut ids = IdTrackerType::IdList.create();
    /// ids.set(9);
    /// assert!(ids.get(9));
    /// assert!(!ids.get(10));
    /// ```
    #[must_use]
    pub fn create(self) -> Box<dyn IdTracker> {
        match self {
            Self::BitSet => Box::new(BitSetIdTracker::default()),
            Self::IdList => Box::new(ListIdTracker::default()),
            Self::Dynamic => Box::new(DynamicIdTracker::default()),
        }
    }
}

/// Error returned when parsing an unknown [`IdTrackerType`] name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown id tracker type {name:?} (expected BitSet, IdList or Dynamic)")]
pub struct ParseIdTrackerTypeError {
    /// The rejected name.
    pub name: String,
}

impl FromStr for IdTrackerType {
    type Err = ParseIdTrackerTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "bitset" => Ok(Self::BitSet),
            "idlist" => Ok(Self::IdList),
            "dynamic" => Ok(Self::Dynamic),
            _ => Err(ParseIdTrackerTypeError {
                name: value.to_owned(),
            }),
        }
    }
}

impl fmt::Display for IdTrackerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BitSet => "BitSet",
            Self::IdList => "IdList",
            Self::Dynamic => "Dynamic",
        };
        f.write_str(label)
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "word indices are bounded by the identifier range addressable on 64-bit targets"
)]
const fn word_position(bit: u64) -> (usize, u64) {
    ((bit >> WORD_SHIFT) as usize, 1_u64 << (bit & (WORD_BITS - 1)))
}

fn bits_of(words: &[u64], base: EntityId) -> impl Iterator<Item = EntityId> + '_ {
    words
        .iter()
        .zip(0_u64..)
        .filter(|(word, _)| **word != 0)
        .flat_map(move |(&word, index)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1_u64 << bit) != 0)
                .map(move |bit| base + index * WORD_BITS + bit)
        })
}

/// Dense identifier set with one bit per id.
///
/// Identifiers above [`BITSET_DENSE_LIMIT`] are kept in an ordered overflow
/// set so a single outlier cannot force a huge allocation.
#[derive(Debug, Default, Clone)]
pub struct BitSetIdTracker {
    words: Vec<u64>,
    overflow: BTreeSet<EntityId>,
    count: usize,
}

impl IdTracker for BitSetIdTracker {
    fn set(&mut self, id: EntityId) {
        if id > BITSET_DENSE_LIMIT {
            if self.overflow.is_empty() {
                warn!(
                    "identifier {id} exceeds the dense bitset range (max {BITSET_DENSE_LIMIT}); \
                     tracking larger identifiers sparsely"
                );
            }
            if self.overflow.insert(id) {
                self.count += 1;
            }
            return;
        }
        let (index, mask) = word_position(id);
        if index >= self.words.len() {
            self.words.resize(index + 1, 0);
        }
        if let Some(word) = self.words.get_mut(index)
            && *word & mask == 0
        {
            *word |= mask;
            self.count += 1;
        }
    }

    fn get(&self, id: EntityId) -> bool {
        if id > BITSET_DENSE_LIMIT {
            return self.overflow.contains(&id);
        }
        let (index, mask) = word_position(id);
        self.words.get(index).is_some_and(|word| word & mask != 0)
    }

    fn ids(&self) -> Box<dyn Iterator<Item = EntityId> + '_> {
        Box::new(bits_of(&self.words, 0).chain(self.overflow.iter().copied()))
    }

    fn len(&self) -> usize {
        self.count
    }
}

/// Sparse identifier set backed by an ordered set.
#[derive(Debug, Default, Clone)]
pub struct ListIdTracker {
    ids: BTreeSet<EntityId>,
}

impl IdTracker for ListIdTracker {
    fn set(&mut self, id: EntityId) {
        self.ids.insert(id);
    }

    fn get(&self, id: EntityId) -> bool {
        self.ids.contains(&id)
    }

    fn ids(&self) -> Box<dyn Iterator<Item = EntityId> + '_> {
        Box::new(self.ids.iter().copied())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Identifier set built from fixed-size bit segments allocated on demand.
#[derive(Debug, Default, Clone)]
pub struct DynamicIdTracker {
    segments: BTreeMap<u64, Box<[u64; SEGMENT_WORDS]>>,
    count: usize,
}

impl DynamicIdTracker {
    const fn locate(id: EntityId) -> (u64, u64) {
        (id >> SEGMENT_SHIFT, id & (SEGMENT_BITS - 1))
    }
}

impl IdTracker for DynamicIdTracker {
    fn set(&mut self, id: EntityId) {
        let (segment, offset) = Self::locate(id);
        let (index, mask) = word_position(offset);
        let words = self
            .segments
            .entry(segment)
            .or_insert_with(|| Box::new([0; SEGMENT_WORDS]));
        if let Some(word) = words.get_mut(index)
            && *word & mask == 0
        {
            *word |= mask;
            self.count += 1;
        }
    }

    fn get(&self, id: EntityId) -> bool {
        let (segment, offset) = Self::locate(id);
        let (index, mask) = word_position(offset);
        self.segments
            .get(&segment)
            .and_then(|words| words.get(index))
            .is_some_and(|word| word & mask != 0)
    }

    fn ids(&self) -> Box<dyn Iterator<Item = EntityId> + '_> {
        Box::new(
            self.segments
                .iter()
                .flat_map(|(segment, words)| bits_of(words.as_slice(), segment * SEGMENT_BITS)),
        )
    }

    fn len(&self) -> usize {
        self.count
    }
}
