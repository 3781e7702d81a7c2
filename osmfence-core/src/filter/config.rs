//! Area filter configuration and its normalised completeness mode.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::IdTrackerType;
use crate::record_store::RecordStoreKind;

/// Options controlling an [`AreaFilter`](super::AreaFilter).
///
/// The flags interact; [`AreaFilterConfig::completeness`] resolves them into
/// a single [`Completeness`] mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AreaFilterConfig {
    /// Backing used for identifier sets.
    pub id_tracker: IdTrackerType,
    /// Strip way nodes and relation members that are not available when the
    /// entity is emitted.
    pub clip_incomplete_entities: bool,
    /// Include every node of ways with at least one node inside the area.
    pub complete_ways: bool,
    /// Include the members of relations selected by the filter. Implies
    /// `complete_ways`.
    pub complete_relations: bool,
    /// Include relations referencing selected relations. Ignored when a
    /// complete mode is enabled, which cascades already.
    pub cascading_relations: bool,
    /// Where buffered changes are kept.
    pub record_store: RecordStoreKind,
}

impl AreaFilterConfig {
    /// Resolve the flags into a completeness mode.
    ///
    /// # Examples
    ///
    /// ```
    /// use osmfence_core::{AreaFilterConfig, Completeness};
    ///
    /// let config = AreaFilterConfig {
    ///     complete_relations: true,
    ///     cascading_relations: true,
    ///     ..AreaFilterConfig::default()
    /// };
    /// assert_eq!(config.completeness(), Completeness::CompleteRelations);
    /// ```
    #[must_use]
    pub const fn completeness(&self) -> Completeness {
        if self.complete_relations {
            Completeness::CompleteRelations
        } else if self.complete_ways {
            Completeness::CompleteWays
        } else if self.cascading_relations {
            Completeness::CascadingRelations
        } else {
            Completeness::Membership
        }
    }
}

/// How much referential completeness the filter enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Completeness {
    /// Emit entities that match directly; stream everything.
    Membership,
    /// Stream nodes and ways; hold relations back until parents of selected
    /// relations are known.
    CascadingRelations,
    /// Buffer everything; pull in all nodes of selected ways.
    CompleteWays,
    /// Buffer everything; additionally pull in the members of selected
    /// relations.
    CompleteRelations,
}

impl Completeness {
    /// Whether every change is buffered until completion.
    #[must_use]
    pub const fn buffers_all(self) -> bool {
        matches!(self, Self::CompleteWays | Self::CompleteRelations)
    }

    /// Whether relations are buffered until completion.
    #[must_use]
    pub const fn buffers_relations(self) -> bool {
        !matches!(self, Self::Membership)
    }

    /// Whether referenced nodes of selected ways are required.
    #[must_use]
    pub const fn completes_ways(self) -> bool {
        self.buffers_all()
    }

    /// Whether members of selected relations are required.
    #[must_use]
    pub const fn completes_relations(self) -> bool {
        matches!(self, Self::CompleteRelations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(false, false, false, Completeness::Membership)]
    #[case(false, false, true, Completeness::CascadingRelations)]
    #[case(true, false, false, Completeness::CompleteWays)]
    #[case(true, false, true, Completeness::CompleteWays)]
    #[case(false, true, false, Completeness::CompleteRelations)]
    #[case(false, true, true, Completeness::CompleteRelations)]
    #[case(true, true, true, Completeness::CompleteRelations)]
    fn normalises_flags(
        #[case] complete_ways: bool,
        #[case] complete_relations: bool,
        #[case] cascading_relations: bool,
        #[case] expected: Completeness,
    ) {
        let config = AreaFilterConfig {
            complete_ways,
            complete_relations,
            cascading_relations,
            ..AreaFilterConfig::default()
        };
        let mode = config.completeness();
        assert_eq!(mode, expected);
        if complete_relations {
            assert!(mode.completes_ways(), "complete relations implies complete ways");
        }
        if complete_ways || complete_relations {
            assert_ne!(mode, Completeness::CascadingRelations);
        }
    }
}
