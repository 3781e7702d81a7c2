//! Area membership predicates.
//!
//! The filter only needs to ask whether a node lies within the target area;
//! [`Area`] captures that single question so the completeness logic never
//! depends on the shape being tested.

use std::fmt;

use geo::{Coord, Intersects, Rect};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Node;

/// Decides whether a node belongs to an area.
pub trait Area {
    /// Return `true` when `node` lies inside the area, boundary included.
    fn contains(&self, node: &Node) -> bool;
}

/// Axis-aligned rectangle in longitude/latitude degrees.
///
/// A box whose `left` edge is east of its `right` edge spans the
/// antimeridian: it covers `left..=180` and `-180..=right`.
///
/// # Examples
///
/// ```
/// use osmfence_core::{Area, BoundingBox, Node};
///
/// # fn main() -> Result<(), osmfence_core::BoundingBoxError> {
/// let bbox = BoundingBox::new(-20.0, 20.0, 20.0, -20.0)?;
/// assert!(bbox.contains(&Node::new(1, 1, 20.0, 10.0)));
/// assert!(!bbox.contains(&Node::new(2, 1, 30.0, 30.0)));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBox {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
}

/// Errors returned by [`BoundingBox::new`].
#[derive(Debug, Error, PartialEq)]
pub enum BoundingBoxError {
    /// A coordinate was NaN or infinite.
    #[error("{edge} edge must be a finite coordinate, got {value}")]
    NonFinite {
        /// Name of the offending edge.
        edge: &'static str,
        /// Value supplied for the edge.
        value: f64,
    },
    /// A longitude fell outside `-180..=180`.
    #[error("{edge} longitude {value} is outside -180..=180")]
    LongitudeOutOfRange {
        /// Name of the offending edge.
        edge: &'static str,
        /// Value supplied for the edge.
        value: f64,
    },
    /// A latitude fell outside `-90..=90`.
    #[error("{edge} latitude {value} is outside -90..=90")]
    LatitudeOutOfRange {
        /// Name of the offending edge.
        edge: &'static str,
        /// Value supplied for the edge.
        value: f64,
    },
    /// The bottom edge lay north of the top edge.
    #[error("bottom latitude {bottom} lies north of top latitude {top}")]
    Inverted {
        /// Northern edge.
        top: f64,
        /// Southern edge.
        bottom: f64,
    },
}

impl BoundingBox {
    /// Validate and construct a bounding box from its four edges.
    ///
    /// # Errors
    /// Returns [`BoundingBoxError`] when an edge is not finite, lies outside
    /// the WGS84 range, or when `bottom > top`. `left > right` is accepted and
    /// denotes a box crossing the antimeridian.
    pub fn new(left: f64, right: f64, top: f64, bottom: f64) -> Result<Self, BoundingBoxError> {
        for (edge, value) in [
            ("left", left),
            ("right", right),
            ("top", top),
            ("bottom", bottom),
        ] {
            if !value.is_finite() {
                return Err(BoundingBoxError::NonFinite { edge, value });
            }
        }
        for (edge, value) in [("left", left), ("right", right)] {
            if !(-180.0..=180.0).contains(&value) {
                return Err(BoundingBoxError::LongitudeOutOfRange { edge, value });
            }
        }
        for (edge, value) in [("top", top), ("bottom", bottom)] {
            if !(-90.0..=90.0).contains(&value) {
                return Err(BoundingBoxError::LatitudeOutOfRange { edge, value });
            }
        }
        if bottom > top {
            return Err(BoundingBoxError::Inverted { top, bottom });
        }
        Ok(Self {
            left,
            right,
            top,
            bottom,
        })
    }

    /// Western edge.
    #[must_use]
    pub const fn left(&self) -> f64 {
        self.left
    }

    /// Eastern edge.
    #[must_use]
    pub const fn right(&self) -> f64 {
        self.right
    }

    /// Northern edge.
    #[must_use]
    pub const fn top(&self) -> f64 {
        self.top
    }

    /// Southern edge.
    #[must_use]
    pub const fn bottom(&self) -> f64 {
        self.bottom
    }

    /// Whether the box spans the antimeridian.
    #[must_use]
    pub const fn crosses_antimeridian(&self) -> bool {
        self.left > self.right
    }

    /// The box as one or two non-wrapping rectangles.
    ///
    /// Boxes crossing the antimeridian are split at ±180°.
    #[must_use]
    pub fn rects(&self) -> Vec<Rect<f64>> {
        let rect = |west: f64, east: f64| {
            Rect::new(
                Coord {
                    x: west,
                    y: self.bottom,
                },
                Coord {
                    x: east,
                    y: self.top,
                },
            )
        };
        if self.crosses_antimeridian() {
            vec![rect(self.left, 180.0), rect(-180.0, self.right)]
        } else {
            vec![rect(self.left, self.right)]
        }
    }
}

impl Area for BoundingBox {
    fn contains(&self, node: &Node) -> bool {
        // `Intersects` treats boundary points as inside the rectangle.
        self.rects()
            .iter()
            .any(|rect| rect.intersects(&node.location))
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "left={} right={} top={} bottom={}",
            self.left, self.right, self.top, self.bottom
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn simple_box() -> BoundingBox {
        BoundingBox::new(-20.0, 20.0, 20.0, -20.0).expect("valid box")
    }

    #[fixture]
    fn dateline_box() -> BoundingBox {
        BoundingBox::new(170.0, -170.0, 10.0, -10.0).expect("valid box")
    }

    #[rstest]
    #[case(10.0, 10.0, true)] // inside
    #[case(30.0, 30.0, false)] // outside
    #[case(20.0, 10.0, true)] // east edge
    #[case(-20.0, 10.0, true)] // west edge
    #[case(10.0, 20.0, true)] // north edge
    #[case(10.0, -20.0, true)] // south edge
    #[case(20.0, 20.0, true)] // north-east corner
    #[case(20.000_001, 10.0, false)]
    #[case(10.0, -20.000_001, false)]
    fn simple_box_membership(
        simple_box: BoundingBox,
        #[case] lon: f64,
        #[case] lat: f64,
        #[case] expected: bool,
    ) {
        let node = Node::new(1, 1, lon, lat);
        assert_eq!(simple_box.contains(&node), expected, "lon={lon} lat={lat}");
    }

    #[rstest]
    #[case(175.0, 0.0, true)]
    #[case(-175.0, 0.0, true)]
    #[case(180.0, 0.0, true)]
    #[case(-180.0, 0.0, true)]
    #[case(170.0, 10.0, true)]
    #[case(-170.0, -10.0, true)]
    #[case(0.0, 0.0, false)]
    #[case(175.0, 11.0, false)]
    fn dateline_box_membership(
        dateline_box: BoundingBox,
        #[case] lon: f64,
        #[case] lat: f64,
        #[case] expected: bool,
    ) {
        let node = Node::new(1, 1, lon, lat);
        assert_eq!(dateline_box.contains(&node), expected, "lon={lon} lat={lat}");
    }

    #[rstest]
    fn splits_dateline_box_into_two_rects(dateline_box: BoundingBox) {
        assert!(dateline_box.crosses_antimeridian());
        assert_eq!(dateline_box.rects().len(), 2);
    }

    #[rstest]
    #[case(f64::NAN, 1.0, 1.0, 0.0)]
    #[case(0.0, 181.0, 1.0, 0.0)]
    #[case(0.0, 1.0, 91.0, 0.0)]
    fn rejects_invalid_edges(
        #[case] left: f64,
        #[case] right: f64,
        #[case] top: f64,
        #[case] bottom: f64,
    ) {
        assert!(BoundingBox::new(left, right, top, bottom).is_err());
    }

    #[rstest]
    fn rejects_inverted_latitudes() {
        let err = BoundingBox::new(0.0, 1.0, -5.0, 5.0).expect_err("inverted box");
        assert_eq!(
            err,
            BoundingBoxError::Inverted {
                top: -5.0,
                bottom: 5.0
            }
        );
    }
}
