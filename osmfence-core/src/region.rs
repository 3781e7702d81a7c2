//! Named regions driving the splitter.

use std::fmt;

use thiserror::Error;

use crate::BoundingBox;

/// Reasons a region storage key is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionKeyError {
    /// The key is empty.
    #[error("region key is empty")]
    Empty,
    /// The key would escape or alias its directory.
    #[error("region key `{key}` must not be `.` or `..`")]
    Relative {
        /// Offending key.
        key: String,
    },
    /// The key contains a path separator or control character.
    #[error("region key `{key}` contains forbidden character {character:?}")]
    ForbiddenCharacter {
        /// Offending key.
        key: String,
        /// First forbidden character found.
        character: char,
    },
}

/// A named bounding box with a storage key.
///
/// The key names the directory holding the region's replication state and
/// output, so it is restricted to a single path component.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    name: String,
    key: String,
    bound: BoundingBox,
}

impl Region {
    /// Validate the storage key and build a region.
    ///
    /// # Errors
    /// Returns [`RegionKeyError`] when `key` is empty, `.`/`..`, or contains
    /// a path separator or control character.
    ///
    /// # Examples
    ///
    /// ```
    /// use osmfence_core::{BoundingBox, Region};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let bound = BoundingBox::new(5.8, 15.1, 55.1, 47.2)?;
    /// let region = Region::new("Germany", "de", bound)?;
    /// assert_eq!(region.key(), "de");
    /// assert!(Region::new("Escape", "../de", bound).is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        bound: BoundingBox,
    ) -> Result<Self, RegionKeyError> {
        let validated = validate_key(key.into())?;
        Ok(Self {
            name: name.into(),
            key: validated,
            bound,
        })
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage key, a single path component.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Region extent.
    #[must_use]
    pub const fn bound(&self) -> &BoundingBox {
        &self.bound
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.key, self.bound)
    }
}

fn validate_key(key: String) -> Result<String, RegionKeyError> {
    if key.is_empty() {
        return Err(RegionKeyError::Empty);
    }
    if key == "." || key == ".." {
        return Err(RegionKeyError::Relative { key });
    }
    if let Some(character) = key
        .chars()
        .find(|c| matches!(c, '/' | '\\' | ':') || c.is_control())
    {
        return Err(RegionKeyError::ForbiddenCharacter { key, character });
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn bound() -> BoundingBox {
        BoundingBox::new(-1.0, 1.0, 1.0, -1.0).expect("valid box")
    }

    #[rstest]
    #[case("north-america")]
    #[case("region_01")]
    #[case(".hidden")]
    fn accepts_single_component_keys(bound: BoundingBox, #[case] key: &str) {
        let region = Region::new("Region", key, bound).expect("valid key");
        assert_eq!(region.key(), key);
        assert_eq!(region.name(), "Region");
    }

    #[rstest]
    #[case("", RegionKeyError::Empty)]
    #[case("..", RegionKeyError::Relative { key: "..".into() })]
    #[case("a/b", RegionKeyError::ForbiddenCharacter { key: "a/b".into(), character: '/' })]
    #[case("a\\b", RegionKeyError::ForbiddenCharacter { key: "a\\b".into(), character: '\\' })]
    #[case("c:", RegionKeyError::ForbiddenCharacter { key: "c:".into(), character: ':' })]
    fn rejects_unsafe_keys(bound: BoundingBox, #[case] key: &str, #[case] expected: RegionKeyError) {
        assert_eq!(Region::new("Region", key, bound), Err(expected));
    }
}
