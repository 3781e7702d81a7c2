//! Loading the region list from `area-list.json`.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs_utf8::Dir;
use osmfence_core::{BoundingBox, BoundingBoxError, Region, RegionKeyError};
use serde::Deserialize;
use thiserror::Error;

/// File name of the region list inside a working directory.
pub const REGION_LIST_FILE: &str = "area-list.json";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegionEntry {
    name: String,
    folder: String,
    bound: BoundEntry,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BoundEntry {
    #[serde(rename = "top-left")]
    top_left: String,
    #[serde(rename = "bottom-right")]
    bottom_right: String,
}

/// Errors raised while loading the region list.
#[derive(Debug, Error)]
pub enum RegionConfigError {
    /// The file could not be read.
    #[error("failed to read region list {path}: {source}")]
    Read {
        /// Path of the region list.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file is not a valid region list document.
    #[error("malformed region list {path}: {source}")]
    Parse {
        /// Path of the region list.
        path: Utf8PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A corner is not a `lat,lon` pair of numbers.
    #[error("region `{region}`: invalid {corner} coordinate `{value}`")]
    Coordinate {
        /// Display name of the region.
        region: String,
        /// Corner being parsed.
        corner: &'static str,
        /// Raw coordinate text.
        value: String,
    },
    /// The corners do not form a valid bounding box.
    #[error("region `{region}`: {source}")]
    Bound {
        /// Display name of the region.
        region: String,
        /// Validation failure.
        #[source]
        source: BoundingBoxError,
    },
    /// The folder is not a safe storage key.
    #[error("region `{region}`: {source}")]
    Key {
        /// Display name of the region.
        region: String,
        /// Validation failure.
        #[source]
        source: RegionKeyError,
    },
    /// Two regions share a folder.
    #[error("folder `{folder}` is used by more than one region")]
    DuplicateFolder {
        /// The repeated folder.
        folder: String,
    },
}

/// Read and validate the region list of a working directory.
///
/// # Errors
/// Returns [`RegionConfigError`] when the file is missing or malformed, or
/// when any region is invalid.
pub fn load_regions(dir: &Dir) -> Result<Vec<Region>, RegionConfigError> {
    let path = Utf8Path::new(REGION_LIST_FILE);
    let contents = dir
        .read_to_string(path)
        .map_err(|source| RegionConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse_regions(&contents).map_err(|err| match err {
        RegionConfigError::Parse { source, .. } => RegionConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Parse a region list document.
///
/// Corners are written `"lat,lon"`; a single space may replace the comma.
///
/// # Errors
/// Returns [`RegionConfigError`] for malformed JSON, coordinates, bounds or
/// folders.
///
/// # Examples
///
/// ```
/// use osmfence_data::parse_regions;
///
/// let regions = parse_regions(r#"[
///     {"name": "Benelux", "folder": "benelux",
///      "bound": {"top-left": "53.6,2.5", "bottom-right": "49.4 7.3"}}
/// ]"#)?;
/// assert_eq!(regions[0].bound().left(), 2.5);
/// assert_eq!(regions[0].bound().bottom(), 49.4);
/// # Ok::<(), osmfence_data::RegionConfigError>(())
/// ```
pub fn parse_regions(contents: &str) -> Result<Vec<Region>, RegionConfigError> {
    let entries: Vec<RegionEntry> =
        serde_json::from_str(contents).map_err(|source| RegionConfigError::Parse {
            path: Utf8PathBuf::from(REGION_LIST_FILE),
            source,
        })?;
    let mut regions: Vec<Region> = Vec::with_capacity(entries.len());
    for entry in entries {
        let region = entry.into_region()?;
        if regions.iter().any(|existing| existing.key() == region.key()) {
            return Err(RegionConfigError::DuplicateFolder {
                folder: region.key().to_owned(),
            });
        }
        regions.push(region);
    }
    Ok(regions)
}

impl RegionEntry {
    fn into_region(self) -> Result<Region, RegionConfigError> {
        let (top, left) = self.corner("top-left", &self.bound.top_left)?;
        let (bottom, right) = self.corner("bottom-right", &self.bound.bottom_right)?;
        let bound = BoundingBox::new(left, right, top, bottom).map_err(|source| {
            RegionConfigError::Bound {
                region: self.name.clone(),
                source,
            }
        })?;
        let Self { name, folder, .. } = self;
        Region::new(name.clone(), folder, bound)
            .map_err(|source| RegionConfigError::Key { region: name, source })
    }

    fn corner(&self, corner: &'static str, value: &str) -> Result<(f64, f64), RegionConfigError> {
        let invalid = || RegionConfigError::Coordinate {
            region: self.name.clone(),
            corner,
            value: value.to_owned(),
        };
        let mut parts = value
            .trim()
            .split([',', ' '])
            .filter(|part| !part.is_empty())
            .map(str::parse::<f64>);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(Ok(lat)), Some(Ok(lon)), None) => Ok((lat, lon)),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn document(top_left: &str, bottom_right: &str, folder: &str) -> String {
        format!(
            r#"[{{"name": "Test", "folder": "{folder}",
                 "bound": {{"top-left": "{top_left}", "bottom-right": "{bottom_right}"}}}}]"#
        )
    }

    #[rstest]
    #[case("10,-20", "-10,20")]
    #[case("10 -20", "-10 20")]
    #[case(" 10, -20 ", "-10,20")]
    fn parses_corner_separators(#[case] top_left: &str, #[case] bottom_right: &str) {
        let regions = parse_regions(&document(top_left, bottom_right, "test")).expect("regions");
        let bound = regions.first().expect("one region").bound();
        assert_eq!(
            (bound.left(), bound.right(), bound.top(), bound.bottom()),
            (-20.0, 20.0, 10.0, -10.0)
        );
    }

    #[rstest]
    fn accepts_antimeridian_boxes() {
        let regions = parse_regions(&document("10,170", "-10,-170", "pacific")).expect("regions");
        assert!(regions.first().expect("one region").bound().crosses_antimeridian());
    }

    #[rstest]
    #[case(document("10", "-10,20", "test"))]
    #[case(document("north,-20", "-10,20", "test"))]
    #[case(document("10,-20,3", "-10,20", "test"))]
    fn rejects_bad_coordinates(#[case] contents: String) {
        let err = parse_regions(&contents).expect_err("invalid coordinate");
        assert!(matches!(
            err,
            RegionConfigError::Coordinate { corner: "top-left", .. }
        ));
    }

    #[rstest]
    fn rejects_inverted_latitudes() {
        let err = parse_regions(&document("-10,-20", "10,20", "test")).expect_err("inverted");
        assert!(matches!(err, RegionConfigError::Bound { .. }));
    }

    #[rstest]
    #[case("../escape")]
    #[case("")]
    fn rejects_unsafe_folders(#[case] folder: &str) {
        let err = parse_regions(&document("10,-20", "-10,20", folder)).expect_err("unsafe");
        assert!(matches!(err, RegionConfigError::Key { .. }));
    }

    #[rstest]
    fn rejects_missing_fields() {
        let err = parse_regions(r#"[{"name": "Test", "folder": "test"}]"#).expect_err("no bound");
        assert!(matches!(err, RegionConfigError::Parse { .. }));
    }

    #[rstest]
    fn rejects_duplicate_folders() {
        let contents = r#"[
            {"name": "A", "folder": "same", "bound": {"top-left": "1,0", "bottom-right": "0,1"}},
            {"name": "B", "folder": "same", "bound": {"top-left": "1,0", "bottom-right": "0,1"}}
        ]"#;
        let err = parse_regions(contents).expect_err("duplicate");
        assert!(matches!(err, RegionConfigError::DuplicateFolder { folder } if folder == "same"));
    }
}
