//! Configured universe of valid map parameters.
//!
//! The catalog lists the districts that can be rendered, the named palettes
//! the renderer understands and the accepted class-count range. It is loaded
//! once at startup and shared read-only by the fingerprint builder and the
//! catalog endpoints.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of classification classes when a request omits it.
pub const DEFAULT_CLASS_COUNT: u8 = 5;
/// Default palette when a request omits it.
pub const DEFAULT_PALETTE: &str = "viridis";

/// A renderable administrative district.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct District {
    /// Stable district identifier, for example `SK0101`.
    pub code: String,
    /// Human-readable district name.
    pub name: String,
}

/// Inclusive bounds for the classification class count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassCountBounds {
    min: u8,
    max: u8,
}

impl ClassCountBounds {
    /// Build bounds, rejecting empty or zero-based ranges.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidBounds`] when `min` is zero or exceeds `max`.
    pub fn new(min: u8, max: u8) -> Result<Self, CatalogError> {
        if min == 0 || min > max {
            return Err(CatalogError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    /// Smallest accepted class count.
    #[must_use]
    pub const fn min(self) -> u8 {
        self.min
    }

    /// Largest accepted class count.
    #[must_use]
    pub const fn max(self) -> u8 {
        self.max
    }

    /// Whether `value` lies inside the bounds.
    #[must_use]
    pub fn contains(self, value: i64) -> bool {
        (i64::from(self.min)..=i64::from(self.max)).contains(&value)
    }
}

impl Default for ClassCountBounds {
    fn default() -> Self {
        Self { min: 1, max: 10 }
    }
}

/// Errors raised while assembling a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The catalog lists no districts.
    #[error("catalog must list at least one district")]
    NoDistricts,
    /// The catalog lists no named palettes.
    #[error("catalog must list at least one palette")]
    NoPalettes,
    /// A district code was blank.
    #[error("district codes must not be blank")]
    BlankDistrictCode,
    /// A district code appeared twice after normalisation.
    #[error("district {code} is listed more than once")]
    DuplicateDistrict {
        /// Normalised duplicate code.
        code: String,
    },
    /// A palette name was blank or contained whitespace.
    #[error("palette name {name:?} is not a single word")]
    InvalidPaletteName {
        /// Offending name.
        name: String,
    },
    /// The class-count range was empty.
    #[error("class count bounds {min}..={max} are invalid")]
    InvalidBounds {
        /// Lower bound.
        min: u8,
        /// Upper bound.
        max: u8,
    },
}

/// Serialised catalog document, as stored in the catalog JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogDocument {
    /// Renderable districts.
    pub districts: Vec<District>,
    /// Named palettes accepted by the renderer.
    pub palettes: Vec<String>,
}

/// Normalise a district code for comparison and hashing.
pub(crate) fn normalise_district_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Normalise a palette name for comparison and hashing.
pub(crate) fn normalise_palette_name(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Read-only set of valid districts, palettes and class-count bounds.
///
/// # Examples
/// ```
/// use choropleth::domain::{ClassCountBounds, District, MapCatalog};
///
/// let catalog = MapCatalog::new(
///     [District { code: "sk0101".into(), name: "Bratislava I".into() }],
///     ["Viridis".to_owned()],
///     ClassCountBounds::default(),
/// )
/// .expect("catalog is valid");
/// assert!(catalog.district_name("SK0101").is_some());
/// assert!(catalog.has_palette("viridis"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapCatalog {
    districts: BTreeMap<String, String>,
    palettes: BTreeSet<String>,
    bounds: ClassCountBounds,
}

impl MapCatalog {
    /// Assemble a catalog, normalising codes to upper case and palette names
    /// to lower case.
    ///
    /// # Errors
    /// Returns [`CatalogError`] when a list is empty or an entry is invalid.
    pub fn new(
        districts: impl IntoIterator<Item = District>,
        palettes: impl IntoIterator<Item = String>,
        bounds: ClassCountBounds,
    ) -> Result<Self, CatalogError> {
        let mut district_map = BTreeMap::new();
        for district in districts {
            let code = normalise_district_code(&district.code);
            if code.is_empty() {
                return Err(CatalogError::BlankDistrictCode);
            }
            let name = district.name.trim().to_owned();
            if district_map.insert(code.clone(), name).is_some() {
                return Err(CatalogError::DuplicateDistrict { code });
            }
        }
        if district_map.is_empty() {
            return Err(CatalogError::NoDistricts);
        }

        let mut palette_set = BTreeSet::new();
        for palette in palettes {
            let name = normalise_palette_name(&palette);
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(CatalogError::InvalidPaletteName { name: palette });
            }
            palette_set.insert(name);
        }
        if palette_set.is_empty() {
            return Err(CatalogError::NoPalettes);
        }

        Ok(Self {
            districts: district_map,
            palettes: palette_set,
            bounds,
        })
    }

    /// Assemble a catalog from a deserialised document.
    ///
    /// # Errors
    /// Propagates [`CatalogError`] from [`MapCatalog::new`].
    pub fn from_document(
        document: CatalogDocument,
        bounds: ClassCountBounds,
    ) -> Result<Self, CatalogError> {
        Self::new(document.districts, document.palettes, bounds)
    }

    /// Name of the district with the given (un-normalised) code.
    #[must_use]
    pub fn district_name(&self, code: &str) -> Option<&str> {
        self.districts
            .get(&normalise_district_code(code))
            .map(String::as_str)
    }

    /// Whether `name` is a configured palette, ignoring case.
    #[must_use]
    pub fn has_palette(&self, name: &str) -> bool {
        self.palettes.contains(&normalise_palette_name(name))
    }

    /// Districts ordered by code.
    pub fn districts(&self) -> impl Iterator<Item = District> + '_ {
        self.districts.iter().map(|(code, name)| District {
            code: code.clone(),
            name: name.clone(),
        })
    }

    /// Palette names in lexical order.
    pub fn palettes(&self) -> impl Iterator<Item = &str> {
        self.palettes.iter().map(String::as_str)
    }

    /// Accepted class-count range.
    #[must_use]
    pub const fn bounds(&self) -> ClassCountBounds {
        self.bounds
    }

    /// Class count used when a request omits one, clamped into the bounds.
    #[must_use]
    pub fn default_class_count(&self) -> u8 {
        DEFAULT_CLASS_COUNT.clamp(self.bounds.min, self.bounds.max)
    }

    /// Palette used when a request omits one.
    ///
    /// Falls back to the first configured palette when `viridis` is absent.
    #[must_use]
    pub fn default_palette(&self) -> &str {
        if self.palettes.contains(DEFAULT_PALETTE) {
            return DEFAULT_PALETTE;
        }
        self.palettes.iter().next().map_or(DEFAULT_PALETTE, String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn district(code: &str) -> District {
        District {
            code: code.to_owned(),
            name: format!("District {code}"),
        }
    }

    #[rstest]
    fn normalises_codes_and_palettes() {
        let catalog = MapCatalog::new(
            [district(" d1 ")],
            [" Plasma ".to_owned()],
            ClassCountBounds::default(),
        )
        .expect("valid catalog");

        assert_eq!(catalog.district_name("D1"), Some("District  d1"));
        assert!(catalog.has_palette("PLASMA"));
        assert_eq!(catalog.default_palette(), "plasma");
    }

    #[rstest]
    fn rejects_duplicate_codes_after_normalisation() {
        let result = MapCatalog::new(
            [district("d1"), district("D1")],
            ["viridis".to_owned()],
            ClassCountBounds::default(),
        );
        assert_eq!(
            result,
            Err(CatalogError::DuplicateDistrict { code: "D1".to_owned() })
        );
    }

    #[rstest]
    #[case::no_districts(Vec::new(), vec!["viridis".to_owned()], CatalogError::NoDistricts)]
    #[case::no_palettes(vec![district("D1")], Vec::new(), CatalogError::NoPalettes)]
    #[case::blank_code(vec![district("  ")], vec!["viridis".to_owned()], CatalogError::BlankDistrictCode)]
    fn rejects_incomplete_catalogs(
        #[case] districts: Vec<District>,
        #[case] palettes: Vec<String>,
        #[case] expected: CatalogError,
    ) {
        let result = MapCatalog::new(districts, palettes, ClassCountBounds::default());
        assert_eq!(result, Err(expected));
    }

    #[rstest]
    #[case(0, 10)]
    #[case(6, 5)]
    fn bounds_reject_invalid_ranges(#[case] min: u8, #[case] max: u8) {
        assert_eq!(
            ClassCountBounds::new(min, max),
            Err(CatalogError::InvalidBounds { min, max })
        );
    }

    #[rstest]
    fn default_class_count_is_clamped() {
        let bounds = ClassCountBounds::new(1, 3).expect("valid bounds");
        let catalog =
            MapCatalog::new([district("D1")], ["viridis".to_owned()], bounds).expect("catalog");
        assert_eq!(catalog.default_class_count(), 3);
    }

    #[rstest]
    fn document_deserialises_from_json() {
        let document: CatalogDocument = serde_json::from_str(
            r#"{"districts":[{"code":"SK0101","name":"Bratislava I"}],"palettes":["viridis"]}"#,
        )
        .expect("document parses");
        let catalog = MapCatalog::from_document(document, ClassCountBounds::default())
            .expect("catalog builds");
        assert_eq!(catalog.districts().count(), 1);
    }
}
