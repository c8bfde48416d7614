//! Map generation request parameters and their validation.
//!
//! [`MapParameters`] is the raw, client-supplied shape. Validating it against
//! a [`MapCatalog`] yields a [`GenerationRequest`] whose fields are already in
//! canonical form: district codes upper case, palette names lower case and
//! custom colour lists expanded to lower-case `#rrggbb`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::catalog::{MapCatalog, normalise_district_code, normalise_palette_name};

const MIN_CUSTOM_COLOURS: usize = 2;
const MAX_CUSTOM_COLOURS: usize = 16;

/// Raw request parameters as received from a client.
///
/// Missing class counts and palettes fall back to the catalog defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapParameters {
    /// District identifier.
    pub district: String,
    /// Requested number of classes.
    #[serde(default)]
    pub class_count: Option<i64>,
    /// Named palette or comma-separated list of hex colours.
    #[serde(default)]
    pub palette: Option<String>,
}

impl MapParameters {
    /// Convenience constructor used by tests and adapters.
    pub fn new(district: impl Into<String>, class_count: i64, palette: impl Into<String>) -> Self {
        Self {
            district: district.into(),
            class_count: Some(class_count),
            palette: Some(palette.into()),
        }
    }
}

/// Reasons a request is rejected before any job is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestValidationError {
    /// The district field was blank.
    #[error("district must not be empty")]
    MissingDistrict,
    /// The district is not in the configured catalog.
    #[error("unknown district: {district}")]
    UnknownDistrict {
        /// Normalised district code.
        district: String,
    },
    /// The class count lies outside the configured bounds.
    #[error("class count {value} is outside the allowed range {min}..={max}")]
    ClassCountOutOfRange {
        /// Requested value.
        value: i64,
        /// Lower bound.
        min: u8,
        /// Upper bound.
        max: u8,
    },
    /// The palette name is not configured.
    #[error("unknown palette: {palette}")]
    UnknownPalette {
        /// Normalised palette name.
        palette: String,
    },
    /// The custom colour specification is malformed.
    #[error("invalid colour specification {spec:?}: {reason}")]
    InvalidColourSpec {
        /// Raw specification.
        spec: String,
        /// Human-readable cause.
        reason: String,
    },
}

impl RequestValidationError {
    /// Name of the offending request field.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::MissingDistrict | Self::UnknownDistrict { .. } => "district",
            Self::ClassCountOutOfRange { .. } => "classCount",
            Self::UnknownPalette { .. } | Self::InvalidColourSpec { .. } => "palette",
        }
    }
}

/// Canonical district identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DistrictCode(String);

impl DistrictCode {
    /// Borrow the canonical code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for DistrictCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical palette choice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Palette {
    /// A configured named palette, lower case.
    Named(String),
    /// Custom colour ramp, each colour lower-case `#rrggbb`.
    Custom(Vec<String>),
}

impl Palette {
    /// Parse a palette, accepting configured names or custom colour lists.
    ///
    /// A value is treated as a custom specification when it starts with `#`
    /// or contains a comma.
    ///
    /// # Errors
    /// Returns [`RequestValidationError::UnknownPalette`] or
    /// [`RequestValidationError::InvalidColourSpec`].
    pub fn parse(raw: &str, catalog: &MapCatalog) -> Result<Self, RequestValidationError> {
        let trimmed = raw.trim();
        if trimmed.starts_with('#') || trimmed.contains(',') {
            return parse_custom(trimmed).map(Self::Custom);
        }
        let name = normalise_palette_name(trimmed);
        if catalog.has_palette(&name) {
            Ok(Self::Named(name))
        } else {
            Err(RequestValidationError::UnknownPalette { palette: name })
        }
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Custom(colours) => f.write_str(&colours.join(",")),
        }
    }
}

fn parse_custom(spec: &str) -> Result<Vec<String>, RequestValidationError> {
    let invalid = |reason: String| RequestValidationError::InvalidColourSpec {
        spec: spec.to_owned(),
        reason,
    };
    let colours = spec
        .split(',')
        .map(str::trim)
        .map(|part| {
            parse_hex_colour(part).ok_or_else(|| invalid(format!("{part:?} is not a hex colour")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if !(MIN_CUSTOM_COLOURS..=MAX_CUSTOM_COLOURS).contains(&colours.len()) {
        return Err(invalid(format!(
            "expected between {MIN_CUSTOM_COLOURS} and {MAX_CUSTOM_COLOURS} colours, got {}",
            colours.len()
        )));
    }
    Ok(colours)
}

fn parse_hex_colour(raw: &str) -> Option<String> {
    let digits = raw.strip_prefix('#')?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let digits = digits.to_ascii_lowercase();
    match digits.len() {
        6 => Some(format!("#{digits}")),
        3 => {
            let expanded: String = digits.chars().flat_map(|c| [c, c]).collect();
            Some(format!("#{expanded}"))
        }
        _ => None,
    }
}

/// Validated, canonical map generation request. Immutable once created.
///
/// # Examples
/// ```
/// use choropleth::domain::{ClassCountBounds, District, GenerationRequest, MapCatalog, MapParameters};
///
/// let catalog = MapCatalog::new(
///     [District { code: "D1".into(), name: "First".into() }],
///     ["viridis".to_owned()],
///     ClassCountBounds::default(),
/// )
/// .expect("catalog");
/// let request = GenerationRequest::validate(&MapParameters::new(" d1 ", 5, "VIRIDIS"), &catalog)
///     .expect("valid request");
/// assert_eq!(request.district().as_str(), "D1");
/// assert_eq!(request.palette().to_string(), "viridis");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenerationRequest {
    district: DistrictCode,
    class_count: u8,
    palette: Palette,
}

impl GenerationRequest {
    /// Validate raw parameters against the catalog.
    ///
    /// # Errors
    /// Returns [`RequestValidationError`] describing the first invalid field.
    pub fn validate(
        params: &MapParameters,
        catalog: &MapCatalog,
    ) -> Result<Self, RequestValidationError> {
        let code = normalise_district_code(&params.district);
        if code.is_empty() {
            return Err(RequestValidationError::MissingDistrict);
        }
        if catalog.district_name(&code).is_none() {
            return Err(RequestValidationError::UnknownDistrict { district: code });
        }

        let bounds = catalog.bounds();
        let class_count = match params.class_count {
            None => catalog.default_class_count(),
            Some(value) => u8::try_from(value)
                .ok()
                .filter(|_| bounds.contains(value))
                .ok_or(RequestValidationError::ClassCountOutOfRange {
                    value,
                    min: bounds.min(),
                    max: bounds.max(),
                })?,
        };

        let palette = match params.palette.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Palette::parse(raw, catalog)?,
            _ => Palette::Named(catalog.default_palette().to_owned()),
        };

        Ok(Self {
            district: DistrictCode(code),
            class_count,
            palette,
        })
    }

    /// Canonical district code.
    #[must_use]
    pub fn district(&self) -> &DistrictCode {
        &self.district
    }

    /// Number of classification classes.
    #[must_use]
    pub fn class_count(&self) -> u8 {
        self.class_count
    }

    /// Canonical palette.
    #[must_use]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{ClassCountBounds, District};
    use rstest::{fixture, rstest};

    #[fixture]
    fn catalog() -> MapCatalog {
        MapCatalog::new(
            [
                District {
                    code: "D1".into(),
                    name: "First".into(),
                },
                District {
                    code: "D2".into(),
                    name: "Second".into(),
                },
            ],
            ["viridis".to_owned(), "plasma".to_owned()],
            ClassCountBounds::default(),
        )
        .expect("fixture catalog is valid")
    }

    #[rstest]
    fn applies_defaults_for_missing_fields(catalog: MapCatalog) {
        let params = MapParameters {
            district: "d2".into(),
            class_count: None,
            palette: None,
        };
        let request = GenerationRequest::validate(&params, &catalog).expect("valid");
        assert_eq!(request.class_count(), 5);
        assert_eq!(request.palette(), &Palette::Named("viridis".into()));
    }

    #[rstest]
    #[case::zero(0)]
    #[case::negative(-3)]
    #[case::above_max(11)]
    #[case::beyond_u8(300)]
    fn rejects_out_of_range_class_counts(catalog: MapCatalog, #[case] value: i64) {
        let result = GenerationRequest::validate(&MapParameters::new("D1", value, "viridis"), &catalog);
        assert_eq!(
            result,
            Err(RequestValidationError::ClassCountOutOfRange {
                value,
                min: 1,
                max: 10
            })
        );
    }

    #[rstest]
    fn rejects_unknown_district(catalog: MapCatalog) {
        let result = GenerationRequest::validate(&MapParameters::new("zz", 5, "viridis"), &catalog);
        assert_eq!(
            result,
            Err(RequestValidationError::UnknownDistrict {
                district: "ZZ".into()
            })
        );
    }

    #[rstest]
    fn rejects_blank_district(catalog: MapCatalog) {
        let result = GenerationRequest::validate(&MapParameters::new("  ", 5, "viridis"), &catalog);
        assert_eq!(result, Err(RequestValidationError::MissingDistrict));
    }

    #[rstest]
    fn rejects_unknown_palette_name(catalog: MapCatalog) {
        let result = GenerationRequest::validate(&MapParameters::new("D1", 5, "Jet"), &catalog);
        assert_eq!(
            result,
            Err(RequestValidationError::UnknownPalette {
                palette: "jet".into()
            })
        );
    }

    #[rstest]
    #[case::short_form("#FFF, #000", vec!["#ffffff", "#000000"])]
    #[case::long_form("#1a2B3c,#ABCDEF,#000000", vec!["#1a2b3c", "#abcdef", "#000000"])]
    fn canonicalises_custom_colour_lists(
        catalog: MapCatalog,
        #[case] spec: &str,
        #[case] expected: Vec<&str>,
    ) {
        let request =
            GenerationRequest::validate(&MapParameters::new("D1", 4, spec), &catalog).expect("valid");
        let expected = expected.into_iter().map(str::to_owned).collect();
        assert_eq!(request.palette(), &Palette::Custom(expected));
    }

    #[rstest]
    #[case::single_colour("#ffffff")]
    #[case::bad_digit("#ff00zz,#000000")]
    #[case::bad_length("#ffff,#000000")]
    #[case::missing_hash("ffffff,#000000")]
    #[case::empty_entry("#ffffff,,#000000")]
    fn rejects_malformed_custom_specs(catalog: MapCatalog, #[case] spec: &str) {
        let result = GenerationRequest::validate(&MapParameters::new("D1", 4, spec), &catalog);
        assert!(
            matches!(result, Err(RequestValidationError::InvalidColourSpec { .. })),
            "{spec} should be rejected, got {result:?}"
        );
    }

    #[rstest]
    fn field_names_match_wire_format() {
        assert_eq!(RequestValidationError::MissingDistrict.field(), "district");
        assert_eq!(
            RequestValidationError::ClassCountOutOfRange {
                value: 0,
                min: 1,
                max: 10
            }
            .field(),
            "classCount"
        );
    }
}
