//! Deterministic identities for map generation requests.
//!
//! A [`Fingerprint`] is the SHA-256 of a canonical, line-oriented rendering
//! of the validated request:
//!
//! ```text
//! district=<UPPER CASE CODE>
//! classes=<count>
//! palette=<lower-case name | #rrggbb,#rrggbb,...>
//! ```
//!
//! Every field is normalised by [`GenerationRequest::validate`] before it is
//! hashed, so requests that differ only in case or whitespace collapse onto
//! the same fingerprint.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::catalog::MapCatalog;
use super::map_request::{GenerationRequest, MapParameters, RequestValidationError};

const FINGERPRINT_BYTES: usize = 32;

/// Errors raised when parsing a fingerprint from its hex form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintParseError {
    /// The input was not lowercase hexadecimal.
    #[error("fingerprint must be lowercase hexadecimal")]
    NotHex,
    /// The input decoded to the wrong number of bytes.
    #[error("fingerprint must be {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected byte count.
        expected: usize,
        /// Decoded byte count.
        actual: usize,
    },
}

/// Stable identity of a map generation request.
///
/// # Examples
/// ```
/// use choropleth::domain::Fingerprint;
///
/// let hex = "ab".repeat(32);
/// let fingerprint: Fingerprint = hex.parse().expect("valid fingerprint");
/// assert_eq!(fingerprint.to_hex(), hex);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint([u8; FINGERPRINT_BYTES]);

impl Fingerprint {
    /// Compute the fingerprint of a validated request.
    #[must_use]
    pub fn of(request: &GenerationRequest) -> Self {
        let canonical = format!(
            "district={}\nclasses={}\npalette={}\n",
            request.district(),
            request.class_count(),
            request.palette()
        );
        Self(Sha256::digest(canonical.as_bytes()).into())
    }

    /// Encode the fingerprint as 64 lowercase hexadecimal characters.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(FingerprintParseError::NotHex);
        }
        let bytes = hex::decode(s).map_err(|_| FingerprintParseError::NotHex)?;
        let actual = bytes.len();
        let array: [u8; FINGERPRINT_BYTES] =
            bytes
                .try_into()
                .map_err(|_| FingerprintParseError::InvalidLength {
                    expected: FINGERPRINT_BYTES,
                    actual,
                })?;
        Ok(Self(array))
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A validated request paired with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedRequest {
    /// Identity used for deduplication and lookup.
    pub fingerprint: Fingerprint,
    /// Canonical request forwarded to the renderer.
    pub request: GenerationRequest,
}

/// Validates raw parameters against the catalog and fingerprints them.
///
/// Pure: building never touches the registry or the store.
#[derive(Debug, Clone)]
pub struct FingerprintBuilder {
    catalog: Arc<MapCatalog>,
}

impl FingerprintBuilder {
    /// Create a builder bound to `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<MapCatalog>) -> Self {
        Self { catalog }
    }

    /// Catalog the builder validates against.
    #[must_use]
    pub fn catalog(&self) -> &MapCatalog {
        &self.catalog
    }

    /// Validate and fingerprint `params`.
    ///
    /// # Errors
    /// Returns [`RequestValidationError`] for unknown districts or palettes,
    /// out-of-range class counts and malformed colour specifications.
    pub fn build(&self, params: &MapParameters) -> Result<KeyedRequest, RequestValidationError> {
        let request = GenerationRequest::validate(params, &self.catalog)?;
        Ok(KeyedRequest {
            fingerprint: Fingerprint::of(&request),
            request,
        })
    }
}
