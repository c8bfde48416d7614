//! Cache-control policies for map and probe responses.
//!
//! Job snapshots change while a worker renders, so they are never stored.
//! Artifacts only change when regenerated or swept; clients may keep a copy
//! but must revalidate it against `Last-Modified`.

use actix_web::http::header::{CACHE_CONTROL, HeaderName};

/// Policy for job snapshots and health probes.
pub const NO_STORE: &str = "no-store";

/// Policy for rendered images and data tables.
pub const ARTIFACT_REVALIDATE: &str = "private, no-cache, must-revalidate";

pub const fn no_store_header() -> (HeaderName, &'static str) {
    (CACHE_CONTROL, NO_STORE)
}

pub const fn artifact_header() -> (HeaderName, &'static str) {
    (CACHE_CONTROL, ARTIFACT_REVALIDATE)
}
