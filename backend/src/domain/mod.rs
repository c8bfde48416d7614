//! Domain primitives, job orchestration and ports.
//!
//! Purpose: validate and fingerprint map requests, track render jobs, drive
//! the render worker pool and answer polling queries. Nothing here knows
//! about HTTP or the filesystem; adapters plug in through [`ports`].
//!
//! Public surface:
//! - `Error`/`ErrorCode`: API error payload and stable identifiers.
//! - `MapParameters` → `GenerationRequest` → `Fingerprint`: request
//!   validation and identity.
//! - `JobRegistry`: synchronised job state, the source of truth for
//!   in-flight work.
//! - `RenderScheduler`: bounded worker pool.
//! - `MapGenerationService`: implementation of the driving ports.

pub mod catalog;
pub mod data_table;
pub mod error;
pub mod fingerprint;
pub mod job;
pub mod job_registry;
pub mod map_generation_service;
pub mod map_request;
pub mod ports;
pub mod render_scheduler;
pub mod trace_id;

pub use self::catalog::{
    CatalogDocument, CatalogError, ClassCountBounds, DEFAULT_CLASS_COUNT, DEFAULT_PALETTE,
    District, MapCatalog,
};
pub use self::data_table::{DataTable, DataTableError, TableColumn};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::fingerprint::{Fingerprint, FingerprintBuilder, FingerprintParseError, KeyedRequest};
pub use self::job::{Job, JobState};
pub use self::job_registry::{
    ClaimedJob, DEFAULT_RECORD_LIMIT, JobRegistry, JobSnapshot, RecordVersion, RegistryError,
    StoreEvidence, StoredArtifact, SubmitOutcome, Submitted,
};
pub use self::map_generation_service::MapGenerationService;
pub use self::map_request::{
    DistrictCode, GenerationRequest, MapParameters, Palette, RequestValidationError,
};
pub use self::render_scheduler::{
    RenderAdapter, RenderScheduler, RenderSchedulerConfig, RenderSchedulerPorts,
};
pub use self::trace_id::{TRACE_ID_HEADER, TraceId};

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use actix_web::HttpResponse;
/// use choropleth::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<HttpResponse> {
///     Err(Error::not_ready("still rendering"))
/// }
/// ```
pub type ApiResult<T> = Result<T, Error>;
