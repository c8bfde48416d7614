//! Map submission and polling endpoints.
//!
//! ```text
//! POST /api/v1/maps           {"district":"SK0101","classCount":5,"palette":"viridis"}
//! GET  /api/v1/maps/status?district=SK0101&classCount=5&palette=viridis
//! GET  /api/v1/maps/image?...
//! GET  /api/v1/maps/table?...
//! ```
//!
//! Every handler answers from the registry and the artifact store; none waits
//! for a render. Clients poll `status` until the job is `completed` or `error`.

use actix_web::http::header;
use actix_web::{HttpResponse, get, post, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::{IntoParams, ToSchema};

use crate::domain::ports::MapSubmission;
use crate::domain::{DataTable, Error, Job, JobState, MapParameters, SubmitOutcome, TableColumn};
use crate::inbound::http::cache_control::{artifact_header, no_store_header};
use crate::inbound::http::schemas::ErrorSchema;
use crate::inbound::http::{ApiResult, state::HttpState};

const PNG_CONTENT_TYPE: &str = "image/png";

/// Request payload for submitting a map.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MapRequestBody {
    /// District code, case-insensitive.
    #[schema(example = "SK0101")]
    pub district: String,
    /// Number of classification classes; defaults to 5.
    #[serde(default)]
    #[schema(example = 5)]
    pub class_count: Option<i64>,
    /// Named palette or comma-separated hex colours; defaults to `viridis`.
    #[serde(default)]
    #[schema(example = "viridis")]
    pub palette: Option<String>,
    /// Replace a finished job with a fresh render.
    #[serde(default)]
    pub regenerate: bool,
}

impl From<MapRequestBody> for MapSubmission {
    fn from(body: MapRequestBody) -> Self {
        Self {
            parameters: MapParameters {
                district: body.district,
                class_count: body.class_count,
                palette: body.palette,
            },
            regenerate: body.regenerate,
        }
    }
}

/// Query string identifying a map.
///
/// `classCount` is parsed by hand so a non-numeric value yields the same
/// `invalid_request` payload as an out-of-range one.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct MapQuery {
    /// District code.
    pub district: String,
    /// Number of classification classes.
    pub class_count: Option<String>,
    /// Named palette or comma-separated hex colours.
    pub palette: Option<String>,
}

impl TryFrom<MapQuery> for MapParameters {
    type Error = Error;

    fn try_from(query: MapQuery) -> Result<Self, Self::Error> {
        let class_count = query
            .class_count
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                raw.parse::<i64>().map_err(|_| {
                    Error::invalid_request(format!("class count must be an integer, got {raw:?}"))
                        .with_details(json!({ "field": "classCount" }))
                })
            })
            .transpose()?;
        Ok(Self {
            district: query.district,
            class_count,
            palette: query.palette,
        })
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStateBody {
    /// Queued for a worker.
    Pending,
    /// Being rendered.
    Processing,
    /// Image and table are available.
    Completed,
    /// Rendering failed; resubmit to retry.
    Error,
}

impl From<JobState> for JobStateBody {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Pending => Self::Pending,
            JobState::Processing => Self::Processing,
            JobState::Completed => Self::Completed,
            JobState::Error => Self::Error,
        }
    }
}

/// Job snapshot returned to pollers.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobBody {
    /// Hex SHA-256 of the canonical request.
    #[schema(example = "3b1f0c5e9d2a47f6b8c1e0d9a7f64b3c2e1d0f9a8b7c6d5e4f3a2b1c0d9e8f7a")]
    pub fingerprint: String,
    pub state: JobStateBody,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Failure detail; present only when `state` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl From<Job> for JobBody {
    fn from(job: Job) -> Self {
        Self {
            fingerprint: job.fingerprint.to_hex(),
            state: job.state.into(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            error_detail: job.error_detail,
        }
    }
}

/// How a submission was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcomeBody {
    /// A new render job was queued.
    Created,
    /// The same map is already queued or rendering.
    AlreadyInFlight,
    /// A finished artifact already exists.
    AlreadyCompleted,
}

impl From<SubmitOutcome> for SubmitOutcomeBody {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Created => Self::Created,
            SubmitOutcome::AlreadyInFlight => Self::AlreadyInFlight,
            SubmitOutcome::AlreadyCompleted => Self::AlreadyCompleted,
        }
    }
}

/// Response payload for an accepted submission.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponseBody {
    pub fingerprint: String,
    pub outcome: SubmitOutcomeBody,
    pub job: JobBody,
}

/// Data table column.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct TableColumnBody {
    #[schema(example = "ALRAT")]
    pub key: String,
    #[schema(example = "Agricultural land share (%) (ALRAT)")]
    pub label: String,
}

impl From<&TableColumn> for TableColumnBody {
    fn from(column: &TableColumn) -> Self {
        Self {
            key: column.key.clone(),
            label: column.label.clone(),
        }
    }
}

/// Data behind a rendered map; one cell per column in every row.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct DataTableBody {
    pub columns: Vec<TableColumnBody>,
    #[schema(value_type = Vec<Vec<Object>>)]
    pub rows: Vec<Vec<Value>>,
}

impl From<DataTable> for DataTableBody {
    fn from(table: DataTable) -> Self {
        Self {
            columns: table.columns().iter().map(TableColumnBody::from).collect(),
            rows: table.rows().to_vec(),
        }
    }
}

/// Submit a map for rendering.
///
/// Answers immediately. Repeating a submission while the map is queued or
/// rendering reports `already_in_flight` and schedules nothing.
#[utoipa::path(
    post,
    path = "/api/v1/maps",
    request_body = MapRequestBody,
    responses(
        (status = 202, description = "Submission accepted", body = SubmissionResponseBody),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 503, description = "Artifact store unavailable", body = ErrorSchema)
    ),
    tags = ["maps"],
    operation_id = "submitMap"
)]
#[post("/maps")]
pub async fn submit_map(
    state: web::Data<HttpState>,
    payload: web::Json<MapRequestBody>,
) -> ApiResult<HttpResponse> {
    let receipt = state.maps.submit(payload.into_inner().into()).await?;
    Ok(HttpResponse::Accepted().json(SubmissionResponseBody {
        fingerprint: receipt.fingerprint.to_hex(),
        outcome: receipt.outcome.into(),
        job: receipt.job.into(),
    }))
}

/// Current job for a map.
#[utoipa::path(
    get,
    path = "/api/v1/maps/status",
    params(MapQuery),
    responses(
        (status = 200, description = "Job snapshot", body = JobBody),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 404, description = "Map never requested or expired", body = ErrorSchema)
    ),
    tags = ["maps"],
    operation_id = "getMapStatus"
)]
#[get("/maps/status")]
pub async fn map_status(
    state: web::Data<HttpState>,
    query: web::Query<MapQuery>,
) -> ApiResult<HttpResponse> {
    let job = state.maps_query.status(query.into_inner().try_into()?).await?;
    Ok(HttpResponse::Ok()
        .insert_header(no_store_header())
        .json(JobBody::from(job)))
}

/// Rendered PNG for a completed map.
#[utoipa::path(
    get,
    path = "/api/v1/maps/image",
    params(MapQuery),
    responses(
        (status = 200, description = "Map image", content_type = "image/png", body = Vec<u8>),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 404, description = "Map never requested or expired", body = ErrorSchema),
        (status = 409, description = "Map not rendered yet", body = ErrorSchema)
    ),
    tags = ["maps"],
    operation_id = "getMapImage"
)]
#[get("/maps/image")]
pub async fn map_image(
    state: web::Data<HttpState>,
    query: web::Query<MapQuery>,
) -> ApiResult<HttpResponse> {
    let image = state.maps_query.image(query.into_inner().try_into()?).await?;
    let last_modified = image
        .stored_at
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    Ok(HttpResponse::Ok()
        .content_type(PNG_CONTENT_TYPE)
        .insert_header(artifact_header())
        .insert_header((header::LAST_MODIFIED, last_modified))
        .body(image.bytes))
}

/// Data table for a completed map.
#[utoipa::path(
    get,
    path = "/api/v1/maps/table",
    params(MapQuery),
    responses(
        (status = 200, description = "Data table", body = DataTableBody),
        (status = 400, description = "Invalid request", body = ErrorSchema),
        (status = 404, description = "Map never requested or expired", body = ErrorSchema),
        (status = 409, description = "Map not rendered yet", body = ErrorSchema)
    ),
    tags = ["maps"],
    operation_id = "getMapTable"
)]
#[get("/maps/table")]
pub async fn map_table(
    state: web::Data<HttpState>,
    query: web::Query<MapQuery>,
) -> ApiResult<HttpResponse> {
    let table = state
        .maps_query
        .data_table(query.into_inner().try_into()?)
        .await?;
    Ok(HttpResponse::Ok()
        .insert_header(artifact_header())
        .json(DataTableBody::from(table)))
}

/// JSON extractor settings turning malformed bodies into `invalid_request`.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(16 * 1024)
        .error_handler(|err, _req| {
            Error::invalid_request(format!("malformed request body: {err}")).into()
        })
}

/// Query extractor settings turning missing parameters into `invalid_request`.
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        Error::invalid_request(format!("malformed query string: {err}")).into()
    })
}

#[cfg(test)]
#[path = "maps_tests.rs"]
mod tests;
