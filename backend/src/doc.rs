//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers every HTTP endpoint of the inbound layer together
//! with the domain error wrappers ([`ErrorSchema`], [`ErrorCodeSchema`]) so
//! domain types stay free of utoipa derives.
//!
//! The document backs Swagger UI in debug builds and is printed by
//! `cargo run --bin openapi-dump`.

use crate::inbound::http::catalog::{DistrictBody, PaletteOptionsBody};
use crate::inbound::http::maps::{
    DataTableBody, JobBody, JobStateBody, MapRequestBody, SubmissionResponseBody,
    SubmitOutcomeBody, TableColumnBody,
};
use crate::inbound::http::schemas::{ErrorCodeSchema, ErrorSchema};
use utoipa::OpenApi;

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Choropleth map service API",
        description = "Submit district choropleth maps for background rendering, poll their \
                       status and download finished images and data tables."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    paths(
        crate::inbound::http::maps::submit_map,
        crate::inbound::http::maps::map_status,
        crate::inbound::http::maps::map_image,
        crate::inbound::http::maps::map_table,
        crate::inbound::http::catalog::list_districts,
        crate::inbound::http::catalog::list_palettes,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        ErrorSchema,
        ErrorCodeSchema,
        MapRequestBody,
        SubmissionResponseBody,
        SubmitOutcomeBody,
        JobBody,
        JobStateBody,
        DataTableBody,
        TableColumnBody,
        DistrictBody,
        PaletteOptionsBody,
    )),
    tags(
        (name = "maps", description = "Map submission and polling"),
        (name = "catalog", description = "Districts and palettes that can be rendered"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    //! Tests verifying the registered paths and schema fields.

    use super::*;
    use rstest::rstest;
    use utoipa::openapi::RefOr;
    use utoipa::openapi::schema::Schema;

    // utoipa replaces :: with . in schema names
    const ERROR_SCHEMA_NAME: &str = "crate.domain.Error";

    fn object_has_field(schema: &RefOr<Schema>, field: &str) -> bool {
        match schema {
            RefOr::T(Schema::Object(obj)) => obj.properties.contains_key(field),
            _ => false,
        }
    }

    #[rstest]
    fn error_schema_has_required_fields() {
        let doc = ApiDoc::openapi();
        let schemas = &doc.components.as_ref().expect("components").schemas;
        let error_schema = schemas.get(ERROR_SCHEMA_NAME).expect("Error schema");

        assert!(object_has_field(error_schema, "code"));
        assert!(object_has_field(error_schema, "message"));
        assert!(object_has_field(error_schema, "details"));
    }

    #[rstest]
    #[case("/api/v1/maps")]
    #[case("/api/v1/maps/status")]
    #[case("/api/v1/maps/image")]
    #[case("/api/v1/maps/table")]
    #[case("/api/v1/districts")]
    #[case("/api/v1/palettes")]
    #[case("/health/ready")]
    fn documents_endpoint(#[case] path: &str) {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key(path), "missing path {path}");
    }

    #[rstest]
    fn job_body_uses_camel_case() {
        let doc = ApiDoc::openapi();
        let schemas = &doc.components.as_ref().expect("components").schemas;
        let job = schemas.get("JobBody").expect("JobBody schema");

        assert!(object_has_field(job, "errorDetail"));
        assert!(object_has_field(job, "createdAt"));
    }
}
