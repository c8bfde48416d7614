//! Catalog endpoints listing what can be rendered.

use actix_web::{HttpResponse, get, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::District;
use crate::domain::ports::PaletteOptions;
use crate::inbound::http::state::HttpState;

/// A renderable district.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct DistrictBody {
    /// District code accepted by the map endpoints.
    #[schema(example = "SK0101")]
    pub code: String,
    /// Display name.
    #[schema(example = "Bratislava I")]
    pub name: String,
}

impl From<District> for DistrictBody {
    fn from(district: District) -> Self {
        Self {
            code: district.code,
            name: district.name,
        }
    }
}

/// Palette and class-count options.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaletteOptionsBody {
    /// Named palettes; a comma-separated list of hex colours is also accepted.
    #[schema(example = json!(["viridis", "plasma"]))]
    pub palettes: Vec<String>,
    #[schema(example = "viridis")]
    pub default_palette: String,
    #[schema(example = 1)]
    pub min_class_count: u8,
    #[schema(example = 10)]
    pub max_class_count: u8,
    #[schema(example = 5)]
    pub default_class_count: u8,
}

impl From<PaletteOptions> for PaletteOptionsBody {
    fn from(options: PaletteOptions) -> Self {
        Self {
            palettes: options.palettes,
            default_palette: options.default_palette,
            min_class_count: options.min_class_count,
            max_class_count: options.max_class_count,
            default_class_count: options.default_class_count,
        }
    }
}

/// List renderable districts ordered by code.
#[utoipa::path(
    get,
    path = "/api/v1/districts",
    responses((status = 200, description = "Districts", body = [DistrictBody])),
    tags = ["catalog"],
    operation_id = "listDistricts"
)]
#[get("/districts")]
pub async fn list_districts(state: web::Data<HttpState>) -> HttpResponse {
    let districts: Vec<DistrictBody> = state
        .maps_query
        .districts()
        .into_iter()
        .map(DistrictBody::from)
        .collect();
    HttpResponse::Ok().json(districts)
}

/// Palette names and class-count limits.
#[utoipa::path(
    get,
    path = "/api/v1/palettes",
    responses((status = 200, description = "Palette options", body = PaletteOptionsBody)),
    tags = ["catalog"],
    operation_id = "listPalettes"
)]
#[get("/palettes")]
pub async fn list_palettes(state: web::Data<HttpState>) -> HttpResponse {
    HttpResponse::Ok().json(PaletteOptionsBody::from(state.maps_query.palette_options()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{MockMapGenerationCommand, MockMapGenerationQuery};
    use actix_web::{App, test as actix_test};
    use rstest::rstest;
    use serde_json::Value;
    use std::sync::Arc;

    fn state() -> web::Data<HttpState> {
        let mut query = MockMapGenerationQuery::new();
        query.expect_districts().returning(|| {
            vec![
                District {
                    code: "SK0101".into(),
                    name: "Bratislava I".into(),
                },
                District {
                    code: "SK0102".into(),
                    name: "Bratislava II".into(),
                },
            ]
        });
        query.expect_palette_options().returning(|| PaletteOptions {
            palettes: vec!["plasma".into(), "viridis".into()],
            default_palette: "viridis".into(),
            min_class_count: 1,
            max_class_count: 10,
            default_class_count: 5,
        });
        web::Data::new(HttpState::new(
            Arc::new(MockMapGenerationCommand::new()),
            Arc::new(query),
        ))
    }

    #[rstest]
    #[actix_web::test]
    async fn lists_districts() {
        let app = actix_test::init_service(
            App::new()
                .app_data(state())
                .service(web::scope("/api/v1").service(list_districts)),
        )
        .await;

        let request = actix_test::TestRequest::get()
            .uri("/api/v1/districts")
            .to_request();
        let body: Vec<DistrictBody> = actix_test::call_and_read_body_json(&app, request).await;

        let codes: Vec<_> = body.iter().map(|district| district.code.as_str()).collect();
        assert_eq!(codes, ["SK0101", "SK0102"]);
    }

    #[rstest]
    #[actix_web::test]
    async fn lists_palette_options_in_camel_case() {
        let app = actix_test::init_service(
            App::new()
                .app_data(state())
                .service(web::scope("/api/v1").service(list_palettes)),
        )
        .await;

        let request = actix_test::TestRequest::get()
            .uri("/api/v1/palettes")
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, request).await;

        assert_eq!(body["defaultPalette"], "viridis");
        assert_eq!(body["maxClassCount"], 10);
        assert_eq!(body["palettes"][1], "viridis");
    }
}
