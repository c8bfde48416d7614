//! Prometheus request metrics that can be switched off at runtime.
//!
//! `actix-web-prom` both records request metrics and serves `/metrics`. When
//! registration fails at startup the service keeps running without it, so the
//! app is always wrapped and a disabled layer passes requests straight
//! through with a boxed body.

use std::sync::Arc;

use actix_service::boxed::{self, BoxService};
use actix_service::{Service, ServiceExt as _, Transform};
use actix_web::body::{BoxBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Compat;
use actix_web_prom::PrometheusMetrics;
use futures_util::future::LocalBoxFuture;

type BoxedEndpoint = BoxService<ServiceRequest, ServiceResponse<BoxBody>, actix_web::Error>;

/// Request metrics middleware, present only when Prometheus initialised.
#[derive(Clone)]
pub(crate) struct RequestMetrics(Option<Arc<PrometheusMetrics>>);

impl From<Option<PrometheusMetrics>> for RequestMetrics {
    fn from(metrics: Option<PrometheusMetrics>) -> Self {
        Self(metrics.map(Arc::new))
    }
}

fn passthrough<S, B>(service: S) -> BoxedEndpoint
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: MessageBody + 'static,
{
    boxed::service(service.map(ServiceResponse::map_into_boxed_body))
}

impl<S, B> Transform<S, ServiceRequest> for RequestMetrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = BoxedEndpoint;
    type Future = LocalBoxFuture<'static, Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        let Some(prometheus) = self.0.as_deref() else {
            return Box::pin(async move { Ok(passthrough(service)) });
        };
        let recording = Compat::new(prometheus.clone()).new_transform(service);
        Box::pin(async move { Ok(boxed::service(recording.await?)) })
    }
}
