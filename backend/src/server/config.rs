//! Listener settings handed to [`super::create_server`].

use std::net::SocketAddr;

#[cfg(feature = "metrics")]
use actix_web_prom::PrometheusMetrics;

use choropleth::config::{MapServiceSettings, SettingsError};

/// Where the HTTP server listens and which optional layers it installs.
pub struct ServerConfig {
    pub(crate) bind_addr: SocketAddr,
    #[cfg(feature = "metrics")]
    pub(crate) prometheus: Option<PrometheusMetrics>,
}

impl ServerConfig {
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            #[cfg(feature = "metrics")]
            prometheus: None,
        }
    }

    /// Listener taken from the service settings.
    ///
    /// # Errors
    /// Returns [`SettingsError::BindAddr`] when the configured address does
    /// not parse.
    pub fn from_settings(settings: &MapServiceSettings) -> Result<Self, SettingsError> {
        settings.bind_addr().map(Self::new)
    }

    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Install Prometheus request metrics and the `/metrics` endpoint.
    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn with_metrics(self, prometheus: Option<PrometheusMetrics>) -> Self {
        Self { prometheus, ..self }
    }

    #[cfg(feature = "metrics")]
    #[must_use]
    pub const fn metrics(&self) -> Option<&PrometheusMetrics> {
        self.prometheus.as_ref()
    }
}
