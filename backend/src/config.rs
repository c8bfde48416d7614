//! Service configuration loaded via OrthoConfig.
//!
//! Values come from `CHOROPLETH_*` environment variables, an optional config
//! file and command-line flags. Every field is optional; accessors supply the
//! defaults.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cap_std::{ambient_authority, fs::Dir};
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{
    CatalogDocument, CatalogError, ClassCountBounds, DEFAULT_RECORD_LIMIT, MapCatalog,
    RenderSchedulerConfig,
};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_WORKER_COUNT: usize = 2;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 120;
const DEFAULT_IDLE_POLL_MS: u64 = 500;
const DEFAULT_ARTIFACT_DIR: &str = "var/artifacts";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
/// Resolved against the working directory.
const DEFAULT_CATALOG_PATH: &str = "fixtures/catalog.json";

/// Errors raised while turning settings into runtime components.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The bind address does not parse as `host:port`.
    #[error("invalid bind address {value:?}: {source}")]
    BindAddr {
        /// Configured value.
        value: String,
        /// Parse failure.
        #[source]
        source: std::net::AddrParseError,
    },
    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {path}")]
    NonUtf8Path {
        /// Offending path.
        path: PathBuf,
    },
    /// The catalog file could not be read.
    #[error("failed to read catalog at {path}: {source}")]
    CatalogRead {
        /// Catalog path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The catalog file is not valid JSON for a catalog document.
    #[error("failed to parse catalog at {path}: {source}")]
    CatalogParse {
        /// Catalog path.
        path: PathBuf,
        /// Parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// The catalog or class-count bounds are invalid.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Configuration values for the map service.
#[derive(Debug, Clone, Default, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "CHOROPLETH")]
pub struct MapServiceSettings {
    /// Socket address for the HTTP listener.
    pub bind_addr: Option<String>,
    /// Number of render workers.
    pub worker_count: Option<usize>,
    /// Per-render timeout in seconds.
    pub render_timeout_secs: Option<u64>,
    /// How often idle workers re-check the queue, in milliseconds.
    pub idle_poll_ms: Option<u64>,
    /// Directory holding stored artifacts.
    pub artifact_dir: Option<PathBuf>,
    /// Artifact retention in seconds; unset keeps artifacts forever.
    pub retention_secs: Option<u64>,
    /// Interval between retention sweeps in seconds.
    pub sweep_interval_secs: Option<u64>,
    /// Job records kept before the oldest finished ones are evicted.
    pub max_job_records: Option<usize>,
    /// Catalog JSON listing districts and palettes.
    pub catalog_path: Option<PathBuf>,
    /// External renderer command line; the fixture renderer is used when unset.
    pub renderer_command: Option<String>,
    /// Smallest accepted class count.
    pub min_class_count: Option<u8>,
    /// Largest accepted class count.
    pub max_class_count: Option<u8>,
}

impl MapServiceSettings {
    /// Parsed listener address.
    ///
    /// # Errors
    /// Returns [`SettingsError::BindAddr`] when the value does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        let value = self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        value.parse().map_err(|source| SettingsError::BindAddr {
            value: value.to_owned(),
            source,
        })
    }

    /// Worker pool settings; a zero worker count or render timeout is raised
    /// to one.
    pub fn scheduler(&self) -> RenderSchedulerConfig {
        RenderSchedulerConfig {
            worker_count: self.worker_count.unwrap_or(DEFAULT_WORKER_COUNT).max(1),
            render_timeout: Duration::from_secs(
                self.render_timeout_secs
                    .unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS)
                    .max(1),
            ),
            idle_poll: Duration::from_millis(self.idle_poll_ms.unwrap_or(DEFAULT_IDLE_POLL_MS)),
        }
    }

    /// Artifact directory as a UTF-8 path.
    ///
    /// # Errors
    /// Returns [`SettingsError::NonUtf8Path`] for a non-UTF-8 path.
    pub fn artifact_dir(&self) -> Result<camino::Utf8PathBuf, SettingsError> {
        let path = self
            .artifact_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR));
        camino::Utf8PathBuf::try_from(path)
            .map_err(|err| SettingsError::NonUtf8Path {
                path: err.into_path_buf(),
            })
    }

    /// Retention window; `None` keeps artifacts forever.
    pub fn retention(&self) -> Option<Duration> {
        self.retention_secs.map(Duration::from_secs)
    }

    /// Interval between retention sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(
            self.sweep_interval_secs
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS)
                .max(1),
        )
    }

    /// Job record limit for the registry; zero is raised to one.
    pub fn job_record_limit(&self) -> usize {
        self.max_job_records.unwrap_or(DEFAULT_RECORD_LIMIT).max(1)
    }

    /// Catalog path, falling back to the bundled fixture relative to the
    /// working directory.
    pub fn catalog_path(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_PATH))
    }

    /// Trimmed renderer command line, if configured.
    pub fn renderer_command(&self) -> Option<&str> {
        self.renderer_command
            .as_deref()
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }

    /// Class-count bounds, defaulting to `1..=10`.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidBounds`] for an empty or zero-based range.
    pub fn class_count_bounds(&self) -> Result<ClassCountBounds, CatalogError> {
        let defaults = ClassCountBounds::default();
        ClassCountBounds::new(
            self.min_class_count.unwrap_or(defaults.min()),
            self.max_class_count.unwrap_or(defaults.max()),
        )
    }

    /// Read and validate the catalog.
    ///
    /// # Errors
    /// Returns [`SettingsError`] when the file cannot be read or parsed, or
    /// the catalog is invalid.
    pub fn load_catalog(&self) -> Result<MapCatalog, SettingsError> {
        let path = self.catalog_path();
        let bytes = read_file(&path).map_err(|source| SettingsError::CatalogRead {
            path: path.clone(),
            source,
        })?;
        let document: CatalogDocument = serde_json::from_slice(&bytes)
            .map_err(|source| SettingsError::CatalogParse { path, source })?;
        Ok(MapCatalog::from_document(
            document,
            self.class_count_bounds()?,
        )?)
    }
}

fn read_file(path: &Path) -> io::Result<Vec<u8>> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    dir.read(file_name)
}
