//! Renderer that shells out to an external map-making program.
//!
//! The program is invoked as
//!
//! ```text
//! <command...> --district <CODE> --classes <N> --palette <PALETTE> --output <DIR>
//! ```
//!
//! and must leave `map.png` and `table.json` in `<DIR>`, a scratch directory
//! removed after the call. `table.json` uses the [`DataTable`] shape
//! (`{"columns": [{"key", "label"}], "rows": [[...]]}`).

use std::ffi::OsString;
use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

use crate::domain::ports::{MapRenderer, RenderError, RenderedMap};
use crate::domain::{DataTable, GenerationRequest};

const IMAGE_FILE: &str = "map.png";
const TABLE_FILE: &str = "table.json";
const MAX_STDERR_CHARS: usize = 2_000;

/// Renderer backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandMapRenderer {
    command: Vec<OsString>,
}

impl CommandMapRenderer {
    /// Build a renderer from a program and leading arguments.
    pub fn new(
        program: impl Into<OsString>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        let mut command = vec![program.into()];
        command.extend(args.into_iter().map(Into::into));
        Self { command }
    }

    /// Build a renderer from a whitespace-separated command line such as
    /// `python3 render_map.py`. Returns `None` for a blank line.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let program = words.next()?;
        Some(Self::new(program, words))
    }

    fn command_label(&self) -> String {
        self.command
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl MapRenderer for CommandMapRenderer {
    async fn render(&self, request: &GenerationRequest) -> Result<RenderedMap, RenderError> {
        let Some(program) = self.command.first() else {
            return Err(RenderError::failed("renderer command is empty"));
        };
        let scratch = tempfile::Builder::new()
            .prefix("choropleth-render-")
            .tempdir()
            .map_err(|err| RenderError::failed(format!("create scratch directory: {err}")))?;

        let mut command = Command::new(program);
        command
            .args(self.command.iter().skip(1))
            .arg("--district")
            .arg(request.district().as_str())
            .arg("--classes")
            .arg(request.class_count().to_string())
            .arg("--palette")
            .arg(request.palette().to_string())
            .arg("--output")
            .arg(scratch.path())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        debug!(command = %self.command_label(), district = %request.district(), "invoking renderer");

        let output = command.output().await.map_err(|err| {
            RenderError::failed(format!("could not start '{}': {err}", self.command_label()))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
            return Err(RenderError::failed(format!(
                "'{}' exited with {}: {stderr}",
                self.command_label(),
                output.status
            )));
        }

        read_outputs(scratch).await
    }
}

async fn read_outputs(scratch: TempDir) -> Result<RenderedMap, RenderError> {
    let read = tokio::task::spawn_blocking(move || -> io::Result<(Vec<u8>, Vec<u8>)> {
        let dir = Dir::open_ambient_dir(scratch.path(), ambient_authority())?;
        Ok((dir.read(IMAGE_FILE)?, dir.read(TABLE_FILE)?))
    })
    .await
    .map_err(|err| RenderError::failed(format!("reading renderer output failed: {err}")))?;
    let (image, table) = read.map_err(|err| {
        RenderError::invalid_output(format!("expected {IMAGE_FILE} and {TABLE_FILE}: {err}"))
    })?;
    let table: DataTable = serde_json::from_slice(&table)
        .map_err(|err| RenderError::invalid_output(format!("{TABLE_FILE}: {err}")))?;
    Ok(RenderedMap { image, table })
}
