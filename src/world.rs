//! Simulator world preparation: the generated world file, its compile step, the
//! simulator process and the resource search path.

use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::args::ConfigHandle;
use crate::description::{Action, ActionKind, Expr, Output, ProcessSpec};

/// Search path the simulator uses to resolve `model://` URIs.
pub const RESOURCE_PATH_VAR: &str = "GZ_SIM_RESOURCE_PATH";

/// The generated world description for one run.
///
/// The file is removed exactly once: by [`WorldArtifact::release`] or, on any
/// other exit path, when the artifact is dropped.
#[derive(Debug)]
pub struct WorldArtifact {
    path: PathBuf,
    file: Option<TempPath>,
}

impl WorldArtifact {
    /// Creates a uniquely named `nav2_*.sdf` file in the system temp directory.
    pub fn acquire() -> std::io::Result<Self> {
        Self::acquire_in(&std::env::temp_dir())
    }

    pub fn acquire_in(dir: &Path) -> std::io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("nav2_")
            .suffix(".sdf")
            .tempfile_in(dir)?
            .into_temp_path();
        let path = file.to_path_buf();
        log::debug!("World artifact: {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the file now. Removal failures are logged, never returned.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(file) = self.file.take() {
            match file.close() {
                Ok(()) => log::debug!("Removed world artifact {}", self.path.display()),
                Err(e) => log::warn!(
                    "Failed to remove world artifact {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}

impl Drop for WorldArtifact {
    fn drop(&mut self) {
        self.remove();
    }
}

/// `xacro -o <artifact> headless:=False <world>`, run to completion.
pub fn compile_world_action(world: &ConfigHandle, artifact: &WorldArtifact) -> Action {
    Action::new(ActionKind::ExecuteProcess(ProcessSpec {
        name: "xacro".to_string(),
        cmd: vec![
            Expr::text("xacro"),
            Expr::text("-o"),
            Expr::text(artifact.path().display().to_string()),
            Expr::text("headless:=").then_text("False"),
            Expr::config(world),
        ],
        output: Output::Log,
        wait: true,
    }))
}

/// `gz sim -r -s <artifact>`: real-time, server started against the artifact.
pub fn simulator_action(artifact: &WorldArtifact) -> Action {
    Action::new(ActionKind::ExecuteProcess(ProcessSpec {
        name: "gz_sim".to_string(),
        cmd: vec![
            Expr::text("gz"),
            Expr::text("sim"),
            Expr::text("-r"),
            Expr::text("-s"),
            Expr::text(artifact.path().display().to_string()),
        ],
        output: Output::Screen,
        wait: false,
    }))
}

/// Appends `<sim_dir>/models` and the parent of `<sim_dir>` to the simulator search path.
pub fn resource_path_actions(sim_dir: &Path) -> Vec<Action> {
    let models = sim_dir.join("models");
    let parent = sim_dir.parent().unwrap_or(sim_dir);
    let parent = parent
        .canonicalize()
        .unwrap_or_else(|_| parent.to_path_buf());
    vec![
        Action::append_env(RESOURCE_PATH_VAR, models.display().to_string()),
        Action::append_env(RESOURCE_PATH_VAR, parent.display().to_string()),
    ]
}

/// Joins `value` onto an existing path-like variable value.
pub fn append_path_value(existing: Option<&str>, value: &str) -> String {
    match existing {
        Some(existing) if !existing.is_empty() => format!("{}:{}", existing, value),
        _ => value.to_string(),
    }
}
