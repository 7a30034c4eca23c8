use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::LaunchError;

/// The ament environment, providing access to installed ROS 2 packages.
///
/// Packages are discovered from the ament resource index of each
/// `AMENT_PREFIX_PATH` prefix. Earlier prefixes take priority.
#[derive(Debug, Clone)]
pub struct Env {
    prefixes: Vec<PathBuf>,
}

impl Env {
    /// Creates an ament environment from `AMENT_PREFIX_PATH`.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var("AMENT_PREFIX_PATH")
            .map_err(|_| anyhow::anyhow!("AMENT_PREFIX_PATH is not set. Source your ROS 2 setup first."))?;
        Ok(Self::from_path(&path))
    }

    /// Creates an ament environment from a colon-separated prefix path string.
    pub fn from_path(path: &str) -> Self {
        let prefixes = path
            .split(':')
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        Self { prefixes }
    }

    pub fn prefixes(&self) -> &[PathBuf] {
        &self.prefixes
    }

    /// Returns the ament prefix path for a package, or `None` if not found.
    pub fn package_prefix(&self, name: &str) -> Option<PathBuf> {
        self.prefixes
            .iter()
            .find(|prefix| index_marker(prefix, name).exists())
            .cloned()
    }

    /// Returns `<prefix>/share/<package>`, the package's installed data directory.
    pub fn package_share_dir(&self, name: &str) -> Result<PathBuf, LaunchError> {
        self.package_prefix(name)
            .map(|prefix| prefix.join("share").join(name))
            .ok_or_else(|| LaunchError::PackageNotFound(name.to_string()))
    }

    /// Resolves the full path to a launch file, checking `launch/` then the share directory.
    pub fn launch_file_path(&self, package: &str, file: &str) -> Option<PathBuf> {
        let share_dir = self.package_share_dir(package).ok()?;

        let launch_path = share_dir.join("launch").join(file);
        if launch_path.exists() {
            return Some(launch_path);
        }

        let share_path = share_dir.join(file);
        if share_path.exists() {
            return Some(share_path);
        }

        None
    }
}

fn index_marker(prefix: &Path, name: &str) -> PathBuf {
    prefix
        .join("share")
        .join("ament_index")
        .join("resource_index")
        .join("packages")
        .join(name)
}
