use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::description::{Action, ActionKind};
use crate::error::{LaunchError, Result};
use crate::roster::RobotConfig;

/// A declared launch argument, overridable from the command line as `name:=value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchArgument {
    /// Argument name as declared.
    pub name: String,
    /// Value used when no override is given.
    pub default_value: String,
    pub description: Option<String>,
}

/// A named binding to a launch configuration, resolved when the description runs.
///
/// Handles are minted by [`ArgumentRegistry`], either for a declared argument or
/// for an undeclared configuration with a built-in fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigHandle {
    name: String,
    fallback: Option<String>,
}

impl ConfigHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }
}

/// Declares the launch arguments of a description.
#[derive(Debug, Default)]
pub struct ArgumentRegistry {
    arguments: Vec<LaunchArgument>,
    params_files: BTreeMap<String, ConfigHandle>,
}

impl ArgumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an argument. Names must be unique within the registry.
    pub fn declare(
        &mut self,
        name: &str,
        default_value: impl Into<String>,
        description: Option<&str>,
    ) -> Result<ConfigHandle> {
        if self.arguments.iter().any(|a| a.name == name) {
            return Err(LaunchError::DuplicateArgument(name.to_string()));
        }
        self.arguments.push(LaunchArgument {
            name: name.to_string(),
            default_value: default_value.into(),
            description: description.map(str::to_string),
        });
        Ok(ConfigHandle {
            name: name.to_string(),
            fallback: None,
        })
    }

    /// Declares `<robot>_params_file` and records it as that robot's parameters handle.
    pub fn declare_robot_params(
        &mut self,
        robot: &RobotConfig,
        default_value: impl Into<String>,
    ) -> Result<ConfigHandle> {
        let description = format!(
            "Full path to the ROS2 parameters file to use for {} launched nodes",
            robot.name
        );
        let handle = self.declare(
            &format!("{}_params_file", robot.name),
            default_value,
            Some(&description),
        )?;
        self.params_files.insert(robot.name.clone(), handle.clone());
        Ok(handle)
    }

    /// Returns the parameters-file handle declared for `robot_name`.
    pub fn params_file_for(&self, robot_name: &str) -> Option<&ConfigHandle> {
        self.params_files.get(robot_name)
    }

    /// A handle to a configuration that is not declared as an argument but
    /// falls back to `fallback` when nobody sets it.
    pub fn configuration(&self, name: &str, fallback: impl Into<String>) -> ConfigHandle {
        ConfigHandle {
            name: name.to_string(),
            fallback: Some(fallback.into()),
        }
    }

    pub fn arguments(&self) -> &[LaunchArgument] {
        &self.arguments
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.arguments.iter().any(|a| a.name == name)
    }

    /// Returns one `DeclareArgument` action per argument, in declaration order.
    pub fn declarations(&self) -> Vec<Action> {
        self.arguments
            .iter()
            .cloned()
            .map(|arg| Action::new(ActionKind::DeclareArgument(arg)))
            .collect()
    }
}

/// Resolved launch configuration values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LaunchConfigurations {
    values: BTreeMap<String, String>,
}

impl LaunchConfigurations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with command-line overrides.
    pub fn with_overrides(overrides: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            values: overrides.into_iter().collect(),
        }
    }

    /// Applies an argument's default unless the value is already set.
    /// Returns `true` when the default was used.
    pub fn declare(&mut self, argument: &LaunchArgument) -> bool {
        if self.values.contains_key(&argument.name) {
            return false;
        }
        self.values
            .insert(argument.name.clone(), argument.default_value.clone());
        true
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Resolves a handle: stored value, then the handle's fallback.
    pub fn get(&self, handle: &ConfigHandle) -> Result<String> {
        self.values
            .get(&handle.name)
            .cloned()
            .or_else(|| handle.fallback.clone())
            .ok_or_else(|| LaunchError::UnresolvedConfiguration(handle.name.clone()))
    }
}

/// Reads a configuration value as a boolean, ignoring case.
pub fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(LaunchError::InvalidBoolean {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Parses a `key:=value` command-line override.
pub fn parse_override(s: &str) -> Result<(String, String)> {
    match s.split_once(":=") {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(LaunchError::InvalidOverride(s.to_string())),
    }
}
