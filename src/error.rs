//! Configuration errors raised while building or resolving a launch description.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Launch argument '{0}' is declared more than once")]
    DuplicateArgument(String),

    #[error("Robot name '{0}' appears more than once in the roster")]
    DuplicateRobot(String),

    #[error("Robot names must not be empty")]
    EmptyRobotName,

    #[error("No parameters file argument is declared for robot '{0}'")]
    MissingParamsFile(String),

    #[error("Launch configuration '{0}' is not set and has no default. Pass it as {0}:=<value>.")]
    UnresolvedConfiguration(String),

    #[error("Launch configuration '{name}' has value '{value}', expected true or false")]
    InvalidBoolean { name: String, value: String },

    #[error("Invalid launch argument '{0}', expected key:=value")]
    InvalidOverride(String),

    #[error("Namespace '{0}' is used by more than one group")]
    NamespaceCollision(String),

    #[error("Launch file not found: {}", .0.display())]
    MissingLaunchFile(PathBuf),

    #[error("Package '{0}' not found. Ensure the package is installed and sourced.")]
    PackageNotFound(String),

    #[error("Invalid roster: {0}")]
    Roster(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LaunchError>;
