//! Multi-robot simulation bringup.
//!
//! Builds one launch description that starts a shared simulator world and, for
//! every robot in a roster, an isolated group holding that robot's
//! visualization and navigation stack. The description is resolved against
//! command-line overrides into a [`Plan`] and executed by a [`Launcher`].

/// Ament environment discovery: package prefixes and share directories.
pub mod ament;
/// Top-level description assembly and packaged default paths.
pub mod assemble;
/// Launch argument declarations and resolved configuration values.
pub mod args;
/// Per-robot instance groups.
pub mod compose;
/// Launch description model: actions, substitutions, conditions.
pub mod description;
pub mod error;
/// Process launching, lifecycle management, and output streaming.
pub mod process;
/// Evaluation of a description into a concrete plan.
pub mod resolve;
/// Robot identities and spawn poses.
pub mod roster;
/// Plan execution and operator interrupts.
pub mod runner;
/// World artifact, simulator process, and resource search path.
pub mod world;

pub use ament::Env;
pub use args::{ArgumentRegistry, ConfigHandle, LaunchArgument, LaunchConfigurations};
pub use assemble::{BringupLayout, Declared, assemble, declare_arguments};
pub use compose::{InstanceComposer, SharedConfig};
pub use description::{Action, ActionKind, Condition, Expr, LaunchDescription, Output};
pub use error::{LaunchError, Result};
pub use process::Launcher;
pub use resolve::{IncludeInvocation, Plan, ProcessInvocation, Resolver, Step};
pub use roster::{RobotConfig, Roster};
pub use runner::{Outcome, Shutdown};
pub use world::WorldArtifact;
