//! Launch description model.
//!
//! A description is an ordered list of actions whose string values may refer to
//! launch configurations. Nothing here is resolved until the description is
//! handed to [`crate::resolve::Resolver`].

use std::path::PathBuf;

use crate::args::{ConfigHandle, LaunchArgument, LaunchConfigurations, parse_bool};
use crate::error::Result;

/// One piece of a lazily-resolved string.
#[derive(Debug, Clone, PartialEq)]
pub enum Substitution {
    /// Literal text.
    Text(String),
    /// The raw value of a launch configuration.
    Config(ConfigHandle),
    /// A launch configuration read as a boolean and normalized to `true`/`false`.
    ConfigAsBool(ConfigHandle),
}

/// A concatenation of substitutions.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr(pub Vec<Substitution>);

impl Expr {
    pub fn text(s: impl Into<String>) -> Self {
        Expr(vec![Substitution::Text(s.into())])
    }

    pub fn config(handle: &ConfigHandle) -> Self {
        Expr(vec![Substitution::Config(handle.clone())])
    }

    pub fn config_as_bool(handle: &ConfigHandle) -> Self {
        Expr(vec![Substitution::ConfigAsBool(handle.clone())])
    }

    /// Appends literal text.
    pub fn then_text(mut self, s: impl Into<String>) -> Self {
        self.0.push(Substitution::Text(s.into()));
        self
    }

    /// Appends the raw value of a configuration.
    pub fn then_config(mut self, handle: &ConfigHandle) -> Self {
        self.0.push(Substitution::Config(handle.clone()));
        self
    }

    /// Appends a configuration normalized as a boolean.
    pub fn then_bool(mut self, handle: &ConfigHandle) -> Self {
        self.0.push(Substitution::ConfigAsBool(handle.clone()));
        self
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self.0.as_slice() {
            [Substitution::Text(s)] => Some(s.as_str()),
            _ => None,
        }
    }

    /// Resolves every substitution and concatenates the results.
    pub fn resolve(&self, configurations: &LaunchConfigurations) -> Result<String> {
        let mut out = String::new();
        for sub in &self.0 {
            match sub {
                Substitution::Text(s) => out.push_str(s),
                Substitution::Config(handle) => out.push_str(&configurations.get(handle)?),
                Substitution::ConfigAsBool(handle) => {
                    let value = configurations.get(handle)?;
                    out.push_str(if parse_bool(handle.name(), &value)? {
                        "true"
                    } else {
                        "false"
                    });
                }
            }
        }
        Ok(out)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::text(s)
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::text(s)
    }
}

impl From<&ConfigHandle> for Expr {
    fn from(handle: &ConfigHandle) -> Self {
        Expr::config(handle)
    }
}

/// Gates a single action.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Run when the expression reads as true.
    If(Expr),
    /// Run when the expression reads as false.
    Unless(Expr),
}

impl Condition {
    pub fn evaluate(&self, configurations: &LaunchConfigurations) -> Result<bool> {
        let (expr, expected) = match self {
            Condition::If(expr) => (expr, true),
            Condition::Unless(expr) => (expr, false),
        };
        let name = expr
            .0
            .iter()
            .find_map(|sub| match sub {
                Substitution::Config(handle) | Substitution::ConfigAsBool(handle) => {
                    Some(handle.name())
                }
                Substitution::Text(_) => None,
            })
            .unwrap_or("condition");
        let value = expr.resolve(configurations)?;
        Ok(parse_bool(name, &value)? == expected)
    }
}

/// Where a process's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Output {
    /// Streamed to the operator console and the process log file.
    Screen,
    /// Written to the process log file only.
    Log,
}

/// An external command.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSpec {
    /// Short label used for log files and console prefixes.
    pub name: String,
    pub cmd: Vec<Expr>,
    pub output: Output,
    /// Run to completion before the next action starts.
    pub wait: bool,
}

#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    pub condition: Option<Condition>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            condition: None,
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn append_env(name: impl Into<String>, value: impl Into<Expr>) -> Self {
        Self::new(ActionKind::AppendEnv {
            name: name.into(),
            value: value.into(),
        })
    }

    pub fn set_env(name: impl Into<String>, value: impl Into<Expr>) -> Self {
        Self::new(ActionKind::SetEnv {
            name: name.into(),
            value: value.into(),
        })
    }

    pub fn include(file: impl Into<PathBuf>, args: Vec<(String, Expr)>) -> Self {
        Self::new(ActionKind::Include {
            file: file.into(),
            args,
        })
    }

    pub fn group(namespace: Option<String>, body: Vec<Action>) -> Self {
        Self::new(ActionKind::Group { namespace, body })
    }

    pub fn log_info(msg: Expr) -> Self {
        Self::new(ActionKind::LogInfo { msg })
    }
}

#[derive(Debug, Clone)]
pub enum ActionKind {
    /// Appends a value to a path-like environment variable.
    AppendEnv { name: String, value: Expr },
    /// Sets an environment variable for everything started afterwards.
    SetEnv { name: String, value: Expr },
    /// Declares a launch argument and applies its default.
    DeclareArgument(LaunchArgument),
    ExecuteProcess(ProcessSpec),
    /// Includes another launch file with argument overrides.
    Include { file: PathBuf, args: Vec<(String, Expr)> },
    /// Scoped block; configuration and environment changes inside do not leak.
    Group {
        namespace: Option<String>,
        body: Vec<Action>,
    },
    LogInfo { msg: Expr },
}

/// An ordered list of launch actions.
#[derive(Debug, Clone, Default)]
pub struct LaunchDescription {
    actions: Vec<Action>,
}

impl LaunchDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn extend(&mut self, actions: impl IntoIterator<Item = Action>) {
        self.actions.extend(actions);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Returns the top-level groups in order.
    pub fn groups(&self) -> impl Iterator<Item = (Option<&str>, &[Action])> {
        self.actions.iter().filter_map(|a| match &a.kind {
            ActionKind::Group { namespace, body } => Some((namespace.as_deref(), body.as_slice())),
            _ => None,
        })
    }
}
