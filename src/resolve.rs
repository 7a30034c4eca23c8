//! Evaluates a [`LaunchDescription`] into a concrete, ordered launch plan.
//!
//! Resolution is sequential: declarations and environment changes take effect
//! for the actions that follow them, conditions are evaluated against the
//! configurations known at that point, and groups restore the outer scope when
//! they end.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::OsString;
use std::path::PathBuf;

use serde::Serialize;

use crate::args::LaunchConfigurations;
use crate::description::{Action, ActionKind, LaunchDescription, Output};
use crate::error::{LaunchError, Result};
use crate::world::append_path_value;

/// A command ready to spawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInvocation {
    pub name: String,
    pub cmd: Vec<String>,
    pub output: Output,
    pub wait: bool,
    /// Environment variables set by the description, applied on top of the inherited environment.
    pub env: BTreeMap<String, String>,
}

/// A launch file to start with resolved arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncludeInvocation {
    pub namespace: Option<String>,
    pub file: PathBuf,
    pub args: Vec<(String, String)>,
    pub env: BTreeMap<String, String>,
}

impl IncludeInvocation {
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Log {
        namespace: Option<String>,
        message: String,
    },
    Process(ProcessInvocation),
    Include(IncludeInvocation),
}

/// The result of resolving a description.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub arguments: LaunchConfigurations,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn includes(&self) -> impl Iterator<Item = &IncludeInvocation> {
        self.steps.iter().filter_map(|s| match s {
            Step::Include(include) => Some(include),
            _ => None,
        })
    }

    pub fn processes(&self) -> impl Iterator<Item = &ProcessInvocation> {
        self.steps.iter().filter_map(|s| match s {
            Step::Process(process) => Some(process),
            _ => None,
        })
    }

    /// Log messages, optionally restricted to one namespace.
    pub fn log_lines<'a>(&'a self, namespace: Option<&'a str>) -> impl Iterator<Item = &'a str> {
        self.steps.iter().filter_map(move |s| match s {
            Step::Log {
                namespace: ns,
                message,
            } if namespace.is_none() || ns.as_deref() == namespace => Some(message.as_str()),
            _ => None,
        })
    }
}

/// Walks a description and produces a [`Plan`].
pub struct Resolver {
    configurations: LaunchConfigurations,
    overrides: Vec<String>,
    base_env: HashMap<String, String>,
    env: BTreeMap<String, String>,
    namespace: Vec<String>,
    seen_namespaces: HashSet<String>,
    declared: HashSet<String>,
    steps: Vec<Step>,
}

impl Resolver {
    /// Creates a resolver seeded with command-line overrides and the current process environment.
    pub fn new(overrides: Vec<(String, String)>) -> Self {
        let names = overrides.iter().map(|(k, _)| k.clone()).collect();
        Self {
            configurations: LaunchConfigurations::with_overrides(overrides),
            overrides: names,
            base_env: inherited_env(std::env::vars_os()),
            env: BTreeMap::new(),
            namespace: Vec::new(),
            seen_namespaces: HashSet::new(),
            declared: HashSet::new(),
            steps: Vec::new(),
        }
    }

    /// Replaces the inherited environment used by append operations.
    pub fn with_base_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.base_env = env.into_iter().collect();
        self
    }

    pub fn resolve(mut self, description: &LaunchDescription) -> Result<Plan> {
        self.visit_all(description.actions())?;

        for name in &self.overrides {
            if !self.declared.contains(name) {
                log::warn!("Launch argument '{}' is not declared by this launch", name);
            }
        }

        Ok(Plan {
            arguments: self.configurations,
            steps: self.steps,
        })
    }

    fn visit_all(&mut self, actions: &[Action]) -> Result<()> {
        for action in actions {
            self.visit(action)?;
        }
        Ok(())
    }

    fn visit(&mut self, action: &Action) -> Result<()> {
        if let Some(condition) = &action.condition
            && !condition.evaluate(&self.configurations)?
        {
            return Ok(());
        }

        match &action.kind {
            ActionKind::DeclareArgument(argument) => {
                self.declared.insert(argument.name.clone());
                if !self.configurations.declare(argument) {
                    log::debug!("Argument '{}' overridden", argument.name);
                }
            }

            ActionKind::SetEnv { name, value } => {
                let value = value.resolve(&self.configurations)?;
                self.env.insert(name.clone(), value);
            }

            ActionKind::AppendEnv { name, value } => {
                let value = value.resolve(&self.configurations)?;
                let existing = self
                    .env
                    .get(name)
                    .or_else(|| self.base_env.get(name))
                    .map(String::as_str);
                let combined = append_path_value(existing, &value);
                self.env.insert(name.clone(), combined);
            }

            ActionKind::ExecuteProcess(spec) => {
                let cmd = spec
                    .cmd
                    .iter()
                    .map(|e| e.resolve(&self.configurations))
                    .collect::<Result<Vec<_>>>()?;
                self.steps.push(Step::Process(ProcessInvocation {
                    name: spec.name.clone(),
                    cmd,
                    output: spec.output,
                    wait: spec.wait,
                    env: self.env.clone(),
                }));
            }

            ActionKind::Include { file, args } => {
                if !file.exists() {
                    return Err(LaunchError::MissingLaunchFile(file.clone()));
                }
                let args = args
                    .iter()
                    .map(|(name, value)| {
                        Ok::<_, LaunchError>((name.clone(), value.resolve(&self.configurations)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.steps.push(Step::Include(IncludeInvocation {
                    namespace: self.current_namespace(),
                    file: file.clone(),
                    args,
                    env: self.env.clone(),
                }));
            }

            ActionKind::Group { namespace, body } => {
                let saved_configurations = self.configurations.clone();
                let saved_env = self.env.clone();
                let pushed = namespace.is_some();

                if let Some(ns) = namespace {
                    self.namespace.push(ns.trim_matches('/').to_string());
                    let full = self.current_namespace().unwrap_or_default();
                    if !self.seen_namespaces.insert(full.clone()) {
                        return Err(LaunchError::NamespaceCollision(full));
                    }
                }

                let result = self.visit_all(body);

                if pushed {
                    self.namespace.pop();
                }
                self.configurations = saved_configurations;
                self.env = saved_env;
                result?;
            }

            ActionKind::LogInfo { msg } => {
                let message = msg.resolve(&self.configurations)?;
                let namespace = self.current_namespace();
                self.steps.push(Step::Log { namespace, message });
            }
        }
        Ok(())
    }

    fn current_namespace(&self) -> Option<String> {
        if self.namespace.is_empty() {
            None
        } else {
            Some(format!("/{}", self.namespace.join("/")))
        }
    }
}

/// Collects the inherited environment, skipping entries that are not valid Unicode.
fn inherited_env(vars: impl IntoIterator<Item = (OsString, OsString)>) -> HashMap<String, String> {
    vars.into_iter()
        .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => Some((name, value)),
            (Ok(name), Err(_)) => {
                log::debug!("Ignoring non-Unicode value of {}", name);
                None
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ArgumentRegistry;
    use crate::description::{Condition, Expr, ProcessSpec};

    fn launch_file(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("child_launch.py");
        std::fs::write(&path, "").unwrap();
        path
    }

    #[test]
    fn test_declarations_and_overrides() {
        let mut registry = ArgumentRegistry::new();
        let map = registry.declare("map", "/default.yaml", None).unwrap();
        let mut ld = LaunchDescription::new();
        ld.extend(registry.declarations());
        ld.add_action(Action::log_info(Expr::text("map: ").then_config(&map)));

        let plan = Resolver::new(vec![("map".into(), "/other.yaml".into())])
            .resolve(&ld)
            .unwrap();
        assert_eq!(plan.arguments.value("map"), Some("/other.yaml"));
        assert_eq!(plan.log_lines(None).collect::<Vec<_>>(), ["map: /other.yaml"]);
    }

    #[test]
    fn test_handle_used_before_declaration_fails() {
        let mut registry = ArgumentRegistry::new();
        let map = registry.declare("map", "/default.yaml", None).unwrap();
        let mut ld = LaunchDescription::new();
        ld.add_action(Action::log_info(Expr::config(&map)));
        ld.extend(registry.declarations());

        let err = Resolver::new(Vec::new()).resolve(&ld).unwrap_err();
        assert!(matches!(err, LaunchError::UnresolvedConfiguration(name) if name == "map"));
    }

    #[test]
    fn test_append_env_uses_base_env() {
        let mut ld = LaunchDescription::new();
        ld.add_action(Action::append_env("GZ_SIM_RESOURCE_PATH", "/a"));
        ld.add_action(Action::append_env("GZ_SIM_RESOURCE_PATH", "/b"));
        ld.add_action(Action::append_env("FRESH_PATH", "/c"));
        ld.add_action(Action::new(ActionKind::ExecuteProcess(ProcessSpec {
            name: "env".into(),
            cmd: vec![Expr::text("env")],
            output: Output::Log,
            wait: true,
        })));

        let plan = Resolver::new(Vec::new())
            .with_base_env([("GZ_SIM_RESOURCE_PATH".to_string(), "/base".to_string())])
            .resolve(&ld)
            .unwrap();
        let process = plan.processes().next().unwrap();
        assert_eq!(process.env["GZ_SIM_RESOURCE_PATH"], "/base:/a:/b");
        assert_eq!(process.env["FRESH_PATH"], "/c");
    }

    #[cfg(unix)]
    #[test]
    fn test_inherited_env_skips_non_unicode() {
        use std::os::unix::ffi::OsStringExt;

        let env = inherited_env([
            (OsString::from("GZ_SIM_RESOURCE_PATH"), OsString::from("/base")),
            (OsString::from("BAD_VALUE"), OsString::from_vec(vec![0xff, 0xfe])),
            (OsString::from_vec(vec![0xff]), OsString::from("x")),
        ]);
        assert_eq!(env.len(), 1);
        assert_eq!(env["GZ_SIM_RESOURCE_PATH"], "/base");
    }

    #[test]
    fn test_resolver_from_process_environment() {
        let mut ld = LaunchDescription::new();
        ld.add_action(Action::append_env("FLEETLAUNCH_UNSET_PATH", "/a"));
        ld.add_action(Action::new(ActionKind::ExecuteProcess(ProcessSpec {
            name: "env".into(),
            cmd: vec![Expr::text("env")],
            output: Output::Log,
            wait: true,
        })));
        let plan = Resolver::new(Vec::new()).resolve(&ld).unwrap();
        let process = plan.processes().next().unwrap();
        assert_eq!(process.env["FLEETLAUNCH_UNSET_PATH"], "/a");
    }

    #[test]
    fn test_group_scopes_environment_and_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let file = launch_file(dir.path());
        let mut ld = LaunchDescription::new();
        ld.add_action(Action::group(
            Some("robot1".into()),
            vec![
                Action::set_env("INNER", "1"),
                Action::include(&file, vec![]),
                Action::log_info(Expr::text("inside")),
            ],
        ));
        ld.add_action(Action::include(&file, vec![]));

        let plan = Resolver::new(Vec::new()).with_base_env(Vec::new()).resolve(&ld).unwrap();
        let includes: Vec<_> = plan.includes().collect();
        assert_eq!(includes[0].namespace.as_deref(), Some("/robot1"));
        assert_eq!(includes[0].env.get("INNER").map(String::as_str), Some("1"));
        assert_eq!(includes[1].namespace, None);
        assert!(includes[1].env.get("INNER").is_none());
        assert_eq!(plan.log_lines(Some("/robot1")).count(), 1);
    }

    #[test]
    fn test_namespace_collision() {
        let mut ld = LaunchDescription::new();
        ld.add_action(Action::group(Some("robot1".into()), vec![]));
        ld.add_action(Action::group(Some("/robot1/".into()), vec![]));
        let err = Resolver::new(Vec::new()).resolve(&ld).unwrap_err();
        assert!(matches!(err, LaunchError::NamespaceCollision(ns) if ns == "/robot1"));
    }

    #[test]
    fn test_missing_include_target() {
        let mut ld = LaunchDescription::new();
        ld.add_action(Action::include("/definitely/not/here_launch.py", vec![]));
        let err = Resolver::new(Vec::new()).resolve(&ld).unwrap_err();
        assert!(matches!(err, LaunchError::MissingLaunchFile(_)));
    }

    #[test]
    fn test_skipped_action_is_not_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let file = launch_file(dir.path());
        let mut registry = ArgumentRegistry::new();
        let flag = registry.declare("use_rviz", "False", None).unwrap();
        let undeclared = registry.configuration("never_set", "x");
        let mut ld = LaunchDescription::new();
        ld.extend(registry.declarations());
        ld.add_action(
            Action::include(&file, vec![("cfg".into(), Expr::config(&undeclared))])
                .when(Condition::If(Expr::config(&flag))),
        );
        ld.add_action(
            Action::log_info(Expr::text("no rviz")).when(Condition::Unless(Expr::config(&flag))),
        );

        let plan = Resolver::new(Vec::new()).resolve(&ld).unwrap();
        assert_eq!(plan.includes().count(), 0);
        assert_eq!(plan.log_lines(None).collect::<Vec<_>>(), ["no rviz"]);
    }

    #[test]
    fn test_plan_serializes() {
        let mut ld = LaunchDescription::new();
        ld.add_action(Action::log_info(Expr::text("hello")));
        let plan = Resolver::new(Vec::new()).resolve(&ld).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["steps"][0]["type"], "log");
        assert_eq!(json["steps"][0]["message"], "hello");
    }
}
