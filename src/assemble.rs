//! Top-level description for the multi-robot simulation bringup.

use std::path::{Path, PathBuf};

use crate::ament::Env;
use crate::args::{ArgumentRegistry, ConfigHandle};
use crate::compose::{InstanceComposer, SharedConfig};
use crate::description::{Action, LaunchDescription};
use crate::error::Result;
use crate::roster::Roster;
use crate::world::{WorldArtifact, compile_world_action, resource_path_actions, simulator_action};

pub const BRINGUP_PACKAGE: &str = "nav2_bringup";
pub const SIM_PACKAGE: &str = "nav2_minimal_tb3_sim";

const RVIZ_LAUNCH_FILE: &str = "rviz_launch.py";
const NAV_LAUNCH_FILE: &str = "tb3_simulation_launch.py";

/// Installed locations of the bringup and simulation packages.
#[derive(Debug, Clone)]
pub struct BringupLayout {
    pub bringup_dir: PathBuf,
    pub sim_dir: PathBuf,
    /// Visualization launch file included once per robot.
    pub rviz_launch: PathBuf,
    /// Navigation stack launch file included once per robot.
    pub nav_launch: PathBuf,
}

impl BringupLayout {
    /// A layout with both launch files under `<bringup_dir>/launch`.
    pub fn new(bringup_dir: impl Into<PathBuf>, sim_dir: impl Into<PathBuf>) -> Self {
        let bringup_dir = bringup_dir.into();
        let launch_dir = bringup_dir.join("launch");
        Self {
            rviz_launch: launch_dir.join(RVIZ_LAUNCH_FILE),
            nav_launch: launch_dir.join(NAV_LAUNCH_FILE),
            bringup_dir,
            sim_dir: sim_dir.into(),
        }
    }

    /// Locates both packages through the ament index.
    ///
    /// A launch file that cannot be found keeps its conventional `launch/`
    /// path so that resolution reports it as missing.
    pub fn from_env(env: &Env) -> Result<Self> {
        let mut layout = Self::new(
            env.package_share_dir(BRINGUP_PACKAGE)?,
            env.package_share_dir(SIM_PACKAGE)?,
        );
        if let Some(path) = env.launch_file_path(BRINGUP_PACKAGE, RVIZ_LAUNCH_FILE) {
            layout.rviz_launch = path;
        }
        if let Some(path) = env.launch_file_path(BRINGUP_PACKAGE, NAV_LAUNCH_FILE) {
            layout.nav_launch = path;
        }
        Ok(layout)
    }

    pub fn default_world(&self) -> PathBuf {
        self.sim_dir.join("worlds").join("tb3_sandbox.sdf.xacro")
    }

    pub fn default_map(&self) -> PathBuf {
        self.bringup_dir.join("maps").join("tb3_sandbox.yaml")
    }

    pub fn default_graph(&self) -> PathBuf {
        self.bringup_dir
            .join("graphs")
            .join("turtlebot3_graph.geojson")
    }

    pub fn default_params(&self) -> PathBuf {
        self.bringup_dir.join("params").join("nav2_params.yaml")
    }

    pub fn default_rviz_config(&self) -> PathBuf {
        self.bringup_dir.join("rviz").join("nav2_default_view.rviz")
    }
}

/// The declared arguments of the bringup and the handles the description uses.
#[derive(Debug)]
pub struct Declared {
    pub registry: ArgumentRegistry,
    pub world: ConfigHandle,
    pub shared: SharedConfig,
}

/// Declares every bringup argument, including one parameters file per robot.
pub fn declare_arguments(roster: &Roster, layout: &BringupLayout) -> Result<Declared> {
    let mut registry = ArgumentRegistry::new();

    let world = registry.declare(
        "world",
        path_text(&layout.default_world()),
        Some("Full path to world file to load"),
    )?;
    let map = registry.declare(
        "map",
        path_text(&layout.default_map()),
        Some("Full path to map file to load"),
    )?;
    let graph = registry.declare("graph", path_text(&layout.default_graph()), None)?;

    let params = path_text(&layout.default_params());
    for robot in roster.robots() {
        registry.declare_robot_params(robot, params.clone())?;
    }

    let use_rviz = registry.declare("use_rviz", "True", Some("Whether to start RVIZ"))?;
    let autostart = registry.declare(
        "autostart",
        "false",
        Some("Automatically startup the stacks"),
    )?;
    let rviz_config = registry.declare(
        "rviz_config",
        path_text(&layout.default_rviz_config()),
        Some("Full path to the RVIZ config file to use."),
    )?;
    let use_robot_state_pub = registry.declare(
        "use_robot_state_pub",
        "True",
        Some("Whether to start the robot state publisher"),
    )?;
    let log_settings = registry.configuration("log_settings", "true");

    Ok(Declared {
        registry,
        world,
        shared: SharedConfig {
            map,
            graph,
            autostart,
            rviz_config,
            use_robot_state_pub,
            use_rviz,
            log_settings,
        },
    })
}

/// Builds the full description: environment, declarations, world compile,
/// simulator start, then one group per robot.
///
/// The caller owns `artifact` for the whole run; dropping it removes the
/// generated world file.
pub fn assemble(
    roster: &Roster,
    layout: &BringupLayout,
    artifact: &WorldArtifact,
) -> Result<LaunchDescription> {
    let Declared {
        registry,
        world,
        shared,
    } = declare_arguments(roster, layout)?;

    let composer = InstanceComposer {
        shared,
        rviz_launch: layout.rviz_launch.clone(),
        nav_launch: layout.nav_launch.clone(),
    };
    let groups = roster
        .robots()
        .iter()
        .map(|robot| composer.compose(robot, &registry))
        .collect::<Result<Vec<_>>>()?;

    let mut ld = LaunchDescription::new();
    ld.add_action(Action::set_env("RCUTILS_LOGGING_BUFFERED_STREAM", "1"));
    ld.extend(resource_path_actions(&layout.sim_dir));
    ld.extend(registry.declarations());
    ld.add_action(compile_world_action(&world, artifact));
    ld.add_action(simulator_action(artifact));
    ld.extend(groups);

    log::debug!(
        "Assembled description with {} actions for {} robots",
        ld.actions().len(),
        roster.len()
    );
    Ok(ld)
}

fn path_text(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::ActionKind;
    use crate::roster::RobotConfig;

    fn layout() -> BringupLayout {
        BringupLayout::new("/opt/share/nav2_bringup", "/opt/share/nav2_minimal_tb3_sim")
    }

    #[test]
    fn test_layout_from_ament_index() {
        let prefix = tempfile::tempdir().unwrap();
        for package in [BRINGUP_PACKAGE, SIM_PACKAGE] {
            let marker = prefix
                .path()
                .join("share/ament_index/resource_index/packages")
                .join(package);
            std::fs::create_dir_all(marker.parent().unwrap()).unwrap();
            std::fs::write(&marker, "").unwrap();
        }
        let bringup_dir = prefix.path().join("share").join(BRINGUP_PACKAGE);
        std::fs::create_dir_all(bringup_dir.join("launch")).unwrap();
        std::fs::write(bringup_dir.join("launch").join(RVIZ_LAUNCH_FILE), "").unwrap();
        std::fs::write(bringup_dir.join(NAV_LAUNCH_FILE), "").unwrap();

        let env = Env::from_path(&prefix.path().display().to_string());
        let layout = BringupLayout::from_env(&env).unwrap();
        assert_eq!(layout.bringup_dir, bringup_dir);
        assert_eq!(layout.sim_dir, prefix.path().join("share").join(SIM_PACKAGE));
        assert_eq!(layout.rviz_launch, bringup_dir.join("launch").join(RVIZ_LAUNCH_FILE));
        assert_eq!(layout.nav_launch, bringup_dir.join(NAV_LAUNCH_FILE));

        std::fs::remove_file(bringup_dir.join(NAV_LAUNCH_FILE)).unwrap();
        let layout = BringupLayout::from_env(&env).unwrap();
        assert_eq!(layout.nav_launch, bringup_dir.join("launch").join(NAV_LAUNCH_FILE));
    }

    #[test]
    fn test_declared_argument_order() {
        let declared = declare_arguments(&Roster::sandbox_pair(), &layout()).unwrap();
        let names: Vec<&str> = declared
            .registry
            .arguments()
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(
            names,
            [
                "world",
                "map",
                "graph",
                "robot1_params_file",
                "robot2_params_file",
                "use_rviz",
                "autostart",
                "rviz_config",
                "use_robot_state_pub",
            ]
        );
        let map = &declared.registry.arguments()[1];
        assert_eq!(map.default_value, "/opt/share/nav2_bringup/maps/tb3_sandbox.yaml");
        assert!(!declared.registry.is_declared("log_settings"));
    }

    #[test]
    fn test_params_declared_per_roster_entry() {
        let roster = Roster::new(vec![
            RobotConfig::new("a", 0.0, 0.0, 0.0),
            RobotConfig::new("b", 0.0, 1.0, 0.0),
            RobotConfig::new("c", 0.0, 2.0, 0.0),
        ])
        .unwrap();
        let declared = declare_arguments(&roster, &layout()).unwrap();
        for name in ["a", "b", "c"] {
            assert_eq!(
                declared.registry.params_file_for(name).unwrap().name(),
                format!("{}_params_file", name)
            );
        }
    }

    #[test]
    fn test_action_order() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = WorldArtifact::acquire_in(dir.path()).unwrap();
        let ld = assemble(&Roster::sandbox_pair(), &layout(), &artifact).unwrap();

        let kinds: Vec<&str> = ld
            .actions()
            .iter()
            .map(|a| match &a.kind {
                ActionKind::SetEnv { .. } => "set_env",
                ActionKind::AppendEnv { .. } => "append_env",
                ActionKind::DeclareArgument(_) => "declare",
                ActionKind::ExecuteProcess(_) => "process",
                ActionKind::Include { .. } => "include",
                ActionKind::Group { .. } => "group",
                ActionKind::LogInfo { .. } => "log",
            })
            .collect();
        let mut expected = vec!["set_env", "append_env", "append_env"];
        expected.extend(["declare"; 9]);
        expected.extend(["process", "process", "group", "group"]);
        assert_eq!(kinds, expected);
    }

    #[test]
    fn test_resource_paths_independent_of_roster_size() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = WorldArtifact::acquire_in(dir.path()).unwrap();
        let robots = (0..5)
            .map(|i| RobotConfig::new(format!("robot{}", i), 0.0, i as f64, 0.01))
            .collect();
        let roster = Roster::new(robots).unwrap();
        let ld = assemble(&roster, &layout(), &artifact).unwrap();

        let appends = ld
            .actions()
            .iter()
            .filter(|a| matches!(a.kind, ActionKind::AppendEnv { .. }))
            .count();
        assert_eq!(appends, 2);
        assert_eq!(ld.groups().count(), 5);
    }

    #[test]
    fn test_empty_roster_has_no_groups() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = WorldArtifact::acquire_in(dir.path()).unwrap();
        let roster = Roster::new(Vec::new()).unwrap();
        let ld = assemble(&roster, &layout(), &artifact).unwrap();
        assert_eq!(ld.groups().count(), 0);
    }
}
