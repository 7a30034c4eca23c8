//! Per-robot instance groups.

use std::path::PathBuf;

use crate::args::{ArgumentRegistry, ConfigHandle};
use crate::description::{Action, Condition, Expr};
use crate::error::{LaunchError, Result};
use crate::roster::RobotConfig;

/// Configuration shared by every robot instance.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    pub map: ConfigHandle,
    pub graph: ConfigHandle,
    pub autostart: ConfigHandle,
    pub rviz_config: ConfigHandle,
    pub use_robot_state_pub: ConfigHandle,
    pub use_rviz: ConfigHandle,
    /// Gates the per-robot diagnostic lines.
    pub log_settings: ConfigHandle,
}

/// Builds one namespaced group per robot: visualization, navigation stack and
/// diagnostic log lines.
#[derive(Debug, Clone)]
pub struct InstanceComposer {
    pub shared: SharedConfig,
    /// Visualization launch file, included once per robot when `use_rviz` is true.
    pub rviz_launch: PathBuf,
    /// Navigation stack launch file, included once per robot.
    pub nav_launch: PathBuf,
}

impl InstanceComposer {
    pub fn compose(&self, robot: &RobotConfig, registry: &ArgumentRegistry) -> Result<Action> {
        let params_file = registry
            .params_file_for(&robot.name)
            .ok_or_else(|| LaunchError::MissingParamsFile(robot.name.clone()))?;

        let mut body = vec![self.rviz_include(robot), self.nav_include(robot, params_file)];
        body.extend(self.log_lines(robot, params_file));

        Ok(Action::group(Some(robot.name.clone()), body))
    }

    fn rviz_include(&self, robot: &RobotConfig) -> Action {
        let shared = &self.shared;
        Action::include(
            &self.rviz_launch,
            vec![
                ("namespace".to_string(), Expr::text(&robot.name)),
                ("rviz_config".to_string(), Expr::config(&shared.rviz_config)),
            ],
        )
        .when(Condition::If(Expr::config(&shared.use_rviz)))
    }

    fn nav_include(&self, robot: &RobotConfig, params_file: &ConfigHandle) -> Action {
        let shared = &self.shared;
        let mut args = vec![
            ("namespace".to_string(), Expr::text(&robot.name)),
            ("map".to_string(), Expr::config(&shared.map)),
            ("graph".to_string(), Expr::config(&shared.graph)),
            ("use_sim_time".to_string(), Expr::text("True")),
            ("params_file".to_string(), Expr::config(params_file)),
            ("autostart".to_string(), Expr::config_as_bool(&shared.autostart)),
            // Visualization and the simulator are owned by the top level.
            ("use_rviz".to_string(), Expr::text("False")),
            ("use_simulator".to_string(), Expr::text("False")),
            ("headless".to_string(), Expr::text("False")),
            (
                "use_robot_state_pub".to_string(),
                Expr::config_as_bool(&shared.use_robot_state_pub),
            ),
        ];
        args.extend(
            robot
                .pose_args()
                .into_iter()
                .map(|(name, value)| (name.to_string(), Expr::text(value))),
        );
        args.push(("robot_name".to_string(), Expr::text(&robot.name)));

        Action::include(&self.nav_launch, args)
    }

    fn log_lines(&self, robot: &RobotConfig, params_file: &ConfigHandle) -> Vec<Action> {
        let shared = &self.shared;
        let name = robot.name.as_str();
        let messages = [
            Expr::text(format!("Launching {}", name)),
            Expr::text(format!("{} map yaml: ", name)).then_config(&shared.map),
            Expr::text(format!("{} params yaml: ", name)).then_config(params_file),
            Expr::text(format!("{} rviz config file: ", name)).then_config(&shared.rviz_config),
            Expr::text(format!("{} using robot state pub: ", name))
                .then_bool(&shared.use_robot_state_pub),
            Expr::text(format!("{} autostart: ", name)).then_bool(&shared.autostart),
        ];
        messages
            .into_iter()
            .map(|msg| {
                Action::log_info(msg).when(Condition::If(Expr::config(&shared.log_settings)))
            })
            .collect()
    }
}
