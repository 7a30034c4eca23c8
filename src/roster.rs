use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LaunchError, Result};

/// Identity and spawn pose of one simulated robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Unique identifier, used as the robot's namespace and argument prefix.
    pub name: String,
    pub x_pose: f64,
    pub y_pose: f64,
    #[serde(default)]
    pub z_pose: f64,
    #[serde(default)]
    pub roll: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub yaw: f64,
}

impl RobotConfig {
    pub fn new(name: impl Into<String>, x_pose: f64, y_pose: f64, z_pose: f64) -> Self {
        Self {
            name: name.into(),
            x_pose,
            y_pose,
            z_pose,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
        }
    }

    /// Returns the pose as `(argument name, text)` pairs in launch-argument order.
    pub fn pose_args(&self) -> [(&'static str, String); 6] {
        [
            ("x_pose", pose_text(self.x_pose)),
            ("y_pose", pose_text(self.y_pose)),
            ("z_pose", pose_text(self.z_pose)),
            ("roll", pose_text(self.roll)),
            ("pitch", pose_text(self.pitch)),
            ("yaw", pose_text(self.yaw)),
        ]
    }
}

/// Formats a pose component the way launch arguments expect it (`0.0`, `-0.5`, `1e-05`).
///
/// Exponents carry a sign and at least two digits.
pub fn pose_text(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let text = format!("{:?}", value);
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => text,
    }
}

/// An ordered collection of robots with unique names.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    robots: Vec<RobotConfig>,
}

impl Roster {
    /// Builds a roster, rejecting empty or duplicate robot names.
    pub fn new(robots: Vec<RobotConfig>) -> Result<Self> {
        let mut seen = HashSet::new();
        for robot in &robots {
            if robot.name.trim().is_empty() {
                return Err(LaunchError::EmptyRobotName);
            }
            if !seen.insert(robot.name.as_str()) {
                return Err(LaunchError::DuplicateRobot(robot.name.clone()));
            }
        }
        Ok(Self { robots })
    }

    /// The two-robot sandbox roster shipped with the bringup package.
    pub fn sandbox_pair() -> Self {
        Self {
            robots: vec![
                RobotConfig::new("robot1", 0.0, 0.5, 0.01),
                RobotConfig::new("robot2", 0.0, -0.5, 0.01),
            ],
        }
    }

    /// Parses a JSON array of robot records.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let robots: Vec<RobotConfig> = serde_json::from_str(json)?;
        Self::new(robots)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn robots(&self) -> &[RobotConfig] {
        &self.robots
    }

    pub fn len(&self) -> usize {
        self.robots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }
}
