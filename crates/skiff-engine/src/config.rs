//! Engine configuration.
//!
//! [`EngineConfig`] is plain serde data. Every field has a default, so a
//! JSON document only needs to name what it changes:
//!
//! ```
//! use skiff_engine::config::{BackendKind, EngineConfig};
//!
//! let config = EngineConfig::from_json_str(r#"{ "fps": 30, "physics": "naive" }"#).unwrap();
//! assert_eq!(config.physics, BackendKind::Naive);
//! assert_eq!(config.physics_rate(), 30);
//! assert_eq!(config.gravity, 900.0);
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::math::Vec2;

// ---------------------------------------------------------------------------
// BackendKind
// ---------------------------------------------------------------------------

/// Which physics backend drives the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackendKind {
    /// Pairwise O(n^2) checks with a simple impulse response.
    Naive,
    /// rapier2d rigid-body solver.
    #[default]
    Solver,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Naive, BackendKind::Solver];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Naive => "naive",
            BackendKind::Solver => "solver",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "naive" | "cheesy" => Ok(BackendKind::Naive),
            "solver" | "rapier" | "pymunk" => Ok(BackendKind::Solver),
            _ => Err(ConfigError::UnknownBackend {
                name: s.to_owned(),
                available: BackendKind::ALL.map(|k| k.as_str()).join(", "),
            }),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendKind> for String {
    fn from(kind: BackendKind) -> Self {
        kind.as_str().to_owned()
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Startup configuration of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Target frame rate.
    pub fps: u32,
    /// Physics steps per second. Follows `fps` when unset.
    pub physics_rate: Option<u32>,
    /// Downward acceleration in world units per second squared.
    pub gravity: f64,
    pub fullscreen: bool,
    pub vsync: bool,
    /// Ignored when `fullscreen` is set.
    pub window_width: u32,
    /// Ignored when `fullscreen` is set.
    pub window_height: u32,
    pub physics: BackendKind,
    /// Verbose logging.
    pub debug: bool,
    /// Upper bound on physics steps per frame. Backlog beyond it is dropped.
    pub max_steps_per_advance: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            physics_rate: None,
            gravity: 900.0,
            fullscreen: false,
            vsync: false,
            window_width: 1024,
            window_height: 768,
            physics: BackendKind::default(),
            debug: false,
            max_steps_per_advance: None,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 {
            return Err(ConfigError::InvalidRate {
                field: "fps",
                value: 0,
            });
        }
        if self.physics_rate == Some(0) {
            return Err(ConfigError::InvalidRate {
                field: "physics_rate",
                value: 0,
            });
        }
        if self.max_steps_per_advance == Some(0) {
            return Err(ConfigError::InvalidRate {
                field: "max_steps_per_advance",
                value: 0,
            });
        }
        if !self.gravity.is_finite() {
            return Err(ConfigError::NonFiniteGravity {
                value: self.gravity,
            });
        }
        Ok(())
    }

    pub fn physics_rate(&self) -> u32 {
        self.physics_rate.unwrap_or(self.fps)
    }

    /// Seconds per physics step.
    pub fn physics_dt(&self) -> f64 {
        1.0 / self.physics_rate() as f64
    }

    /// Gravity as a vector; `gravity` pulls towards negative y.
    pub fn gravity_vector(&self) -> Vec2 {
        Vec2::new(0.0, -self.gravity)
    }

    /// Window size, or `None` when running fullscreen.
    pub fn window_size(&self) -> Option<(u32, u32)> {
        (!self.fullscreen).then_some((self.window_width, self.window_height))
    }
}
