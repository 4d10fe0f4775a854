//! Startup configuration.
//!
//! Built once in `main` and passed into the registry, detector factory and
//! fusion sink; nothing here is global.

use crate::frame::TrackedIdentity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Dimensions of the shared world window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorldWindow {
    pub width: u32,
    pub height: u32,
}

/// Detection parameters for one tracked identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "detector", rename_all = "kebab-case")]
pub enum DetectorConfig {
    /// Fiducial marker with this tag id.
    Marker { tag_id: u32 },
    /// Neural-network bounding boxes above this score.
    NeuralNet {
        #[serde(default = "default_score_threshold")]
        score_threshold: f32,
    },
    /// Synthetic fixed observation, for demos and tests.
    Fixed {
        x: i32,
        y: i32,
        #[serde(default)]
        rotation: f64,
    },
}

fn default_score_threshold() -> f32 {
    0.5
}

/// One tracked identity and how to detect it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub id: TrackedIdentity,
    #[serde(flatten)]
    pub detector: DetectorConfig,
}

/// A camera brought up at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BootCamera {
    pub index: u32,
    #[serde(default = "default_fps")]
    pub fps: f64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub angle: f64,
}

fn default_fps() -> f64 {
    30.0
}

fn default_max_probe_index() -> u32 {
    10
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub world: WorldWindow,
    /// Upper bound on device indices probed when searching for free cameras.
    #[serde(default = "default_max_probe_index")]
    pub max_probe_index: u32,
    #[serde(default)]
    pub objects: Vec<ObjectConfig>,
    #[serde(default)]
    pub cameras: Vec<BootCamera>,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.world.width == 0 || self.world.height == 0 {
            return Err(ConfigError::ValidationError(
                "world window must be non-empty".into(),
            ));
        }
        let mut ids = HashSet::new();
        for object in &self.objects {
            if !ids.insert(object.id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate tracked identity {}",
                    object.id
                )));
            }
        }
        for camera in &self.cameras {
            if !(camera.fps.is_finite() && camera.fps > 0.0) {
                return Err(ConfigError::ValidationError(format!(
                    "camera {} has invalid fps {}",
                    camera.index, camera.fps
                )));
            }
        }
        Ok(())
    }

    /// Every identity the fusion stage should track.
    pub fn tracked_identities(&self) -> Vec<TrackedIdentity> {
        self.objects.iter().map(|o| o.id).collect()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
world:
  width: 800
  height: 600
objects:
  - id: 1
    detector: marker
    tag_id: 7
  - id: 2
    detector: neural-net
cameras:
  - index: 0
    x: 0.0
    y: 0.0
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.max_probe_index, 10); // default
        assert_eq!(config.objects.len(), 2);
        assert!(matches!(
            config.objects[0].detector,
            DetectorConfig::Marker { tag_id: 7 }
        ));
        assert!(matches!(
            config.objects[1].detector,
            DetectorConfig::NeuralNet { score_threshold } if score_threshold == 0.5
        ));
        assert_eq!(config.cameras[0].fps, 30.0); // default
        assert_eq!(config.cameras[0].angle, 0.0); // default
        assert_eq!(
            config.tracked_identities(),
            vec![TrackedIdentity(1), TrackedIdentity(2)]
        );
    }

    #[test]
    fn test_parse_config_with_fixed_objects() {
        let yaml = r#"
world:
  width: 400
  height: 300
max_probe_index: 4
objects:
  - id: 9
    detector: fixed
    x: 10
    y: 20
"#;
        let config = Config::parse(yaml).unwrap();
        assert!(matches!(
            config.objects[0].detector,
            DetectorConfig::Fixed { x: 10, y: 20, rotation } if rotation == 0.0
        ));
        assert_eq!(config.max_probe_index, 4);
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let yaml = r#"
world:
  width: 400
  height: 300
objects:
  - id: 1
    detector: marker
    tag_id: 1
  - id: 1
    detector: marker
    tag_id: 2
"#;
        assert!(matches!(
            Config::parse(yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_invalid_fps_rejected() {
        let yaml = r#"
world:
  width: 400
  height: 300
cameras:
  - index: 0
    fps: 0.0
    x: 0.0
    y: 0.0
"#;
        assert!(matches!(
            Config::parse(yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
