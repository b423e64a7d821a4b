// THEORY:
// Tunable parameters of the tracker. Each extraction and update call receives
// a `&TrackingConfig` explicitly; there is no process-wide state, so two
// trackers with different limits can coexist. The struct can be loaded from a
// TOML file and falls back to the defaults below for missing keys or a missing
// file.

use crate::error::TrackError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Minimal object size in pixels, for at least one dimension.
pub const OBJECT_SIZE_LIMIT_DEFAULT: usize = 10;
/// Step used to widen/narrow colour boundaries.
pub const OBJECT_COLOR_UPDATE_STEP_DEFAULT: u16 = 1;
/// Length of the position ring used for velocity estimation.
pub const OBJECT_POSITIONS_DEFAULT: usize = 10;

const SEARCH_MARGIN_DEFAULT: usize = 16;
const MIN_CONFIDENCE_DEFAULT: u32 = 40;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrackingConfig {
    /// An extracted or re-shaped region is rejected when both its width and
    /// height are below this value.
    pub min_object_size: usize,
    /// Colour boundary step, in channel units (degrees for hue, percent for
    /// saturation and intensity, 0-255 levels otherwise).
    pub color_update_step: u16,
    /// Number of remembered positions.
    pub position_history: usize,
    /// Padding added around the predicted object box when searching a new frame.
    pub search_margin: usize,
    /// Correlation confidence (percent) under which the object is considered lost.
    pub min_confidence: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_object_size: OBJECT_SIZE_LIMIT_DEFAULT,
            color_update_step: OBJECT_COLOR_UPDATE_STEP_DEFAULT,
            position_history: OBJECT_POSITIONS_DEFAULT,
            search_margin: SEARCH_MARGIN_DEFAULT,
            min_confidence: MIN_CONFIDENCE_DEFAULT,
        }
    }
}

impl TrackingConfig {
    /// Load configuration from a TOML file, or the defaults when it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self, TrackError> {
        if !path.exists() {
            info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        info!("Loading config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: TrackingConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrackError> {
        if self.color_update_step > 255 {
            return Err(TrackError::InvalidArgument(format!(
                "color_update_step must be within 0..=255, got {}",
                self.color_update_step
            )));
        }
        if self.position_history < 2 {
            return Err(TrackError::InvalidArgument(format!(
                "position_history must hold at least 2 positions, got {}",
                self.position_history
            )));
        }
        if self.min_confidence > 100 {
            return Err(TrackError::InvalidArgument(format!(
                "min_confidence is a percentage, got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_library_constants() {
        let config = TrackingConfig::default();
        assert_eq!(config.min_object_size, 10);
        assert_eq!(config.color_update_step, 1);
        assert_eq!(config.position_history, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: TrackingConfig = toml::from_str("min_object_size = 4\n").expect("parse");
        assert_eq!(config.min_object_size, 4);
        assert_eq!(config.color_update_step, OBJECT_COLOR_UPDATE_STEP_DEFAULT);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<TrackingConfig>("speed = 3\n").is_err());
    }

    #[test]
    fn oversized_step_fails_validation() {
        let config = TrackingConfig {
            color_update_step: 300,
            ..TrackingConfig::default()
        };
        assert!(matches!(config.validate(), Err(TrackError::InvalidArgument(_))));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = TrackingConfig::load_from(Path::new("/nonexistent/vistrack.toml"))
            .expect("defaults");
        assert_eq!(config, TrackingConfig::default());
    }
}
