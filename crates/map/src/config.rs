//! Tunable presentation and routing policy.
//!
//! Every field has a default, so a partial YAML document (or none at all)
//! yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{MapError, Result};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default)]
    pub viewport: ViewportSettings,
    #[serde(default)]
    pub cull: CullSettings,
    #[serde(default)]
    pub cluster: ClusterSettings,
    #[serde(default)]
    pub route: RouteSettings,
}

impl MapConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Self = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MapError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let v = &self.viewport;
        if !(v.min_scale > 0.0 && v.min_scale <= v.max_scale) {
            return Err(MapError::Config(format!(
                "viewport scale bounds must satisfy 0 < min <= max (got {}..{})",
                v.min_scale, v.max_scale
            )));
        }
        if v.zoom_step <= 1.0 || v.wheel_zoom_in <= 1.0 {
            return Err(MapError::Config("zoom-in factors must be > 1".into()));
        }
        if !(v.wheel_zoom_out > 0.0 && v.wheel_zoom_out < 1.0) {
            return Err(MapError::Config("wheel_zoom_out must be in (0, 1)".into()));
        }
        if self.cluster.cell_px <= 0.0 {
            return Err(MapError::Config("cluster.cell_px must be > 0".into()));
        }
        if self.route.max_candidates == 0 {
            return Err(MapError::Config("route.max_candidates must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportSettings {
    pub min_scale: f64,
    pub max_scale: f64,
    /// Margin left around the map by `fit`, in screen pixels.
    pub fit_padding_px: f64,
    /// Factor used by the zoom buttons.
    pub zoom_step: f64,
    pub wheel_zoom_in: f64,
    pub wheel_zoom_out: f64,
    /// Scale multiplier applied when a cluster is clicked.
    pub cluster_zoom: f64,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            min_scale: 0.05,
            max_scale: 6.0,
            fit_padding_px: 24.0,
            zoom_step: 1.15,
            wheel_zoom_in: 1.08,
            wheel_zoom_out: 0.92,
            cluster_zoom: 1.6,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CullSettings {
    pub padding_px: f64,
}

impl Default for CullSettings {
    fn default() -> Self {
        Self { padding_px: 48.0 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub enabled: bool,
    pub cell_px: f64,
    /// Cluster whenever the scale drops below this.
    pub below_scale: f64,
    /// Cluster whenever more markers than this are visible.
    pub above_count: usize,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cell_px: 34.0,
            below_scale: 0.35,
            above_count: 600,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    pub max_candidates: usize,
    pub two_opt_passes: usize,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            max_candidates: 200,
            two_opt_passes: 2,
        }
    }
}
