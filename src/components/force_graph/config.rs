use serde::{Deserialize, Serialize};

use super::fx::{FxLimits, FxTiming};
use super::physics::PhysicsConfig;

/// Trade CPU for stability: how many physics substeps run per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
	Low,
	#[default]
	Medium,
	High,
}

impl Quality {
	pub fn substeps(&self) -> usize {
		match self {
			Quality::Low => 1,
			Quality::Medium => 2,
			Quality::High => 4,
		}
	}
}

/// Everything the host can tune. Missing fields fall back to defaults, so a
/// partial JSON object is enough.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
	pub quality: Quality,
	/// Disables live physics; layouts come from one fixed relaxation pass
	/// and FX run on a virtual clock.
	pub test_mode: bool,
	pub relax_iterations: usize,
	/// Frame length of the virtual clock used in test mode.
	pub virtual_frame_ms: f64,
	pub default_node_size: f64,
	/// Extra pick radius around nodes, in graph units.
	pub pick_slop: f64,
	/// Max distance from an edge's segment that still counts as a hit.
	pub edge_tolerance: f64,
	pub physics: PhysicsConfig,
	pub fx: FxTiming,
	pub limits: FxLimits,
}

impl Default for GraphConfig {
	fn default() -> Self {
		Self {
			quality: Quality::default(),
			test_mode: false,
			relax_iterations: 300,
			virtual_frame_ms: 16.0,
			default_node_size: 12.0,
			pick_slop: 4.0,
			edge_tolerance: 5.0,
			physics: PhysicsConfig::default(),
			fx: FxTiming::default(),
			limits: FxLimits::default(),
		}
	}
}

impl GraphConfig {
	pub fn from_json(json: &str) -> super::error::Result<Self> {
		Ok(serde_json::from_str(json)?)
	}
}
