use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{GraphError, Result};

/// Which side of the ledger a participant sits on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetSign {
	Creditor,
	Debtor,
	#[default]
	Neutral,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphNode {
	pub id: String,
	pub name: Option<String>,
	pub color_key: Option<String>,
	/// Diameter in pixels.
	pub size: Option<f64>,
	pub shape_key: Option<String>,
	pub net_balance: Option<String>,
	pub net_sign: NetSign,
	pub status: Option<String>,
	#[serde(rename = "type")]
	pub node_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphLink {
	pub source: String,
	pub target: String,
	pub width_key: Option<String>,
	pub alpha_key: Option<String>,
	pub limit: f64,
	pub used: f64,
	pub available: f64,
	pub status: Option<String>,
}

impl GraphLink {
	pub fn key(&self) -> EdgeKey {
		EdgeKey::new(&self.source, &self.target)
	}
}

/// Stable identity of a directed edge. `A→B` and `B→A` are different keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
	pub source: String,
	pub target: String,
}

impl EdgeKey {
	pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
		Self {
			source: source.into(),
			target: target.into(),
		}
	}
}

impl fmt::Display for EdgeKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}→{}", self.source, self.target)
	}
}

/// One immutable picture of the network for a single equivalent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
	pub equivalent: String,
	pub generated_at: String,
	pub nodes: Vec<GraphNode>,
	pub links: Vec<GraphLink>,
}

impl Snapshot {
	pub fn from_json(json: &str) -> Result<Self> {
		let snapshot: Snapshot = serde_json::from_str(json)?;
		snapshot.validate()?;
		Ok(snapshot)
	}

	/// Checks id uniqueness and that every link lands on a known node.
	pub fn validate(&self) -> Result<()> {
		let mut ids = HashSet::with_capacity(self.nodes.len());
		for node in &self.nodes {
			if !ids.insert(node.id.as_str()) {
				return Err(GraphError::DuplicateNode(node.id.clone()));
			}
		}

		let mut keys = HashSet::with_capacity(self.links.len());
		for link in &self.links {
			for end in [&link.source, &link.target] {
				if !ids.contains(end.as_str()) {
					return Err(GraphError::DanglingEdge {
						key: link.key(),
						node: end.clone(),
					});
				}
			}
			if !keys.insert((link.source.as_str(), link.target.as_str())) {
				return Err(GraphError::DuplicateEdge(link.key()));
			}
		}
		Ok(())
	}
}

/// Position of a node as handed to drawing surfaces and tests.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodePosition {
	pub id: String,
	pub x: f64,
	pub y: f64,
}

#[cfg(test)]
pub(crate) fn node(id: &str) -> GraphNode {
	GraphNode {
		id: id.into(),
		..Default::default()
	}
}

#[cfg(test)]
pub(crate) fn link(source: &str, target: &str) -> GraphLink {
	GraphLink {
		source: source.into(),
		target: target.into(),
		..Default::default()
	}
}

#[cfg(test)]
pub(crate) fn snapshot(ids: &[&str], links: &[(&str, &str)]) -> Snapshot {
	Snapshot {
		equivalent: "UAH".into(),
		generated_at: "2026-01-01T00:00:00Z".into(),
		nodes: ids.iter().map(|id| node(id)).collect(),
		links: links.iter().map(|(s, t)| link(s, t)).collect(),
	}
}
