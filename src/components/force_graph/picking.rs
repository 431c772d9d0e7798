use super::layout::{LayoutEdge, LayoutNode};
use super::types::EdgeKey;

/// What sits under the pointer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pick {
	Node(String),
	Edge(EdgeKey),
}

/// Emitted for detail panels and other listeners outside the canvas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionEvent {
	NodeSelected(String),
	EdgeSelected(EdgeKey),
	Cleared,
	DragStarted(String),
	DragEnded(String),
}

/// Closest node whose disc (plus `slop`) contains the point. Later nodes
/// are drawn on top, so they win ties.
pub fn node_at(nodes: &[LayoutNode], x: f64, y: f64, slop: f64) -> Option<usize> {
	let mut best: Option<(usize, f64)> = None;
	for (i, node) in nodes.iter().enumerate() {
		let d = ((node.x - x).powi(2) + (node.y - y).powi(2)).sqrt();
		if d > node.radius + slop {
			continue;
		}
		if best.is_none_or(|(_, bd)| d <= bd) {
			best = Some((i, d));
		}
	}
	best.map(|(i, _)| i)
}

pub fn edge_at(
	nodes: &[LayoutNode],
	edges: &[LayoutEdge],
	x: f64,
	y: f64,
	tolerance: f64,
) -> Option<usize> {
	let mut best: Option<(usize, f64)> = None;
	for (i, edge) in edges.iter().enumerate() {
		let (a, b) = (&nodes[edge.source], &nodes[edge.target]);
		let d = segment_distance(x, y, a.x, a.y, b.x, b.y);
		if d > tolerance {
			continue;
		}
		if best.is_none_or(|(_, bd)| d <= bd) {
			best = Some((i, d));
		}
	}
	best.map(|(i, _)| i)
}

/// Distance from `(px, py)` to the segment `a..b`. A zero-length segment
/// degrades to point distance.
pub fn segment_distance(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
	let (dx, dy) = (bx - ax, by - ay);
	let len2 = dx * dx + dy * dy;
	let t = if len2 == 0.0 {
		0.0
	} else {
		(((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0)
	};
	let (cx, cy) = (ax + t * dx, ay + t * dy);
	((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}

/// Nodes take priority over edges: they are drawn above them.
pub fn pick(
	nodes: &[LayoutNode],
	edges: &[LayoutEdge],
	x: f64,
	y: f64,
	slop: f64,
	tolerance: f64,
) -> Option<Pick> {
	if let Some(i) = node_at(nodes, x, y, slop) {
		return Some(Pick::Node(nodes[i].node.id.clone()));
	}
	edge_at(nodes, edges, x, y, tolerance).map(|i| Pick::Edge(edges[i].key.clone()))
}

/// Currently highlighted items. Independent of physics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
	pub node: Option<String>,
	pub edge: Option<EdgeKey>,
}

impl Selection {
	pub fn is_empty(&self) -> bool {
		self.node.is_none() && self.edge.is_none()
	}

	pub fn contains_node(&self, id: &str) -> bool {
		self.node.as_deref() == Some(id)
	}

	pub fn contains_edge(&self, key: &EdgeKey) -> bool {
		self.edge.as_ref() == Some(key)
	}

	pub(crate) fn select(&mut self, pick: Option<Pick>) -> SelectionEvent {
		*self = Selection::default();
		match pick {
			Some(Pick::Node(id)) => {
				self.node = Some(id.clone());
				SelectionEvent::NodeSelected(id)
			}
			Some(Pick::Edge(key)) => {
				self.edge = Some(key.clone());
				SelectionEvent::EdgeSelected(key)
			}
			None => SelectionEvent::Cleared,
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct DragState {
	pub node: String,
	/// Pointer-to-node-center offset at grab time, so the node doesn't jump.
	pub offset: (f64, f64),
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::force_graph::layout::LayoutCoordinator;
	use crate::components::force_graph::types::snapshot;

	fn placed(points: &[(&str, f64, f64)], links: &[(&str, &str)]) -> LayoutCoordinator {
		let ids: Vec<&str> = points.iter().map(|p| p.0).collect();
		let mut layout = LayoutCoordinator::new(12.0);
		layout.set_viewport(800.0, 600.0);
		layout.set_snapshot(&snapshot(&ids, links)).unwrap();
		for &(id, x, y) in points {
			let n = layout.node_mut(id).unwrap();
			n.x = x;
			n.y = y;
		}
		layout
	}

	#[test]
	fn segment_distance_cases() {
		assert_eq!(segment_distance(5.0, 3.0, 0.0, 0.0, 10.0, 0.0), 3.0);
		assert_eq!(segment_distance(-4.0, 3.0, 0.0, 0.0, 10.0, 0.0), 5.0);
		assert_eq!(segment_distance(3.0, 4.0, 0.0, 0.0, 0.0, 0.0), 5.0);
	}

	#[test]
	fn node_hit_uses_radius_and_slop() {
		let layout = placed(&[("A", 100.0, 100.0)], &[]);
		assert_eq!(node_at(layout.nodes(), 105.0, 100.0, 0.0), Some(0));
		assert_eq!(node_at(layout.nodes(), 108.0, 100.0, 0.0), None);
		assert_eq!(node_at(layout.nodes(), 108.0, 100.0, 3.0), Some(0));
	}

	#[test]
	fn nearest_node_wins() {
		let layout = placed(&[("A", 100.0, 100.0), ("B", 108.0, 100.0)], &[]);
		assert_eq!(node_at(layout.nodes(), 102.0, 100.0, 0.0), Some(0));
		assert_eq!(node_at(layout.nodes(), 106.0, 100.0, 0.0), Some(1));
	}

	#[test]
	fn pick_prefers_nodes_then_edges() {
		let layout = placed(&[("A", 100.0, 100.0), ("B", 300.0, 100.0)], &[("A", "B")]);
		let pick_at = |x, y| pick(layout.nodes(), layout.edges(), x, y, 0.0, 5.0);
		assert_eq!(pick_at(101.0, 101.0), Some(Pick::Node("A".into())));
		assert_eq!(pick_at(200.0, 104.0), Some(Pick::Edge(EdgeKey::new("A", "B"))));
		assert_eq!(pick_at(200.0, 120.0), None);
	}

	#[test]
	fn selection_replaces_previous() {
		let mut sel = Selection::default();
		assert_eq!(
			sel.select(Some(Pick::Node("A".into()))),
			SelectionEvent::NodeSelected("A".into())
		);
		assert!(sel.contains_node("A"));
		sel.select(Some(Pick::Edge(EdgeKey::new("A", "B"))));
		assert!(!sel.contains_node("A"));
		assert!(sel.contains_edge(&EdgeKey::new("A", "B")));
		assert_eq!(sel.select(None), SelectionEvent::Cleared);
		assert!(sel.is_empty());
	}
}
