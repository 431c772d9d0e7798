use std::collections::HashMap;
use std::f64::consts::PI;

use log::{debug, warn};

use super::error::Result;
use super::types::{EdgeKey, GraphLink, GraphNode, NodePosition, Snapshot};

/// Radius step of the sunflower seed layout.
const SEED_RADIUS: f64 = 10.0;
/// Distance from the neighbour centroid at which a newcomer is dropped.
const NEIGHBOR_OFFSET: f64 = 30.0;

#[derive(Clone, Debug)]
pub struct LayoutNode {
	pub node: GraphNode,
	pub x: f64,
	pub y: f64,
	pub vx: f64,
	pub vy: f64,
	pub radius: f64,
	pub(crate) pin: Option<(f64, f64)>,
}

impl LayoutNode {
	pub fn id(&self) -> &str {
		&self.node.id
	}

	pub fn pin(&self) -> Option<(f64, f64)> {
		self.pin
	}

	pub fn is_pinned(&self) -> bool {
		self.pin.is_some()
	}
}

#[derive(Clone, Debug)]
pub struct LayoutEdge {
	pub link: GraphLink,
	pub key: EdgeKey,
	/// Index of the source node in the working array.
	pub source: usize,
	pub target: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
	pub width: f64,
	pub height: f64,
}

impl Viewport {
	pub fn new(width: f64, height: f64) -> Option<Self> {
		let valid = width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0;
		valid.then_some(Self { width, height })
	}

	pub fn center(&self) -> (f64, f64) {
		(self.width / 2.0, self.height / 2.0)
	}

	pub fn area(&self) -> f64 {
		self.width * self.height
	}
}

/// How a snapshot swap changed the working set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
	pub kept: usize,
	pub added: usize,
	pub removed: usize,
}

/// Owns the node/edge working arrays and their lookup maps.
///
/// Arrays and maps are only ever replaced together, so an index taken from a
/// map always points into the array it was built for.
pub struct LayoutCoordinator {
	nodes: Vec<LayoutNode>,
	edges: Vec<LayoutEdge>,
	node_index: HashMap<String, usize>,
	edge_index: HashMap<EdgeKey, usize>,
	viewport: Option<Viewport>,
	equivalent: String,
	generated_at: String,
	default_node_size: f64,
}

impl LayoutCoordinator {
	pub fn new(default_node_size: f64) -> Self {
		Self {
			nodes: Vec::new(),
			edges: Vec::new(),
			node_index: HashMap::new(),
			edge_index: HashMap::new(),
			viewport: None,
			equivalent: String::new(),
			generated_at: String::new(),
			default_node_size,
		}
	}

	pub fn nodes(&self) -> &[LayoutNode] {
		&self.nodes
	}

	pub fn edges(&self) -> &[LayoutEdge] {
		&self.edges
	}

	pub fn viewport(&self) -> Option<Viewport> {
		self.viewport
	}

	pub fn equivalent(&self) -> &str {
		&self.equivalent
	}

	pub fn generated_at(&self) -> &str {
		&self.generated_at
	}

	pub fn node_idx(&self, id: &str) -> Option<usize> {
		self.node_index.get(id).copied()
	}

	pub fn node(&self, id: &str) -> Option<&LayoutNode> {
		self.node_idx(id).map(|i| &self.nodes[i])
	}

	pub fn edge_idx(&self, key: &EdgeKey) -> Option<usize> {
		self.edge_index.get(key).copied()
	}

	pub fn edge(&self, key: &EdgeKey) -> Option<&LayoutEdge> {
		self.edge_idx(key).map(|i| &self.edges[i])
	}

	pub fn positions(&self) -> Vec<NodePosition> {
		self.nodes
			.iter()
			.map(|n| NodePosition {
				id: n.node.id.clone(),
				x: n.x,
				y: n.y,
			})
			.collect()
	}

	pub(crate) fn parts_mut(&mut self) -> (&mut [LayoutNode], &[LayoutEdge]) {
		(&mut self.nodes, &self.edges)
	}

	pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut LayoutNode> {
		let idx = self.node_idx(id)?;
		Some(&mut self.nodes[idx])
	}

	/// Replaces the working set with `snapshot`.
	///
	/// Nodes that survive keep position, velocity and pin. The snapshot is
	/// validated first; on error nothing is touched.
	pub fn set_snapshot(&mut self, snapshot: &Snapshot) -> Result<SnapshotDiff> {
		snapshot.validate()?;

		let mut node_index = HashMap::with_capacity(snapshot.nodes.len());
		for (i, node) in snapshot.nodes.iter().enumerate() {
			node_index.insert(node.id.clone(), i);
		}

		let mut edges = Vec::with_capacity(snapshot.links.len());
		let mut edge_index = HashMap::with_capacity(snapshot.links.len());
		for link in &snapshot.links {
			let key = link.key();
			edge_index.insert(key.clone(), edges.len());
			edges.push(LayoutEdge {
				source: node_index[&link.source],
				target: node_index[&link.target],
				link: link.clone(),
				key,
			});
		}

		let mut diff = SnapshotDiff::default();
		let mut nodes = Vec::with_capacity(snapshot.nodes.len());
		let mut placed = vec![false; snapshot.nodes.len()];
		for (i, node) in snapshot.nodes.iter().enumerate() {
			let radius = self.radius_for(node);
			let previous = self.node(&node.id);
			if previous.is_some() {
				diff.kept += 1;
				placed[i] = true;
			} else {
				diff.added += 1;
			}
			let (x, y, vx, vy, pin) = previous
				.map(|p| (p.x, p.y, p.vx, p.vy, p.pin))
				.unwrap_or((0.0, 0.0, 0.0, 0.0, None));
			nodes.push(LayoutNode {
				node: node.clone(),
				x,
				y,
				vx,
				vy,
				radius,
				pin,
			});
		}
		diff.removed = self.nodes.len() - diff.kept;

		let center = self.seed_center();
		for i in 0..nodes.len() {
			if placed[i] {
				continue;
			}
			let (x, y) = seed_near_neighbors(&nodes, &edges, &placed, i)
				.unwrap_or_else(|| phyllotaxis(i, center));
			nodes[i].x = x;
			nodes[i].y = y;
			placed[i] = true;
		}

		self.nodes = nodes;
		self.edges = edges;
		self.node_index = node_index;
		self.edge_index = edge_index;
		self.equivalent = snapshot.equivalent.clone();
		self.generated_at = snapshot.generated_at.clone();

		debug!(
			"snapshot {} @ {}: {} kept, {} added, {} removed, {} edges",
			self.equivalent,
			self.generated_at,
			diff.kept,
			diff.added,
			diff.removed,
			self.edges.len()
		);
		Ok(diff)
	}

	/// Fits the layout to new bounds. Returns whether a relayout happened;
	/// an unusable size is ignored, keeping the previous viewport (or none).
	pub fn set_viewport(&mut self, width: f64, height: f64) -> bool {
		let Some(next) = Viewport::new(width, height) else {
			warn!("ignoring viewport {width}x{height}; relayout deferred");
			return false;
		};
		match self.viewport.replace(next) {
			Some(prev) if prev == next => false,
			Some(prev) => {
				self.rescale(prev, next);
				true
			}
			None => {
				self.reseed();
				true
			}
		}
	}

	/// Throws away every position and lays all nodes out on the seed spiral.
	pub fn reseed(&mut self) {
		let center = self.seed_center();
		for (i, node) in self.nodes.iter_mut().enumerate() {
			let (x, y) = node.pin.unwrap_or_else(|| phyllotaxis(i, center));
			node.x = x;
			node.y = y;
			node.vx = 0.0;
			node.vy = 0.0;
		}
	}

	fn rescale(&mut self, prev: Viewport, next: Viewport) {
		let (pcx, pcy) = prev.center();
		let (ncx, ncy) = next.center();
		let (sx, sy) = (next.width / prev.width, next.height / prev.height);
		let map = |x: f64, y: f64| ((x - pcx) * sx + ncx, (y - pcy) * sy + ncy);
		for node in &mut self.nodes {
			(node.x, node.y) = map(node.x, node.y);
			node.pin = node.pin.map(|(x, y)| map(x, y));
		}
		debug!(
			"relayout {}x{} -> {}x{}",
			prev.width, prev.height, next.width, next.height
		);
	}

	fn seed_center(&self) -> (f64, f64) {
		self.viewport.map(|v| v.center()).unwrap_or((0.0, 0.0))
	}

	fn radius_for(&self, node: &GraphNode) -> f64 {
		let size = node
			.size
			.filter(|s| s.is_finite() && *s > 0.0)
			.unwrap_or(self.default_node_size);
		(size / 2.0).max(1.0)
	}
}

/// Sunflower spiral: even density, no two seeds coincide.
fn phyllotaxis(i: usize, (cx, cy): (f64, f64)) -> (f64, f64) {
	let golden = PI * (3.0 - 5f64.sqrt());
	let r = SEED_RADIUS * (0.5 + i as f64).sqrt();
	let a = i as f64 * golden;
	(cx + r * a.cos(), cy + r * a.sin())
}

fn seed_near_neighbors(
	nodes: &[LayoutNode],
	edges: &[LayoutEdge],
	placed: &[bool],
	i: usize,
) -> Option<(f64, f64)> {
	let (mut sx, mut sy, mut count) = (0.0, 0.0, 0usize);
	for edge in edges {
		let other = if edge.source == i {
			edge.target
		} else if edge.target == i {
			edge.source
		} else {
			continue;
		};
		if other != i && placed[other] {
			sx += nodes[other].x;
			sy += nodes[other].y;
			count += 1;
		}
	}
	if count == 0 {
		return None;
	}
	let angle = stable_unit(&nodes[i].node.id) * 2.0 * PI;
	Some((
		sx / count as f64 + NEIGHBOR_OFFSET * angle.cos(),
		sy / count as f64 + NEIGHBOR_OFFSET * angle.sin(),
	))
}

/// FNV-1a of `s` mapped into `[0, 1)`.
fn stable_unit(s: &str) -> f64 {
	let mut h: u64 = 0xcbf29ce484222325;
	for b in s.bytes() {
		h ^= b as u64;
		h = h.wrapping_mul(0x100000001b3);
	}
	(h >> 11) as f64 / (1u64 << 53) as f64
}
