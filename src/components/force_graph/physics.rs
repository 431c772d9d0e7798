use serde::{Deserialize, Serialize};

use super::layout::{LayoutCoordinator, LayoutEdge, LayoutNode, Viewport};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
	/// Alpha after `reheat()`.
	pub alpha_start: f64,
	/// Below this the simulation counts as settled.
	pub alpha_min: f64,
	pub alpha_target: f64,
	pub alpha_decay: f64,
	/// Multiplier applied to velocity every tick.
	pub velocity_decay: f64,
	pub max_velocity: f64,
	pub center_strength: f64,
	pub charge_strength: f64,
	/// Repulsion cutoff as a multiple of the ideal spacing `k`.
	pub cutoff_factor: f64,
	pub link_distance: f64,
	pub link_strength: f64,
	pub collision_padding: f64,
	pub collision_strength: f64,
	pub boundary_margin: f64,
	pub boundary_strength: f64,
	pub min_distance: f64,
}

impl Default for PhysicsConfig {
	fn default() -> Self {
		Self {
			alpha_start: 1.0,
			alpha_min: 0.001,
			alpha_target: 0.0,
			// reaches alpha_min from 1.0 in ~300 ticks
			alpha_decay: 1.0 - 0.001f64.powf(1.0 / 300.0),
			velocity_decay: 0.6,
			max_velocity: 40.0,
			center_strength: 0.1,
			charge_strength: 1500.0,
			cutoff_factor: 3.0,
			link_distance: 90.0,
			link_strength: 0.4,
			collision_padding: 2.0,
			collision_strength: 0.7,
			boundary_margin: 24.0,
			boundary_strength: 0.1,
			min_distance: 0.5,
		}
	}
}

/// Tick-based force simulation over the coordinator's working set.
///
/// Positions and velocities live in the coordinator's `LayoutNode`s; the
/// engine only keeps the temperature and scratch buffers.
pub struct PhysicsEngine {
	config: PhysicsConfig,
	alpha: f64,
	forces: Vec<(f64, f64)>,
}

impl PhysicsEngine {
	pub fn new(config: PhysicsConfig) -> Self {
		Self {
			alpha: config.alpha_start,
			config,
			forces: Vec::new(),
		}
	}

	pub fn config(&self) -> &PhysicsConfig {
		&self.config
	}

	pub fn alpha(&self) -> f64 {
		self.alpha
	}

	pub fn is_active(&self) -> bool {
		self.alpha >= self.config.alpha_min
	}

	pub fn reheat(&mut self) {
		self.alpha = self.alpha.max(self.config.alpha_start);
	}

	/// Marks the simulation settled without touching positions.
	pub fn settle(&mut self) {
		self.alpha = 0.0;
	}

	/// Fixes a node at `(x, y)`. It stops integrating but keeps pushing others.
	pub fn pin(&mut self, layout: &mut LayoutCoordinator, id: &str, x: f64, y: f64) -> bool {
		let Some(node) = layout.node_mut(id) else {
			return false;
		};
		node.pin = Some((x, y));
		node.x = x;
		node.y = y;
		node.vx = 0.0;
		node.vy = 0.0;
		true
	}

	pub fn unpin(&mut self, layout: &mut LayoutCoordinator, id: &str) -> bool {
		match layout.node_mut(id) {
			Some(node) => node.pin.take().is_some(),
			None => false,
		}
	}

	pub fn pinned_ids<'a>(&self, layout: &'a LayoutCoordinator) -> impl Iterator<Item = &'a str> {
		layout.nodes().iter().filter(|n| n.is_pinned()).map(|n| n.id())
	}

	/// Advances one step. Returns whether the simulation is still active.
	pub fn tick(&mut self, layout: &mut LayoutCoordinator) -> bool {
		let viewport = layout.viewport();
		let (nodes, edges) = layout.parts_mut();
		if nodes.len() <= 1 {
			self.settle();
			return false;
		}
		if !self.is_active() {
			return false;
		}
		// no bounds yet: settle until a viewport reheats us
		let Some(viewport) = viewport else {
			self.settle();
			return false;
		};

		self.alpha -= (self.alpha - self.config.alpha_target) * self.config.alpha_decay;
		self.step(nodes, edges, viewport);
		self.is_active()
	}

	/// Deterministic layout: reseeds, runs `iterations` steps on a fixed
	/// alpha schedule and leaves the engine settled. No clock is involved.
	pub fn relax(&mut self, layout: &mut LayoutCoordinator, iterations: usize) {
		layout.reseed();
		let viewport = layout.viewport();
		let (nodes, edges) = layout.parts_mut();
		if let Some(viewport) = viewport {
			if nodes.len() > 1 {
				self.alpha = self.config.alpha_start;
				for _ in 0..iterations {
					self.alpha -= (self.alpha - self.config.alpha_target) * self.config.alpha_decay;
					self.step(nodes, edges, viewport);
				}
			}
		}
		self.settle();
	}

	fn step(&mut self, nodes: &mut [LayoutNode], edges: &[LayoutEdge], viewport: Viewport) {
		let cfg = &self.config;
		let alpha = self.alpha;
		let n = nodes.len();
		self.forces.clear();
		self.forces.resize(n, (0.0, 0.0));
		let forces = &mut self.forces;

		// center: shift the whole cloud, don't squeeze it
		let (cx, cy) = viewport.center();
		let free = nodes.iter().filter(|n| !n.is_pinned()).count();
		if free > 0 {
			let (mx, my) = nodes
				.iter()
				.filter(|n| !n.is_pinned())
				.fold((0.0, 0.0), |(sx, sy), n| (sx + n.x, sy + n.y));
			let (mx, my) = (mx / free as f64, my / free as f64);
			let (px, py) = (
				(cx - mx) * cfg.center_strength * alpha,
				(cy - my) * cfg.center_strength * alpha,
			);
			for f in forces.iter_mut() {
				f.0 += px;
				f.1 += py;
			}
		}

		// repulsion + collision, one pass over pairs
		let k = (viewport.area() / n as f64).sqrt();
		let cutoff2 = (k * cfg.cutoff_factor).powi(2);
		let min2 = cfg.min_distance * cfg.min_distance;
		for i in 0..n {
			for j in (i + 1)..n {
				let (a, b) = (&nodes[i], &nodes[j]);
				if a.is_pinned() && b.is_pinned() {
					continue;
				}
				let (mut dx, mut dy) = (a.x - b.x, a.y - b.y);
				let mut d2 = dx * dx + dy * dy;
				if d2 > cutoff2 {
					continue;
				}
				if d2 == 0.0 {
					(dx, dy) = jitter(i, j);
					d2 = dx * dx + dy * dy;
				}
				let len = d2.sqrt();
				let (ux, uy) = (dx / len, dy / len);
				let d2 = d2.max(min2);
				let d = d2.sqrt();

				let mut push = cfg.charge_strength * alpha / d2;
				let overlap = a.radius + b.radius + cfg.collision_padding - d;
				if overlap > 0.0 {
					push += overlap * cfg.collision_strength * 0.5;
				}
				forces[i].0 += ux * push;
				forces[i].1 += uy * push;
				forces[j].0 -= ux * push;
				forces[j].1 -= uy * push;
			}
		}

		// springs
		for edge in edges {
			let (s, t) = (edge.source, edge.target);
			if s == t {
				continue;
			}
			let (dx, dy) = (nodes[t].x - nodes[s].x, nodes[t].y - nodes[s].y);
			let d = (dx * dx + dy * dy).sqrt().max(cfg.min_distance);
			let l = (d - cfg.link_distance) / d * cfg.link_strength * alpha * 0.5;
			forces[s].0 += dx * l;
			forces[s].1 += dy * l;
			forces[t].0 -= dx * l;
			forces[t].1 -= dy * l;
		}

		// boundary
		let m = cfg.boundary_margin;
		for (node, f) in nodes.iter().zip(forces.iter_mut()) {
			if node.x < m {
				f.0 += (m - node.x) * cfg.boundary_strength;
			} else if node.x > viewport.width - m {
				f.0 -= (node.x - (viewport.width - m)) * cfg.boundary_strength;
			}
			if node.y < m {
				f.1 += (m - node.y) * cfg.boundary_strength;
			} else if node.y > viewport.height - m {
				f.1 -= (node.y - (viewport.height - m)) * cfg.boundary_strength;
			}
		}

		for (node, &(fx, fy)) in nodes.iter_mut().zip(forces.iter()) {
			if let Some((px, py)) = node.pin {
				node.x = px;
				node.y = py;
				node.vx = 0.0;
				node.vy = 0.0;
				continue;
			}
			node.vx = (node.vx + fx) * cfg.velocity_decay;
			node.vy = (node.vy + fy) * cfg.velocity_decay;
			let speed = (node.vx * node.vx + node.vy * node.vy).sqrt();
			if speed > cfg.max_velocity {
				let s = cfg.max_velocity / speed;
				node.vx *= s;
				node.vy *= s;
			}
			node.x += node.vx;
			node.y += node.vy;
		}
	}
}

/// Separation direction for two nodes sitting on the exact same spot.
fn jitter(i: usize, j: usize) -> (f64, f64) {
	let a = (i * 31 + j * 17) as f64 * 2.399_963;
	(a.cos() * 1e-3, a.sin() * 1e-3)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::force_graph::types::snapshot;

	fn layout_for(ids: &[&str], links: &[(&str, &str)]) -> LayoutCoordinator {
		let mut layout = LayoutCoordinator::new(12.0);
		layout.set_viewport(800.0, 600.0);
		layout.set_snapshot(&snapshot(ids, links)).unwrap();
		layout
	}

	fn dist(layout: &LayoutCoordinator, a: &str, b: &str) -> f64 {
		let (a, b) = (layout.node(a).unwrap(), layout.node(b).unwrap());
		((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
	}

	#[test]
	fn empty_and_single_node_settle_immediately() {
		let mut engine = PhysicsEngine::new(PhysicsConfig::default());
		let mut empty = layout_for(&[], &[]);
		assert!(!engine.tick(&mut empty));
		assert!(!engine.is_active());

		let mut engine = PhysicsEngine::new(PhysicsConfig::default());
		let mut one = layout_for(&["A"], &[]);
		let before = (one.nodes()[0].x, one.nodes()[0].y);
		assert!(!engine.tick(&mut one));
		assert_eq!((one.nodes()[0].x, one.nodes()[0].y), before);
	}

	#[test]
	fn missing_viewport_settles() {
		let mut layout = LayoutCoordinator::new(12.0);
		layout.set_snapshot(&snapshot(&["A", "B"], &[("A", "B")])).unwrap();
		let mut engine = PhysicsEngine::new(PhysicsConfig::default());
		assert!(engine.is_active());
		assert!(!engine.tick(&mut layout));
		assert!(!engine.is_active());

		layout.set_viewport(800.0, 600.0);
		engine.reheat();
		assert!(engine.tick(&mut layout));
	}

	#[test]
	fn two_nodes_converge_to_link_distance() {
		let mut layout = layout_for(&["A", "B"], &[("A", "B")]);
		let mut engine = PhysicsEngine::new(PhysicsConfig::default());
		let mut ticks = 0;
		while engine.tick(&mut layout) {
			ticks += 1;
			assert!(ticks < 1000, "simulation never settled");
		}
		let ideal = engine.config().link_distance;
		let d = dist(&layout, "A", "B");
		assert!((d - ideal).abs() < ideal * 0.05, "separation {d}, ideal {ideal}");
	}

	#[test]
	fn pinned_node_never_moves() {
		let mut layout = layout_for(&["A", "B", "C"], &[("A", "B"), ("B", "C")]);
		let mut engine = PhysicsEngine::new(PhysicsConfig::default());
		assert!(engine.pin(&mut layout, "B", 123.0, 321.0));
		for _ in 0..200 {
			engine.tick(&mut layout);
			let b = layout.node("B").unwrap();
			assert_eq!((b.x, b.y), (123.0, 321.0));
		}
		assert_eq!(engine.pinned_ids(&layout).collect::<Vec<_>>(), ["B"]);

		assert!(engine.unpin(&mut layout, "B"));
		engine.reheat();
		for _ in 0..5 {
			engine.tick(&mut layout);
		}
		let b = layout.node("B").unwrap();
		assert_ne!((b.x, b.y), (123.0, 321.0));
	}

	#[test]
	fn pinned_node_still_pushes_others() {
		let mut layout = layout_for(&["A", "B"], &[]);
		let mut engine = PhysicsEngine::new(PhysicsConfig::default());
		engine.pin(&mut layout, "A", 400.0, 300.0);
		let before = dist(&layout, "A", "B");
		for _ in 0..30 {
			engine.tick(&mut layout);
		}
		assert!(dist(&layout, "A", "B") > before);
	}

	#[test]
	fn coincident_nodes_separate() {
		let mut layout = layout_for(&["A", "B"], &[("A", "B")]);
		for id in ["A", "B"] {
			let n = layout.node_mut(id).unwrap();
			n.x = 400.0;
			n.y = 300.0;
		}
		let mut engine = PhysicsEngine::new(PhysicsConfig::default());
		for _ in 0..50 {
			engine.tick(&mut layout);
		}
		assert!(layout.nodes().iter().all(|n| n.x.is_finite() && n.y.is_finite()));
		assert!(dist(&layout, "A", "B") > 1.0);
	}

	#[test]
	fn boundary_pulls_strays_back() {
		let mut layout = layout_for(&["A", "B"], &[]);
		layout.node_mut("A").unwrap().x = -200.0;
		let mut engine = PhysicsEngine::new(PhysicsConfig::default());
		for _ in 0..200 {
			engine.tick(&mut layout);
		}
		assert!(layout.node("A").unwrap().x > 0.0);
	}

	#[test]
	fn relax_is_deterministic() {
		let ids = ["A", "B", "C", "D", "E"];
		let links = [("A", "B"), ("B", "C"), ("C", "A"), ("D", "E")];
		let mut layout = layout_for(&ids, &links);
		let mut engine = PhysicsEngine::new(PhysicsConfig::default());
		engine.relax(&mut layout, 200);
		let first = layout.positions();
		assert!(!engine.is_active());

		engine.relax(&mut layout, 200);
		assert_eq!(layout.positions(), first);
	}

	#[test]
	fn reheat_wakes_a_settled_engine() {
		let mut layout = layout_for(&["A", "B"], &[("A", "B")]);
		let mut engine = PhysicsEngine::new(PhysicsConfig::default());
		engine.settle();
		assert!(!engine.tick(&mut layout));
		engine.reheat();
		assert!(engine.tick(&mut layout));
	}
}
