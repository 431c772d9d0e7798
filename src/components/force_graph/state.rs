use std::collections::HashSet;

use log::{debug, warn};

use super::config::GraphConfig;
use super::error::{GraphError, Result};
use super::events::{EventInput, LiveEvent, Normalizer, Playlist, normalize_at};
use super::fx::{FxEngine, FxTarget};
use super::layout::{LayoutCoordinator, SnapshotDiff};
use super::physics::PhysicsEngine;
use super::picking::{DragState, Pick, Selection, SelectionEvent, node_at, pick};
use super::playback::Playback;
use super::scheduler::FrameTarget;
use super::types::{NodePosition, Snapshot};

const MIN_ZOOM: f64 = 0.1;
const MAX_ZOOM: f64 = 10.0;
/// Seconds a pointer must rest on a node before its highlight fades in.
const HOVER_DELAY: f64 = 0.08;
const FADE_IN_SPEED: f64 = 1.8;
const FADE_OUT_SPEED: f64 = 1.26;
/// Longest frame gap the hover fade integrates, in seconds.
const MAX_FRAME_DT: f64 = 0.1;

/// Screen = graph * k + (x, y).
#[derive(Clone, Debug, PartialEq)]
pub struct ViewTransform {
	pub x: f64,
	pub y: f64,
	pub k: f64,
}

impl Default for ViewTransform {
	fn default() -> Self {
		Self {
			x: 0.0,
			y: 0.0,
			k: 1.0,
		}
	}
}

impl ViewTransform {
	pub fn screen_to_graph(&self, sx: f64, sy: f64) -> (f64, f64) {
		((sx - self.x) / self.k, (sy - self.y) / self.k)
	}

	pub fn graph_to_screen(&self, gx: f64, gy: f64) -> (f64, f64) {
		(gx * self.k + self.x, gy * self.k + self.y)
	}

	/// Zooms by `factor` keeping the graph point under `(sx, sy)` fixed.
	pub fn zoom_at(&mut self, sx: f64, sy: f64, factor: f64) {
		let k = (self.k * factor).clamp(MIN_ZOOM, MAX_ZOOM);
		let ratio = k / self.k;
		self.x = sx - (sx - self.x) * ratio;
		self.y = sy - (sy - self.y) * ratio;
		self.k = k;
	}
}

#[derive(Clone, Debug, Default)]
pub struct PanState {
	pub active: bool,
	pub start_x: f64,
	pub start_y: f64,
	pub transform_start_x: f64,
	pub transform_start_y: f64,
}

#[derive(Clone, Debug, Default)]
pub struct HoverState {
	pub node: Option<String>,
	pub neighbors: HashSet<String>,
	pub highlight_t: f64,
	pub prev_node: Option<String>,
	pub prev_neighbors: HashSet<String>,
	delay_t: f64,
}

impl HoverState {
	/// Eases `highlight_t` by `dt` seconds. Returns whether it still moves.
	fn step(&mut self, dt: f64) -> bool {
		if self.node.is_some() {
			self.delay_t = (self.delay_t + dt).min(HOVER_DELAY);
			if self.delay_t >= HOVER_DELAY {
				self.highlight_t += (1.0 - self.highlight_t) * FADE_IN_SPEED * dt;
				if self.highlight_t > 0.99 {
					self.highlight_t = 1.0;
				}
			}
			return self.highlight_t < 1.0;
		}
		if self.prev_node.is_none() && self.highlight_t == 0.0 {
			return false;
		}
		self.highlight_t -= self.highlight_t * FADE_OUT_SPEED * dt;
		if self.highlight_t < 0.01 {
			self.highlight_t = 0.0;
			self.prev_node = None;
			self.prev_neighbors.clear();
		}
		true
	}
}

/// One engine instance: the working set, physics, FX overlay and pointer
/// state behind a single canvas.
pub struct GraphState {
	config: GraphConfig,
	layout: LayoutCoordinator,
	physics: PhysicsEngine,
	normalizer: Normalizer,
	fx: FxEngine,
	selection: Selection,
	drag: Option<DragState>,
	playback: Option<Playback>,
	pub transform: ViewTransform,
	pub pan: PanState,
	pub hover: HoverState,
	now_ms: f64,
	last_frame: Option<f64>,
	redraw: bool,
	selection_events: Vec<SelectionEvent>,
	errors: Vec<GraphError>,
}

impl GraphState {
	pub fn new(config: GraphConfig) -> Self {
		Self {
			layout: LayoutCoordinator::new(config.default_node_size),
			physics: PhysicsEngine::new(config.physics.clone()),
			normalizer: Normalizer::new(),
			fx: FxEngine::new(config.fx.clone(), config.limits.clone()),
			selection: Selection::default(),
			drag: None,
			playback: None,
			transform: ViewTransform::default(),
			pan: PanState::default(),
			hover: HoverState::default(),
			now_ms: 0.0,
			last_frame: None,
			redraw: true,
			selection_events: Vec::new(),
			errors: Vec::new(),
			config,
		}
	}

	pub fn config(&self) -> &GraphConfig {
		&self.config
	}

	pub fn layout(&self) -> &LayoutCoordinator {
		&self.layout
	}

	pub fn physics(&self) -> &PhysicsEngine {
		&self.physics
	}

	pub fn fx(&self) -> &FxEngine {
		&self.fx
	}

	pub fn selection(&self) -> &Selection {
		&self.selection
	}

	pub fn drag(&self) -> Option<&DragState> {
		self.drag.as_ref()
	}

	pub fn playback(&self) -> Option<&Playback> {
		self.playback.as_ref()
	}

	pub fn playback_mut(&mut self) -> Option<&mut Playback> {
		self.redraw = true;
		self.playback.as_mut()
	}

	/// Timestamp of the current frame; live events spawn at this time. Zero
	/// until the first frame, which moves anything spawned earlier onto its clock.
	pub fn now_ms(&self) -> f64 {
		self.now_ms
	}

	pub fn positions(&self) -> Vec<NodePosition> {
		self.layout.positions()
	}

	/// Selection changes since the last call, oldest first.
	pub fn take_selection_events(&mut self) -> Vec<SelectionEvent> {
		std::mem::take(&mut self.selection_events)
	}

	/// Playlist steps that stopped resolving after a snapshot swap.
	pub fn take_errors(&mut self) -> Vec<GraphError> {
		std::mem::take(&mut self.errors)
	}

	/// Replaces the working set. On error nothing changes.
	pub fn set_snapshot(&mut self, snapshot: &Snapshot) -> Result<SnapshotDiff> {
		let diff = self.layout.set_snapshot(snapshot)?;

		let layout = &self.layout;
		let expired = self.fx.expire_where(self.now_ms, |target| match target {
			FxTarget::Node(id) => layout.node(id).is_none(),
			FxTarget::Edge(key) => layout.edge(key).is_none(),
		});
		if expired > 0 {
			debug!("{expired} fx entities lost their target");
		}
		self.drop_stale_interaction();

		if self.config.test_mode {
			self.physics.relax(&mut self.layout, self.config.relax_iterations);
		} else {
			self.physics.reheat();
		}
		self.redraw = true;
		Ok(diff)
	}

	pub fn set_viewport(&mut self, width: f64, height: f64) -> bool {
		if !self.layout.set_viewport(width, height) {
			return false;
		}
		if self.config.test_mode {
			self.physics.relax(&mut self.layout, self.config.relax_iterations);
		} else {
			self.physics.reheat();
		}
		self.redraw = true;
		true
	}

	/// Loads `snapshot` and lays it out with the fixed relaxation pass,
	/// independent of any clock.
	pub fn relax(&mut self, snapshot: &Snapshot) -> Result<Vec<NodePosition>> {
		self.set_snapshot(snapshot)?;
		if !self.config.test_mode {
			self.physics.relax(&mut self.layout, self.config.relax_iterations);
		}
		Ok(self.layout.positions())
	}

	pub fn reheat(&mut self) {
		self.physics.reheat();
	}

	/// Normalizes a live event and spawns its FX at the current frame time.
	pub fn push_event(&mut self, event: LiveEvent) -> Result<usize> {
		let event = self.normalizer.normalize(EventInput::Live(event), &self.layout)?;
		self.redraw = true;
		Ok(self.fx.spawn_from_event(&event, self.now_ms))
	}

	pub fn push_json(&mut self, json: &str) -> Result<usize> {
		let event = self.normalizer.normalize_json(json, &self.layout)?;
		self.redraw = true;
		Ok(self.fx.spawn_from_event(&event, self.now_ms))
	}

	/// Checks every step against the current snapshot, then installs the
	/// playlist stopped at its start.
	pub fn load_playlist(&mut self, playlist: Playlist) -> Result<()> {
		self.normalizer.normalize_playlist(&playlist, &self.layout)?;
		if let Some(equivalent) = &playlist.equivalent {
			if equivalent != self.layout.equivalent() {
				warn!(
					"playlist is for {equivalent}, snapshot is {}",
					self.layout.equivalent()
				);
			}
		}
		debug!("playlist loaded, {} steps", playlist.steps.len());
		self.playback = Some(Playback::new(playlist));
		Ok(())
	}

	pub fn screen_to_graph(&self, sx: f64, sy: f64) -> (f64, f64) {
		self.transform.screen_to_graph(sx, sy)
	}

	/// Selects what is under the pointer and grabs it if it is a node.
	/// Returns whether a drag started; otherwise the host may pan.
	pub fn pointer_down(&mut self, sx: f64, sy: f64) -> bool {
		let (x, y) = self.screen_to_graph(sx, sy);
		let hit = pick(
			self.layout.nodes(),
			self.layout.edges(),
			x,
			y,
			self.config.pick_slop,
			self.config.edge_tolerance,
		);
		let had_selection = !self.selection.is_empty();
		let event = self.selection.select(hit.clone());
		if had_selection || event != SelectionEvent::Cleared {
			self.selection_events.push(event);
		}
		self.redraw = true;

		let Some(Pick::Node(id)) = hit else {
			return false;
		};
		let Some((nx, ny)) = self.layout.node(&id).map(|n| (n.x, n.y)) else {
			return false;
		};
		self.physics.pin(&mut self.layout, &id, nx, ny);
		self.physics.reheat();
		self.drag = Some(DragState {
			node: id.clone(),
			offset: (nx - x, ny - y),
		});
		self.selection_events.push(SelectionEvent::DragStarted(id));
		true
	}

	/// Drags the grabbed node, pans, or updates hover, in that order.
	pub fn pointer_move(&mut self, sx: f64, sy: f64) {
		if let Some(drag) = &self.drag {
			let (x, y) = self.screen_to_graph(sx, sy);
			let (px, py) = (x + drag.offset.0, y + drag.offset.1);
			let id = drag.node.clone();
			self.physics.pin(&mut self.layout, &id, px, py);
			self.physics.reheat();
			self.redraw = true;
		} else if self.pan.active {
			self.transform.x = self.pan.transform_start_x + (sx - self.pan.start_x);
			self.transform.y = self.pan.transform_start_y + (sy - self.pan.start_y);
			self.redraw = true;
		} else {
			let (x, y) = self.screen_to_graph(sx, sy);
			let hovered = node_at(self.layout.nodes(), x, y, self.config.pick_slop)
				.map(|i| self.layout.nodes()[i].id().to_owned());
			self.set_hover(hovered);
		}
	}

	/// Releases a drag (the node goes back to the simulation) and ends panning.
	pub fn pointer_up(&mut self) {
		self.pan.active = false;
		if let Some(drag) = self.drag.take() {
			self.physics.unpin(&mut self.layout, &drag.node);
			self.physics.reheat();
			self.selection_events.push(SelectionEvent::DragEnded(drag.node));
			self.redraw = true;
		}
	}

	pub fn pointer_leave(&mut self) {
		self.pointer_up();
		self.set_hover(None);
	}

	pub fn begin_pan(&mut self, sx: f64, sy: f64) {
		self.pan = PanState {
			active: true,
			start_x: sx,
			start_y: sy,
			transform_start_x: self.transform.x,
			transform_start_y: self.transform.y,
		};
	}

	/// Wheel zoom around the pointer: scrolling down zooms out.
	pub fn wheel(&mut self, sx: f64, sy: f64, delta_y: f64) {
		let factor = if delta_y > 0.0 { 0.9 } else { 1.1 };
		self.transform.zoom_at(sx, sy, factor);
		self.redraw = true;
	}

	pub fn set_hover(&mut self, node: Option<String>) {
		if self.hover.node == node {
			return;
		}
		let was_hovering = self.hover.node.is_some();

		// keep the old highlight around so it can fade out
		if was_hovering && node.is_none() {
			self.hover.prev_node = self.hover.node.take();
			self.hover.prev_neighbors = std::mem::take(&mut self.hover.neighbors);
		} else {
			self.hover.prev_node = None;
			self.hover.prev_neighbors.clear();
		}

		self.hover.neighbors = node
			.as_deref()
			.map(|id| self.neighbors_of(id))
			.unwrap_or_default();
		if node.is_some() && !was_hovering {
			self.hover.delay_t = 0.0;
		}
		self.hover.node = node;
		self.redraw = true;
	}

	pub fn is_highlighted(&self, id: &str) -> bool {
		self.is_hovered(id)
			|| self.hover.neighbors.contains(id)
			|| self.hover.prev_neighbors.contains(id)
	}

	pub fn is_hovered(&self, id: &str) -> bool {
		self.hover.node.as_deref() == Some(id) || self.hover.prev_node.as_deref() == Some(id)
	}

	pub fn has_active_highlight(&self) -> bool {
		self.hover.node.is_some() || self.hover.prev_node.is_some()
	}

	fn neighbors_of(&self, id: &str) -> HashSet<String> {
		let nodes = self.layout.nodes();
		self.layout
			.edges()
			.iter()
			.filter_map(|e| {
				let (s, t) = (nodes[e.source].id(), nodes[e.target].id());
				if s == id {
					Some(t.to_owned())
				} else if t == id {
					Some(s.to_owned())
				} else {
					None
				}
			})
			.collect()
	}

	/// Forgets selection, drag and hover that point at ids the current
	/// snapshot no longer has.
	fn drop_stale_interaction(&mut self) {
		let node_gone = |id: &String| self.layout.node(id).is_none();
		let stale_selection = self.selection.node.as_ref().is_some_and(node_gone)
			|| self
				.selection
				.edge
				.as_ref()
				.is_some_and(|key| self.layout.edge(key).is_none());
		if stale_selection {
			self.selection = Selection::default();
			self.selection_events.push(SelectionEvent::Cleared);
		}

		if self.drag.as_ref().is_some_and(|d| node_gone(&d.node)) {
			if let Some(drag) = self.drag.take() {
				self.selection_events.push(SelectionEvent::DragEnded(drag.node));
			}
		}

		match self.hover.node.clone() {
			Some(id) if self.layout.node(&id).is_none() => self.hover = HoverState::default(),
			Some(id) => self.hover.neighbors = self.neighbors_of(&id),
			None => {}
		}
		if self.hover.prev_node.as_ref().is_some_and(node_gone) {
			self.hover.prev_node = None;
			self.hover.prev_neighbors.clear();
		}
	}

	fn poll_playback(&mut self, now: f64) {
		let Some(playback) = self.playback.as_mut() else {
			return;
		};
		for (index, step) in playback.poll(now) {
			match normalize_at(index, EventInput::Scripted(step), &self.layout) {
				Ok(event) => {
					self.fx.spawn_from_event(&event, now);
					self.redraw = true;
				}
				Err(err) => {
					warn!("playlist step skipped: {err}");
					self.errors.push(err);
				}
			}
		}
	}
}

impl FrameTarget for GraphState {
	fn begin_frame(&mut self, now: f64) {
		let dt = self
			.last_frame
			.map(|last| ((now - last) / 1000.0).clamp(0.0, MAX_FRAME_DT))
			.unwrap_or(0.0);
		if self.last_frame.is_none() && now != self.now_ms {
			self.fx.rebase(now - self.now_ms);
		}
		self.last_frame = Some(now);
		self.now_ms = now;
		if self.hover.step(dt) {
			self.redraw = true;
		}
		self.poll_playback(now);
	}

	fn physics_active(&self) -> bool {
		!self.config.test_mode && self.physics.is_active()
	}

	fn step_physics(&mut self, substeps: usize) -> usize {
		let mut ran = 0;
		while ran < substeps {
			ran += 1;
			if !self.physics.tick(&mut self.layout) {
				break;
			}
		}
		ran
	}

	fn advance_fx(&mut self, now: f64) -> usize {
		self.fx.advance(now)
	}

	fn fx_live(&self) -> usize {
		self.fx.len()
	}

	fn take_redraw(&mut self) -> bool {
		std::mem::take(&mut self.redraw)
	}
}
