use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{GraphError, Result};
use super::layout::LayoutCoordinator;
use super::types::EdgeKey;

/// Every `type` tag the normalizer understands.
pub const EVENT_TYPES: [&str; 3] = ["tx", "clearing.plan", "clearing.done"];

/// An edge reference as authored: `{"from": "A", "to": "B"}` or `["A", "B"]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeRef {
	Pair(String, String),
	Named { from: String, to: String },
}

impl EdgeRef {
	pub fn key(&self) -> EdgeKey {
		match self {
			EdgeRef::Pair(from, to) | EdgeRef::Named { from, to } => EdgeKey::new(from, to),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxPayload {
	#[serde(default)]
	pub id: Option<String>,
	pub edges: Vec<EdgeRef>,
	/// Participants to flash, e.g. payer and payee.
	#[serde(default)]
	pub nodes: Vec<String>,
	#[serde(default)]
	pub amount: Option<String>,
	#[serde(default)]
	pub ttl_ms: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStepPayload {
	#[serde(default)]
	pub at_ms: Option<f64>,
	#[serde(default)]
	pub highlight_edges: Vec<EdgeRef>,
	#[serde(default)]
	pub particles_edges: Vec<EdgeRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanPayload {
	pub plan_id: String,
	pub steps: Vec<PlanStepPayload>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DonePayload {
	pub plan_id: String,
}

/// A domain event as pushed by the live stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LiveEvent {
	#[serde(rename = "tx")]
	Tx(TxPayload),
	#[serde(rename = "clearing.plan")]
	ClearingPlan(PlanPayload),
	#[serde(rename = "clearing.done")]
	ClearingDone(DonePayload),
}

/// A pre-authored playlist entry: an event body plus its offset from the
/// start of playback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptedStep {
	pub at_ms: f64,
	#[serde(flatten)]
	pub event: LiveEvent,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
	#[serde(default)]
	pub equivalent: Option<String>,
	pub steps: Vec<ScriptedStep>,
}

impl Playlist {
	/// Parses a playlist, naming the offending step when one carries an
	/// unknown or missing `type`.
	pub fn from_json(json: &str) -> Result<Self> {
		let value: Value = serde_json::from_str(json)?;
		if let Some(steps) = value.get("steps").and_then(Value::as_array) {
			for (index, step) in steps.iter().enumerate() {
				check_type(index, step)?;
			}
		}
		Ok(serde_json::from_value(value)?)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventInput {
	Live(LiveEvent),
	Scripted(ScriptedStep),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventSource {
	Live,
	Scripted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
	Tx,
	ClearingPlan,
	ClearingDone,
}

impl EventKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			EventKind::Tx => "tx",
			EventKind::ClearingPlan => "clearing.plan",
			EventKind::ClearingDone => "clearing.done",
		}
	}
}

impl fmt::Display for EventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventTiming {
	/// Playlist offset, scripted events only.
	pub at_ms: Option<f64>,
	/// Overrides the configured lifetime of spawned entities.
	pub ttl_ms: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlanStep {
	/// Offset from plan start; `None` means "use the configured step gap".
	pub at_ms: Option<f64>,
	pub highlight: Vec<EdgeKey>,
	pub particles: Vec<EdgeKey>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventBody {
	Tx {
		edges: Vec<EdgeKey>,
		nodes: Vec<String>,
		amount: Option<String>,
	},
	ClearingPlan {
		plan_id: String,
		steps: Vec<PlanStep>,
	},
	ClearingDone {
		plan_id: String,
	},
}

/// The single event shape the FX engine consumes, whatever the source.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedEvent {
	pub index: usize,
	pub source: EventSource,
	pub timing: EventTiming,
	pub body: EventBody,
}

impl NormalizedEvent {
	pub fn kind(&self) -> EventKind {
		match self.body {
			EventBody::Tx { .. } => EventKind::Tx,
			EventBody::ClearingPlan { .. } => EventKind::ClearingPlan,
			EventBody::ClearingDone { .. } => EventKind::ClearingDone,
		}
	}

	/// All edge keys in declared order.
	pub fn edges(&self) -> Vec<&EdgeKey> {
		match &self.body {
			EventBody::Tx { edges, .. } => edges.iter().collect(),
			EventBody::ClearingPlan { steps, .. } => steps
				.iter()
				.flat_map(|s| s.highlight.iter().chain(s.particles.iter()))
				.collect(),
			EventBody::ClearingDone { .. } => Vec::new(),
		}
	}
}

/// Turns live and scripted input into [`NormalizedEvent`]s, rejecting
/// anything that does not resolve against the current working set.
#[derive(Debug, Default)]
pub struct Normalizer {
	next_index: usize,
}

impl Normalizer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Index the next live event will get.
	pub fn next_index(&self) -> usize {
		self.next_index
	}

	pub fn normalize(
		&mut self,
		input: EventInput,
		layout: &LayoutCoordinator,
	) -> Result<NormalizedEvent> {
		let index = self.take_index();
		normalize_at(index, input, layout)
	}

	pub fn normalize_json(&mut self, json: &str, layout: &LayoutCoordinator) -> Result<NormalizedEvent> {
		let index = self.take_index();
		let event = parse_live(index, json)?;
		normalize_at(index, EventInput::Live(event), layout)
	}

	/// Validates a whole playlist up front. Indices are step positions.
	pub fn normalize_playlist(
		&self,
		playlist: &Playlist,
		layout: &LayoutCoordinator,
	) -> Result<Vec<NormalizedEvent>> {
		playlist
			.steps
			.iter()
			.enumerate()
			.map(|(i, step)| normalize_at(i, EventInput::Scripted(step.clone()), layout))
			.collect()
	}

	fn take_index(&mut self) -> usize {
		let index = self.next_index;
		self.next_index += 1;
		index
	}
}

fn check_type(index: usize, value: &Value) -> Result<()> {
	match value.get("type").and_then(Value::as_str) {
		Some(kind) if EVENT_TYPES.contains(&kind) => Ok(()),
		Some(kind) => Err(GraphError::UnknownEventType {
			event: index,
			kind: kind.to_owned(),
		}),
		None => Err(GraphError::MalformedEvent {
			event: index,
			reason: "missing string field `type`".into(),
		}),
	}
}

fn parse_live(index: usize, json: &str) -> Result<LiveEvent> {
	let value: Value = serde_json::from_str(json)?;
	check_type(index, &value)?;
	serde_json::from_value(value).map_err(|e| GraphError::MalformedEvent {
		event: index,
		reason: e.to_string(),
	})
}

pub fn normalize_at(
	index: usize,
	input: EventInput,
	layout: &LayoutCoordinator,
) -> Result<NormalizedEvent> {
	let (source, at_ms, event) = match input {
		EventInput::Live(event) => (EventSource::Live, None, event),
		EventInput::Scripted(step) => (EventSource::Scripted, Some(step.at_ms), step.event),
	};
	let malformed = |reason: String| GraphError::MalformedEvent {
		event: index,
		reason,
	};

	let mut position = 0;
	let (ttl_ms, body) = match event {
		LiveEvent::Tx(tx) => {
			if tx.edges.is_empty() {
				return Err(malformed("tx carries no edges".into()));
			}
			let edges = resolve_edges(index, &tx.edges, &mut position, layout)?;
			for id in &tx.nodes {
				if layout.node(id).is_none() {
					return Err(GraphError::UnknownNode {
						event: index,
						id: id.clone(),
					});
				}
			}
			(
				tx.ttl_ms,
				EventBody::Tx {
					edges,
					nodes: tx.nodes,
					amount: tx.amount,
				},
			)
		}
		LiveEvent::ClearingPlan(plan) => {
			if plan.plan_id.is_empty() {
				return Err(malformed("clearing.plan without plan_id".into()));
			}
			if plan.steps.is_empty() {
				return Err(malformed(format!("plan `{}` has no steps", plan.plan_id)));
			}
			let mut steps = Vec::with_capacity(plan.steps.len());
			for (i, step) in plan.steps.iter().enumerate() {
				if step.highlight_edges.is_empty() && step.particles_edges.is_empty() {
					return Err(malformed(format!("plan `{}` step {i} has no edges", plan.plan_id)));
				}
				steps.push(PlanStep {
					at_ms: step.at_ms,
					highlight: resolve_edges(index, &step.highlight_edges, &mut position, layout)?,
					particles: resolve_edges(index, &step.particles_edges, &mut position, layout)?,
				});
			}
			(
				None,
				EventBody::ClearingPlan {
					plan_id: plan.plan_id,
					steps,
				},
			)
		}
		LiveEvent::ClearingDone(done) => {
			if done.plan_id.is_empty() {
				return Err(malformed("clearing.done without plan_id".into()));
			}
			(None, EventBody::ClearingDone { plan_id: done.plan_id })
		}
	};

	Ok(NormalizedEvent {
		index,
		source,
		timing: EventTiming { at_ms, ttl_ms },
		body,
	})
}

/// Resolves references in order; `position` keeps counting across calls so
/// errors point at the edge's place within the whole event.
fn resolve_edges(
	index: usize,
	refs: &[EdgeRef],
	position: &mut usize,
	layout: &LayoutCoordinator,
) -> Result<Vec<EdgeKey>> {
	let mut keys = Vec::with_capacity(refs.len());
	for r in refs {
		let key = r.key();
		if layout.edge(&key).is_none() {
			return Err(GraphError::UnknownEdge {
				event: index,
				position: *position,
				key,
			});
		}
		keys.push(key);
		*position += 1;
	}
	Ok(keys)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::force_graph::types::snapshot;

	fn abc() -> LayoutCoordinator {
		let mut layout = LayoutCoordinator::new(12.0);
		layout.set_viewport(800.0, 600.0);
		layout
			.set_snapshot(&snapshot(&["A", "B", "C"], &[("A", "B"), ("B", "C")]))
			.unwrap();
		layout
	}

	fn tx(edges: &[(&str, &str)]) -> LiveEvent {
		LiveEvent::Tx(TxPayload {
			id: None,
			edges: edges
				.iter()
				.map(|(f, t)| EdgeRef::Named {
					from: f.to_string(),
					to: t.to_string(),
				})
				.collect(),
			nodes: Vec::new(),
			amount: None,
			ttl_ms: None,
		})
	}

	#[test]
	fn live_tx_normalizes() {
		let layout = abc();
		let mut norm = Normalizer::new();
		let event = norm
			.normalize_json(r#"{"type": "tx", "edges": [{"from": "A", "to": "B"}], "ttl_ms": 500}"#, &layout)
			.unwrap();
		assert_eq!(event.kind(), EventKind::Tx);
		assert_eq!(event.source, EventSource::Live);
		assert_eq!(event.timing.ttl_ms, Some(500.0));
		assert_eq!(event.edges(), [&EdgeKey::new("A", "B")]);
		assert_eq!(norm.next_index(), 1);
	}

	#[test]
	fn unknown_edge_is_named() {
		let layout = abc();
		let mut norm = Normalizer::new();
		norm.normalize(EventInput::Live(tx(&[("A", "B")])), &layout).unwrap();

		let err = norm
			.normalize(EventInput::Live(tx(&[("C", "A")])), &layout)
			.unwrap_err();
		assert!(err.to_string().contains("C→A"), "{err}");
		assert!(matches!(err, GraphError::UnknownEdge { event: 1, position: 0, .. }));
	}

	#[test]
	fn direction_matters() {
		let layout = abc();
		let err = Normalizer::new()
			.normalize(EventInput::Live(tx(&[("B", "A")])), &layout)
			.unwrap_err();
		assert!(err.to_string().contains("B→A"));
	}

	#[test]
	fn one_bad_edge_among_many() {
		let layout = abc();
		let event = tx(&[("A", "B"), ("B", "C"), ("A", "C"), ("A", "B")]);
		let err = Normalizer::new()
			.normalize(EventInput::Live(event), &layout)
			.unwrap_err();
		match err {
			GraphError::UnknownEdge { position, key, .. } => {
				assert_eq!(position, 2);
				assert_eq!(key, EdgeKey::new("A", "C"));
			}
			other => panic!("unexpected {other}"),
		}
	}

	#[test]
	fn unknown_type_is_rejected() {
		let layout = abc();
		let mut norm = Normalizer::new();
		let err = norm
			.normalize_json(r#"{"type": "trustline.changed", "edges": []}"#, &layout)
			.unwrap_err();
		assert!(matches!(err, GraphError::UnknownEventType { event: 0, ref kind } if kind == "trustline.changed"));

		let err = norm.normalize_json(r#"{"edges": []}"#, &layout).unwrap_err();
		assert!(matches!(err, GraphError::MalformedEvent { event: 1, .. }));
		assert!(matches!(norm.normalize_json("{not json", &layout), Err(GraphError::Parse(_))));
	}

	#[test]
	fn playlist_names_step_with_unknown_type() {
		let json = r#"{"steps": [
			{"at_ms": 0, "type": "tx", "edges": [["A", "B"]]},
			{"at_ms": 400, "type": "trustline.changed", "edges": []}
		]}"#;
		let err = Playlist::from_json(json).unwrap_err();
		assert!(matches!(err, GraphError::UnknownEventType { event: 1, ref kind } if kind == "trustline.changed"));

		let err = Playlist::from_json(r#"{"steps": [{"at_ms": 0}]}"#).unwrap_err();
		assert!(matches!(err, GraphError::MalformedEvent { event: 0, .. }));
		let playlist = Playlist::from_json(r#"{"steps": [{"at_ms": 0, "type": "tx", "edges": [["A", "B"]]}]}"#).unwrap();
		assert_eq!(playlist.steps.len(), 1);
	}

	#[test]
	fn structural_checks() {
		let layout = abc();
		let mut norm = Normalizer::new();
		assert!(matches!(
			norm.normalize(EventInput::Live(tx(&[])), &layout),
			Err(GraphError::MalformedEvent { .. })
		));
		let err = norm
			.normalize_json(r#"{"type": "clearing.plan", "plan_id": "p", "steps": []}"#, &layout)
			.unwrap_err();
		assert!(err.to_string().contains("no steps"));

		let mut bad_node = tx(&[("A", "B")]);
		if let LiveEvent::Tx(ref mut p) = bad_node {
			p.nodes.push("Z".into());
		}
		assert!(matches!(
			norm.normalize(EventInput::Live(bad_node), &layout),
			Err(GraphError::UnknownNode { ref id, .. }) if id == "Z"
		));
	}

	#[test]
	fn clearing_plan_positions_span_steps() {
		let layout = abc();
		let json = r#"{
			"type": "clearing.plan",
			"plan_id": "cycle-7",
			"steps": [
				{"highlight_edges": [["A", "B"]], "particles_edges": [["A", "B"]]},
				{"at_ms": 900, "highlight_edges": [["B", "C"]], "particles_edges": [["C", "A"]]}
			]
		}"#;
		let err = Normalizer::new().normalize_json(json, &layout).unwrap_err();
		assert!(matches!(err, GraphError::UnknownEdge { position: 3, .. }));
		assert!(err.to_string().contains("C→A"));
	}

	#[test]
	fn plan_and_done_normalize() {
		let layout = abc();
		let mut norm = Normalizer::new();
		let plan = norm
			.normalize_json(
				r#"{"type": "clearing.plan", "plan_id": "p1", "steps": [
					{"highlight_edges": [{"from": "A", "to": "B"}, ["B", "C"]]},
					{"at_ms": 300, "particles_edges": [["B", "C"]]}
				]}"#,
				&layout,
			)
			.unwrap();
		match &plan.body {
			EventBody::ClearingPlan { plan_id, steps } => {
				assert_eq!(plan_id, "p1");
				assert_eq!(steps.len(), 2);
				assert_eq!(steps[0].highlight.len(), 2);
				assert_eq!(steps[1].at_ms, Some(300.0));
			}
			other => panic!("unexpected {other:?}"),
		}
		assert_eq!(plan.edges().len(), 3);

		let done = norm
			.normalize_json(r#"{"type": "clearing.done", "plan_id": "p1"}"#, &layout)
			.unwrap();
		assert_eq!(done.kind(), EventKind::ClearingDone);
		assert!(done.edges().is_empty());
	}

	#[test]
	fn scripted_and_live_share_one_shape() {
		let layout = abc();
		let playlist = Playlist::from_json(
			r#"{"equivalent": "UAH", "steps": [
				{"at_ms": 0, "type": "tx", "edges": [["A", "B"]]},
				{"at_ms": 1200, "type": "clearing.done", "plan_id": "p"}
			]}"#,
		)
		.unwrap();
		let events = Normalizer::new().normalize_playlist(&playlist, &layout).unwrap();
		assert_eq!(events.len(), 2);
		assert_eq!(events[0].source, EventSource::Scripted);
		assert_eq!(events[1].timing.at_ms, Some(1200.0));

		let live = Normalizer::new()
			.normalize(EventInput::Live(tx(&[("A", "B")])), &layout)
			.unwrap();
		assert_eq!(live.body, events[0].body);
	}

	#[test]
	fn playlist_reports_failing_step() {
		let layout = abc();
		let playlist = Playlist::from_json(
			r#"{"steps": [
				{"at_ms": 0, "type": "tx", "edges": [["A", "B"]]},
				{"at_ms": 10, "type": "tx", "edges": [["B", "C"]]},
				{"at_ms": 20, "type": "tx", "edges": [["C", "A"]]}
			]}"#,
		)
		.unwrap();
		let err = Normalizer::new().normalize_playlist(&playlist, &layout).unwrap_err();
		assert!(matches!(err, GraphError::UnknownEdge { event: 2, .. }));
	}
}
