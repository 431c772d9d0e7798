use std::collections::VecDeque;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::events::{EventBody, NormalizedEvent};
use super::types::EdgeKey;

/// Plans remembered for their `clearing.done` burst.
const MAX_TRACKED_PLANS: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FxKind {
	Spark,
	EdgePulse,
	NodeBurst,
	FloatingLabel,
}

impl FxKind {
	pub const ALL: [FxKind; 4] = [
		FxKind::Spark,
		FxKind::EdgePulse,
		FxKind::NodeBurst,
		FxKind::FloatingLabel,
	];
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FxTarget {
	Node(String),
	Edge(EdgeKey),
}

/// Gap between sequential spawns of one event, and how long each lives.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxDurations {
	pub stagger_ms: f64,
	pub ttl_ms: f64,
}

impl Default for FxDurations {
	fn default() -> Self {
		Self {
			stagger_ms: 80.0,
			ttl_ms: 1000.0,
		}
	}
}

/// The one timing table shared by live and scripted events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxTiming {
	pub spark: FxDurations,
	pub edge_pulse: FxDurations,
	pub node_burst: FxDurations,
	pub floating_label: FxDurations,
	/// Offset between consecutive clearing steps without an explicit `at_ms`.
	pub clearing_step_gap_ms: f64,
}

impl Default for FxTiming {
	fn default() -> Self {
		Self {
			spark: FxDurations {
				stagger_ms: 90.0,
				ttl_ms: 900.0,
			},
			edge_pulse: FxDurations {
				stagger_ms: 60.0,
				ttl_ms: 1400.0,
			},
			node_burst: FxDurations {
				stagger_ms: 40.0,
				ttl_ms: 700.0,
			},
			floating_label: FxDurations {
				stagger_ms: 0.0,
				ttl_ms: 1600.0,
			},
			clearing_step_gap_ms: 650.0,
		}
	}
}

impl FxTiming {
	pub fn for_kind(&self, kind: FxKind) -> FxDurations {
		match kind {
			FxKind::Spark => self.spark,
			FxKind::EdgePulse => self.edge_pulse,
			FxKind::NodeBurst => self.node_burst,
			FxKind::FloatingLabel => self.floating_label,
		}
	}
}

/// Soft caps on concurrently live entities, per kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxLimits {
	pub spark: usize,
	pub edge_pulse: usize,
	pub node_burst: usize,
	pub floating_label: usize,
}

impl Default for FxLimits {
	fn default() -> Self {
		Self {
			spark: 240,
			edge_pulse: 160,
			node_burst: 64,
			floating_label: 32,
		}
	}
}

impl FxLimits {
	pub fn for_kind(&self, kind: FxKind) -> usize {
		match kind {
			FxKind::Spark => self.spark,
			FxKind::EdgePulse => self.edge_pulse,
			FxKind::NodeBurst => self.node_burst,
			FxKind::FloatingLabel => self.floating_label,
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct FxEntity {
	/// Unique per engine; two identical events never share entities.
	pub id: u64,
	pub kind: FxKind,
	pub target: FxTarget,
	/// May lie in the future for staggered spawns.
	pub spawn_at: f64,
	pub ttl_ms: f64,
	pub plan_id: Option<String>,
	pub label: Option<String>,
	expires_at: f64,
}

impl FxEntity {
	pub fn expires_at(&self) -> f64 {
		self.expires_at
	}

	pub fn is_live(&self, now: f64) -> bool {
		now < self.expires_at
	}

	pub fn is_visible(&self, now: f64) -> bool {
		now >= self.spawn_at && self.is_live(now)
	}

	/// Position in the entity's lifetime, `0.0` at spawn and `1.0` at expiry.
	pub fn progress(&self, now: f64) -> Option<f64> {
		if !self.is_visible(now) {
			return None;
		}
		if self.ttl_ms <= 0.0 {
			return Some(1.0);
		}
		Some(((now - self.spawn_at) / self.ttl_ms).clamp(0.0, 1.0))
	}
}

/// Owns every transient overlay entity.
pub struct FxEngine {
	timing: FxTiming,
	limits: FxLimits,
	entities: Vec<FxEntity>,
	plans: VecDeque<(String, Vec<EdgeKey>)>,
	next_id: u64,
}

impl FxEngine {
	pub fn new(timing: FxTiming, limits: FxLimits) -> Self {
		Self {
			timing,
			limits,
			entities: Vec::new(),
			plans: VecDeque::new(),
			next_id: 0,
		}
	}

	pub fn timing(&self) -> &FxTiming {
		&self.timing
	}

	pub fn entities(&self) -> &[FxEntity] {
		&self.entities
	}

	pub fn visible(&self, now: f64) -> impl Iterator<Item = &FxEntity> {
		self.entities.iter().filter(move |e| e.is_visible(now))
	}

	pub fn len(&self) -> usize {
		self.entities.len()
	}

	pub fn is_idle(&self) -> bool {
		self.entities.is_empty()
	}

	pub fn count(&self, kind: FxKind) -> usize {
		self.entities.iter().filter(|e| e.kind == kind).count()
	}

	pub fn count_on(&self, kind: FxKind, target: &FxTarget) -> usize {
		self.entities
			.iter()
			.filter(|e| e.kind == kind && &e.target == target)
			.count()
	}

	/// Spawns the entities an event implies. Returns how many were created.
	pub fn spawn_from_event(&mut self, event: &NormalizedEvent, now: f64) -> usize {
		let before = self.entities.len();
		let ttl_override = event.timing.ttl_ms;

		match &event.body {
			EventBody::Tx {
				edges,
				nodes,
				amount,
			} => {
				let spark = self.timing.spark;
				for (i, key) in edges.iter().enumerate() {
					let at = now + i as f64 * spark.stagger_ms;
					let ttl = ttl_override.unwrap_or(spark.ttl_ms);
					self.push(FxKind::Spark, FxTarget::Edge(key.clone()), at, ttl, None, None);
				}
				let burst = self.timing.node_burst;
				for (i, id) in nodes.iter().enumerate() {
					let at = now + i as f64 * burst.stagger_ms;
					let ttl = ttl_override.unwrap_or(burst.ttl_ms);
					self.push(FxKind::NodeBurst, FxTarget::Node(id.clone()), at, ttl, None, None);
				}
				if let (Some(amount), Some(last)) = (amount, edges.last()) {
					let at = now + (edges.len() - 1) as f64 * spark.stagger_ms;
					let ttl = ttl_override.unwrap_or(self.timing.floating_label.ttl_ms);
					self.push(
						FxKind::FloatingLabel,
						FxTarget::Node(last.target.clone()),
						at,
						ttl,
						None,
						Some(amount.clone()),
					);
				}
			}
			EventBody::ClearingPlan { plan_id, steps } => {
				if self.plans.iter().any(|(id, _)| id == plan_id) {
					debug!("clearing plan {plan_id} restarted");
					self.expire_plan(plan_id, now);
					self.plans.retain(|(id, _)| id != plan_id);
				}
				let (pulse, spark) = (self.timing.edge_pulse, self.timing.spark);
				let gap = self.timing.clearing_step_gap_ms;
				let mut touched = Vec::new();
				for (i, step) in steps.iter().enumerate() {
					let base = now + step.at_ms.unwrap_or(i as f64 * gap);
					for (j, key) in step.highlight.iter().enumerate() {
						let at = base + j as f64 * pulse.stagger_ms;
						let target = FxTarget::Edge(key.clone());
						self.push(FxKind::EdgePulse, target, at, pulse.ttl_ms, Some(plan_id), None);
					}
					for (j, key) in step.particles.iter().enumerate() {
						let at = base + j as f64 * spark.stagger_ms;
						let target = FxTarget::Edge(key.clone());
						self.push(FxKind::Spark, target, at, spark.ttl_ms, Some(plan_id), None);
					}
					touched.extend(step.highlight.iter().chain(step.particles.iter()).cloned());
				}
				self.plans.push_back((plan_id.clone(), touched));
				if self.plans.len() > MAX_TRACKED_PLANS {
					self.plans.pop_front();
				}
			}
			EventBody::ClearingDone { plan_id } => {
				let expired = self.expire_plan(plan_id, now);
				let Some(pos) = self.plans.iter().position(|(id, _)| id == plan_id) else {
					warn!("clearing.done for unknown plan {plan_id}");
					return 0;
				};
				let (_, edges) = self.plans.remove(pos).unwrap_or_default();
				let mut nodes: Vec<&str> = Vec::new();
				for key in &edges {
					for id in [key.source.as_str(), key.target.as_str()] {
						if !nodes.contains(&id) {
							nodes.push(id);
						}
					}
				}
				let burst = self.timing.node_burst;
				let ids: Vec<String> = nodes.into_iter().map(str::to_owned).collect();
				for (i, id) in ids.into_iter().enumerate() {
					let at = now + i as f64 * burst.stagger_ms;
					self.push(FxKind::NodeBurst, FxTarget::Node(id), at, burst.ttl_ms, None, None);
				}
				debug!("clearing plan {plan_id} done, {expired} entities cut short");
			}
		}

		self.enforce_caps(now);
		self.entities.len() - before
	}

	/// Drops everything whose expiry has passed. Returns how many went.
	pub fn advance(&mut self, now: f64) -> usize {
		let before = self.entities.len();
		self.entities.retain(|e| e.is_live(now));
		before - self.entities.len()
	}

	/// Cuts short entities whose target `gone` reports missing, e.g. after a snapshot
	/// swap removed their edge. They go on the next `advance`.
	pub fn expire_where(&mut self, now: f64, mut gone: impl FnMut(&FxTarget) -> bool) -> usize {
		let mut n = 0;
		for e in &mut self.entities {
			if e.is_live(now) && gone(&e.target) {
				e.expires_at = now;
				n += 1;
			}
		}
		n
	}

	/// Shifts every entity's schedule by `offset_ms`, for entities stamped on a
	/// provisional clock before the real one was known.
	pub fn rebase(&mut self, offset_ms: f64) {
		for e in &mut self.entities {
			e.spawn_at += offset_ms;
			e.expires_at += offset_ms;
		}
	}

	fn expire_plan(&mut self, plan_id: &str, now: f64) -> usize {
		let mut n = 0;
		for e in &mut self.entities {
			if e.plan_id.as_deref() == Some(plan_id) && e.is_live(now) {
				e.expires_at = now;
				n += 1;
			}
		}
		n
	}

	fn push(
		&mut self,
		kind: FxKind,
		target: FxTarget,
		spawn_at: f64,
		ttl_ms: f64,
		plan_id: Option<&String>,
		label: Option<String>,
	) {
		let ttl_ms = ttl_ms.max(0.0);
		self.entities.push(FxEntity {
			id: self.next_id,
			kind,
			target,
			spawn_at,
			ttl_ms,
			plan_id: plan_id.cloned(),
			label,
			expires_at: spawn_at + ttl_ms,
		});
		self.next_id += 1;
	}

	/// Oldest-first early expiry for kinds over their soft cap.
	fn enforce_caps(&mut self, now: f64) {
		for kind in FxKind::ALL {
			let cap = self.limits.for_kind(kind);
			let live = self
				.entities
				.iter()
				.filter(|e| e.kind == kind && e.is_live(now))
				.count();
			if live <= cap {
				continue;
			}
			let mut excess = live - cap;
			for e in &mut self.entities {
				if excess == 0 {
					break;
				}
				if e.kind == kind && e.is_live(now) {
					e.expires_at = now;
					excess -= 1;
				}
			}
			debug!("{kind:?} over cap {cap}: evicted {}", live - cap);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::force_graph::events::{EventSource, EventTiming, PlanStep};

	fn key(s: &str, t: &str) -> EdgeKey {
		EdgeKey::new(s, t)
	}

	fn event(body: EventBody) -> NormalizedEvent {
		NormalizedEvent {
			index: 0,
			source: EventSource::Live,
			timing: EventTiming::default(),
			body,
		}
	}

	fn tx(edges: &[(&str, &str)]) -> NormalizedEvent {
		event(EventBody::Tx {
			edges: edges.iter().map(|(s, t)| key(s, t)).collect(),
			nodes: Vec::new(),
			amount: None,
		})
	}

	fn plan(id: &str, steps: Vec<PlanStep>) -> NormalizedEvent {
		event(EventBody::ClearingPlan {
			plan_id: id.into(),
			steps,
		})
	}

	fn engine() -> FxEngine {
		FxEngine::new(FxTiming::default(), FxLimits::default())
	}

	#[test]
	fn one_spark_lives_for_its_ttl() {
		let mut fx = engine();
		let now = 1000.0;
		assert_eq!(fx.spawn_from_event(&tx(&[("A", "B")]), now), 1);
		assert_eq!(fx.count(FxKind::Spark), 1);

		let ttl = fx.timing().spark.ttl_ms;
		assert_eq!(fx.advance(now + ttl - 1.0), 0);
		assert_eq!(fx.count(FxKind::Spark), 1);
		assert_eq!(fx.advance(now + ttl + 0.5), 1);
		assert_eq!(fx.count(FxKind::Spark), 0);
		assert!(fx.is_idle());
	}

	#[test]
	fn sparks_land_on_the_named_edge_only() {
		let mut fx = engine();
		fx.spawn_from_event(&tx(&[("A", "B")]), 0.0);
		assert_eq!(fx.count_on(FxKind::Spark, &FxTarget::Edge(key("A", "B"))), 1);
		assert_eq!(fx.count_on(FxKind::Spark, &FxTarget::Edge(key("B", "C"))), 0);
	}

	#[test]
	fn sparks_stagger_in_declared_order() {
		let mut fx = engine();
		fx.spawn_from_event(&tx(&[("A", "B"), ("B", "C"), ("C", "D")]), 100.0);
		let gap = fx.timing().spark.stagger_ms;
		let spawns: Vec<_> = fx.entities().iter().map(|e| (e.target.clone(), e.spawn_at)).collect();
		assert_eq!(
			spawns,
			[
				(FxTarget::Edge(key("A", "B")), 100.0),
				(FxTarget::Edge(key("B", "C")), 100.0 + gap),
				(FxTarget::Edge(key("C", "D")), 100.0 + 2.0 * gap),
			]
		);
		assert_eq!(fx.visible(100.0).count(), 1);
		assert!(fx.entities()[2].progress(100.0).is_none());
	}

	#[test]
	fn event_ttl_overrides_config() {
		let mut fx = engine();
		let mut e = tx(&[("A", "B")]);
		e.timing.ttl_ms = Some(50.0);
		fx.spawn_from_event(&e, 0.0);
		assert_eq!(fx.entities()[0].expires_at(), 50.0);
		assert_eq!(fx.entities()[0].progress(25.0), Some(0.5));
	}

	#[test]
	fn identical_events_get_distinct_entities() {
		let mut fx = engine();
		fx.spawn_from_event(&tx(&[("A", "B")]), 0.0);
		fx.spawn_from_event(&tx(&[("A", "B")]), 0.0);
		let ids: Vec<_> = fx.entities().iter().map(|e| e.id).collect();
		assert_eq!(ids, [0, 1]);
	}

	#[test]
	fn tx_with_amount_and_nodes() {
		let mut fx = engine();
		let e = event(EventBody::Tx {
			edges: vec![key("A", "B"), key("B", "C")],
			nodes: vec!["A".into(), "C".into()],
			amount: Some("120.00".into()),
		});
		assert_eq!(fx.spawn_from_event(&e, 0.0), 5);
		assert_eq!(fx.count(FxKind::NodeBurst), 2);
		let label = fx
			.entities()
			.iter()
			.find(|e| e.kind == FxKind::FloatingLabel)
			.unwrap();
		assert_eq!(label.target, FxTarget::Node("C".into()));
		assert_eq!(label.label.as_deref(), Some("120.00"));
	}

	#[test]
	fn clearing_plan_flows_step_by_step() {
		let mut fx = engine();
		let steps = vec![
			PlanStep {
				at_ms: None,
				highlight: vec![key("A", "B")],
				particles: vec![key("A", "B")],
			},
			PlanStep {
				at_ms: None,
				highlight: vec![key("B", "C")],
				particles: vec![key("B", "C")],
			},
		];
		assert_eq!(fx.spawn_from_event(&plan("p", steps), 0.0), 4);
		let gap = fx.timing().clearing_step_gap_ms;
		let second: Vec<_> = fx
			.entities()
			.iter()
			.filter(|e| e.target == FxTarget::Edge(key("B", "C")))
			.map(|e| e.spawn_at)
			.collect();
		assert!(second.iter().all(|&t| t == gap));
		assert!(fx.entities().iter().all(|e| e.plan_id.as_deref() == Some("p")));
		assert_eq!(fx.visible(0.0).count(), 2);
	}

	#[test]
	fn explicit_step_offset_wins() {
		let mut fx = engine();
		let steps = vec![PlanStep {
			at_ms: Some(250.0),
			highlight: vec![key("A", "B")],
			particles: Vec::new(),
		}];
		fx.spawn_from_event(&plan("p", steps), 1000.0);
		assert_eq!(fx.entities()[0].spawn_at, 1250.0);
	}

	#[test]
	fn rebase_moves_the_whole_schedule() {
		let mut fx = engine();
		fx.spawn_from_event(&tx(&[("A", "B")]), 0.0);
		let ttl = fx.entities()[0].ttl_ms;
		fx.rebase(5000.0);
		assert_eq!(fx.entities()[0].spawn_at, 5000.0);
		assert_eq!(fx.entities()[0].expires_at(), 5000.0 + ttl);
		assert_eq!(fx.advance(5000.0), 0);
		assert_eq!(fx.visible(5000.0).count(), 1);
	}

	#[test]
	fn done_cuts_plan_short_and_bursts_nodes() {
		let mut fx = engine();
		fx.spawn_from_event(&tx(&[("X", "Y")]), 0.0);
		let steps = vec![PlanStep {
			at_ms: None,
			highlight: vec![key("A", "B"), key("B", "A")],
			particles: vec![key("A", "B")],
		}];
		fx.spawn_from_event(&plan("p", steps), 0.0);
		assert_eq!(fx.len(), 4);

		let spawned = fx.spawn_from_event(
			&event(EventBody::ClearingDone {
				plan_id: "p".into(),
			}),
			10.0,
		);
		assert_eq!(spawned, 2);
		assert_eq!(fx.advance(10.0), 3);
		assert_eq!(fx.count(FxKind::Spark), 1);
		assert_eq!(fx.count(FxKind::NodeBurst), 2);
		assert_eq!(fx.count(FxKind::EdgePulse), 0);
	}

	#[test]
	fn done_for_unknown_plan_is_harmless() {
		let mut fx = engine();
		fx.spawn_from_event(&tx(&[("A", "B")]), 0.0);
		let done = event(EventBody::ClearingDone {
			plan_id: "nope".into(),
		});
		assert_eq!(fx.spawn_from_event(&done, 5.0), 0);
		assert_eq!(fx.advance(5.0), 0);
		assert_eq!(fx.len(), 1);
	}

	#[test]
	fn cap_evicts_oldest_first() {
		let limits = FxLimits {
			spark: 2,
			..FxLimits::default()
		};
		let mut fx = FxEngine::new(FxTiming::default(), limits);
		for _ in 0..3 {
			fx.spawn_from_event(&tx(&[("A", "B")]), 0.0);
		}
		assert_eq!(fx.advance(0.0), 1);
		let ids: Vec<_> = fx.entities().iter().map(|e| e.id).collect();
		assert_eq!(ids, [1, 2]);
	}

	#[test]
	fn expire_where_marks_missing_targets() {
		let mut fx = engine();
		fx.spawn_from_event(&tx(&[("A", "B"), ("B", "C")]), 0.0);
		let gone = FxTarget::Edge(key("A", "B"));
		assert_eq!(fx.expire_where(1.0, |t| *t == gone), 1);
		assert_eq!(fx.advance(1.0), 1);
		assert_eq!(fx.count_on(FxKind::Spark, &FxTarget::Edge(key("B", "C"))), 1);
	}
}
