use std::f64::consts::PI;

use web_sys::CanvasRenderingContext2d;

use super::fx::{FxEntity, FxKind, FxTarget};
use super::layout::{LayoutEdge, LayoutNode};
use super::state::GraphState;
use super::types::{GraphLink, GraphNode, NetSign};

const COLORS: &[&str] = &[
	"#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
	"#bcbd22", "#17becf",
];
const BACKGROUND: &str = "#1a1a2e";
const SPARK_COLOR: &str = "255, 214, 102";
const PULSE_COLOR: &str = "120, 230, 170";
const SELECTED_COLOR: &str = "#ffd166";

fn ease_out_cubic(t: f64) -> f64 {
	1.0 - (1.0 - t).powi(3)
}

/// Fill for a node. Known keys map to fixed colors, anything else to a
/// stable palette slot so the same key always gets the same color.
pub(crate) fn node_color(node: &GraphNode) -> &'static str {
	match node.color_key.as_deref() {
		Some("creditor") => "#2ca02c",
		Some("debtor") => "#d62728",
		Some("neutral") => "#7f7f7f",
		Some("hub") => "#9467bd",
		Some(key) => COLORS[palette_slot(key)],
		None => match node.net_sign {
			NetSign::Creditor => "#2ca02c",
			NetSign::Debtor => "#d62728",
			NetSign::Neutral => COLORS[0],
		},
	}
}

fn palette_slot(key: &str) -> usize {
	key.bytes()
		.fold(0usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
		% COLORS.len()
}

pub(crate) fn edge_width(link: &GraphLink) -> f64 {
	match link.width_key.as_deref() {
		Some("hairline") => 0.75,
		Some("thin") => 1.0,
		Some("thick") => 2.5,
		Some("heavy") => 3.5,
		_ => 1.5,
	}
}

pub(crate) fn edge_alpha(link: &GraphLink) -> f64 {
	match link.alpha_key.as_deref() {
		Some("faint") => 0.2,
		Some("muted") => 0.4,
		Some("active") => 0.8,
		Some("highlight") => 0.95,
		_ => 0.6,
	}
}

pub fn render(state: &GraphState, ctx: &CanvasRenderingContext2d) {
	let (width, height) = state
		.layout()
		.viewport()
		.map(|v| (v.width, v.height))
		.unwrap_or((0.0, 0.0));
	ctx.set_fill_style_str(BACKGROUND);
	ctx.fill_rect(0.0, 0.0, width, height);
	ctx.save();
	let _ = ctx.translate(state.transform.x, state.transform.y);
	let _ = ctx.scale(state.transform.k, state.transform.k);
	draw_edges(state, ctx);
	draw_fx(state, ctx, FxLayer::UnderNodes);
	draw_nodes(state, ctx);
	draw_fx(state, ctx, FxLayer::OverNodes);
	ctx.restore();
}

fn draw_edges(state: &GraphState, ctx: &CanvasRenderingContext2d) {
	let k = state.transform.k;
	let arrow_size = 8.0 / k;
	let t = ease_out_cubic(state.hover.highlight_t);
	let nodes = state.layout().nodes();

	for edge in state.layout().edges() {
		let (n1, n2) = (&nodes[edge.source], &nodes[edge.target]);
		let (dx, dy) = (n2.x - n1.x, n2.y - n1.y);
		let dist = (dx * dx + dy * dy).sqrt();
		if dist < 0.001 {
			continue;
		}

		let base_alpha = edge_alpha(&edge.link);
		let base_width = edge_width(&edge.link) / k;
		let selected = state.selection().contains_edge(&edge.key);
		let is_highlighted = state.has_active_highlight()
			&& state.is_highlighted(n1.id())
			&& state.is_highlighted(n2.id());

		// t=0: every edge at its own alpha; t=1: highlighted edges brighten,
		// the rest dim
		let (alpha, width) = if selected {
			(1.0, base_width * 2.0)
		} else if is_highlighted {
			(
				base_alpha + (1.0 - base_alpha) * 0.5 * t,
				base_width * (1.0 + 0.3 * t),
			)
		} else {
			(base_alpha * (1.0 - 0.75 * t), base_width * (1.0 - 0.3 * t))
		};
		let color = if selected {
			format!("rgba(255, 209, 102, {alpha})")
		} else {
			format!("rgba(100, 180, 255, {alpha})")
		};

		let (ux, uy) = (dx / dist, dy / dist);
		ctx.set_stroke_style_str(&color);
		ctx.set_line_width(width);
		ctx.begin_path();
		ctx.move_to(n1.x + ux * n1.radius, n1.y + uy * n1.radius);
		ctx.line_to(
			n2.x - ux * (n2.radius + arrow_size),
			n2.y - uy * (n2.radius + arrow_size),
		);
		ctx.stroke();

		ctx.set_fill_style_str(&color);
		let (tip_x, tip_y) = (n2.x - ux * n2.radius, n2.y - uy * n2.radius);
		let (back_x, back_y) = (tip_x - ux * arrow_size, tip_y - uy * arrow_size);
		let (px, py) = (-uy * arrow_size * 0.5, ux * arrow_size * 0.5);
		ctx.begin_path();
		ctx.move_to(tip_x, tip_y);
		ctx.line_to(back_x + px, back_y + py);
		ctx.line_to(back_x - px, back_y - py);
		ctx.close_path();
		ctx.fill();
	}
}

fn node_path(ctx: &CanvasRenderingContext2d, node: &LayoutNode, x: f64, y: f64, r: f64) {
	ctx.begin_path();
	match node.node.shape_key.as_deref() {
		Some("square") => ctx.rect(x - r, y - r, 2.0 * r, 2.0 * r),
		Some("diamond") => {
			ctx.move_to(x, y - r);
			ctx.line_to(x + r, y);
			ctx.line_to(x, y + r);
			ctx.line_to(x - r, y);
			ctx.close_path();
		}
		_ => {
			let _ = ctx.arc(x, y, r, 0.0, 2.0 * PI);
		}
	}
}

fn draw_label(ctx: &CanvasRenderingContext2d, node: &LayoutNode, radius: f64, k: f64, style: &str) {
	if let Some(name) = &node.node.name {
		ctx.set_fill_style_str(style);
		ctx.set_font(&format!("{}px sans-serif", 10.0 / k.max(0.5)));
		let _ = ctx.fill_text(name, node.x + radius + 3.0, node.y + 3.0);
	}
}

fn draw_nodes(state: &GraphState, ctx: &CanvasRenderingContext2d) {
	let (has_highlight, t, k) = (
		state.has_active_highlight(),
		ease_out_cubic(state.hover.highlight_t),
		state.transform.k,
	);

	for node in state.layout().nodes() {
		if has_highlight && state.is_highlighted(node.id()) {
			continue;
		}
		let (alpha, radius) = (1.0 - 0.7 * t, node.radius * (1.0 - 0.15 * t));

		ctx.set_global_alpha(alpha);
		node_path(ctx, node, node.x, node.y, radius);
		ctx.set_fill_style_str(node_color(&node.node));
		ctx.fill();
		ctx.set_global_alpha(1.0);
		draw_marks(state, ctx, node, radius, k);
		draw_label(ctx, node, radius, k, &format!("rgba(255, 255, 255, {})", alpha * 0.8));
	}

	if !has_highlight {
		return;
	}

	for node in state.layout().nodes() {
		let id = node.id();
		if !state.is_highlighted(id) {
			continue;
		}
		let (x, y) = (node.x, node.y);
		let is_hovered = state.is_hovered(id);

		let (radius, glow_radius) = if is_hovered {
			(node.radius * (1.0 + 0.35 * t), node.radius * (1.8 + 1.2 * t))
		} else {
			(node.radius * (1.0 + 0.2 * t), node.radius * (1.4 + 0.6 * t))
		};

		if t > 0.01 {
			if let Ok(gradient) = ctx.create_radial_gradient(x, y, radius * 0.3, x, y, glow_radius) {
				let alpha = if is_hovered { 0.35 * t } else { 0.2 * t };
				let _ = gradient.add_color_stop(0.0, &format!("rgba(255, 255, 255, {alpha})"));
				let _ = gradient
					.add_color_stop(0.6, &format!("rgba(200, 220, 255, {})", alpha * 0.3));
				let _ = gradient.add_color_stop(1.0, "rgba(255, 255, 255, 0)");
				ctx.begin_path();
				let _ = ctx.arc(x, y, glow_radius, 0.0, 2.0 * PI);
				#[allow(deprecated)]
				ctx.set_fill_style(&gradient);
				ctx.fill();
			}
		}

		node_path(ctx, node, x, y, radius);
		ctx.set_fill_style_str(node_color(&node.node));
		ctx.fill();

		if is_hovered && t > 0.01 {
			ctx.begin_path();
			let _ = ctx.arc(x, y, radius + 2.0 / k, 0.0, 2.0 * PI);
			ctx.set_stroke_style_str(&format!("rgba(255, 255, 255, {})", 0.7 * t));
			ctx.set_line_width(1.5 / k);
			ctx.stroke();
		}
		draw_marks(state, ctx, node, radius, k);
		draw_label(ctx, node, radius, k, "white");
	}
}

/// Selection ring and pin dot.
fn draw_marks(state: &GraphState, ctx: &CanvasRenderingContext2d, node: &LayoutNode, radius: f64, k: f64) {
	if state.selection().contains_node(node.id()) {
		ctx.begin_path();
		let _ = ctx.arc(node.x, node.y, radius + 3.0 / k, 0.0, 2.0 * PI);
		ctx.set_stroke_style_str(SELECTED_COLOR);
		ctx.set_line_width(2.0 / k);
		ctx.stroke();
	}
	if node.is_pinned() {
		ctx.begin_path();
		let _ = ctx.arc(node.x, node.y, (radius * 0.3).max(1.5 / k), 0.0, 2.0 * PI);
		ctx.set_fill_style_str("white");
		ctx.fill();
	}
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FxLayer {
	UnderNodes,
	OverNodes,
}

fn layer_of(kind: FxKind) -> FxLayer {
	match kind {
		FxKind::EdgePulse => FxLayer::UnderNodes,
		FxKind::Spark | FxKind::NodeBurst | FxKind::FloatingLabel => FxLayer::OverNodes,
	}
}

fn draw_fx(state: &GraphState, ctx: &CanvasRenderingContext2d, layer: FxLayer) {
	let now = state.now_ms();
	let k = state.transform.k;
	for entity in state.fx().visible(now) {
		if layer_of(entity.kind) != layer {
			continue;
		}
		let Some(p) = entity.progress(now) else {
			continue;
		};
		match &entity.target {
			FxTarget::Edge(key) => {
				if let Some(edge) = state.layout().edge(key) {
					draw_edge_fx(state, ctx, entity, edge, p, k);
				}
			}
			FxTarget::Node(id) => {
				if let Some(node) = state.layout().node(id) {
					draw_node_fx(ctx, entity, node, p, k);
				}
			}
		}
	}
	ctx.set_global_alpha(1.0);
}

fn draw_edge_fx(
	state: &GraphState,
	ctx: &CanvasRenderingContext2d,
	entity: &FxEntity,
	edge: &LayoutEdge,
	p: f64,
	k: f64,
) {
	let nodes = state.layout().nodes();
	let (a, b) = (&nodes[edge.source], &nodes[edge.target]);
	match entity.kind {
		FxKind::Spark => {
			let s = ease_out_cubic(p);
			let (x, y) = (a.x + (b.x - a.x) * s, a.y + (b.y - a.y) * s);
			let tail = (s - 0.12).max(0.0);
			let (tx, ty) = (a.x + (b.x - a.x) * tail, a.y + (b.y - a.y) * tail);
			ctx.set_stroke_style_str(&format!("rgba({SPARK_COLOR}, {})", 0.5 * (1.0 - p)));
			ctx.set_line_width(3.0 / k);
			ctx.begin_path();
			ctx.move_to(tx, ty);
			ctx.line_to(x, y);
			ctx.stroke();
			ctx.begin_path();
			let _ = ctx.arc(x, y, 3.5 / k, 0.0, 2.0 * PI);
			ctx.set_fill_style_str(&format!("rgba({SPARK_COLOR}, 1)"));
			ctx.fill();
		}
		FxKind::EdgePulse => {
			// swells then fades
			let swell = (p * PI).sin();
			ctx.set_stroke_style_str(&format!("rgba({PULSE_COLOR}, {})", 0.8 * (1.0 - p)));
			ctx.set_line_width((2.0 + 4.0 * swell) / k);
			ctx.begin_path();
			ctx.move_to(a.x, a.y);
			ctx.line_to(b.x, b.y);
			ctx.stroke();
		}
		FxKind::FloatingLabel => {
			draw_floating_label(ctx, entity, (a.x + b.x) / 2.0, (a.y + b.y) / 2.0, p, k);
		}
		FxKind::NodeBurst => {}
	}
}

fn draw_node_fx(ctx: &CanvasRenderingContext2d, entity: &FxEntity, node: &LayoutNode, p: f64, k: f64) {
	match entity.kind {
		FxKind::NodeBurst => {
			let r = node.radius + 18.0 * ease_out_cubic(p);
			ctx.begin_path();
			let _ = ctx.arc(node.x, node.y, r, 0.0, 2.0 * PI);
			ctx.set_stroke_style_str(&format!("rgba({SPARK_COLOR}, {})", 1.0 - p));
			ctx.set_line_width(2.0 / k);
			ctx.stroke();
		}
		FxKind::FloatingLabel => {
			draw_floating_label(ctx, entity, node.x, node.y - node.radius, p, k);
		}
		FxKind::Spark | FxKind::EdgePulse => {}
	}
}

fn draw_floating_label(ctx: &CanvasRenderingContext2d, entity: &FxEntity, x: f64, y: f64, p: f64, k: f64) {
	let Some(text) = &entity.label else {
		return;
	};
	let rise = 24.0 * ease_out_cubic(p);
	ctx.set_global_alpha(1.0 - p);
	ctx.set_fill_style_str("white");
	ctx.set_font(&format!("bold {}px sans-serif", 11.0 / k.max(0.5)));
	ctx.set_text_align("center");
	let _ = ctx.fill_text(text, x, y - 6.0 - rise);
	ctx.set_text_align("start");
	ctx.set_global_alpha(1.0);
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::force_graph::types::{link, node};

	#[test]
	fn known_color_keys_and_fallbacks() {
		let mut n = node("A");
		assert_eq!(node_color(&n), COLORS[0]);
		n.net_sign = NetSign::Debtor;
		assert_eq!(node_color(&n), "#d62728");
		n.color_key = Some("creditor".into());
		assert_eq!(node_color(&n), "#2ca02c");
		n.color_key = Some("some-custom-key".into());
		let first = node_color(&n);
		assert_eq!(node_color(&n.clone()), first);
		assert!(COLORS.contains(&first));
	}

	#[test]
	fn edge_style_keys() {
		let mut l = link("A", "B");
		assert_eq!((edge_width(&l), edge_alpha(&l)), (1.5, 0.6));
		l.width_key = Some("heavy".into());
		l.alpha_key = Some("faint".into());
		assert_eq!((edge_width(&l), edge_alpha(&l)), (3.5, 0.2));
	}

	#[test]
	fn easing_hits_endpoints() {
		assert_eq!(ease_out_cubic(0.0), 0.0);
		assert_eq!(ease_out_cubic(1.0), 1.0);
		assert!(ease_out_cubic(0.5) > 0.5);
	}
}
