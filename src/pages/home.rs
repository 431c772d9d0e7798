use leptos::prelude::*;
use log::warn;

use crate::components::force_graph::{
	EdgeRef, ForceGraphCanvas, GraphLink, GraphNode, LiveEvent, NetSign, Playlist,
	SelectionEvent, Snapshot, TxPayload,
};

const DEMO_PLAYLIST: &str = include_str!("demo_playlist.json");

/// Links that close clearing cycles over the tree, `p7→p3→p1→p0→p7` and
/// `p5→p2→p0→p5`.
const CYCLE_LINKS: [(usize, usize); 2] = [(0, 7), (0, 5)];

/// Deterministic sample network: a trust tree plus a couple of cycles.
fn sample_network(n: usize) -> Snapshot {
	let nodes: Vec<GraphNode> = (0..n)
		.map(|i| {
			let net_sign = match i % 3 {
				0 => NetSign::Creditor,
				1 => NetSign::Debtor,
				_ => NetSign::Neutral,
			};
			GraphNode {
				id: format!("p{i}"),
				name: (i < 12).then(|| format!("Participant {i}")),
				color_key: Some(format!("{net_sign:?}").to_lowercase()),
				size: Some(10.0 + 12.0 * rand_simple(i + n)),
				net_sign,
				status: Some("active".into()),
				node_type: Some(if i % 7 == 0 { "business" } else { "person" }.into()),
				..Default::default()
			}
		})
		.collect();

	let links: Vec<GraphLink> = (1..n)
		.map(|i| (i, (rand_simple(i) * (i as f64)) as usize))
		.chain(CYCLE_LINKS.into_iter().filter(|&(_, t)| t < n))
		.map(|(source, target)| {
			let limit = 100.0 * (1 + source % 5) as f64;
			let used = (limit * rand_simple(source * 31 + target)).round();
			GraphLink {
				source: format!("p{source}"),
				target: format!("p{target}"),
				width_key: Some(if limit >= 300.0 { "thick" } else { "thin" }.into()),
				alpha_key: Some(if used * 2.0 > limit { "active" } else { "muted" }.into()),
				limit,
				used,
				available: limit - used,
				status: Some("active".into()),
			}
		})
		.collect();

	Snapshot {
		equivalent: "UAH".into(),
		generated_at: "2026-01-01T00:00:00Z".into(),
		nodes,
		links,
	}
}

/// Simple pseudo-random number generator (deterministic for consistency).
fn rand_simple(seed: usize) -> f64 {
	let x = ((seed + 1) * 9301 + 49297) % 233280;
	(x as f64) / 233280.0
}

fn describe(event: &SelectionEvent) -> Option<String> {
	match event {
		SelectionEvent::NodeSelected(id) => Some(format!("Participant {id}")),
		SelectionEvent::EdgeSelected(key) => Some(format!("Trustline {key}")),
		SelectionEvent::Cleared => Some(String::new()),
		SelectionEvent::DragStarted(_) | SelectionEvent::DragEnded(_) => None,
	}
}

/// Default Home Page
#[component]
pub fn Home() -> impl IntoView {
	let snapshot = Signal::derive(move || sample_network(40));
	let playlist = match Playlist::from_json(DEMO_PLAYLIST) {
		Ok(playlist) => Some(playlist),
		Err(err) => {
			warn!("demo playlist unreadable: {err}");
			None
		}
	};

	let selected = RwSignal::new(String::new());
	let last_error = RwSignal::new(None::<String>);
	let live = RwSignal::new(Vec::<LiveEvent>::new());

	let on_select = move |event: SelectionEvent| {
		if let Some(text) = describe(&event) {
			selected.set(text);
		}
	};
	let on_error = move |message: String| last_error.set(Some(message));
	let send_payment = move |_| {
		live.update(|events| {
			events.push(LiveEvent::Tx(TxPayload {
				id: Some(format!("live-{}", events.len())),
				edges: vec![
					EdgeRef::Pair("p9".into(), "p5".into()),
					EdgeRef::Pair("p5".into(), "p2".into()),
				],
				nodes: vec!["p9".into(), "p2".into()],
				amount: Some("25 UAH".into()),
				ttl_ms: None,
			}))
		});
	};

	view! {
		<ErrorBoundary fallback=|errors| {
			view! {
				<h1>"Uh oh! Something went wrong!"</h1>

				<p>"Errors: "</p>
				<ul>
					{move || {
						errors
							.get()
							.into_iter()
							.map(|(_, e)| view! { <li>{e.to_string()}</li> })
							.collect_view()
					}}
				</ul>
			}
		}>

			<div class="fullscreen-graph">
				<ForceGraphCanvas
					snapshot=snapshot
					playlist=playlist
					loop_playback=true
					events=live
					on_select=on_select
					on_error=on_error
					fullscreen=true
				/>
				<div class="graph-overlay">
					<h1>"Credit Network"</h1>
					<p class="subtitle">
						"Click a participant or trustline. Drag to pin. Scroll to zoom. Drag background to pan."
					</p>
					<button on:click=send_payment>"Send live payment"</button>
					<p class="selection">{move || selected.get()}</p>
					<p class="error">{move || last_error.get().unwrap_or_default()}</p>
				</div>
			</div>
		</ErrorBoundary>
	}
}
