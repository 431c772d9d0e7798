use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;
use log::error;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, MouseEvent, WheelEvent, Window};

use super::config::GraphConfig;
use super::error::GraphError;
use super::events::{LiveEvent, Playlist};
use super::picking::SelectionEvent;
use super::render;
use super::scheduler::{FrameClock, Scheduler, VirtualClock, WallClock};
use super::state::GraphState;
use super::types::Snapshot;

type SharedState = Rc<RefCell<Option<GraphState>>>;

fn report(on_error: Option<Callback<String>>, err: &GraphError) {
	error!("{err}");
	if let Some(cb) = on_error {
		cb.run(err.to_string());
	}
}

/// Hands queued selection changes and playback errors to the host. Runs
/// outside the state borrow so callbacks may read it again.
fn notify(
	state: &SharedState,
	on_select: Option<Callback<SelectionEvent>>,
	on_error: Option<Callback<String>>,
) {
	let (events, errors) = match state.borrow_mut().as_mut() {
		Some(s) => (s.take_selection_events(), s.take_errors()),
		None => return,
	};
	if let Some(cb) = on_select {
		for event in events {
			cb.run(event);
		}
	}
	for err in &errors {
		report(on_error, err);
	}
}

fn window_size(window: &Window) -> (f64, f64) {
	let dim = |v: Result<JsValue, JsValue>, fallback: f64| {
		v.ok().and_then(|v| v.as_f64()).unwrap_or(fallback)
	};
	(dim(window.inner_width(), 800.0), dim(window.inner_height(), 600.0))
}

fn pointer_offset(canvas_ref: NodeRef<leptos::html::Canvas>, ev: &MouseEvent) -> Option<(f64, f64)> {
	let canvas: HtmlCanvasElement = canvas_ref.get()?.into();
	let rect = canvas.get_bounding_client_rect();
	Some((
		ev.client_x() as f64 - rect.left(),
		ev.client_y() as f64 - rect.top(),
	))
}

#[component]
pub fn ForceGraphCanvas(
	#[prop(into)] snapshot: Signal<Snapshot>,
	#[prop(optional)] config: GraphConfig,
	#[prop(default = None)] playlist: Option<Playlist>,
	#[prop(default = true)] autoplay: bool,
	#[prop(default = false)] loop_playback: bool,
	/// Live events; entries appended since the last change are pushed.
	#[prop(optional, into)]
	events: Option<Signal<Vec<LiveEvent>>>,
	#[prop(optional, into)] on_select: Option<Callback<SelectionEvent>>,
	#[prop(optional, into)] on_error: Option<Callback<String>>,
	#[prop(default = false)] fullscreen: bool,
	#[prop(default = None)] width: Option<f64>,
	#[prop(default = None)] height: Option<f64>,
) -> impl IntoView {
	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let state: SharedState = Rc::new(RefCell::new(None));
	let animate: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
	let resize_cb: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
	let (state_init, animate_init, resize_cb_init) =
		(state.clone(), animate.clone(), resize_cb.clone());

	Effect::new(move |_| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		let canvas: HtmlCanvasElement = canvas.into();
		let Some(window) = web_sys::window() else {
			return;
		};

		let (w, h) = if fullscreen {
			window_size(&window)
		} else {
			let parent = canvas.parent_element();
			(
				width.unwrap_or_else(|| parent.as_ref().map(|p| p.client_width() as f64).unwrap_or(800.0)),
				height.unwrap_or_else(|| parent.as_ref().map(|p| p.client_height() as f64).unwrap_or(600.0)),
			)
		};
		canvas.set_width(w as u32);
		canvas.set_height(h as u32);

		let Some(ctx) = canvas
			.get_context("2d")
			.ok()
			.flatten()
			.and_then(|c| c.dyn_into::<CanvasRenderingContext2d>().ok())
		else {
			error!("canvas has no 2d context");
			return;
		};

		let mut graph = GraphState::new(config.clone());
		graph.set_viewport(w, h);
		if let Err(err) = graph.set_snapshot(&snapshot.get_untracked()) {
			report(on_error, &err);
		}
		if let Some(playlist) = playlist.clone() {
			match graph.load_playlist(playlist) {
				Ok(()) => {
					if let Some(playback) = graph.playback_mut() {
						playback.set_loop(loop_playback);
						if autoplay {
							playback.play();
						}
					}
				}
				Err(err) => report(on_error, &err),
			}
		}
		*state_init.borrow_mut() = Some(graph);

		if fullscreen {
			let (state_resize, canvas_resize) = (state_init.clone(), canvas.clone());
			*resize_cb_init.borrow_mut() = Some(Closure::new(move || {
				let Some(win) = web_sys::window() else {
					return;
				};
				let (nw, nh) = window_size(&win);
				canvas_resize.set_width(nw as u32);
				canvas_resize.set_height(nh as u32);
				if let Some(ref mut s) = *state_resize.borrow_mut() {
					s.set_viewport(nw, nh);
				}
			}));
			if let Some(ref cb) = *resize_cb_init.borrow() {
				let _ =
					window.add_event_listener_with_callback("resize", cb.as_ref().unchecked_ref());
			}
		}

		let clock = if config.test_mode {
			FrameClock::Virtual(VirtualClock::new(config.virtual_frame_ms))
		} else {
			FrameClock::Wall(WallClock)
		};
		let mut scheduler = Scheduler::new(clock, config.quality);
		scheduler.start();

		let (state_anim, animate_inner) = (state_init.clone(), animate_init.clone());
		*animate_init.borrow_mut() = Some(Closure::new(move || {
			if let Some(ref mut s) = *state_anim.borrow_mut() {
				scheduler.tick(s, |s| render::render(s, &ctx));
			}
			notify(&state_anim, on_select, on_error);
			if let (Some(win), Some(cb)) = (web_sys::window(), animate_inner.borrow().as_ref()) {
				let _ = win.request_animation_frame(cb.as_ref().unchecked_ref());
			}
		}));
		if let Some(ref cb) = *animate_init.borrow() {
			let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
		}
	});

	// snapshot swaps land between frames, never inside the frame closure
	let state_snap = state.clone();
	Effect::new(move |_| {
		let next = snapshot.get();
		let result = match state_snap.borrow_mut().as_mut() {
			Some(s) => s.set_snapshot(&next).map(|_| ()),
			None => return,
		};
		if let Err(err) = result {
			report(on_error, &err);
		}
		notify(&state_snap, on_select, on_error);
	});

	if let Some(events) = events {
		let state_ev = state.clone();
		Effect::new(move |seen: Option<usize>| {
			let batch = events.get();
			let from = seen.filter(|&n| n <= batch.len()).unwrap_or(0);
			let failures: Vec<GraphError> = match state_ev.borrow_mut().as_mut() {
				Some(s) => batch[from..]
					.iter()
					.filter_map(|ev| s.push_event(ev.clone()).err())
					.collect(),
				None => return from,
			};
			for err in &failures {
				report(on_error, err);
			}
			batch.len()
		});
	}

	let state_md = state.clone();
	let on_mousedown = move |ev: MouseEvent| {
		let Some((x, y)) = pointer_offset(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_md.borrow_mut() {
			if !s.pointer_down(x, y) {
				s.begin_pan(x, y);
			}
		}
		notify(&state_md, on_select, on_error);
	};

	let state_mm = state.clone();
	let on_mousemove = move |ev: MouseEvent| {
		let Some((x, y)) = pointer_offset(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_mm.borrow_mut() {
			s.pointer_move(x, y);
		}
	};

	let state_mu = state.clone();
	let on_mouseup = move |_: MouseEvent| {
		if let Some(ref mut s) = *state_mu.borrow_mut() {
			s.pointer_up();
		}
		notify(&state_mu, on_select, on_error);
	};

	let state_ml = state.clone();
	let on_mouseleave = move |_: MouseEvent| {
		if let Some(ref mut s) = *state_ml.borrow_mut() {
			s.pointer_leave();
		}
		notify(&state_ml, on_select, on_error);
	};

	let state_wh = state.clone();
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		let Some((x, y)) = pointer_offset(canvas_ref, &ev) else {
			return;
		};
		if let Some(ref mut s) = *state_wh.borrow_mut() {
			s.wheel(x, y, ev.delta_y());
		}
	};

	view! {
		<canvas
			node_ref=canvas_ref
			class="force-graph-canvas"
			on:mousedown=on_mousedown
			on:mousemove=on_mousemove
			on:mouseup=on_mouseup
			on:mouseleave=on_mouseleave
			on:wheel=on_wheel
			style="display: block; cursor: grab;"
		/>
	}
}
