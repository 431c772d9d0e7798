use super::config::Quality;

/// Source of frame timestamps in milliseconds.
pub trait Clock {
	fn now_ms(&mut self) -> f64;
}

/// Host wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct WallClock;

impl Clock for WallClock {
	fn now_ms(&mut self) -> f64 {
		js_sys::Date::now()
	}
}

/// Fixed-step clock: every read advances by one frame. Starts at zero.
#[derive(Clone, Copy, Debug)]
pub struct VirtualClock {
	now: f64,
	step_ms: f64,
}

impl VirtualClock {
	pub fn new(step_ms: f64) -> Self {
		Self { now: 0.0, step_ms }
	}
}

impl Clock for VirtualClock {
	fn now_ms(&mut self) -> f64 {
		let now = self.now;
		self.now += self.step_ms;
		now
	}
}

/// Runtime choice between the two clocks, so hosts need no generics.
#[derive(Clone, Copy, Debug)]
pub enum FrameClock {
	Wall(WallClock),
	Virtual(VirtualClock),
}

impl Clock for FrameClock {
	fn now_ms(&mut self) -> f64 {
		match self {
			FrameClock::Wall(c) => c.now_ms(),
			FrameClock::Virtual(c) => c.now_ms(),
		}
	}
}

/// What the scheduler drives each frame.
pub trait FrameTarget {
	/// Called first, with the frame timestamp.
	fn begin_frame(&mut self, now: f64);
	fn physics_active(&self) -> bool;
	/// Runs up to `substeps` physics ticks; returns how many ran.
	fn step_physics(&mut self, substeps: usize) -> usize;
	/// Purges expired FX; returns how many were removed.
	fn advance_fx(&mut self, now: f64) -> usize;
	fn fx_live(&self) -> usize;
	/// Consumes a pending "something changed, draw me" request.
	fn take_redraw(&mut self) -> bool;
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
	pub now_ms: f64,
	pub dt_ms: f64,
	pub substeps: usize,
	pub fx_removed: usize,
	pub fx_live: usize,
	pub drew: bool,
	/// Nothing was moving, so physics, FX and draw were all skipped.
	pub skipped: bool,
}

/// Cooperative per-frame driver: physics substeps, then FX, then draw.
pub struct Scheduler<C: Clock> {
	clock: C,
	quality: Quality,
	running: bool,
	last_now: Option<f64>,
	frames: u64,
}

impl<C: Clock> Scheduler<C> {
	pub fn new(clock: C, quality: Quality) -> Self {
		Self {
			clock,
			quality,
			running: false,
			last_now: None,
			frames: 0,
		}
	}

	pub fn start(&mut self) {
		self.running = true;
	}

	/// Stops ticking. The next `start` measures its first delta from zero.
	pub fn stop(&mut self) {
		self.running = false;
		self.last_now = None;
	}

	pub fn is_running(&self) -> bool {
		self.running
	}

	pub fn set_quality(&mut self, quality: Quality) {
		self.quality = quality;
	}

	pub fn frames(&self) -> u64 {
		self.frames
	}

	/// Runs one frame. Returns `None` while stopped.
	pub fn tick<T: FrameTarget>(&mut self, target: &mut T, draw: impl FnOnce(&T)) -> Option<FrameStats> {
		if !self.running {
			return None;
		}
		let now = self.clock.now_ms();
		let dt = self.last_now.map(|last| (now - last).max(0.0)).unwrap_or(0.0);
		self.last_now = Some(now);
		self.frames += 1;

		target.begin_frame(now);
		let mut stats = FrameStats {
			now_ms: now,
			dt_ms: dt,
			..Default::default()
		};

		let busy = target.physics_active() || target.fx_live() > 0;
		if busy {
			if target.physics_active() {
				stats.substeps = target.step_physics(self.quality.substeps());
			}
			stats.fx_removed = target.advance_fx(now);
		}
		stats.fx_live = target.fx_live();

		let requested = target.take_redraw();
		if busy || requested {
			draw(target);
			stats.drew = true;
		} else {
			stats.skipped = true;
		}
		Some(stats)
	}
}
