use super::events::{Playlist, ScriptedStep};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
	/// At the beginning, not running
	Stopped,
	Playing,
	Paused,
	/// Ran past the last step with looping off
	Finished,
}

/// Releases playlist steps as their offsets elapse on the frame clock.
pub struct Playback {
	steps: Vec<(usize, ScriptedStep)>,
	cursor: usize,
	state: PlaybackState,
	loop_enabled: bool,
	speed: f64,
	elapsed_ms: f64,
	last_now: Option<f64>,
}

impl Playback {
	pub fn new(playlist: Playlist) -> Self {
		let mut steps: Vec<_> = playlist.steps.into_iter().enumerate().collect();
		// stable: equal offsets keep authored order
		steps.sort_by(|a, b| a.1.at_ms.total_cmp(&b.1.at_ms));
		Self {
			steps,
			cursor: 0,
			state: PlaybackState::Stopped,
			loop_enabled: false,
			speed: 1.0,
			elapsed_ms: 0.0,
			last_now: None,
		}
	}

	pub fn state(&self) -> PlaybackState {
		self.state
	}

	pub fn elapsed_ms(&self) -> f64 {
		self.elapsed_ms
	}

	pub fn total_steps(&self) -> usize {
		self.steps.len()
	}

	/// Steps already released.
	pub fn current_step(&self) -> usize {
		self.cursor
	}

	pub fn duration_ms(&self) -> f64 {
		self.steps.last().map(|(_, s)| s.at_ms).unwrap_or(0.0)
	}

	pub fn progress(&self) -> f64 {
		if self.steps.is_empty() {
			0.0
		} else {
			self.cursor as f64 / self.steps.len() as f64
		}
	}

	pub fn play(&mut self) {
		if self.cursor >= self.steps.len() {
			self.cursor = 0;
			self.elapsed_ms = 0.0;
		}
		self.state = PlaybackState::Playing;
	}

	pub fn pause(&mut self) {
		if self.state == PlaybackState::Playing {
			self.state = PlaybackState::Paused;
		}
	}

	pub fn stop(&mut self) {
		self.cursor = 0;
		self.elapsed_ms = 0.0;
		self.state = PlaybackState::Stopped;
	}

	pub fn set_loop(&mut self, enabled: bool) {
		self.loop_enabled = enabled;
	}

	/// Time multiplier; negative values are treated as zero.
	pub fn set_speed(&mut self, speed: f64) {
		self.speed = speed.max(0.0);
	}

	/// Jumps to `ms`. Steps before that point are skipped, not replayed.
	pub fn seek(&mut self, ms: f64) {
		self.elapsed_ms = ms.clamp(0.0, self.duration_ms());
		self.cursor = self
			.steps
			.iter()
			.position(|(_, s)| s.at_ms >= self.elapsed_ms)
			.unwrap_or(self.steps.len());
	}

	/// Advances the playback clock to `now` and returns the steps that came
	/// due, each with its authored position in the playlist.
	pub fn poll(&mut self, now: f64) -> Vec<(usize, ScriptedStep)> {
		let dt = self.last_now.map(|last| (now - last).max(0.0)).unwrap_or(0.0);
		self.last_now = Some(now);
		if self.state != PlaybackState::Playing {
			return Vec::new();
		}
		self.elapsed_ms += dt * self.speed;

		let mut due = Vec::new();
		while let Some((index, step)) = self.steps.get(self.cursor) {
			if step.at_ms > self.elapsed_ms {
				break;
			}
			due.push((*index, step.clone()));
			self.cursor += 1;
		}

		if self.cursor >= self.steps.len() {
			if self.loop_enabled && !self.steps.is_empty() {
				self.cursor = 0;
				self.elapsed_ms = 0.0;
			} else {
				self.state = PlaybackState::Finished;
			}
		}
		due
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::force_graph::events::{DonePayload, LiveEvent};

	fn playlist(offsets: &[f64]) -> Playlist {
		Playlist {
			equivalent: None,
			steps: offsets
				.iter()
				.enumerate()
				.map(|(i, &at_ms)| ScriptedStep {
					at_ms,
					event: LiveEvent::ClearingDone(DonePayload {
						plan_id: format!("p{i}"),
					}),
				})
				.collect(),
		}
	}

	fn indices(due: Vec<(usize, ScriptedStep)>) -> Vec<usize> {
		due.into_iter().map(|(i, _)| i).collect()
	}

	#[test]
	fn starts_stopped() {
		let mut playback = Playback::new(playlist(&[0.0, 100.0]));
		assert_eq!(playback.state(), PlaybackState::Stopped);
		assert!(playback.poll(0.0).is_empty());
		assert!(playback.poll(500.0).is_empty());
	}

	#[test]
	fn releases_steps_as_time_passes() {
		let mut playback = Playback::new(playlist(&[0.0, 100.0, 250.0]));
		playback.play();
		assert_eq!(indices(playback.poll(1000.0)), [0]);
		assert_eq!(indices(playback.poll(1050.0)), Vec::<usize>::new());
		assert_eq!(indices(playback.poll(1300.0)), [1, 2]);
		assert_eq!(playback.state(), PlaybackState::Finished);
		assert_eq!(playback.progress(), 1.0);
	}

	#[test]
	fn unsorted_steps_keep_authored_index() {
		let mut playback = Playback::new(playlist(&[200.0, 0.0]));
		playback.play();
		assert_eq!(indices(playback.poll(0.0)), [1]);
		assert_eq!(indices(playback.poll(200.0)), [0]);
	}

	#[test]
	fn pause_freezes_the_clock() {
		let mut playback = Playback::new(playlist(&[0.0, 100.0]));
		playback.play();
		playback.poll(0.0);
		playback.pause();
		assert!(playback.poll(1000.0).is_empty());
		playback.play();
		assert!(playback.poll(1050.0).is_empty());
		assert_eq!(indices(playback.poll(1100.0)), [1]);
	}

	#[test]
	fn seek_skips_earlier_steps() {
		let mut playback = Playback::new(playlist(&[0.0, 100.0, 200.0]));
		playback.seek(150.0);
		assert_eq!(playback.current_step(), 2);
		playback.play();
		assert_eq!(indices(playback.poll(0.0)), Vec::<usize>::new());
		assert_eq!(indices(playback.poll(50.0)), [2]);

		playback.seek(10_000.0);
		assert_eq!(playback.elapsed_ms(), 200.0);
	}

	#[test]
	fn loop_wraps_around() {
		let mut playback = Playback::new(playlist(&[0.0, 100.0]));
		playback.set_loop(true);
		playback.play();
		assert_eq!(indices(playback.poll(0.0)), [0]);
		assert_eq!(indices(playback.poll(100.0)), [1]);
		assert_eq!(playback.state(), PlaybackState::Playing);
		assert_eq!(indices(playback.poll(100.0)), [0]);
	}

	#[test]
	fn speed_scales_elapsed_time() {
		let mut playback = Playback::new(playlist(&[0.0, 400.0]));
		playback.set_speed(4.0);
		playback.play();
		playback.poll(0.0);
		assert_eq!(indices(playback.poll(100.0)), [1]);
	}
}
