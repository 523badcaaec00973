use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// How many restarts a supervisor tolerates within a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intensity {
	pub max_restarts: usize,
	pub window: Duration,
}

impl Default for Intensity {
	fn default() -> Self {
		Self {
			max_restarts: 3,
			window: Duration::from_secs(5),
		}
	}
}

impl Intensity {
	pub fn new(max_restarts: usize, window: Duration) -> Self {
		Self {
			max_restarts,
			window,
		}
	}
}

/// Sliding-window log of restart instants.
#[derive(Debug)]
pub(crate) struct RestartLog {
	limit: Intensity,
	stamps: VecDeque<Instant>,
}

impl RestartLog {
	pub(crate) fn new(limit: Intensity) -> Self {
		Self {
			limit,
			stamps: VecDeque::with_capacity(limit.max_restarts),
		}
	}

	pub(crate) fn limit(&self) -> Intensity {
		self.limit
	}

	/// Records a restart at `now`. Returns `false`, without recording, when
	/// the restart would exceed the limit.
	pub(crate) fn record(&mut self, now: Instant) -> bool {
		while let Some(oldest) = self.stamps.front() {
			if now.saturating_duration_since(*oldest) >= self.limit.window {
				self.stamps.pop_front();
			} else {
				break;
			}
		}

		if self.stamps.len() >= self.limit.max_restarts {
			return false;
		}

		self.stamps.push_back(now);
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allows_up_to_max_within_window() {
		let mut log = RestartLog::new(Intensity::new(3, Duration::from_secs(5)));
		let t0 = Instant::now();

		assert!(log.record(t0));
		assert!(log.record(t0 + Duration::from_secs(1)));
		assert!(log.record(t0 + Duration::from_secs(2)));
		assert!(!log.record(t0 + Duration::from_secs(3)));
	}

	#[test]
	fn old_restarts_slide_out() {
		let mut log = RestartLog::new(Intensity::new(2, Duration::from_secs(5)));
		let t0 = Instant::now();

		assert!(log.record(t0));
		assert!(log.record(t0 + Duration::from_secs(1)));
		assert!(!log.record(t0 + Duration::from_secs(4)));
		// the first restart is now outside the window
		assert!(log.record(t0 + Duration::from_secs(5)));
	}

	#[test]
	fn zero_intensity_never_restarts() {
		let mut log = RestartLog::new(Intensity::new(0, Duration::from_secs(5)));
		assert!(!log.record(Instant::now()));
	}
}
