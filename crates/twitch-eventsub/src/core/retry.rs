use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
	pub initial_delay: Duration,
	pub max_delay: Duration,
	pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			initial_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(30),
			backoff_multiplier: 2.0,
		}
	}
}

/// Exponential dial backoff. Carried across reconnects by the supervisor and
/// reset only after a successful open.
#[derive(Debug)]
pub struct Backoff {
	config: RetryConfig,
	consecutive_failures: usize,
	current_delay: Duration,
}

impl Backoff {
	pub fn new(config: RetryConfig) -> Self {
		let current_delay = config.initial_delay;
		Self {
			config,
			consecutive_failures: 0,
			current_delay,
		}
	}

	/// Delay to wait after the failure just observed
	pub fn next_delay(&mut self) -> Duration {
		self.consecutive_failures += 1;

		let delay = self.current_delay;
		let grown = self.current_delay.mul_f64(self.config.backoff_multiplier.max(1.0));
		self.current_delay = grown.min(self.config.max_delay);

		delay.min(self.config.max_delay)
	}

	pub fn reset(&mut self) {
		self.consecutive_failures = 0;
		self.current_delay = self.config.initial_delay;
	}

	pub fn consecutive_failures(&self) -> usize {
		self.consecutive_failures
	}
}
