use crate::core::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_WEBSOCKET_URL: &str = "wss://eventsub.wss.twitch.tv/ws";
pub const DEFAULT_SUBSCRIPTIONS_URL: &str = "https://api.twitch.tv/helix/eventsub/subscriptions";

/// Bound on a single websocket open attempt
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on a single subscription create/delete request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// How often the liveness monitor compares the clock against the deadline
pub const KEEPALIVE_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// Multiplier applied to the server's keepalive timeout before a connection is declared stale
pub const KEEPALIVE_GRACE_FACTOR: f64 = 1.5;
/// Deadline for the first welcome frame on a freshly opened socket
pub const WELCOME_TIMEOUT: Duration = Duration::from_secs(10);

/// How decoded notifications reach the registered callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchMode {
	/// Callbacks run inside the read loop. A slow callback delays the next frame,
	/// keepalives included, and can push the connection past its liveness deadline.
	Inline,
	/// Notifications go through a bounded FIFO queue drained by one worker task.
	/// A full queue blocks the reader until the worker catches up.
	Queued { capacity: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubConfig {
	pub websocket_url: String,
	pub subscriptions_url: String,
	pub dial_timeout: Duration,
	pub request_timeout: Duration,
	pub keepalive_check_interval: Duration,
	pub welcome_timeout: Duration,
	pub retry: RetryConfig,
	pub dispatch: DispatchMode,
}

impl EventSubConfig {
	/// Defaults overridden by `EVENTSUB_*` environment variables when present
	pub fn from_env() -> Self {
		let mut config = Self::default();

		if let Ok(url) = std::env::var("EVENTSUB_WS_URL") {
			config.websocket_url = url;
		}
		if let Ok(url) = std::env::var("EVENTSUB_API_URL") {
			config.subscriptions_url = url;
		}
		if let Some(secs) = std::env::var("EVENTSUB_DIAL_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()) {
			config.dial_timeout = Duration::from_secs(secs);
		}
		if let Some(secs) = std::env::var("EVENTSUB_REQUEST_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()) {
			config.request_timeout = Duration::from_secs(secs);
		}

		config
	}
}

impl Default for EventSubConfig {
	fn default() -> Self {
		Self {
			websocket_url: DEFAULT_WEBSOCKET_URL.to_string(),
			subscriptions_url: DEFAULT_SUBSCRIPTIONS_URL.to_string(),
			dial_timeout: DIAL_TIMEOUT,
			request_timeout: REQUEST_TIMEOUT,
			keepalive_check_interval: KEEPALIVE_CHECK_INTERVAL,
			welcome_timeout: WELCOME_TIMEOUT,
			retry: RetryConfig::default(),
			dispatch: DispatchMode::Inline,
		}
	}
}
