use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use twitch_eventsub::EventSubConfig;

/// Complete configuration for the EventSub daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	/// Application client id sent as `Client-Id`
	pub client_id: String,
	/// User access token sent as the bearer token
	#[serde(skip_serializing)]
	pub access_token: String,
	/// Channels to follow; subscribed again on every new session
	pub broadcaster_ids: Vec<String>,
	/// How often connection state and frame counters are logged
	pub health_check_interval: Duration,
	/// Graceful shutdown timeout
	pub shutdown_timeout: Duration,
	pub eventsub: EventSubConfig,
}

impl Config {
	/// Load configuration from environment variables with sensible defaults
	pub fn from_env() -> Result<Self> {
		let client_id = std::env::var("TWITCH_CLIENT_ID").map_err(|_| Error::Config("TWITCH_CLIENT_ID is not set".to_string()))?;
		let access_token = std::env::var("TWITCH_ACCESS_TOKEN").map_err(|_| Error::Config("TWITCH_ACCESS_TOKEN is not set".to_string()))?;
		let broadcaster_ids = parse_broadcaster_ids(&std::env::var("TWITCH_BROADCASTER_IDS").unwrap_or_default());

		if broadcaster_ids.is_empty() {
			tracing::warn!("TWITCH_BROADCASTER_IDS is empty, no channels will be subscribed");
		}

		Ok(Self {
			client_id,
			access_token,
			broadcaster_ids,
			health_check_interval: Duration::from_secs(std::env::var("HEALTH_CHECK_INTERVAL_SECS").ok().and_then(|i| i.parse().ok()).unwrap_or(30)),
			shutdown_timeout: Duration::from_secs(std::env::var("SHUTDOWN_TIMEOUT_SECS").ok().and_then(|t| t.parse().ok()).unwrap_or(10)),
			eventsub: EventSubConfig::from_env(),
		})
	}
}

/// Comma separated ids; blanks and duplicates dropped, order kept
pub fn parse_broadcaster_ids(raw: &str) -> Vec<String> {
	let mut ids: Vec<String> = Vec::new();
	for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
		if !ids.iter().any(|existing| existing == id) {
			ids.push(id.to_string());
		}
	}
	ids
}
