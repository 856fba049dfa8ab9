use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubscriptionError {
	#[error("No active EventSub session")]
	NotReady,

	#[error("EventSub API returned {status}: {body}")]
	Http { status: u16, body: String },

	#[error("HTTP request failed: {0}")]
	Request(#[from] reqwest::Error),

	#[error("Failed to decode EventSub API response: {0}")]
	Decode(#[from] serde_json::Error),
}
