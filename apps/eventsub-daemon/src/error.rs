use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
	#[error("EventSub error: {0}")]
	EventSub(#[from] twitch_eventsub::EventSubError),

	#[error("Configuration error: {0}")]
	Config(String),

	#[error("Timeout: {0}")]
	Timeout(String),
}
