mod error;
mod processor;
mod types;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

pub use error::MessageError;
pub use processor::{EventSubMessageProcessor, InboundMessage};
pub use types::{Envelope, MessageType, Metadata, NotificationPayload, RevocationPayload, SessionInfo, SessionPayload, Subscription, TransportInfo};

type Result<T> = std::result::Result<T, MessageError>;

/// Thread-safe message processor wrapper
#[derive(Clone, Default)]
pub struct MessageProcessor {
	processor: Arc<Mutex<EventSubMessageProcessor>>,
}

impl MessageProcessor {
	pub fn new() -> Self {
		Self::default()
	}

	#[instrument(skip(self, text))]
	pub async fn process_message(&self, text: &str) -> Result<InboundMessage> {
		self.processor.lock().await.process_message(text)
	}

	pub async fn get_stats(&self) -> HashMap<String, u64> {
		self.processor.lock().await.get_message_stats().clone()
	}

	pub async fn reset_stats(&self) {
		self.processor.lock().await.reset_stats();
	}
}
