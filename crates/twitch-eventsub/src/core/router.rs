use super::{Dispatcher, Hooks, SessionState};
use crate::messages::{InboundMessage, MessageProcessor};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Why the current connection has to be replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectReason {
	/// Read failed with anything other than a normal closure
	ReadError(String),
	/// No frame within the liveness deadline
	HeartbeatTimeout,
	/// Server asked to move to this URL
	Migration(String),
}

/// Decodes frames and applies their effects, one frame at a time
#[derive(Clone)]
pub(crate) struct MessageRouter {
	processor: MessageProcessor,
	session: SessionState,
	dispatcher: Dispatcher,
	hooks: Arc<Hooks>,
}

impl MessageRouter {
	pub fn new(processor: MessageProcessor, session: SessionState, dispatcher: Dispatcher, hooks: Arc<Hooks>) -> Self {
		Self {
			processor,
			session,
			dispatcher,
			hooks,
		}
	}

	/// Returns a reason only when the frame requires leaving this connection
	pub async fn handle_frame(&self, text: &str) -> Option<ReconnectReason> {
		let message = match self.processor.process_message(text).await {
			Ok(message) => message,
			Err(e) => {
				warn!(error = %e, "Dropping malformed EventSub frame");
				return None;
			}
		};
		self.session.touch().await;

		match message {
			InboundMessage::Welcome(session) => {
				let session_id = session.id.clone();
				info!(
					session_id = %session_id,
					keepalive_secs = session.heartbeat_timeout.as_secs(),
					"EventSub session welcomed"
				);
				self.session.begin_session(session).await;
				self.hooks.connected(session_id).await;
				None
			}
			InboundMessage::Keepalive => {
				trace!("EventSub keepalive");
				None
			}
			InboundMessage::Notification { subscription, event } => {
				debug!(kind = %subscription.kind, subscription_id = %subscription.id, "EventSub notification");
				self.dispatcher.dispatch(subscription.kind, event).await;
				None
			}
			InboundMessage::Reconnect { reconnect_url } => {
				info!(url = %reconnect_url, "EventSub requested session migration");
				self.session.set_migration_target(reconnect_url.clone()).await;
				Some(ReconnectReason::Migration(reconnect_url))
			}
			InboundMessage::Revocation(subscription) => {
				warn!(
					kind = %subscription.kind,
					subscription_id = %subscription.id,
					status = %subscription.status,
					"EventSub subscription revoked"
				);
				self.hooks.revoked(&subscription);
				None
			}
			InboundMessage::Unknown { message_id } => {
				debug!(message_id = %message_id, "Ignoring unknown EventSub message");
				None
			}
		}
	}
}
