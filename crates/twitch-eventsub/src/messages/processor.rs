use crate::core::Session;
use crate::messages::{Envelope, MessageError, MessageType, NotificationPayload, RevocationPayload, SessionPayload, Subscription};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{instrument, trace, warn};

type Result<T> = std::result::Result<T, MessageError>;

/// A decoded frame, ready for routing
#[derive(Debug, Clone)]
pub enum InboundMessage {
	Welcome(Session),
	Keepalive,
	Notification { subscription: Subscription, event: Value },
	Reconnect { reconnect_url: String },
	Revocation(Subscription),
	/// Kind this client does not know about; kept for forward compatibility
	Unknown { message_id: String },
}

pub struct EventSubMessageProcessor {
	/// Frames processed per message type
	message_stats: HashMap<String, u64>,
}

impl EventSubMessageProcessor {
	pub fn new() -> Self {
		Self { message_stats: HashMap::new() }
	}

	/// Decode the envelope, then the kind-specific payload
	#[instrument(skip(self, text), fields(message_len = text.len()))]
	pub fn process_message(&mut self, text: &str) -> Result<InboundMessage> {
		let envelope: Envelope = serde_json::from_str(text).map_err(|e| {
			trace!("Failed message content (first 200 chars): {}", text.chars().take(200).collect::<String>());
			MessageError::JsonParse(e)
		})?;

		let message_type = envelope.metadata.message_type;
		self.update_message_stats(message_type);

		let message = match message_type {
			MessageType::SessionWelcome => {
				let payload: SessionPayload = decode_payload(message_type, envelope.payload)?;
				// absent or zero: the server promises no keepalives for this session
				let keepalive = payload.session.keepalive_timeout_seconds.unwrap_or(0);

				InboundMessage::Welcome(Session {
					id: payload.session.id,
					heartbeat_timeout: Duration::from_secs(keepalive),
					migration_target: payload.session.reconnect_url,
				})
			}
			MessageType::SessionKeepalive => InboundMessage::Keepalive,
			MessageType::Notification => {
				let payload: NotificationPayload = decode_payload(message_type, envelope.payload)?;
				InboundMessage::Notification {
					subscription: payload.subscription,
					event: payload.event,
				}
			}
			MessageType::SessionReconnect => {
				let payload: SessionPayload = decode_payload(message_type, envelope.payload)?;
				let reconnect_url = payload.session.reconnect_url.ok_or(MessageError::MissingField {
					field: "reconnect_url",
					message_type: message_type.as_str(),
				})?;
				InboundMessage::Reconnect { reconnect_url }
			}
			MessageType::Revocation => {
				let payload: RevocationPayload = decode_payload(message_type, envelope.payload)?;
				InboundMessage::Revocation(payload.subscription)
			}
			MessageType::Unknown => {
				warn!(message_id = %envelope.metadata.message_id, "Unknown EventSub message type, ignoring");
				InboundMessage::Unknown {
					message_id: envelope.metadata.message_id,
				}
			}
		};

		Ok(message)
	}

	fn update_message_stats(&mut self, message_type: MessageType) {
		*self.message_stats.entry(message_type.as_str().to_string()).or_insert(0) += 1;
	}

	pub fn get_message_stats(&self) -> &HashMap<String, u64> {
		&self.message_stats
	}

	pub fn reset_stats(&mut self) {
		self.message_stats.clear();
	}
}

impl Default for EventSubMessageProcessor {
	fn default() -> Self {
		Self::new()
	}
}

fn decode_payload<T: DeserializeOwned>(message_type: MessageType, payload: Value) -> Result<T> {
	serde_json::from_value(payload).map_err(|source| MessageError::Payload {
		message_type: message_type.as_str(),
		source,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn frame(message_type: &str, payload: Value) -> String {
		json!({
			"metadata": {
				"message_id": "96a3f3b5-5dec-4eed-908e-e11ee657416c",
				"message_type": message_type,
				"message_timestamp": "2023-07-19T14:56:51.634234626Z"
			},
			"payload": payload
		})
		.to_string()
	}

	#[test]
	fn test_welcome_populates_session() {
		let mut processor = EventSubMessageProcessor::new();
		let text = frame(
			"session_welcome",
			json!({"session": {
				"id": "AQoQILE98gtqShGmLD7AM6yJThAB",
				"status": "connected",
				"connected_at": "2023-07-19T14:56:51.616329898Z",
				"keepalive_timeout_seconds": 10,
				"reconnect_url": null
			}}),
		);

		match processor.process_message(&text).unwrap() {
			InboundMessage::Welcome(session) => {
				assert_eq!(session.id, "AQoQILE98gtqShGmLD7AM6yJThAB");
				assert_eq!(session.heartbeat_timeout, Duration::from_secs(10));
				assert!(session.migration_target.is_none());
			}
			other => panic!("Expected welcome, got {other:?}"),
		}
	}

	#[test]
	fn test_welcome_without_keepalive_still_opens_session() {
		let mut processor = EventSubMessageProcessor::new();
		let text = frame("session_welcome", json!({"session": {"id": "abc", "status": "connected", "keepalive_timeout_seconds": null}}));

		match processor.process_message(&text).unwrap() {
			InboundMessage::Welcome(session) => {
				assert_eq!(session.id, "abc");
				assert_eq!(session.heartbeat_timeout, Duration::ZERO);
				assert_eq!(session.liveness_deadline(), None);
			}
			other => panic!("Expected welcome, got {other:?}"),
		}
	}

	#[test]
	fn test_keepalive_has_no_payload_action() {
		let mut processor = EventSubMessageProcessor::new();
		let message = processor.process_message(&frame("session_keepalive", json!({}))).unwrap();
		assert!(matches!(message, InboundMessage::Keepalive));
	}

	#[test]
	fn test_notification_carries_kind_and_event() {
		let mut processor = EventSubMessageProcessor::new();
		let text = frame(
			"notification",
			json!({
				"subscription": {
					"id": "f1c2a387-161a-49f9-a165-0f21d7a4e1c4",
					"status": "enabled",
					"type": "stream.online",
					"version": "1",
					"cost": 0,
					"condition": {"broadcaster_user_id": "1337"},
					"transport": {"method": "websocket", "session_id": "AQoQexAWVYKSTIu4ec_2VAxyuhAB"},
					"created_at": "2023-07-19T14:56:51.634234626Z"
				},
				"event": {"broadcaster_user_id": "1337", "type": "live"}
			}),
		);

		match processor.process_message(&text).unwrap() {
			InboundMessage::Notification { subscription, event } => {
				assert_eq!(subscription.kind, "stream.online");
				assert_eq!(subscription.condition.get("broadcaster_user_id").map(String::as_str), Some("1337"));
				assert_eq!(event["type"], "live");
			}
			other => panic!("Expected notification, got {other:?}"),
		}
	}

	#[test]
	fn test_reconnect_requires_url() {
		let mut processor = EventSubMessageProcessor::new();
		let ok = frame(
			"session_reconnect",
			json!({"session": {"id": "abc", "status": "reconnecting", "keepalive_timeout_seconds": null, "reconnect_url": "wss://eventsub.wss.twitch.tv?reconnect=1"}}),
		);
		let missing = frame("session_reconnect", json!({"session": {"id": "abc", "status": "reconnecting"}}));

		match processor.process_message(&ok).unwrap() {
			InboundMessage::Reconnect { reconnect_url } => assert_eq!(reconnect_url, "wss://eventsub.wss.twitch.tv?reconnect=1"),
			other => panic!("Expected reconnect, got {other:?}"),
		}
		assert!(matches!(
			processor.process_message(&missing),
			Err(MessageError::MissingField { field: "reconnect_url", .. })
		));
	}

	#[test]
	fn test_revocation_decodes_subscription() {
		let mut processor = EventSubMessageProcessor::new();
		let text = frame(
			"revocation",
			json!({"subscription": {
				"id": "f1c2a387",
				"status": "authorization_revoked",
				"type": "channel.update",
				"version": "1",
				"condition": {"broadcaster_user_id": "12826"},
				"transport": {"method": "websocket", "session_id": "abc"},
				"created_at": "2023-07-19T14:56:51.634234626Z",
				"cost": 1
			}}),
		);

		match processor.process_message(&text).unwrap() {
			InboundMessage::Revocation(subscription) => assert_eq!(subscription.status, "authorization_revoked"),
			other => panic!("Expected revocation, got {other:?}"),
		}
	}

	#[test]
	fn test_unknown_type_is_not_an_error() {
		let mut processor = EventSubMessageProcessor::new();
		let message = processor.process_message(&frame("session_teleport", json!({}))).unwrap();
		assert!(matches!(message, InboundMessage::Unknown { .. }));
	}

	#[test]
	fn test_malformed_frames_error() {
		let mut processor = EventSubMessageProcessor::new();

		assert!(matches!(processor.process_message("not json"), Err(MessageError::JsonParse(_))));
		assert!(matches!(
			processor.process_message(&frame("notification", json!({"event": {}}))),
			Err(MessageError::Payload { message_type: "notification", .. })
		));
	}

	#[test]
	fn test_stats_count_per_type() {
		let mut processor = EventSubMessageProcessor::new();
		processor.process_message(&frame("session_keepalive", json!({}))).unwrap();
		processor.process_message(&frame("session_keepalive", json!({}))).unwrap();
		let _ = processor.process_message(&frame("notification", json!({})));

		let stats = processor.get_message_stats();
		assert_eq!(stats.get("session_keepalive"), Some(&2));
		assert_eq!(stats.get("notification"), Some(&1));

		processor.reset_stats();
		assert!(processor.get_message_stats().is_empty());
	}
}
