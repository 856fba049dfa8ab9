use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
	SessionWelcome,
	SessionKeepalive,
	Notification,
	SessionReconnect,
	Revocation,
	#[serde(other)]
	Unknown,
}

impl MessageType {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::SessionWelcome => "session_welcome",
			Self::SessionKeepalive => "session_keepalive",
			Self::Notification => "notification",
			Self::SessionReconnect => "session_reconnect",
			Self::Revocation => "revocation",
			Self::Unknown => "unknown",
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
	pub message_id: String,
	pub message_type: MessageType,
	pub message_timestamp: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub subscription_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub subscription_version: Option<String>,
}

/// Envelope of every frame pushed by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
	pub metadata: Metadata,
	#[serde(default)]
	pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
	pub id: String,
	#[serde(default)]
	pub status: String,
	#[serde(default)]
	pub connected_at: String,
	#[serde(default)]
	pub keepalive_timeout_seconds: Option<u64>,
	#[serde(default)]
	pub reconnect_url: Option<String>,
}

/// Payload shared by `session_welcome` and `session_reconnect`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPayload {
	pub session: SessionInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportInfo {
	pub method: String,
	#[serde(default)]
	pub session_id: Option<String>,
}

/// A registration as echoed back by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
	pub id: String,
	#[serde(default)]
	pub status: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub condition: HashMap<String, String>,
	pub transport: TransportInfo,
	#[serde(default)]
	pub created_at: String,
	#[serde(default)]
	pub cost: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
	pub subscription: Subscription,
	pub event: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationPayload {
	pub subscription: Subscription,
}
