//! Typed payloads for the event kinds the tray follows, plus the adapter that
//! turns raw `(kind, payload)` notifications into typed callbacks.

use crate::core::EventCallback;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionKind {
	#[serde(rename = "stream.online")]
	StreamOnline,
	#[serde(rename = "stream.offline")]
	StreamOffline,
	#[serde(rename = "channel.update")]
	ChannelUpdate,
}

impl SubscriptionKind {
	/// Kinds registered for every followed channel
	pub const CHANNEL_DEFAULTS: [Self; 3] = [Self::StreamOnline, Self::StreamOffline, Self::ChannelUpdate];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::StreamOnline => "stream.online",
			Self::StreamOffline => "stream.offline",
			Self::ChannelUpdate => "channel.update",
		}
	}

	pub fn version(&self) -> &'static str {
		"1"
	}

	pub fn parse(kind: &str) -> Option<Self> {
		match kind {
			"stream.online" => Some(Self::StreamOnline),
			"stream.offline" => Some(Self::StreamOffline),
			"channel.update" => Some(Self::ChannelUpdate),
			_ => None,
		}
	}
}

impl fmt::Display for SubscriptionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOnlineEvent {
	pub id: String,
	pub broadcaster_user_id: String,
	pub broadcaster_user_login: String,
	pub broadcaster_user_name: String,
	/// "live", "playlist", "watch_party", "premiere" or "rerun"
	#[serde(rename = "type")]
	pub stream_type: String,
	pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOfflineEvent {
	pub broadcaster_user_id: String,
	pub broadcaster_user_login: String,
	pub broadcaster_user_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUpdateEvent {
	pub broadcaster_user_id: String,
	pub broadcaster_user_login: String,
	pub broadcaster_user_name: String,
	pub title: String,
	pub language: String,
	pub category_id: String,
	pub category_name: String,
	#[serde(default)]
	pub content_classification_labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedEvent {
	StreamOnline(StreamOnlineEvent),
	StreamOffline(StreamOfflineEvent),
	ChannelUpdate(ChannelUpdateEvent),
}

impl TypedEvent {
	/// `Ok(None)` for kinds without a typed representation
	pub fn decode(kind: &str, payload: &Value) -> Result<Option<Self>, serde_json::Error> {
		let event = match SubscriptionKind::parse(kind) {
			Some(SubscriptionKind::StreamOnline) => Self::StreamOnline(StreamOnlineEvent::deserialize(payload)?),
			Some(SubscriptionKind::StreamOffline) => Self::StreamOffline(StreamOfflineEvent::deserialize(payload)?),
			Some(SubscriptionKind::ChannelUpdate) => Self::ChannelUpdate(ChannelUpdateEvent::deserialize(payload)?),
			None => return Ok(None),
		};
		Ok(Some(event))
	}
}

type Handler<T> = Box<dyn Fn(T) + Send + Sync>;

/// Typed callbacks; unset kinds are skipped
#[derive(Default)]
pub struct TypedHandlers {
	on_stream_online: Option<Handler<StreamOnlineEvent>>,
	on_stream_offline: Option<Handler<StreamOfflineEvent>>,
	on_channel_update: Option<Handler<ChannelUpdateEvent>>,
}

impl TypedHandlers {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on_stream_online<F>(mut self, handler: F) -> Self
	where
		F: Fn(StreamOnlineEvent) + Send + Sync + 'static,
	{
		self.on_stream_online = Some(Box::new(handler));
		self
	}

	pub fn on_stream_offline<F>(mut self, handler: F) -> Self
	where
		F: Fn(StreamOfflineEvent) + Send + Sync + 'static,
	{
		self.on_stream_offline = Some(Box::new(handler));
		self
	}

	pub fn on_channel_update<F>(mut self, handler: F) -> Self
	where
		F: Fn(ChannelUpdateEvent) + Send + Sync + 'static,
	{
		self.on_channel_update = Some(Box::new(handler));
		self
	}

	fn handle(&self, kind: &str, payload: &Value) {
		let event = match TypedEvent::decode(kind, payload) {
			Ok(Some(event)) => event,
			Ok(None) => return,
			Err(e) => {
				warn!(kind, error = %e, "Failed to decode EventSub event payload");
				return;
			}
		};

		match event {
			TypedEvent::StreamOnline(e) => {
				if let Some(handler) = &self.on_stream_online {
					handler(e);
				}
			}
			TypedEvent::StreamOffline(e) => {
				if let Some(handler) = &self.on_stream_offline {
					handler(e);
				}
			}
			TypedEvent::ChannelUpdate(e) => {
				if let Some(handler) = &self.on_channel_update {
					handler(e);
				}
			}
		}
	}

	/// Raw fan-out callback that decodes by kind and calls the typed handler
	pub fn into_callback(self) -> EventCallback {
		let handlers = Arc::new(self);
		Arc::new(move |kind: &str, payload: &Value| handlers.handle(kind, payload))
	}
}
