use crate::EventSubService;
use twitch_eventsub::TypedHandlers;

impl EventSubService {
	/// Log stream and channel changes as they arrive
	pub(crate) fn register_event_handlers(&self) {
		let handlers = TypedHandlers::new()
			.on_stream_online(|event| {
				tracing::info!("🔴 {} is live ({}) since {}", event.broadcaster_user_name, event.stream_type, event.started_at);
			})
			.on_stream_offline(|event| {
				tracing::info!("⚫ {} went offline", event.broadcaster_user_name);
			})
			.on_channel_update(|event| {
				tracing::info!("📝 {} updated: \"{}\" in {} [{}]", event.broadcaster_user_name, event.title, event.category_name, event.language);
			});

		self.client.on_typed_events(handlers);

		self.client.on_revocation(|subscription| {
			tracing::warn!("⚠️ Subscription {} ({}) revoked: {}", subscription.id, subscription.kind, subscription.status);
		});
	}
}
