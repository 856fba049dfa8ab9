use crate::EventSubService;
use std::sync::Arc;
use tokio::time::interval;
use twitch_eventsub::ConnectionState;

impl EventSubService {
	/// Spawn task that logs state changes and periodic frame counters
	pub fn spawn_health_checker(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
		tokio::spawn(async move {
			tracing::info!("💓 Starting health checker");

			let mut state = self.client.watch_state();
			let mut check_interval = interval(self.config.health_check_interval);
			check_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

			loop {
				tokio::select! {
					_ = self.cancel_token.cancelled() => {
						tracing::info!("🛑 Health checker shutting down");
						break;
					}
					changed = state.changed() => {
						if changed.is_err() {
							break;
						}
						let current = *state.borrow_and_update();
						match current {
							ConnectionState::Active => tracing::info!("💚 EventSub connection active"),
							ConnectionState::Reconnecting => tracing::warn!("💔 EventSub connection lost, reconnecting"),
							other => tracing::debug!("EventSub state: {:?}", other),
						}
					}
					_ = check_interval.tick() => {
						let session = self.client.session_id().await;
						let tracked = self.client.subscriptions().len().await;
						let stats = self.client.message_stats().await;
						tracing::debug!(
							"📊 state={:?} session={:?} tracked={} frames={:?}",
							self.client.state(),
							session,
							tracked,
							stats
						);
					}
				}
			}

			tracing::info!("✅ Health checker stopped");
		})
	}
}
