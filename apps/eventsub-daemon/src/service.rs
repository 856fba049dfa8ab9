use crate::{Config, Error, Result};
use std::sync::Arc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use twitch_eventsub::{Credentials, EventSubClient};

pub mod events;
pub mod heartbeat;

/// Keeps one EventSub session alive and the configured channels subscribed on it
pub struct EventSubService {
	config: Config,
	client: EventSubClient,
	cancel_token: CancellationToken,
}

impl EventSubService {
	pub fn new(config: Config) -> Result<Self> {
		tracing::info!("🔌 Initializing EventSub service");

		let credentials = Arc::new(Credentials::new(config.client_id.clone(), config.access_token.clone()));
		let client = EventSubClient::new(config.eventsub.clone(), credentials)?;

		Ok(Self::with_client(config, client))
	}

	/// Service around an already built client
	pub fn with_client(config: Config, client: EventSubClient) -> Self {
		Self {
			config,
			client,
			cancel_token: CancellationToken::new(),
		}
	}

	/// Run the service until shutdown
	pub async fn run(self) -> Result<()> {
		let service = Arc::new(self);

		// Setup graceful shutdown handler
		let shutdown_token = service.cancel_token.clone();
		tokio::spawn(async move {
			match tokio::signal::ctrl_c().await {
				Ok(()) => {
					tracing::info!("🛑 Shutdown signal received");
					shutdown_token.cancel();
				}
				Err(e) => {
					tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
				}
			}
		});

		service.register_event_handlers();
		service.register_resubscribe();
		service.client.connect().await?;

		let health_checker = service.clone().spawn_health_checker();

		// Wait for shutdown signal
		service.cancel_token.cancelled().await;
		tracing::info!("🔄 Initiating graceful shutdown...");

		let drained = service.shutdown().await;
		let _ = health_checker.await;

		let cleared = drained?;
		tracing::info!("🧹 Removed {} subscriptions", cleared);
		tracing::info!("✅ Graceful shutdown complete");
		Ok(())
	}

	/// Closes the client, then deletes every tracked subscription. Closing first
	/// stops a resubscribe still running on the reader from adding entries after
	/// the clear.
	pub async fn shutdown(&self) -> Result<usize> {
		let shutdown_timeout = self.config.shutdown_timeout;
		timeout(shutdown_timeout, async {
			self.client.close().await;
			self.client.clear_subscriptions().await
		})
		.await
		.map_err(|_| Error::Timeout(format!("shutdown did not finish within {shutdown_timeout:?}")))
	}

	/// Subscribes the configured channels on every welcome. The client never
	/// replays subscriptions by itself.
	fn register_resubscribe(&self) {
		let subscriptions = self.client.subscriptions();
		let broadcaster_ids: Arc<[String]> = self.config.broadcaster_ids.clone().into();

		self.client.on_connected(move |session_id| {
			let subscriptions = subscriptions.clone();
			let broadcaster_ids = broadcaster_ids.clone();

			async move {
				tracing::info!("🔗 Session {} ready, subscribing {} channels", session_id, broadcaster_ids.len());

				match subscriptions.subscribe_channels(&broadcaster_ids[..]).await {
					Ok(results) => {
						let failed: Vec<&str> = results.iter().filter(|r| !r.is_ok()).map(|r| r.entity_id.as_str()).collect();
						if failed.is_empty() {
							tracing::info!("✅ Subscribed {} channels", results.len());
						} else {
							tracing::warn!("⚠️ Subscribed {} of {} channels, failed: {:?}", results.len() - failed.len(), results.len(), failed);
						}
					}
					Err(e) => tracing::warn!("⚠️ Could not subscribe channels: {}", e),
				}
			}
		});
	}
}
