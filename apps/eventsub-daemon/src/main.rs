use eventsub_daemon::{Config, EventSubService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	// Initialize tracing
	tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "twitch_eventsub=info,eventsub_daemon=info".into()))
		.with(tracing_subscriber::fmt::layer())
		.init();

	tracing::info!("🚀 Starting EventSub daemon");

	let config = Config::from_env()?;

	tracing::info!("📋 Configuration loaded - {} channels, EventSub: {}", config.broadcaster_ids.len(), config.eventsub.websocket_url);

	let service = EventSubService::new(config)?;

	// Run until shutdown signal
	service.run().await?;

	tracing::info!("👋 EventSub daemon shutdown complete");
	Ok(())
}
