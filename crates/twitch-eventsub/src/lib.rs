// twitch-eventsub Library
//
// Real-time Twitch EventSub over websocket: one supervised connection, the
// session it carries, and the per-channel subscriptions scoped to that session.
// Consumers register callbacks and decide what to (re)subscribe on every welcome.

use futures_util::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod config;
mod core;
mod events;
mod messages;
mod subscriptions;

pub use config::{DispatchMode, EventSubConfig, DEFAULT_SUBSCRIPTIONS_URL, DEFAULT_WEBSOCKET_URL, DIAL_TIMEOUT, KEEPALIVE_CHECK_INTERVAL, KEEPALIVE_GRACE_FACTOR, REQUEST_TIMEOUT, WELCOME_TIMEOUT};
pub use crate::core::{
	Backoff, ConnectedCallback, Connection, ConnectionState, Connector, EventCallback, EventFanout, Liveness, ReconnectReason, RetryConfig, RevocationCallback, Session, SessionState, StateError,
	StateTransition, TransportError, WsConnection, WsConnector,
};
pub use events::{ChannelUpdateEvent, StreamOfflineEvent, StreamOnlineEvent, SubscriptionKind, TypedEvent, TypedHandlers};
pub use messages::{
	Envelope, EventSubMessageProcessor, InboundMessage, MessageError, MessageProcessor, MessageType, Metadata, NotificationPayload, RevocationPayload, SessionInfo, SessionPayload, Subscription,
	TransportInfo,
};
pub use subscriptions::{
	ApiResponse, ChannelSubscription, Condition, CreateSubscriptionRequest, CreateSubscriptionResponse, CredentialProvider, Credentials, EnsureOutcome, EventSubApi, HelixClient, Registration,
	RegistrationKey, SubscriptionError, SubscriptionManager, TransportRequest,
};

use crate::core::{Dispatcher, Hooks, MessageRouter, StateCell, Supervisor};

/// Errors for twitch-eventsub crate
#[derive(Debug, Error)]
pub enum EventSubError {
	#[error("Transport error: {0}")]
	Transport(#[from] TransportError),

	#[error("Subscription error: {0}")]
	Subscription(#[from] SubscriptionError),

	#[error("State error: {0}")]
	State(#[from] StateError),

	#[error("Client already started")]
	AlreadyStarted,

	#[error("Client is closed")]
	Closed,
}

pub type Result<T> = std::result::Result<T, EventSubError>;

/// Owner-facing handle over the whole subsystem
pub struct EventSubClient {
	config: EventSubConfig,
	connector: Arc<dyn Connector>,
	session: SessionState,
	state: StateCell,
	processor: MessageProcessor,
	fanout: EventFanout,
	hooks: Arc<Hooks>,
	subscriptions: Arc<SubscriptionManager>,
	shutdown: CancellationToken,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventSubClient {
	/// Production client: websocket transport and Helix subscriptions endpoint
	pub fn new(config: EventSubConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
		let api = HelixClient::new(config.subscriptions_url.clone(), config.request_timeout)?;
		Ok(Self::with_parts(config, Arc::new(WsConnector), Arc::new(api), credentials))
	}

	pub fn with_parts(config: EventSubConfig, connector: Arc<dyn Connector>, api: Arc<dyn EventSubApi>, credentials: Arc<dyn CredentialProvider>) -> Self {
		let session = SessionState::new();
		let subscriptions = Arc::new(SubscriptionManager::new(api, credentials, session.clone()));

		Self {
			config,
			connector,
			session,
			state: StateCell::new(),
			processor: MessageProcessor::new(),
			fanout: EventFanout::new(),
			hooks: Arc::new(Hooks::default()),
			subscriptions,
			shutdown: CancellationToken::new(),
			tasks: Mutex::new(Vec::new()),
		}
	}

	/// Raw `(kind, payload)` consumer. Consumers run in registration order.
	pub fn on_event<F>(&self, callback: F)
	where
		F: Fn(&str, &Value) + Send + Sync + 'static,
	{
		self.fanout.register(Arc::new(callback));
	}

	pub fn on_typed_events(&self, handlers: TypedHandlers) {
		self.fanout.register(handlers.into_callback());
	}

	/// Called with the session id after every welcome, before the next frame is
	/// read. This is where the owner (re)subscribes its desired set.
	pub fn on_connected<F, Fut>(&self, callback: F)
	where
		F: Fn(String) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		self.hooks.set_connected(Arc::new(move |session_id| callback(session_id).boxed()));
	}

	pub fn on_revocation<F>(&self, callback: F)
	where
		F: Fn(&Subscription) + Send + Sync + 'static,
	{
		self.hooks.set_revocation(Arc::new(callback));
	}

	/// Starts the supervisor in the background and returns immediately
	pub async fn connect(&self) -> Result<()> {
		let mut tasks = self.tasks.lock().await;
		match self.state.current() {
			ConnectionState::Closed => return Err(EventSubError::Closed),
			ConnectionState::Idle if tasks.is_empty() => {}
			_ => return Err(EventSubError::AlreadyStarted),
		}

		let (dispatcher, worker) = match self.config.dispatch {
			DispatchMode::Inline => (Dispatcher::Inline(self.fanout.clone()), None),
			DispatchMode::Queued { capacity } => {
				let (dispatcher, worker) = Dispatcher::queued(self.fanout.clone(), capacity);
				(dispatcher, Some(worker))
			}
		};

		let router = MessageRouter::new(self.processor.clone(), self.session.clone(), dispatcher, self.hooks.clone());
		let supervisor = Supervisor::new(
			self.config.clone(),
			self.connector.clone(),
			router,
			self.session.clone(),
			self.state.clone(),
			self.shutdown.clone(),
		);

		info!(url = %self.config.websocket_url, dispatch = ?self.config.dispatch, "Starting EventSub client");
		// supervisor first: the worker only exits once the supervisor has dropped its sender
		tasks.push(tokio::spawn(supervisor.run()));
		tasks.extend(worker);

		Ok(())
	}

	/// Subscribes every configured kind for each entity against the live session
	pub async fn subscribe<S: AsRef<str>>(&self, entity_ids: &[S]) -> Result<Vec<ChannelSubscription>> {
		Ok(self.subscriptions.subscribe_channels(entity_ids).await?)
	}

	/// Best-effort remote delete; local tracking is always emptied
	pub async fn clear_subscriptions(&self) -> usize {
		self.subscriptions.clear().await
	}

	/// Stops the retry loop, closes the connection and joins every task. Must not
	/// be awaited from inside a registered callback.
	pub async fn close(&self) {
		self.shutdown.cancel();

		let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
		for task in tasks {
			if let Err(e) = task.await {
				error!("EventSub task failed during shutdown: {}", e);
			}
		}

		let _ = self.state.apply(StateTransition::Close);
		self.session.invalidate().await;
		info!("EventSub client closed");
	}

	pub fn state(&self) -> ConnectionState {
		self.state.current()
	}

	pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
		self.state.subscribe()
	}

	pub async fn session(&self) -> Option<Session> {
		self.session.session().await
	}

	pub async fn session_id(&self) -> Option<String> {
		self.session.session_id().await
	}

	/// Frames processed per message type since start
	pub async fn message_stats(&self) -> HashMap<String, u64> {
		self.processor.get_stats().await
	}

	/// Shared handle for use inside callbacks
	pub fn subscriptions(&self) -> Arc<SubscriptionManager> {
		self.subscriptions.clone()
	}

	pub fn config(&self) -> &EventSubConfig {
		&self.config
	}
}

impl Drop for EventSubClient {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}
