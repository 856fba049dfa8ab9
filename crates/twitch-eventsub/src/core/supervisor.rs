use super::connection::{liveness_monitor, read_loop};
use super::{Backoff, Connection, Connector, MessageRouter, ReconnectReason, SessionState, StateCell, StateTransition, TransportError};
use crate::config::EventSubConfig;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Owns the connect / backoff / reconnect cycle and exactly one reader and
/// monitor pair at a time.
pub(crate) struct Supervisor {
	config: EventSubConfig,
	connector: Arc<dyn Connector>,
	router: MessageRouter,
	session: SessionState,
	state: StateCell,
	shutdown: CancellationToken,
}

impl Supervisor {
	pub fn new(config: EventSubConfig, connector: Arc<dyn Connector>, router: MessageRouter, session: SessionState, state: StateCell, shutdown: CancellationToken) -> Self {
		Self {
			config,
			connector,
			router,
			session,
			state,
			shutdown,
		}
	}

	/// Runs until the shutdown token is cancelled, then leaves the state `Closed`
	pub async fn run(self) {
		let mut backoff = Backoff::new(self.config.retry.clone());

		'cycle: loop {
			if self.shutdown.is_cancelled() || self.state.apply(StateTransition::Connect).is_err() {
				break;
			}

			let connection = loop {
				let url = match self.session.take_migration_target().await {
					Some(target) => {
						info!(url = %target, "Dialing EventSub migration target");
						target
					}
					None => self.config.websocket_url.clone(),
				};

				let Some(result) = self.dial(&url).await else {
					break 'cycle;
				};

				match result {
					Ok(connection) => break connection,
					Err(e) => {
						let _ = self.state.apply(StateTransition::DialFailed);
						let delay = backoff.next_delay();
						warn!(
							url = %url,
							error = %e,
							attempt = backoff.consecutive_failures(),
							delay_ms = delay.as_millis() as u64,
							"EventSub dial failed, backing off"
						);

						tokio::select! {
							() = self.shutdown.cancelled() => break 'cycle,
							() = tokio::time::sleep(delay) => {}
						}
					}
				}
			};

			backoff.reset();
			if self.state.apply(StateTransition::Opened).is_err() {
				connection.close().await;
				break;
			}
			info!("EventSub connection open");

			match self.drive(connection).await {
				None => break,
				Some(reason) => {
					info!(reason = ?reason, "EventSub reconnecting");
					if self.state.apply(StateTransition::ConnectionLost).is_err() {
						break;
					}
				}
			}
		}

		let _ = self.state.apply(StateTransition::Close);
		info!("EventSub supervisor stopped");
	}

	/// `None` when shutdown won the race
	async fn dial(&self, url: &str) -> Option<Result<Arc<dyn Connection>, TransportError>> {
		let timeout = self.config.dial_timeout;

		tokio::select! {
			() = self.shutdown.cancelled() => None,
			result = tokio::time::timeout(timeout, self.connector.open(url)) => {
				Some(result.unwrap_or(Err(TransportError::DialTimeout(timeout))))
			}
		}
	}

	/// Runs the reader and monitor until either asks for a reconnect or shutdown
	/// is requested, then tears the pair down. `None` means shutdown.
	async fn drive(&self, connection: Arc<dyn Connection>) -> Option<ReconnectReason> {
		let cancel = self.shutdown.child_token();
		// Capacity one: the first signal wins, later ones are dropped
		let (signal_tx, mut signal_rx) = mpsc::channel(1);

		self.session.touch().await;

		let reader = tokio::spawn(read_loop(connection.clone(), self.router.clone(), signal_tx.clone(), cancel.clone()));
		let monitor = tokio::spawn(liveness_monitor(
			self.session.clone(),
			self.config.keepalive_check_interval,
			self.config.welcome_timeout,
			signal_tx,
			cancel.clone(),
		));

		// The monitor holds a sender until it signals or is cancelled, so the
		// channel never closes while this select is pending.
		let outcome = tokio::select! {
			() = self.shutdown.cancelled() => None,
			Some(reason) = signal_rx.recv() => Some(reason),
		};

		cancel.cancel();
		if matches!(outcome, Some(ReconnectReason::Migration(_))) {
			// The next dial does not wait on the old socket's close handshake
			tokio::spawn(async move {
				connection.close().await;
				trace!("Migrated-from EventSub connection closed");
			});
		} else {
			connection.close().await;
		}

		if let Err(e) = reader.await {
			error!("EventSub reader task failed: {}", e);
		}
		if let Err(e) = monitor.await {
			error!("EventSub liveness monitor failed: {}", e);
		}

		if let Some(old) = self.session.invalidate().await {
			debug!(session_id = %old.id, "EventSub session invalidated");
		}

		outcome
	}
}
