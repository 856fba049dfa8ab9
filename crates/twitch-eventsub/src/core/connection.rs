use super::{Connection, MessageRouter, ReconnectReason, SessionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

/// Frame reader for one connection. Processes each frame to completion before
/// reading the next.
pub(crate) async fn read_loop(connection: Arc<dyn Connection>, router: MessageRouter, signal: mpsc::Sender<ReconnectReason>, cancel: CancellationToken) {
	loop {
		let frame = tokio::select! {
			() = cancel.cancelled() => break,
			frame = connection.read() => frame,
		};

		match frame {
			Ok(text) => {
				let outcome = tokio::select! {
					() = cancel.cancelled() => break,
					outcome = router.handle_frame(&text) => outcome,
				};

				if let Some(reason) = outcome {
					let _ = signal.try_send(reason);
					break;
				}
			}
			Err(e) if e.is_normal_closure() => {
				info!("EventSub connection closed normally by server");
				break;
			}
			Err(e) => {
				warn!(error = %e, "EventSub read failed");
				let _ = signal.try_send(ReconnectReason::ReadError(e.to_string()));
				break;
			}
		}
	}

	trace!("Reader exited");
}

/// Periodically compares the liveness clock against the deadline. Before the
/// welcome arrives the deadline is `welcome_timeout`. A session welcomed
/// without a keepalive timeout is never declared stale.
pub(crate) async fn liveness_monitor(
	session: SessionState,
	check_interval: Duration,
	welcome_timeout: Duration,
	signal: mpsc::Sender<ReconnectReason>,
	cancel: CancellationToken,
) {
	let mut ticker = tokio::time::interval(check_interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
	// first tick completes immediately
	ticker.tick().await;

	loop {
		tokio::select! {
			() = cancel.cancelled() => break,
			_ = ticker.tick() => {}
		}

		let liveness = session.liveness().await;
		let deadline = match (liveness.welcomed, liveness.deadline) {
			(false, _) => welcome_timeout,
			(true, Some(deadline)) => deadline,
			(true, None) => continue,
		};

		if liveness.since_last_frame > deadline {
			warn!(
				silent_secs = liveness.since_last_frame.as_secs(),
				deadline_secs = deadline.as_secs_f64(),
				welcomed = liveness.welcomed,
				"EventSub keepalive deadline exceeded"
			);
			let _ = signal.try_send(ReconnectReason::HeartbeatTimeout);
			break;
		}
	}

	trace!("Liveness monitor exited");
}
