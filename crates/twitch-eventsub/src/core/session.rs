use crate::config::KEEPALIVE_GRACE_FACTOR;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Server-assigned identity bound to one physical connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
	pub id: String,
	pub heartbeat_timeout: Duration,
	pub migration_target: Option<String>,
}

impl Session {
	/// Silence tolerated before the connection is declared stale. `None` when
	/// the welcome carried no keepalive timeout.
	pub fn liveness_deadline(&self) -> Option<Duration> {
		if self.heartbeat_timeout.is_zero() {
			return None;
		}
		Some(self.heartbeat_timeout.mul_f64(KEEPALIVE_GRACE_FACTOR))
	}
}

/// Snapshot of the liveness clock
#[derive(Debug, Clone, Copy)]
pub struct Liveness {
	pub since_last_frame: Duration,
	/// A welcome has been received on the current connection
	pub welcomed: bool,
	/// `None` before the welcome, or when the session has no keepalive timeout
	pub deadline: Option<Duration>,
}

#[derive(Debug)]
struct Shared {
	session: Option<Session>,
	pending_target: Option<String>,
	last_frame_at: Instant,
}

/// Every field the reader, monitor and supervisor share sits behind this one lock.
#[derive(Debug, Clone)]
pub struct SessionState {
	inner: Arc<Mutex<Shared>>,
}

impl SessionState {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Mutex::new(Shared {
				session: None,
				pending_target: None,
				last_frame_at: Instant::now(),
			})),
		}
	}

	pub async fn session(&self) -> Option<Session> {
		self.inner.lock().await.session.clone()
	}

	pub async fn session_id(&self) -> Option<String> {
		self.inner.lock().await.session.as_ref().map(|s| s.id.clone())
	}

	pub(crate) async fn begin_session(&self, session: Session) {
		self.inner.lock().await.session = Some(session);
	}

	pub(crate) async fn invalidate(&self) -> Option<Session> {
		self.inner.lock().await.session.take()
	}

	pub(crate) async fn touch(&self) {
		self.inner.lock().await.last_frame_at = Instant::now();
	}

	pub(crate) async fn set_migration_target(&self, url: String) {
		self.inner.lock().await.pending_target = Some(url);
	}

	/// One-shot: the next dial consumes the target, later dials use the default
	pub(crate) async fn take_migration_target(&self) -> Option<String> {
		self.inner.lock().await.pending_target.take()
	}

	pub(crate) async fn liveness(&self) -> Liveness {
		let shared = self.inner.lock().await;
		Liveness {
			since_last_frame: shared.last_frame_at.elapsed(),
			welcomed: shared.session.is_some(),
			deadline: shared.session.as_ref().and_then(Session::liveness_deadline),
		}
	}
}

impl Default for SessionState {
	fn default() -> Self {
		Self::new()
	}
}
