use crate::messages::Subscription;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

/// Raw notification consumer, called with the subscription kind and the opaque event
pub type EventCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;
/// Called with the new session id after every welcome
pub type ConnectedCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;
/// Diagnostic sink for server-side revocations
pub type RevocationCallback = Arc<dyn Fn(&Subscription) + Send + Sync>;

/// Ordered list of notification consumers
#[derive(Clone, Default)]
pub struct EventFanout {
	callbacks: Arc<RwLock<Vec<EventCallback>>>,
}

impl EventFanout {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, callback: EventCallback) {
		self.callbacks.write().unwrap_or_else(std::sync::PoisonError::into_inner).push(callback);
	}

	pub fn len(&self) -> usize {
		self.callbacks.read().unwrap_or_else(std::sync::PoisonError::into_inner).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Calls every consumer in registration order. A panicking consumer is
	/// logged and skipped. Returns how many consumers completed.
	pub fn notify(&self, kind: &str, payload: &Value) -> usize {
		let callbacks = self.callbacks.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone();

		let mut delivered = 0;
		for (index, callback) in callbacks.iter().enumerate() {
			match catch_unwind(AssertUnwindSafe(|| callback(kind, payload))) {
				Ok(()) => delivered += 1,
				Err(panic) => error!(kind, index, "Event callback panicked: {}", panic_message(&panic)),
			}
		}

		trace!(kind, delivered, "Notification fanned out");
		delivered
	}
}

/// Owner-supplied lifecycle callbacks, replaceable at any time
#[derive(Default)]
pub(crate) struct Hooks {
	connected: RwLock<Option<ConnectedCallback>>,
	revocation: RwLock<Option<RevocationCallback>>,
}

impl Hooks {
	pub fn set_connected(&self, callback: ConnectedCallback) {
		*self.connected.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(callback);
	}

	pub fn set_revocation(&self, callback: RevocationCallback) {
		*self.revocation.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(callback);
	}

	/// Awaits the connected callback; a panic inside it is logged, not propagated
	pub async fn connected(&self, session_id: String) {
		let callback = self.connected.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
		let Some(callback) = callback else {
			return;
		};

		if let Err(panic) = AssertUnwindSafe(callback(session_id)).catch_unwind().await {
			error!("Connected callback panicked: {}", panic_message(&panic));
		}
	}

	pub fn revoked(&self, subscription: &Subscription) {
		let callback = self.revocation.read().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
		if let Some(callback) = callback {
			if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(subscription))) {
				error!("Revocation callback panicked: {}", panic_message(&panic));
			}
		}
	}
}

/// Path from the read loop to the fan-out
#[derive(Clone)]
pub(crate) enum Dispatcher {
	/// Callbacks run on the reader task
	Inline(EventFanout),
	/// FIFO hand-off to a single worker task
	Queued(mpsc::Sender<(String, Value)>),
}

impl Dispatcher {
	/// Queued dispatch waits for room in the queue, so a stalled worker stalls the reader
	pub async fn dispatch(&self, kind: String, payload: Value) {
		match self {
			Self::Inline(fanout) => {
				fanout.notify(&kind, &payload);
			}
			Self::Queued(sender) => {
				if sender.send((kind, payload)).await.is_err() {
					debug!("Dispatch worker has stopped, dropping notification");
				}
			}
		}
	}

	/// Starts the worker for queued dispatch. The worker drains what is queued
	/// and exits once every sender is dropped.
	pub fn queued(fanout: EventFanout, capacity: usize) -> (Self, JoinHandle<()>) {
		let (sender, mut receiver) = mpsc::channel::<(String, Value)>(capacity.max(1));

		let worker = tokio::spawn(async move {
			while let Some((kind, payload)) = receiver.recv().await {
				fanout.notify(&kind, &payload);
			}
			debug!("Dispatch worker exited");
		});

		(Self::Queued(sender), worker)
	}
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
	if let Some(message) = panic.downcast_ref::<&str>() {
		message
	} else if let Some(message) = panic.downcast_ref::<String>() {
		message.as_str()
	} else {
		"non-string panic payload"
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use std::sync::Mutex;

	fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> EventCallback {
		let log = log.clone();
		Arc::new(move |kind: &str, _: &Value| log.lock().unwrap().push(format!("{tag}:{kind}")))
	}

	#[test]
	fn test_notify_in_registration_order() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let fanout = EventFanout::new();
		fanout.register(recorder(&log, "a"));
		fanout.register(recorder(&log, "b"));

		assert_eq!(fanout.notify("stream.online", &json!({})), 2);
		assert_eq!(*log.lock().unwrap(), vec!["a:stream.online", "b:stream.online"]);
	}

	#[test]
	fn test_panicking_callback_is_isolated() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let fanout = EventFanout::new();
		fanout.register(recorder(&log, "first"));
		fanout.register(Arc::new(|_: &str, _: &Value| panic!("consumer bug")));
		fanout.register(recorder(&log, "last"));

		assert_eq!(fanout.notify("stream.offline", &json!({})), 2);
		assert_eq!(*log.lock().unwrap(), vec!["first:stream.offline", "last:stream.offline"]);
	}

	#[tokio::test]
	async fn test_queued_dispatch_preserves_order() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let fanout = EventFanout::new();
		fanout.register(recorder(&log, "q"));

		let (dispatcher, worker) = Dispatcher::queued(fanout, 2);
		for kind in ["one", "two", "three", "four"] {
			dispatcher.dispatch(kind.to_string(), json!({})).await;
		}
		drop(dispatcher);
		worker.await.unwrap();

		assert_eq!(*log.lock().unwrap(), vec!["q:one", "q:two", "q:three", "q:four"]);
	}

	#[tokio::test]
	async fn test_connected_hook_panic_is_contained() {
		let hooks = Hooks::default();
		hooks.connected("ignored".to_string()).await;

		hooks.set_connected(Arc::new(|_: String| async { panic!("owner bug") }.boxed()));
		hooks.connected("abc".to_string()).await;
	}
}
