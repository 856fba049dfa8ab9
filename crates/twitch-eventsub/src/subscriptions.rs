mod api;
mod error;

use crate::core::SessionState;
use crate::events::SubscriptionKind;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub use api::{ApiResponse, Condition, CreateSubscriptionRequest, CreateSubscriptionResponse, CredentialProvider, Credentials, EventSubApi, HelixClient, TransportRequest};
pub use error::SubscriptionError;

type Result<T> = std::result::Result<T, SubscriptionError>;

const STATUS_NO_CONTENT: u16 = 204;
const STATUS_NOT_FOUND: u16 = 404;
const STATUS_CONFLICT: u16 = 409;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistrationKey {
	pub kind: SubscriptionKind,
	pub entity_id: String,
}

/// A registration and the session it was confirmed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
	/// `None` when the server answered 409 and never told us the id
	pub id: Option<String>,
	pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
	Created { registration_id: Option<String> },
	/// Server already had it (409)
	AlreadyExists,
	/// Tracked under the live session, no request sent
	AlreadyTracked,
}

/// Result for one entity of a batch
#[derive(Debug)]
pub struct ChannelSubscription {
	pub entity_id: String,
	pub result: Result<Vec<EnsureOutcome>>,
}

impl ChannelSubscription {
	pub fn is_ok(&self) -> bool {
		self.result.is_ok()
	}
}

/// Tracks (kind, entity) registrations for the live session
pub struct SubscriptionManager {
	api: Arc<dyn EventSubApi>,
	credentials: Arc<dyn CredentialProvider>,
	session: SessionState,
	kinds: Vec<SubscriptionKind>,
	tracked: Mutex<HashMap<RegistrationKey, Registration>>,
}

impl SubscriptionManager {
	pub fn new(api: Arc<dyn EventSubApi>, credentials: Arc<dyn CredentialProvider>, session: SessionState) -> Self {
		Self {
			api,
			credentials,
			session,
			kinds: SubscriptionKind::CHANNEL_DEFAULTS.to_vec(),
			tracked: Mutex::new(HashMap::new()),
		}
	}

	/// Replaces the kinds registered per channel
	pub fn with_kinds(mut self, kinds: Vec<SubscriptionKind>) -> Self {
		self.kinds = kinds;
		self
	}

	pub fn kinds(&self) -> &[SubscriptionKind] {
		&self.kinds
	}

	/// Idempotent per (kind, entity) within one session. An entry tracked under
	/// an earlier session is re-issued.
	#[instrument(skip(self))]
	pub async fn ensure(&self, kind: SubscriptionKind, entity_id: &str) -> Result<EnsureOutcome> {
		let key = RegistrationKey {
			kind,
			entity_id: entity_id.to_string(),
		};

		// Held across the request so concurrent ensures of one key send one create.
		// The session is read under it, a waiter may outlive the session it queued on.
		let mut tracked = self.tracked.lock().await;
		let session_id = self.session.session_id().await.ok_or(SubscriptionError::NotReady)?;
		let known_id = match tracked.get(&key) {
			Some(existing) if existing.session_id == session_id => return Ok(EnsureOutcome::AlreadyTracked),
			Some(existing) => {
				debug!(previous_session = %existing.session_id, "Reconfirming registration under new session");
				existing.id.clone()
			}
			None => None,
		};

		let request = CreateSubscriptionRequest::websocket(kind, entity_id, &session_id);
		let response = self.api.create(&self.credentials.credentials(), &request).await?;

		match response.status {
			STATUS_CONFLICT => {
				debug!(entity_id, "Subscription already exists");
				tracked.insert(key, Registration { id: known_id, session_id });
				Ok(EnsureOutcome::AlreadyExists)
			}
			status if (200..300).contains(&status) => {
				let body: CreateSubscriptionResponse = serde_json::from_str(&response.body)?;
				let registration_id = body.data.into_iter().next().map(|s| s.id);
				info!(entity_id, registration_id = ?registration_id, "Subscribed");
				tracked.insert(
					key,
					Registration {
						id: registration_id.clone(),
						session_id,
					},
				);
				Ok(EnsureOutcome::Created { registration_id })
			}
			status => Err(SubscriptionError::Http { status, body: response.body }),
		}
	}

	/// Ensures every configured kind for one channel, stopping at the first failure
	pub async fn subscribe_channel(&self, entity_id: &str) -> Result<Vec<EnsureOutcome>> {
		let mut outcomes = Vec::with_capacity(self.kinds.len());
		for kind in &self.kinds {
			outcomes.push(self.ensure(*kind, entity_id).await?);
		}
		Ok(outcomes)
	}

	/// One result per entity; a failing entity does not stop the batch
	pub async fn subscribe_channels<S: AsRef<str>>(&self, entity_ids: &[S]) -> Result<Vec<ChannelSubscription>> {
		if self.session.session_id().await.is_none() {
			return Err(SubscriptionError::NotReady);
		}

		let mut results = Vec::with_capacity(entity_ids.len());
		for entity_id in entity_ids {
			let entity_id = entity_id.as_ref();
			let result = self.subscribe_channel(entity_id).await;
			if let Err(e) = &result {
				warn!(entity_id, error = %e, "Failed to subscribe channel");
			}
			results.push(ChannelSubscription {
				entity_id: entity_id.to_string(),
				result,
			});
		}

		Ok(results)
	}

	/// 204 and 404 both count as deleted
	#[instrument(skip(self))]
	pub async fn delete(&self, registration_id: &str) -> Result<()> {
		let response = self.api.delete(&self.credentials.credentials(), registration_id).await?;

		match response.status {
			STATUS_NO_CONTENT | STATUS_NOT_FOUND => {
				self.tracked.lock().await.retain(|_, r| r.id.as_deref() != Some(registration_id));
				Ok(())
			}
			status => Err(SubscriptionError::Http { status, body: response.body }),
		}
	}

	/// Best-effort delete of every tracked id. The tracked set is always empty
	/// afterwards. Returns how many entries were dropped.
	pub async fn clear(&self) -> usize {
		let drained: Vec<(RegistrationKey, Registration)> = self.tracked.lock().await.drain().collect();
		let credentials = self.credentials.credentials();

		for (key, registration) in &drained {
			let Some(id) = registration.id.as_deref() else {
				continue;
			};

			match self.api.delete(&credentials, id).await {
				Ok(response) if matches!(response.status, STATUS_NO_CONTENT | STATUS_NOT_FOUND) => {}
				Ok(response) => warn!(kind = %key.kind, entity_id = %key.entity_id, status = response.status, "Failed to delete subscription"),
				Err(e) => warn!(kind = %key.kind, entity_id = %key.entity_id, error = %e, "Failed to delete subscription"),
			}
		}

		info!(count = drained.len(), "Cleared subscriptions");
		drained.len()
	}

	pub async fn tracked(&self) -> HashMap<RegistrationKey, Registration> {
		self.tracked.lock().await.clone()
	}

	pub async fn is_tracked(&self, kind: SubscriptionKind, entity_id: &str) -> bool {
		let key = RegistrationKey {
			kind,
			entity_id: entity_id.to_string(),
		};
		self.tracked.lock().await.contains_key(&key)
	}

	pub async fn len(&self) -> usize {
		self.tracked.lock().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.tracked.lock().await.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::Session;
	use async_trait::async_trait;
	use mockall::*;
	use std::time::Duration;

	mock! {
		Api {}

		#[async_trait]
		impl EventSubApi for Api {
			async fn create(&self, credentials: &Credentials, request: &CreateSubscriptionRequest) -> Result<ApiResponse>;
			async fn delete(&self, credentials: &Credentials, registration_id: &str) -> Result<ApiResponse>;
		}
	}

	fn created(id: &str) -> Result<ApiResponse> {
		Ok(ApiResponse {
			status: 202,
			body: serde_json::json!({
				"data": [{
					"id": id,
					"status": "enabled",
					"type": "stream.online",
					"version": "1",
					"condition": {"broadcaster_user_id": "1337"},
					"transport": {"method": "websocket", "session_id": "s-1"},
					"created_at": "2023-04-11T10:11:12.123Z",
					"cost": 0
				}],
				"total": 1,
				"total_cost": 0,
				"max_total_cost": 10
			})
			.to_string(),
		})
	}

	fn status(code: u16) -> Result<ApiResponse> {
		Ok(ApiResponse {
			status: code,
			body: String::new(),
		})
	}

	async fn welcomed(id: &str) -> SessionState {
		let session = SessionState::new();
		session
			.begin_session(Session {
				id: id.to_string(),
				heartbeat_timeout: Duration::from_secs(10),
				migration_target: None,
			})
			.await;
		session
	}

	fn manager(api: MockApi, session: SessionState) -> SubscriptionManager {
		SubscriptionManager::new(Arc::new(api), Arc::new(Credentials::new("client", "token")), session)
	}

	#[tokio::test]
	async fn test_ensure_twice_sends_one_request() {
		let mut api = MockApi::new();
		api.expect_create()
			.withf(|credentials, request| credentials.client_id == "client" && request.transport.session_id == "s-1")
			.times(1)
			.returning(|_, _| created("reg-1"));

		let manager = manager(api, welcomed("s-1").await);

		let first = manager.ensure(SubscriptionKind::StreamOnline, "1337").await.unwrap();
		let second = manager.ensure(SubscriptionKind::StreamOnline, "1337").await.unwrap();

		assert_eq!(
			first,
			EnsureOutcome::Created {
				registration_id: Some("reg-1".to_string())
			}
		);
		assert_eq!(second, EnsureOutcome::AlreadyTracked);
		assert_eq!(manager.len().await, 1);
	}

	#[tokio::test]
	async fn test_conflict_is_success_with_unknown_id() {
		let mut api = MockApi::new();
		api.expect_create().times(1).returning(|_, _| status(409));

		let manager = manager(api, welcomed("s-1").await);

		assert_eq!(manager.ensure(SubscriptionKind::ChannelUpdate, "42").await.unwrap(), EnsureOutcome::AlreadyExists);
		let tracked = manager.tracked().await;
		let registration = tracked
			.get(&RegistrationKey {
				kind: SubscriptionKind::ChannelUpdate,
				entity_id: "42".to_string(),
			})
			.unwrap();
		assert_eq!(registration.id, None);
	}

	#[tokio::test]
	async fn test_rejects_without_session() {
		let manager = manager(MockApi::new(), SessionState::new());

		assert!(matches!(manager.ensure(SubscriptionKind::StreamOnline, "1").await, Err(SubscriptionError::NotReady)));
		assert!(matches!(manager.subscribe_channels(&["1", "2"]).await, Err(SubscriptionError::NotReady)));
		assert!(manager.is_empty().await);
	}

	#[tokio::test]
	async fn test_new_session_reconfirms_registration() {
		let mut api = MockApi::new();
		let mut seq = Sequence::new();
		api.expect_create().times(1).in_sequence(&mut seq).returning(|_, _| created("reg-1"));
		api.expect_create()
			.withf(|_, request| request.transport.session_id == "s-2")
			.times(1)
			.in_sequence(&mut seq)
			.returning(|_, _| status(409));

		let session = welcomed("s-1").await;
		let manager = manager(api, session.clone());
		manager.ensure(SubscriptionKind::StreamOnline, "1337").await.unwrap();

		session.invalidate().await;
		session
			.begin_session(Session {
				id: "s-2".to_string(),
				heartbeat_timeout: Duration::from_secs(10),
				migration_target: None,
			})
			.await;

		assert_eq!(manager.ensure(SubscriptionKind::StreamOnline, "1337").await.unwrap(), EnsureOutcome::AlreadyExists);
		let tracked = manager.tracked().await;
		let registration = tracked.values().next().unwrap();
		assert_eq!(registration.session_id, "s-2");
		assert_eq!(registration.id.as_deref(), Some("reg-1"), "known id survives a 409 reconfirm");
	}

	#[tokio::test]
	async fn test_batch_continues_past_failed_entity() {
		let mut api = MockApi::new();
		api.expect_create()
			.withf(|_, request| request.condition.broadcaster_user_id == "111")
			.times(3)
			.returning(|_, _| created("reg-111"));
		api.expect_create()
			.withf(|_, request| request.condition.broadcaster_user_id == "222")
			.times(1)
			.returning(|_, _| {
				Ok(ApiResponse {
					status: 500,
					body: "{\"error\":\"Internal Server Error\"}".to_string(),
				})
			});

		let manager = manager(api, welcomed("s-1").await);
		let results = manager.subscribe_channels(&["111", "222"]).await.unwrap();

		assert_eq!(results.len(), 2);
		assert!(results[0].is_ok());
		assert!(matches!(results[1].result, Err(SubscriptionError::Http { status: 500, .. })));
		assert!(manager.is_tracked(SubscriptionKind::StreamOnline, "111").await);
		assert!(!manager.is_tracked(SubscriptionKind::StreamOnline, "222").await);
	}

	#[tokio::test]
	async fn test_delete_tolerates_not_found() {
		let mut api = MockApi::new();
		api.expect_create().returning(|_, _| created("reg-1"));
		api.expect_delete().withf(|_, id| id.to_string() == "reg-1").times(1).returning(|_, _| status(404));

		let manager = manager(api, welcomed("s-1").await);
		manager.ensure(SubscriptionKind::StreamOnline, "1337").await.unwrap();

		manager.delete("reg-1").await.unwrap();
		assert!(manager.is_empty().await);
	}

	#[tokio::test]
	async fn test_delete_surfaces_other_statuses() {
		let mut api = MockApi::new();
		api.expect_delete().returning(|_, _| status(401));

		let manager = manager(api, welcomed("s-1").await);
		assert!(matches!(manager.delete("reg-1").await, Err(SubscriptionError::Http { status: 401, .. })));
	}

	#[tokio::test]
	async fn test_clear_empties_even_when_deletes_fail() {
		let mut api = MockApi::new();
		api.expect_create().returning(|_, request| created(&format!("reg-{}", request.kind)));
		api.expect_delete().times(3).returning(|_, _| status(500));

		let manager = manager(api, welcomed("s-1").await);
		manager.subscribe_channel("1337").await.unwrap();
		assert_eq!(manager.len().await, 3);

		assert_eq!(manager.clear().await, 3);
		assert!(manager.is_empty().await);
	}

	/// Holds the first create open until released
	#[derive(Default)]
	struct GatedApi {
		entered: tokio::sync::Notify,
		release: tokio::sync::Notify,
		requests: std::sync::Mutex<Vec<CreateSubscriptionRequest>>,
	}

	#[async_trait]
	impl EventSubApi for GatedApi {
		async fn create(&self, _: &Credentials, request: &CreateSubscriptionRequest) -> Result<ApiResponse> {
			let first = {
				let mut requests = self.requests.lock().unwrap();
				requests.push(request.clone());
				requests.len() == 1
			};
			if first {
				self.entered.notify_one();
				self.release.notified().await;
			}
			created("reg")
		}

		async fn delete(&self, _: &Credentials, _: &str) -> Result<ApiResponse> {
			status(204)
		}
	}

	#[tokio::test]
	async fn test_waiting_ensure_uses_session_live_when_it_sends() {
		let api = Arc::new(GatedApi::default());
		let session = welcomed("s-1").await;
		let manager = Arc::new(SubscriptionManager::new(api.clone(), Arc::new(Credentials::new("client", "token")), session.clone()));

		let first = tokio::spawn({
			let manager = manager.clone();
			async move { manager.ensure(SubscriptionKind::StreamOnline, "1").await }
		});
		api.entered.notified().await;

		// queues behind the in-flight create while s-1 is still live
		let second = tokio::spawn({
			let manager = manager.clone();
			async move { manager.ensure(SubscriptionKind::StreamOnline, "2").await }
		});
		tokio::time::sleep(Duration::from_millis(20)).await;

		session.invalidate().await;
		session
			.begin_session(Session {
				id: "s-2".to_string(),
				heartbeat_timeout: Duration::from_secs(10),
				migration_target: None,
			})
			.await;
		api.release.notify_one();

		first.await.unwrap().unwrap();
		second.await.unwrap().unwrap();

		let requests = api.requests.lock().unwrap().clone();
		assert_eq!(requests.len(), 2);
		assert_eq!(requests[0].transport.session_id, "s-1");
		assert_eq!(requests[1].transport.session_id, "s-2");
		assert_eq!(manager.tracked().await.values().filter(|r| r.session_id == "s-2").count(), 1);
	}
}
