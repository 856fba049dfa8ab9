use super::SubscriptionError;
use crate::events::SubscriptionKind;
use crate::messages::Subscription;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

type Result<T> = std::result::Result<T, SubscriptionError>;

/// Application credentials sent with every subscription request
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	pub client_id: String,
	pub access_token: String,
}

impl Credentials {
	pub fn new(client_id: impl Into<String>, access_token: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			access_token: access_token.into(),
		}
	}
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials").field("client_id", &self.client_id).field("access_token", &"<redacted>").finish()
	}
}

/// Read on every request, so a refreshed token is picked up without rebuilding the client
pub trait CredentialProvider: Send + Sync {
	fn credentials(&self) -> Credentials;
}

impl CredentialProvider for Credentials {
	fn credentials(&self) -> Credentials {
		self.clone()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
	pub broadcaster_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportRequest {
	pub method: String,
	pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
	#[serde(rename = "type")]
	pub kind: String,
	pub version: String,
	pub condition: Condition,
	pub transport: TransportRequest,
}

impl CreateSubscriptionRequest {
	/// Registration of `kind` for one broadcaster, delivered over the given websocket session
	pub fn websocket(kind: SubscriptionKind, broadcaster_user_id: &str, session_id: &str) -> Self {
		Self {
			kind: kind.as_str().to_string(),
			version: kind.version().to_string(),
			condition: Condition {
				broadcaster_user_id: broadcaster_user_id.to_string(),
			},
			transport: TransportRequest {
				method: "websocket".to_string(),
				session_id: session_id.to_string(),
			},
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionResponse {
	pub data: Vec<Subscription>,
	#[serde(default)]
	pub total: u32,
	#[serde(default)]
	pub total_cost: u32,
	#[serde(default)]
	pub max_total_cost: u32,
}

/// Status and raw body; interpreting them is left to the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
	pub status: u16,
	pub body: String,
}

#[async_trait]
pub trait EventSubApi: Send + Sync {
	async fn create(&self, credentials: &Credentials, request: &CreateSubscriptionRequest) -> Result<ApiResponse>;

	async fn delete(&self, credentials: &Credentials, registration_id: &str) -> Result<ApiResponse>;
}

/// `EventSubApi` over the Helix subscriptions endpoint
#[derive(Debug, Clone)]
pub struct HelixClient {
	http: reqwest::Client,
	url: String,
}

impl HelixClient {
	pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
		let http = reqwest::Client::builder().timeout(request_timeout).build()?;
		Ok(Self { http, url: url.into() })
	}
}

#[async_trait]
impl EventSubApi for HelixClient {
	#[instrument(skip(self, credentials, request), fields(kind = %request.kind, broadcaster = %request.condition.broadcaster_user_id))]
	async fn create(&self, credentials: &Credentials, request: &CreateSubscriptionRequest) -> Result<ApiResponse> {
		let response = self
			.http
			.post(&self.url)
			.bearer_auth(&credentials.access_token)
			.header("Client-Id", &credentials.client_id)
			.json(request)
			.send()
			.await?;

		let status = response.status().as_u16();
		let body = response.text().await?;
		debug!(status, "Create subscription response");

		Ok(ApiResponse { status, body })
	}

	#[instrument(skip(self, credentials))]
	async fn delete(&self, credentials: &Credentials, registration_id: &str) -> Result<ApiResponse> {
		let response = self
			.http
			.delete(&self.url)
			.query(&[("id", registration_id)])
			.bearer_auth(&credentials.access_token)
			.header("Client-Id", &credentials.client_id)
			.send()
			.await?;

		let status = response.status().as_u16();
		let body = response.text().await?;
		debug!(status, "Delete subscription response");

		Ok(ApiResponse { status, body })
	}
}
