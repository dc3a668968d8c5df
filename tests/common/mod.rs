//! Shared fixtures for integration tests.

#![allow(dead_code)]

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use parking_lot::Mutex;
use time::Duration;
// self
use unified_api_client::{
	client::ApiClient,
	clock::{Clock, ManualClock},
	config::ClientConfig,
	http::{ApiRequest, ApiResponse, ApiTransport, TransportFuture},
	store::{MemoryStore, TokenStore},
};
#[cfg(feature = "reqwest")]
use unified_api_client::{client::ReqwestApiClient, http::ReqwestTransport};

/// Responder used by [`ScriptedTransport`] to answer a request.
pub type Responder = dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync;

/// In-process transport that counts calls, records requests, and answers after a delay.
pub struct ScriptedTransport {
	responder: Box<Responder>,
	delay: std::time::Duration,
	calls: AtomicUsize,
	requests: Mutex<Vec<ApiRequest>>,
}
impl ScriptedTransport {
	/// Answers every request with `responder` after `delay`.
	pub fn new(
		delay: std::time::Duration,
		responder: impl Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static,
	) -> Self {
		Self {
			responder: Box::new(responder),
			delay,
			calls: AtomicUsize::new(0),
			requests: Default::default(),
		}
	}

	/// Answers every request with the same JSON body.
	pub fn json(delay: std::time::Duration, body: &'static str) -> Self {
		Self::new(delay, move |_| ApiResponse::new(200, body))
	}

	/// Number of requests that reached the transport.
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Requests seen so far, in arrival order.
	pub fn requests(&self) -> Vec<ApiRequest> {
		self.requests.lock().clone()
	}
}
impl ApiTransport for ScriptedTransport {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let response = (self.responder)(&request);

			self.requests.lock().push(request);

			tokio::time::sleep(self.delay).await;

			Ok(response)
		})
	}
}

/// Config pointed at `base_url` with default limits.
pub fn config(base_url: &str) -> ClientConfig {
	ClientConfig::from_base_url(base_url).expect("Test config should build.")
}

/// Client over a [`ScriptedTransport`], an in-memory store, and a manual clock.
pub fn scripted_client(
	config: ClientConfig,
	transport: ScriptedTransport,
	store: MemoryStore,
) -> (ApiClient<ScriptedTransport>, Arc<ScriptedTransport>, ManualClock) {
	let transport = Arc::new(transport);
	let clock = ManualClock::default();
	let store: Arc<dyn TokenStore> = Arc::new(store);
	let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
	let client = ApiClient::with_transport(config, transport.clone(), store, shared_clock);

	(client, transport, clock)
}

/// Reqwest-backed client talking to a mock server through `store`.
#[cfg(feature = "reqwest")]
pub fn reqwest_client(config: ClientConfig, store: MemoryStore) -> ReqwestApiClient {
	let transport = ReqwestTransport::new(Duration::seconds(5))
		.expect("Test reqwest transport should build.");
	let store: Arc<dyn TokenStore> = Arc::new(store);
	let clock: Arc<dyn Clock> = Arc::new(unified_api_client::clock::SystemClock);

	ApiClient::with_transport(config, transport, store, clock)
}
