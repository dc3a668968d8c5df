//! Access-token refresh after a 401, serialized behind a single-flight guard.
//!
//! Every 401 hands the refresher the access token the failing request carried. Once the guard
//! is held, the refresher re-reads the store: if the token already changed, another caller
//! refreshed in the meantime and the exchange is skipped. Otherwise it posts the refresh token
//! to the configured endpoint and stores the new access token with a compare-and-swap against
//! the rejected one. Any failure clears both tokens, which the rest of the app treats as a
//! logout.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{SessionState, TokenKey, TokenSecret},
	config::ClientConfig,
	envelope,
	error::{self, ConfigError},
	http::{ApiRequest, ApiTransport, Method},
	obs::{self, RequestKind, RequestOutcome, RequestSpan},
	store::{CompareAndSwapOutcome, TokenStore},
};

/// Body returned by the refresh endpoint, either bare or inside the envelope's `data`.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
	#[serde(alias = "accessToken", alias = "access_token")]
	token: TokenSecret,
	#[serde(default, rename = "refreshToken", alias = "refresh_token")]
	refresh_token: Option<TokenSecret>,
}

/// Serializes token refreshes and tracks their outcomes.
#[derive(Debug, Default)]
pub struct TokenRefresher {
	guard: AsyncMutex<()>,
	metrics: RefreshMetrics,
}
impl TokenRefresher {
	/// Counters for refresh attempts and outcomes.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Handles a 401 for a request that carried `rejected`, returning the resulting session state.
	pub async fn refresh<T>(
		&self,
		transport: &T,
		store: &dyn TokenStore,
		config: &ClientConfig,
		rejected: Option<&TokenSecret>,
	) -> SessionState
	where
		T: ?Sized + ApiTransport,
	{
		const KIND: RequestKind = RequestKind::Refresh;

		let span = RequestSpan::new(KIND, &config.refresh_endpoint);

		obs::record_request_outcome(KIND, RequestOutcome::Attempt);

		span.instrument(async move {
			let _singleflight = self.guard.lock().await;

			self.metrics.record_attempt();

			let rejected = rejected.map(TokenSecret::expose);

			match store.load(TokenKey::Access).await {
				Ok(Some(current)) if Some(current.expose()) != rejected => {
					self.metrics.record_coalesced();
					obs::record_request_outcome(KIND, RequestOutcome::Shared);
					obs::debug_event("Access token already rotated by a concurrent refresh.");

					return SessionState::Refreshed;
				},
				_ => {},
			}

			match self.exchange(transport, store, config, rejected).await {
				Ok(()) => {
					self.metrics.record_success();
					obs::record_request_outcome(KIND, RequestOutcome::Success);

					SessionState::Refreshed
				},
				Err(e) => {
					self.metrics.record_failure();
					obs::record_request_outcome(KIND, RequestOutcome::Failure);
					obs::warn_event("Token refresh failed; clearing stored tokens.", &e);

					if let Err(clear_err) = store.clear().await {
						obs::warn_event("Failed to clear stored tokens.", &clear_err);
					}

					SessionState::LoggedOut
				},
			}
		})
		.await
	}

	async fn exchange<T>(
		&self,
		transport: &T,
		store: &dyn TokenStore,
		config: &ClientConfig,
		rejected: Option<&str>,
	) -> Result<()>
	where
		T: ?Sized + ApiTransport,
	{
		let endpoint = config.refresh_endpoint.as_str();
		let refresh_token =
			store.load(TokenKey::Refresh).await?.ok_or(ConfigError::MissingRefreshToken)?;
		let body = serde_json::to_vec(&serde_json::json!({ "refreshToken": refresh_token }))
			.map_err(ConfigError::from)?;
		let request =
			ApiRequest::new(Method::Post, endpoint, config.resolve(endpoint)?).with_json_body(body);
		let response = transport.send(request).await?;

		if !response.is_success() {
			return Err(Error::Http {
				status: response.status,
				message: envelope::error_message(&response.body),
				retry_after: response.retry_after,
			});
		}

		let mut payload = response.json(endpoint)?;

		if let Some(data) = payload.get_mut("data").filter(|data| data.is_object()) {
			payload = data.take();
		}

		let RefreshResponse { token, refresh_token: rotated } =
			error::decode_value::<RefreshResponse>(payload)?;

		match store.compare_and_swap(TokenKey::Access, rejected, token).await? {
			CompareAndSwapOutcome::Updated => {},
			CompareAndSwapOutcome::Mismatch =>
				obs::debug_event("Access token changed during refresh; keeping the newer one."),
		}

		if let Some(rotated) = rotated {
			store.save(TokenKey::Refresh, rotated).await?;
		}

		Ok(())
	}
}
