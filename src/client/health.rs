//! Backend liveness probe.

// self
use crate::{
	_prelude::*,
	client::ApiClient,
	envelope,
	http::{ApiRequest, ApiTransport, Method},
	obs::{self, RequestKind, RequestOutcome, RequestSpan},
};

/// Result of [`ApiClient::health_check`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthReport {
	/// `true` when the endpoint answered with a 2xx status.
	pub healthy: bool,
	/// Status code, if a response arrived at all.
	pub status: Option<u16>,
	/// Time from sending the probe to receiving the response (or the failure).
	pub latency: Duration,
	/// JSON body of the response, when it had one.
	pub detail: Option<Value>,
	/// Why the probe failed.
	pub error: Option<String>,
}

impl<T> ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Probes the health endpoint, bypassing the cache, the flight registry, and the rate
	/// limiter. Never fails; problems are reported in the returned [`HealthReport`].
	pub async fn health_check(&self) -> HealthReport {
		const KIND: RequestKind = RequestKind::Health;

		let endpoint = self.config.health_endpoint.as_str();
		let span = RequestSpan::new(KIND, endpoint);

		obs::record_request_outcome(KIND, RequestOutcome::Attempt);

		span.instrument(async move {
			let started = self.clock.now();
			let url = match self.config.resolve(endpoint) {
				Ok(url) => url,
				Err(e) => return self.unhealthy(started, None, e.to_string()),
			};
			let report = match self.transport.send(ApiRequest::new(Method::Get, endpoint, url)).await
			{
				Ok(response) if response.is_success() => HealthReport {
					healthy: true,
					status: Some(response.status),
					latency: self.clock.now() - started,
					detail: response.json(endpoint).ok().filter(|body| !body.is_null()),
					error: None,
				},
				Ok(response) => self.unhealthy(
					started,
					Some(response.status),
					envelope::error_message(&response.body),
				),
				Err(e) => self.unhealthy(started, None, e.to_string()),
			};

			if report.healthy {
				obs::record_request_outcome(KIND, RequestOutcome::Success);
			}

			report
		})
		.await
	}

	fn unhealthy(&self, started: OffsetDateTime, status: Option<u16>, error: String) -> HealthReport {
		obs::record_request_outcome(RequestKind::Health, RequestOutcome::Failure);
		obs::warn_event("Health check failed.", &error);

		HealthReport {
			healthy: false,
			status,
			latency: self.clock.now() - started,
			detail: None,
			error: Some(error),
		}
	}
}
