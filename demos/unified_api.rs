//! Demonstrates the unified API client against a mock backend: a cached GET, a deduplicated
//! POST, cached content generation, and a health probe.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::{Value, json};
// self
use unified_api_client::{
	client::{ContentRequest, ReqwestApiClient},
	config::ClientConfig,
	envelope::ApiEnvelope,
	store::{MemoryStore, TokenStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let groups_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/groups").header("authorization", "Bearer demo-access");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"success":true,"data":[{"id":1,"title":"Morning prayer"}]}"#);
		})
		.await;
	let rsvp_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/events/rsvp");
			then.status(201)
				.header("content-type", "application/json")
				.body(r#"{"success":true,"data":{"confirmed":true}}"#);
		})
		.await;
	let content_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/content/generate");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"success":true,"data":{"caption":"See you Sunday!"}}"#);
		})
		.await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/health");
			then.status(200).header("content-type", "application/json").body(r#"{"status":"ok"}"#);
		})
		.await;

	let store: Arc<dyn TokenStore> =
		Arc::new(MemoryStore::with_tokens("demo-access", Some("demo-refresh".into())));
	let client = ReqwestApiClient::new(ClientConfig::from_base_url(&server.base_url())?, store)?;

	for _ in 0..3 {
		let groups = client.get::<ApiEnvelope<Value>>("/api/groups", ()).await?.into_result()?;

		println!("Groups: {groups}.");
	}

	let rsvp = json!({ "eventId": 7, "rsvp": "yes" });
	let (first, second) = tokio::join!(
		client.post::<ApiEnvelope<Value>>("/api/events/rsvp", &rsvp),
		client.post::<ApiEnvelope<Value>>("/api/events/rsvp", &rsvp),
	);

	println!("RSVP: {:?} / {:?}.", first?.into_result()?, second?.into_result()?);

	let request = ContentRequest::new("Easter service", "ig", "casual");

	for _ in 0..2 {
		let caption =
			client.generate_content::<ApiEnvelope<Value>>(&request).await?.into_result()?;

		println!("Generated: {caption}.");
	}

	let health = client.health_check().await;

	println!("Healthy: {} in {}ms.", health.healthy, health.latency.whole_milliseconds());
	println!("Cache: {:?}.", client.cache_stats());

	groups_mock.assert_async().await;
	rsvp_mock.assert_async().await;
	content_mock.assert_async().await;

	Ok(())
}
