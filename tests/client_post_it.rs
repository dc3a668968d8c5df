mod common;

// std
use std::time::Duration as StdDuration;
// crates.io
use serde_json::{Value, json};
use time::Duration;
// self
use common::ScriptedTransport;
use unified_api_client::{http::ApiResponse, store::MemoryStore};

fn echo_transport() -> ScriptedTransport {
	ScriptedTransport::new(StdDuration::from_millis(30), |request| {
		let body = request.body.clone().unwrap_or_default();

		ApiResponse::new(201, format!(r#"{{"success":true,"data":{}}}"#, String::from_utf8_lossy(&body)))
	})
}

#[tokio::test]
async fn identical_posts_collapse_and_distinct_bodies_do_not() {
	let (client, transport, _clock) = common::scripted_client(
		common::config("https://api.example.com"),
		echo_transport(),
		MemoryStore::default(),
	);
	let (first, second, other) = tokio::join!(
		client.post::<Value>("/api/prayer-requests", json!({ "text": "healing", "anonymous": true })),
		client.post::<Value>("/api/prayer-requests", json!({ "anonymous": true, "text": "healing" })),
		client.post::<Value>("/api/prayer-requests", json!({ "text": "guidance" })),
	);
	let first = first.expect("First POST should succeed.");

	assert_eq!(second.expect("Duplicate POST should share the first result."), first);
	assert_eq!(other.expect("Distinct POST should succeed.")["data"]["text"], "guidance");
	assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn hold_window_absorbs_double_submits_then_expires() {
	let (client, transport, clock) = common::scripted_client(
		common::config("https://api.example.com"),
		echo_transport(),
		MemoryStore::default(),
	);
	let body = json!({ "eventId": 7, "rsvp": "yes" });

	client.post::<Value>("/api/events/rsvp", &body).await.expect("POST should succeed.");
	clock.advance(Duration::milliseconds(500));
	client.post::<Value>("/api/events/rsvp", &body).await.expect("Held POST should succeed.");

	assert_eq!(transport.calls(), 1);
	assert_eq!(client.cache_stats().in_flight, 1);

	clock.advance(Duration::milliseconds(500));
	client.post::<Value>("/api/events/rsvp", &body).await.expect("Fresh POST should succeed.");

	assert_eq!(transport.calls(), 2);
	// Writes never populate the response cache.
	assert_eq!(client.cache_stats().entries, 0);
}

#[tokio::test]
async fn posts_carry_the_json_body_and_bearer() {
	let (client, transport, _clock) = common::scripted_client(
		common::config("https://api.example.com/v1"),
		echo_transport(),
		MemoryStore::with_tokens("token-post", None),
	);

	client
		.post::<Value>("/api/groups", json!({ "title": "Men's breakfast" }))
		.await
		.expect("POST should succeed.");

	let requests = transport.requests();
	let request = &requests[0];
	let sent: Value = serde_json::from_slice(request.body.as_deref().unwrap_or_default())
		.expect("POST body should be JSON.");

	assert_eq!(request.url.as_str(), "https://api.example.com/v1/api/groups");
	assert_eq!(request.bearer.as_ref().map(|token| token.expose()), Some("token-post"));
	assert_eq!(sent, json!({ "title": "Men's breakfast" }));
}

#[cfg(feature = "reqwest")]
mod reqwest_backend {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;

	#[tokio::test]
	async fn distinct_bodies_reach_the_backend_independently() {
		let server = MockServer::start_async().await;
		let first = server
			.mock_async(|when, then| {
				when.method(POST).path("/api/journal").json_body(json!({ "entry": "grateful" }));
				then.status(200).header("content-type", "application/json").body(r#"{"id":1}"#);
			})
			.await;
		let second = server
			.mock_async(|when, then| {
				when.method(POST).path("/api/journal").json_body(json!({ "entry": "hopeful" }));
				then.status(200).header("content-type", "application/json").body(r#"{"id":2}"#);
			})
			.await;
		let client = common::reqwest_client(
			common::config(&server.base_url()),
			MemoryStore::with_tokens("token-journal", None),
		);
		let (a, b) = tokio::join!(
			client.post::<Value>("/api/journal", json!({ "entry": "grateful" })),
			client.post::<Value>("/api/journal", json!({ "entry": "hopeful" })),
		);

		assert_eq!(a.expect("First POST should succeed.")["id"], 1);
		assert_eq!(b.expect("Second POST should succeed.")["id"], 2);

		first.assert_calls_async(1).await;
		second.assert_calls_async(1).await;
	}
}
