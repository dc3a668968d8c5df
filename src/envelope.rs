//! The backend's `{ success, data?, error? }` response envelope.
//!
//! The client itself returns whatever JSON the backend sends; callers that talk to envelope
//! endpoints decode into [`ApiEnvelope<T>`] and call [`ApiEnvelope::into_result`].

// self
use crate::_prelude::*;

/// Envelope convention used across the backend's service layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
	/// Whether the backend considers the call successful.
	pub success: bool,
	/// Payload on success.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	/// Human-readable failure reason.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl<T> ApiEnvelope<T> {
	/// Wraps a successful payload.
	pub fn ok(data: T) -> Self {
		Self { success: true, data: Some(data), error: None }
	}

	/// Builds a failed envelope.
	pub fn failure(error: impl Into<String>) -> Self {
		Self { success: false, data: None, error: Some(error.into()) }
	}

	/// Converts the envelope into its payload or an [`EnvelopeError`].
	pub fn into_result(self) -> Result<T, EnvelopeError> {
		match (self.success, self.data) {
			(true, Some(data)) => Ok(data),
			(true, None) => Err(EnvelopeError::MissingData),
			(false, _) => Err(EnvelopeError::Rejected {
				reason: self.error.unwrap_or_else(|| "unspecified backend failure".into()),
			}),
		}
	}
}

/// Failures reported through the envelope rather than the HTTP status.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum EnvelopeError {
	/// `success` was `false`.
	#[error("Backend reported failure: {reason}.")]
	Rejected {
		/// The envelope's `error` string.
		reason: String,
	},
	/// `success` was `true` but no `data` was present.
	#[error("Backend reported success without data.")]
	MissingData,
}

/// Extracts a readable failure message from an error response body.
///
/// Prefers the envelope's `error` field, then a `message` field, then a truncated preview of
/// the raw body.
pub(crate) fn error_message(body: &[u8]) -> String {
	const PREVIEW_CHARS: usize = 256;

	if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
		for field in ["error", "message"] {
			if let Some(Value::String(message)) = map.get(field) {
				return message.clone();
			}
		}
	}

	let text = String::from_utf8_lossy(body);
	let text = text.trim();

	if text.is_empty() {
		return "empty response body".into();
	}

	text.chars().take(PREVIEW_CHARS).collect()
}
