// self
use crate::{_prelude::*, obs::RequestKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedRequest<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedRequest<F> = F;

/// A span builder used by client operations.
#[derive(Clone, Debug)]
pub struct RequestSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl RequestSpan {
	/// Creates a new span tagged with the provided operation + endpoint.
	pub fn new(kind: RequestKind, endpoint: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("unified_api_client.request", kind = kind.as_str(), endpoint);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, endpoint);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedRequest<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a debug-level event inside the current span.
pub(crate) fn debug_event(message: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!("{message}");
	#[cfg(not(feature = "tracing"))]
	let _ = message;
}

/// Emits a warn-level event inside the current span.
pub(crate) fn warn_event(message: &str, error: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(error = %error, "{message}");
	#[cfg(not(feature = "tracing"))]
	let _ = (message, error);
}
