// self
use crate::{_prelude::*, auth::CompanyId, obs::FlowKind};

/// Future returned by [`FlowSpan::instrument`]; a plain passthrough without the `tracing` feature.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`FlowSpan::instrument`]; a plain passthrough without the `tracing` feature.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// `xero_connect.flow` span covering one lifecycle operation.
///
/// Fields: `flow` (the [`FlowKind`] label), `stage` (the public operation name), and `company`
/// once the operation knows which company it acts on. Credentials are never recorded.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens a span for `stage` of a `kind` flow with the company still unknown.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"xero_connect.flow",
				flow = kind.as_str(),
				stage,
				company = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Records the company the operation acts on.
	pub fn with_company(self, company: &CompanyId) -> Self {
		#[cfg(feature = "tracing")]
		self.span.record("company", company.as_ref());
		#[cfg(not(feature = "tracing"))]
		let _ = company;

		self
	}

	/// Enters the span for a synchronous section such as authorization URL issuance.
	pub fn entered(self) -> FlowSpanGuard {
		#[cfg(feature = "tracing")]
		{
			FlowSpanGuard { _entered: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			FlowSpanGuard {}
		}
	}

	/// Runs an async operation inside the span; no guard is held across `.await`.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
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

/// Keeps a [`FlowSpan`] entered until dropped.
pub struct FlowSpanGuard {
	#[cfg(feature = "tracing")]
	_entered: tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FlowSpanGuard(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn company() -> CompanyId {
		CompanyId::new("co1").expect("Company fixture should be valid.")
	}

	#[test]
	fn guard_debug_never_exposes_fields() {
		let guard =
			FlowSpan::new(FlowKind::Disconnect, "disconnect").with_company(&company()).entered();

		assert_eq!(format!("{guard:?}"), "FlowSpanGuard(..)");
	}

	#[tokio::test]
	async fn instrumented_operation_keeps_its_output() {
		let span =
			FlowSpan::new(FlowKind::ResourceFetch, "fetch_contacts").with_company(&company());
		let fetched = span.instrument(async { Ok::<_, Error>(3_usize) }).await;

		assert_eq!(fetched.expect("Instrumented future should succeed."), 3);
	}
}
