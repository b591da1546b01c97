//! Optional observability helpers for connector flows.
//!
//! # Feature Flags
//!
//! - `tracing` wraps every lifecycle operation in a `xero_connect.flow` span carrying the `flow`,
//!   `stage`, and `company` fields, and emits events that name the company but never a
//!   credential.
//! - `metrics` increments the `xero_connect_flow_total` counter for every attempt, success, and
//!   failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, auth::CompanyId};

/// Emits a `tracing` event when the feature is enabled; compiles to nothing otherwise.
macro_rules! flow_event {
	($level:ident, $($arg:tt)+) => {
		#[cfg(feature = "tracing")]
		::tracing::$level!($($arg)+);
	};
}
pub(crate) use flow_event;

/// Lifecycle operations observed by the connector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization URL generation and callback completion.
	Authorization,
	/// On-demand or manual token refresh.
	Refresh,
	/// Tenant-scoped resource reads (contacts).
	ResourceFetch,
	/// Record removal.
	Disconnect,
	/// Status projection reads.
	Status,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Authorization => "authorization",
			FlowKind::Refresh => "refresh",
			FlowKind::ResourceFetch => "resource_fetch",
			FlowKind::Disconnect => "disconnect",
			FlowKind::Status => "status",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a lifecycle operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}

	/// Maps a finished operation onto its outcome label.
	pub fn of<T, E>(result: &Result<T, E>) -> Self {
		if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure }
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside a flow span and records attempt plus final outcome.
pub(crate) async fn observe<T, Fut>(
	kind: FlowKind,
	stage: &'static str,
	company: Option<&CompanyId>,
	fut: Fut,
) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	record_flow_outcome(kind, FlowOutcome::Attempt);

	let span = match company {
		Some(company) => FlowSpan::new(kind, stage).with_company(company),
		None => FlowSpan::new(kind, stage),
	};
	let result = span.instrument(fut).await;

	record_flow_outcome(kind, FlowOutcome::of(&result));

	result
}
