//! Connector-level error types shared across flows, the OAuth client, and stores.

// self
use crate::{_prelude::*, auth::CompanyId, oauth::Operation};

/// Connector-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical connector error exposed by public APIs.
///
/// None of the variants carry token material, so their `Display` output is safe to log. Use
/// [`Error::public_message`] for anything that leaves the process (redirects, JSON bodies).
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Outbound call exceeded the configured request timeout.
	#[error("The {operation} call timed out.")]
	Timeout {
		/// Outbound operation that timed out.
		operation: Operation,
	},

	/// Authorization server rejected a grant or a connections lookup.
	#[error("Authorization server rejected the {operation} call: {reason}.")]
	UpstreamAuth {
		/// Outbound operation that was rejected.
		operation: Operation,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Provider-supplied reason (OAuth error code or description).
		reason: String,
	},
	/// Downstream resource API call failed.
	#[error("Resource API rejected the {operation} call: {message}.")]
	UpstreamApi {
		/// Outbound operation that failed.
		operation: Operation,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Human-readable failure summary.
		message: String,
	},
	/// No token record exists for the company.
	#[error("Company {company} is not connected.")]
	NotConnected {
		/// Company that was looked up.
		company: CompanyId,
	},
	/// Authorization succeeded but granted access to no tenant.
	#[error("Authorization granted no tenant connections.")]
	NoTenantConnections,
	/// Stored refresh token is no longer usable; the user must authorize again.
	#[error("Company {company} must re-authorize: {reason}.")]
	ReauthorizationRequired {
		/// Company whose refresh failed.
		company: CompanyId,
		/// Underlying rejection summary.
		reason: String,
	},
	/// Callback `state` did not match a pending authorization flow.
	#[error("Authorization state rejected: {reason}.")]
	InvalidState {
		/// Why the state was rejected.
		reason: String,
	},
}
impl Error {
	/// HTTP status code the route layer should answer with.
	pub fn status_code(&self) -> u16 {
		match self {
			Self::Storage(_) | Self::Config(_) => 500,
			Self::Transient(_) => 503,
			Self::Transport(_) | Self::UpstreamAuth { .. } | Self::UpstreamApi { .. } => 502,
			Self::Timeout { .. } => 504,
			Self::NotConnected { .. } => 404,
			Self::NoTenantConnections => 403,
			Self::ReauthorizationRequired { .. } => 401,
			Self::InvalidState { .. } => 400,
		}
	}

	/// Human-readable category that never contains secrets or upstream payloads.
	pub fn public_message(&self) -> &'static str {
		match self {
			Self::Storage(_) => "Token storage is unavailable.",
			Self::Config(_) => "Internal Server Error",
			Self::Transient(_) => "Xero is temporarily unavailable. Please retry.",
			Self::Transport(_) => "Could not reach Xero. Please retry.",
			Self::Timeout { .. } => "Xero did not respond in time. Please retry.",
			Self::UpstreamAuth { .. } => "Xero rejected the authorization request.",
			Self::UpstreamApi { .. } => "Failed to fetch data from the Xero API.",
			Self::NotConnected { .. } =>
				"No authentication found for this company. Please login with Xero first.",
			Self::NoTenantConnections =>
				"Xero authorization did not grant access to any organisation.",
			Self::ReauthorizationRequired { .. } =>
				"Token expired and refresh failed. Please re-authenticate with Xero.",
			Self::InvalidState { .. } =>
				"Authorization request could not be verified. Please try again.",
		}
	}

	/// Returns `true` when the caller may retry the same call later without user interaction.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Self::Timeout { .. }
				| Self::Transient(_)
				| Self::Transport(_)
				| Self::UpstreamApi { .. }
		)
	}
}

/// Configuration and validation failures raised by the connector.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Configured endpoint is not a valid URL.
	#[error("Configured {endpoint} endpoint is invalid.")]
	InvalidEndpoint {
		/// Which endpoint failed to parse.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Configured connector settings failed validation.
	#[error(transparent)]
	Build(#[from] crate::config::ConfigBuildError),

	/// Token endpoint response omitted the refresh token on an authorization-code exchange.
	#[error("Token endpoint response is missing a refresh token.")]
	MissingRefreshToken,
	/// Token endpoint returned scopes that cannot be normalized.
	#[error("Token endpoint returned invalid scopes.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned a server-side or throttling error.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or connector-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Upstream responded with JSON that could not be parsed.
	#[error("The {operation} response contained malformed JSON.")]
	ResponseParse {
		/// Outbound operation whose response failed to parse.
		operation: Operation,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling Xero.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling Xero.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
