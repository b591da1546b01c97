// std
use std::net::IpAddr;
// crates.io
use url::Host;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, ScopeValidationError, TokenSecret},
	config::{
		ClientAuthMethod, ConnectorConfig, DEFAULT_ACCESS_TYPE, DEFAULT_SCOPE, XeroEndpoints,
	},
};

const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
const DEFAULT_PENDING_FLOW_TTL: Duration = Duration::minutes(10);

/// Errors raised while constructing or validating a [`ConnectorConfig`].
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ConfigBuildError {
	/// Client identifier is blank.
	#[error("Client identifier cannot be empty.")]
	EmptyClientId,
	/// Client secret was not supplied.
	#[error("Missing client secret.")]
	MissingClientSecret,
	/// Redirect URI was not supplied.
	#[error("Missing redirect URI.")]
	MissingRedirectUri,
	/// Frontend URL was not supplied.
	#[error("Missing frontend URL.")]
	MissingFrontendUrl,
	/// Identity or API endpoints must use HTTPS unless they target a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Browser-facing URLs must be HTTP(S).
	#[error("The {endpoint} URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Which URL failed validation.
		endpoint: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// An API path could not be joined onto the API base URL.
	#[error("The {endpoint} path cannot be resolved against the API base URL: {path}.")]
	InvalidApiPath {
		/// Which path failed validation.
		endpoint: &'static str,
		/// Offending path.
		path: String,
	},
	/// Requested scopes are malformed.
	#[error(transparent)]
	InvalidScope(#[from] ScopeValidationError),
	/// At least one scope must be requested.
	#[error("Requested scope cannot be empty.")]
	EmptyScope,
	/// Request timeout must be positive.
	#[error("Request timeout must be positive.")]
	NonPositiveTimeout,
	/// Pending flow lifetime must be positive.
	#[error("Pending authorization lifetime must be positive.")]
	NonPositiveFlowTtl,
}

/// Builder for [`ConnectorConfig`] values.
#[derive(Debug)]
pub struct ConnectorConfigBuilder {
	client_id: String,
	client_secret: Option<TokenSecret>,
	redirect_uri: Option<Url>,
	frontend_url: Option<Url>,
	endpoints: XeroEndpoints,
	scope: Option<String>,
	access_type: Option<String>,
	client_auth: ClientAuthMethod,
	request_timeout: std::time::Duration,
	pending_flow_ttl: Duration,
}
impl ConnectorConfigBuilder {
	/// Creates a builder seeded with Xero defaults.
	pub fn new(client_id: impl Into<String>) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret: None,
			redirect_uri: None,
			frontend_url: None,
			endpoints: XeroEndpoints::default(),
			scope: None,
			access_type: Some(DEFAULT_ACCESS_TYPE.into()),
			client_auth: ClientAuthMethod::default(),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			pending_flow_ttl: DEFAULT_PENDING_FLOW_TTL,
		}
	}

	/// Sets the client secret.
	pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(TokenSecret::new(secret));

		self
	}

	/// Sets the callback URL registered with Xero.
	pub fn redirect_uri(mut self, url: Url) -> Self {
		self.redirect_uri = Some(url);

		self
	}

	/// Sets the frontend URL that callback outcomes redirect to.
	pub fn frontend_url(mut self, url: Url) -> Self {
		self.frontend_url = Some(url);

		self
	}

	/// Overrides the identity and API endpoints.
	pub fn endpoints(mut self, endpoints: XeroEndpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Overrides the requested scopes (space-delimited).
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Overrides or clears the `access_type` authorization parameter.
	pub fn access_type(mut self, access_type: Option<String>) -> Self {
		self.access_type = access_type;

		self
	}

	/// Overrides the token endpoint client authentication method.
	pub fn client_auth(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth = method;

		self
	}

	/// Overrides the outbound request timeout (defaults to 30 seconds).
	pub fn request_timeout(mut self, timeout: std::time::Duration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides how long an authorization `state` stays redeemable (defaults to 10 minutes).
	pub fn pending_flow_ttl(mut self, ttl: Duration) -> Self {
		self.pending_flow_ttl = ttl;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ConnectorConfig, ConfigBuildError> {
		if self.client_id.trim().is_empty() {
			return Err(ConfigBuildError::EmptyClientId);
		}

		let client_secret = self
			.client_secret
			.filter(|secret| !secret.is_empty())
			.ok_or(ConfigBuildError::MissingClientSecret)?;
		let redirect_uri = self.redirect_uri.ok_or(ConfigBuildError::MissingRedirectUri)?;
		let frontend_url = self.frontend_url.ok_or(ConfigBuildError::MissingFrontendUrl)?;
		let scope = ScopeSet::from_str(self.scope.as_deref().unwrap_or(DEFAULT_SCOPE))?;

		if scope.is_empty() {
			return Err(ConfigBuildError::EmptyScope);
		}
		if self.request_timeout.is_zero() {
			return Err(ConfigBuildError::NonPositiveTimeout);
		}
		if !self.pending_flow_ttl.is_positive() {
			return Err(ConfigBuildError::NonPositiveFlowTtl);
		}

		validate_browser_url("redirect", &redirect_uri)?;
		validate_browser_url("frontend", &frontend_url)?;
		validate_endpoint("authorization", &self.endpoints.authorization)?;
		validate_endpoint("token", &self.endpoints.token)?;
		validate_endpoint("api", &self.endpoints.api_base)?;

		if self.endpoints.connections_url().is_err() {
			return Err(ConfigBuildError::InvalidApiPath {
				endpoint: "connections",
				path: self.endpoints.connections_path,
			});
		}
		if self.endpoints.contacts_url().is_err() {
			return Err(ConfigBuildError::InvalidApiPath {
				endpoint: "contacts",
				path: self.endpoints.contacts_path,
			});
		}

		Ok(ConnectorConfig {
			client_id: self.client_id,
			client_secret,
			redirect_uri,
			frontend_url,
			endpoints: self.endpoints,
			scope,
			access_type: self.access_type.filter(|value| !value.is_empty()),
			client_auth: self.client_auth,
			request_timeout: self.request_timeout,
			pending_flow_ttl: self.pending_flow_ttl,
		})
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ConfigBuildError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(ConfigBuildError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

fn validate_browser_url(name: &'static str, url: &Url) -> Result<(), ConfigBuildError> {
	if matches!(url.scheme(), "http" | "https") {
		Ok(())
	} else {
		Err(ConfigBuildError::UnsupportedScheme { endpoint: name, url: url.to_string() })
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	}
}
