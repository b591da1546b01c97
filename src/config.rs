//! Explicit connector configuration passed into the OAuth client and lifecycle manager.
//!
//! Nothing here reads the environment; callers assemble a [`ConnectorConfig`] through
//! [`ConnectorConfig::builder`] and hand it to the lifecycle manager.
//! Endpoint defaults target Xero's production identity and API hosts.

/// Builder API and validation for [`ConnectorConfig`].
pub mod builder;

pub use builder::*;

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::ConfigError,
};

/// Default authorization endpoint.
pub const XERO_AUTHORIZATION_URL: &str = "https://login.xero.com/identity/connect/authorize";
/// Default token endpoint.
pub const XERO_TOKEN_URL: &str = "https://identity.xero.com/connect/token";
/// Default API base URL.
pub const XERO_API_BASE_URL: &str = "https://api.xero.com/";
/// Default tenant connections path.
pub const XERO_CONNECTIONS_PATH: &str = "/connections";
/// Default contacts collection path.
pub const XERO_CONTACTS_PATH: &str = "/api.xro/2.0/Contacts";
/// Scopes requested when the builder is not told otherwise.
pub const DEFAULT_SCOPE: &str = "accounting.contacts offline_access";
/// `access_type` sent with every authorization request by default.
pub const DEFAULT_ACCESS_TYPE: &str = "offline";

/// How client credentials reach the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
}

/// Identity and API endpoints the connector talks to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XeroEndpoints {
	/// Browser-facing authorization endpoint.
	pub authorization: Url,
	/// Token endpoint used for code exchange and refresh.
	pub token: Url,
	/// Base URL that API paths are resolved against.
	pub api_base: Url,
	/// Path listing the tenants a token may access.
	pub connections_path: String,
	/// Path of the contacts collection.
	pub contacts_path: String,
}
impl XeroEndpoints {
	/// Absolute tenant connections URL.
	pub fn connections_url(&self) -> Result<Url, ConfigError> {
		self.resolve("connections", &self.connections_path)
	}

	/// Absolute contacts URL.
	pub fn contacts_url(&self) -> Result<Url, ConfigError> {
		self.resolve("contacts", &self.contacts_path)
	}

	fn resolve(&self, endpoint: &'static str, path: &str) -> Result<Url, ConfigError> {
		self.api_base.join(path).map_err(|source| ConfigError::InvalidEndpoint { endpoint, source })
	}
}
impl Default for XeroEndpoints {
	fn default() -> Self {
		Self {
			authorization: Url::parse(XERO_AUTHORIZATION_URL)
				.unwrap_or_else(|_| unreachable!("Static authorization URL is valid.")),
			token: Url::parse(XERO_TOKEN_URL)
				.unwrap_or_else(|_| unreachable!("Static token URL is valid.")),
			api_base: Url::parse(XERO_API_BASE_URL)
				.unwrap_or_else(|_| unreachable!("Static API base URL is valid.")),
			connections_path: XERO_CONNECTIONS_PATH.into(),
			contacts_path: XERO_CONTACTS_PATH.into(),
		}
	}
}

/// Validated, process-level connector settings.
///
/// The client secret is wrapped in [`TokenSecret`] so `Debug` output stays redacted.
#[derive(Clone, Debug)]
pub struct ConnectorConfig {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Callback URL registered with Xero.
	pub redirect_uri: Url,
	/// Frontend URL that callback outcomes redirect to.
	pub frontend_url: Url,
	/// Identity and API endpoints.
	pub endpoints: XeroEndpoints,
	/// Scopes requested during authorization.
	pub scope: ScopeSet,
	/// Optional `access_type` authorization parameter.
	pub access_type: Option<String>,
	/// Token endpoint client authentication.
	pub client_auth: ClientAuthMethod,
	/// Upper bound for every outbound call.
	pub request_timeout: std::time::Duration,
	/// Lifetime of a cached authorization `state`.
	pub pending_flow_ttl: Duration,
}
impl ConnectorConfig {
	/// Creates a builder seeded with Xero defaults.
	pub fn builder(client_id: impl Into<String>) -> ConnectorConfigBuilder {
		ConnectorConfigBuilder::new(client_id)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn default_endpoints_resolve_api_paths() {
		let endpoints = XeroEndpoints::default();

		assert_eq!(
			endpoints.connections_url().expect("Connections URL should resolve.").as_str(),
			"https://api.xero.com/connections"
		);
		assert_eq!(
			endpoints.contacts_url().expect("Contacts URL should resolve.").as_str(),
			"https://api.xero.com/api.xro/2.0/Contacts"
		);
	}

	#[test]
	fn endpoints_deserialize_with_partial_overrides() {
		let endpoints: XeroEndpoints =
			serde_json::from_str("{\"api_base\":\"https://api.example.test/\"}")
				.expect("Partial endpoint config should deserialize.");

		assert_eq!(endpoints.token.as_str(), XERO_TOKEN_URL);
		assert_eq!(
			endpoints.contacts_url().expect("Contacts URL should resolve.").as_str(),
			"https://api.example.test/api.xro/2.0/Contacts"
		);
	}
}
