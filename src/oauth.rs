//! OAuth client for Xero's identity server plus the tenant-scoped API calls that share its
//! transport.
//!
//! Every method is a single request/response round trip; retry decisions belong to
//! [`TokenLifecycleManager`](crate::flows::TokenLifecycleManager).

pub use oauth2;

// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet,
	EndpointSet, HttpClientError, HttpResponse, RedirectUrl, RefreshToken, RequestTokenError,
	TokenResponse as _, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenType},
	http::{
		Method, Request,
		header::{ACCEPT, AUTHORIZATION},
	},
};
use serde::de::DeserializeOwned;
// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
use crate::{
	_prelude::*,
	auth::{self, CompanyId, ScopeSet, TokenResponse, TokenSecret},
	config::{ClientAuthMethod, ConnectorConfig},
	error::{ConfigError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

/// Header carrying the tenant a Xero API call is scoped to.
pub const XERO_TENANT_HEADER: &str = "xero-tenant-id";

const STATE_LEN: usize = 32;

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Outbound call labels used in errors and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// `grant_type=authorization_code` exchange.
	AuthorizationCode,
	/// `grant_type=refresh_token` exchange.
	RefreshToken,
	/// Tenant connections lookup.
	TenantConnections,
	/// Tenant-scoped resource read.
	ResourceFetch,
}
impl Operation {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::AuthorizationCode => "authorization_code",
			Operation::RefreshToken => "refresh_token",
			Operation::TenantConnections => "tenant_connections",
			Operation::ResourceFetch => "resource_fetch",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Maps HTTP transport failures into connector [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a connector error.
	fn map_transport_error(
		&self,
		operation: Operation,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports; timeouts become [`Error::Timeout`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		operation: Operation,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(operation, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) =>
				map_generic_transport_error(operation, meta, message),
			_ => map_generic_transport_error(operation, meta, "unknown transport failure"),
		}
	}
}

/// Authorization URL plus the `state` it embeds.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
	/// URL the browser should be redirected to.
	pub url: Url,
	/// Opaque CSRF value that must come back on the callback.
	pub state: String,
}

/// One entry of the tenant connections listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConnection {
	/// Connection identifier.
	pub id: Option<String>,
	/// Tenant (company) identifier.
	pub tenant_id: CompanyId,
	/// Tenant kind, e.g. `ORGANISATION`.
	pub tenant_type: Option<String>,
	/// Display name.
	pub tenant_name: Option<String>,
	/// Creation timestamp as reported upstream.
	pub created_date_utc: Option<String>,
	/// Update timestamp as reported upstream.
	pub updated_date_utc: Option<String>,
}

/// Client for the identity server and the tenant-scoped API.
pub struct OAuthClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: Arc<ConnectorConfig>,
	oauth_client: ConfiguredBasicClient,
	connections_url: Url,
	contacts_url: Url,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> OAuthClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds a client from validated configuration and a transport + mapper pair.
	pub fn new(
		config: Arc<ConnectorConfig>,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(config.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "authorization", source })?;
		let token_url = TokenUrl::new(config.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "token", source })?;
		let redirect_url = RedirectUrl::new(config.redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "redirect", source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(config.client_id.clone()))
			.set_client_secret(ClientSecret::new(config.client_secret.expose().to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url);

		if matches!(config.client_auth, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		let connections_url = config.endpoints.connections_url()?;
		let contacts_url = config.endpoints.contacts_url()?;

		Ok(Self {
			config,
			oauth_client,
			connections_url,
			contacts_url,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}

	/// Configuration the client was built from.
	pub fn config(&self) -> &ConnectorConfig {
		&self.config
	}

	/// Absolute contacts collection URL.
	pub fn contacts_url(&self) -> &Url {
		&self.contacts_url
	}

	/// Composes the authorization URL with a freshly generated `state`.
	pub fn build_authorization_url(&self) -> AuthorizationRequest {
		let state = auth::random_alphanumeric(STATE_LEN);
		let mut url = self.config.endpoints.authorization.clone();
		let mut pairs = url.query_pairs_mut();

		pairs.append_pair("response_type", "code");
		pairs.append_pair("client_id", &self.config.client_id);
		pairs.append_pair("redirect_uri", self.config.redirect_uri.as_str());
		pairs.append_pair("scope", &self.config.scope.normalized());
		pairs.append_pair("state", &state);

		if let Some(access_type) = &self.config.access_type {
			pairs.append_pair("access_type", access_type);
		}

		drop(pairs);

		AuthorizationRequest { url, state }
	}

	/// Exchanges an authorization code for tokens.
	pub async fn exchange_code_for_tokens(&self, code: &str) -> Result<TokenResponse> {
		const OPERATION: Operation = Operation::AuthorizationCode;

		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let response = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.request_async(&instrumented)
			.await
			.map_err(|err| self.map_request_error(OPERATION, meta.take(), err))?;
		let token = self.map_token_response(response)?;

		if token.refresh_token.is_none() {
			return Err(ConfigError::MissingRefreshToken.into());
		}

		Ok(token)
	}

	/// Mints a new access token from a refresh token.
	///
	/// The returned `refresh_token` is `None` when the server did not rotate it.
	pub async fn refresh_access_token(&self, refresh_token: &TokenSecret) -> Result<TokenResponse> {
		const OPERATION: Operation = Operation::RefreshToken;

		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let refresh = RefreshToken::new(refresh_token.expose().to_owned());
		let response = self
			.oauth_client
			.exchange_refresh_token(&refresh)
			.request_async(&instrumented)
			.await
			.map_err(|err| self.map_request_error(OPERATION, meta.take(), err))?;

		self.map_token_response(response)
	}

	/// Lists the tenants `access_token` is authorized for, in upstream order.
	pub async fn list_tenant_connections(
		&self,
		access_token: &TokenSecret,
	) -> Result<Vec<TenantConnection>> {
		const OPERATION: Operation = Operation::TenantConnections;

		let (status, body) = self.get(OPERATION, &self.connections_url, access_token, None).await?;

		parse_json(OPERATION, status, &body)
	}

	/// Reads a tenant-scoped collection from `url`, returning the array under `collection_key`.
	///
	/// A missing or `null` collection is an empty list, not a failure.
	pub async fn fetch_resource<T>(
		&self,
		access_token: &TokenSecret,
		tenant: &CompanyId,
		url: &Url,
		collection_key: &str,
	) -> Result<Vec<T>>
	where
		T: DeserializeOwned,
	{
		const OPERATION: Operation = Operation::ResourceFetch;

		let (status, body) = self.get(OPERATION, url, access_token, Some(tenant)).await?;
		let mut envelope: serde_json::Value = parse_json(OPERATION, status, &body)?;

		match envelope.get_mut(collection_key).map(serde_json::Value::take) {
			None | Some(serde_json::Value::Null) => Ok(Vec::new()),
			Some(items) => serde_path_to_error::deserialize(items).map_err(|source| {
				TransientError::ResponseParse { operation: OPERATION, source, status: Some(status) }
					.into()
			}),
		}
	}

	async fn get(
		&self,
		operation: Operation,
		url: &Url,
		access_token: &TokenSecret,
		tenant: Option<&CompanyId>,
	) -> Result<(u16, Vec<u8>)> {
		let mut builder = Request::builder()
			.method(Method::GET)
			.uri(url.as_str())
			.header(AUTHORIZATION, format!("Bearer {}", access_token.expose()))
			.header(ACCEPT, "application/json");

		if let Some(tenant) = tenant {
			builder = builder.header(XERO_TENANT_HEADER, tenant.as_ref());
		}

		let request = builder.body(Vec::new()).map_err(ConfigError::from)?;
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let response: HttpResponse = handle.call(request).await.map_err(|err| {
			self.error_mapper.map_transport_error(operation, meta.take().as_ref(), err)
		})?;
		let status = response.status().as_u16();

		if !response.status().is_success() {
			return Err(map_api_status(operation, status));
		}

		Ok((status, response.into_body()))
	}

	fn map_token_response(
		&self,
		response: oauth2::basic::BasicTokenResponse,
	) -> Result<TokenResponse> {
		let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
		let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

		if expires_in <= 0 {
			return Err(ConfigError::NonPositiveExpiresIn.into());
		}

		let scope = match response.scopes() {
			Some(scopes) => ScopeSet::new(scopes.iter().map(|scope| scope.as_str()))
				.map_err(ConfigError::from)?,
			None => self.config.scope.clone(),
		};
		let token_type = match response.token_type() {
			BasicTokenType::Bearer => auth::DEFAULT_TOKEN_TYPE.to_owned(),
			other => other.as_ref().to_owned(),
		};

		Ok(TokenResponse {
			access_token: TokenSecret::new(response.access_token().secret().to_owned()),
			refresh_token: response
				.refresh_token()
				.map(|token| TokenSecret::new(token.secret().to_owned())),
			expires_in: Duration::seconds(expires_in),
			token_type,
			scope,
		})
	}

	fn map_request_error(
		&self,
		operation: Operation,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> Error {
		let meta_ref = meta.as_ref();

		match err {
			RequestTokenError::ServerResponse(response) =>
				map_server_response_error(operation, response, meta_ref),
			RequestTokenError::Request(error) =>
				self.error_mapper.map_transport_error(operation, meta_ref, error),
			RequestTokenError::Parse(source, _body) => match meta_status(meta_ref) {
				Some(status) if status >= 400 => map_status_rejection(
					operation,
					meta_ref,
					format!("unreadable error response (HTTP {status})"),
				),
				status => TransientError::ResponseParse { operation, source, status }.into(),
			},
			RequestTokenError::Other(message) => map_status_rejection(operation, meta_ref, message),
		}
	}
}
#[cfg(feature = "reqwest")]
impl OAuthClient<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds a client with its own timeout-bounded reqwest transport.
	pub fn with_reqwest(config: Arc<ConnectorConfig>) -> Result<Self> {
		let http_client = ReqwestHttpClient::with_timeout(config.request_timeout)?;

		Self::new(config, http_client, ReqwestTransportErrorMapper)
	}
}
impl<C, M> Debug for OAuthClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthClient")
			.field("client_id", &self.config.client_id)
			.field("token_endpoint", &self.config.endpoints.token.as_str())
			.field("api_base", &self.config.endpoints.api_base.as_str())
			.finish()
	}
}

fn parse_json<T>(operation: Operation, status: u16, body: &[u8]) -> Result<T>
where
	T: DeserializeOwned,
{
	let deserializer = &mut serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(deserializer).map_err(|source| {
		TransientError::ResponseParse { operation, source, status: Some(status) }.into()
	})
}

fn map_api_status(operation: Operation, status: u16) -> Error {
	match operation {
		Operation::TenantConnections | Operation::AuthorizationCode | Operation::RefreshToken =>
			Error::UpstreamAuth {
				operation,
				status: Some(status),
				reason: format!("HTTP {status}"),
			},
		Operation::ResourceFetch => Error::UpstreamApi {
			operation,
			status: Some(status),
			message: format!("Xero API responded with HTTP {status}"),
		},
	}
}

fn map_server_response_error(
	operation: Operation,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let code = response.error().as_ref();
	let reason = match response.error_description() {
		Some(description) => format!("{code}: {description}"),
		None => code.to_owned(),
	};

	if is_transient(meta_status(meta), Some(code)) {
		return TransientError::TokenEndpoint {
			message: reason,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	Error::UpstreamAuth { operation, status: meta_status(meta), reason }
}

fn map_status_rejection(
	operation: Operation,
	meta: Option<&ResponseMetadata>,
	message: impl Display,
) -> Error {
	match meta_status(meta) {
		Some(status) if status >= 400 && !is_transient(Some(status), None) => Error::UpstreamAuth {
			operation,
			status: Some(status),
			reason: message.to_string(),
		},
		status => TransientError::TokenEndpoint {
			message: message.to_string(),
			status,
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn is_transient(status: Option<u16>, oauth_error: Option<&str>) -> bool {
	matches!(status, Some(429 | 500..=599))
		|| matches!(oauth_error, Some("temporarily_unavailable" | "server_error"))
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(operation: Operation, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return Error::Timeout { operation };
	}

	TransportError::from(err).into()
}

#[cfg(feature = "reqwest")]
fn map_generic_transport_error(
	operation: Operation,
	meta: Option<&ResponseMetadata>,
	message: impl Display,
) -> Error {
	TransientError::TokenEndpoint {
		message: format!("HTTP client error during {operation}: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
