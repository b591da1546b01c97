//! Mapping from lifecycle results to what a route layer sends back: frontend redirects for the
//! OAuth callback and `{ success, data | error }` JSON envelopes for everything else.
//!
//! Only company identifiers and [`Error::public_message`] categories ever reach a redirect or a
//! response body.

// self
use crate::{
	_prelude::*,
	auth::{CompanyId, FlowId},
	contacts::{SYNC_COMPLETED_MESSAGE, SyncReport},
	flows::TokenLifecycleManager,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs,
};

/// Redirect message used when the callback carries no authorization code.
pub const MISSING_CODE_MESSAGE: &str = "Authorization code is missing from the callback.";
/// Redirect message used when the identity server reports an authorization error.
pub const AUTHORIZATION_DENIED_MESSAGE: &str = "Xero authorization was cancelled or denied.";

/// Query parameters Xero appends to the redirect URI.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
	/// Authorization code on success.
	#[serde(default)]
	pub code: Option<String>,
	/// Round-tripped `state`.
	#[serde(default)]
	pub state: Option<String>,
	/// OAuth error code when the user denied access or the request was invalid.
	#[serde(default)]
	pub error: Option<String>,
}

/// Frontend redirect announcing a connected company.
pub fn success_redirect(frontend: &Url, company: &CompanyId) -> Url {
	let mut url = frontend.clone();

	url.query_pairs_mut().append_pair("success", "true").append_pair("company", company);

	url
}

/// Frontend redirect carrying a human-readable failure category.
pub fn error_redirect(frontend: &Url, message: &str) -> Url {
	let mut url = frontend.clone();

	url.query_pairs_mut().append_pair("error", message);

	url
}

/// Completes the OAuth callback and returns the frontend URL to redirect the browser to.
///
/// `flow_id` is the handle the caller stored when [`TokenLifecycleManager::begin_authorization`]
/// ran. This never fails: every failure becomes an `error=` redirect. A denied callback or
/// one without a code still consumes the pending flow.
pub async fn callback_redirect<C, M>(
	manager: &TokenLifecycleManager<C, M>,
	flow_id: Option<&FlowId>,
	query: &CallbackQuery,
) -> Url
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let frontend = &manager.config().frontend_url;
	let abandon = || {
		if let Some(flow_id) = flow_id {
			manager.abandon_authorization(flow_id);
		}
	};

	if query.error.is_some() {
		abandon();

		return error_redirect(frontend, AUTHORIZATION_DENIED_MESSAGE);
	}

	let Some(code) = query.code.as_deref().filter(|code| !code.is_empty()) else {
		abandon();

		return error_redirect(frontend, MISSING_CODE_MESSAGE);
	};
	let Some(flow_id) = flow_id else {
		return error_redirect(
			frontend,
			Error::InvalidState { reason: String::new() }.public_message(),
		);
	};
	let state = query.state.as_deref().unwrap_or_default();

	match manager.complete_authorization(flow_id, state, code).await {
		Ok(company) => success_redirect(frontend, &company),
		Err(e) => {
			obs::flow_event!(warn, error = %e, "Authorization callback failed.");

			error_redirect(frontend, e.public_message())
		},
	}
}

/// JSON envelope shared by every API response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
	/// `true` when `data` is present.
	pub success: bool,
	/// Optional human-readable note.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	/// Payload on success.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	/// Failure category on error.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl<T> ApiResponse<T> {
	/// Successful envelope.
	pub fn ok(data: T) -> Self {
		Self { success: true, message: None, data: Some(data), error: None }
	}

	/// Failed envelope carrying only the public category of `error`.
	pub fn failure(error: &Error) -> Self {
		Self {
			success: false,
			message: None,
			data: None,
			error: Some(error.public_message().to_owned()),
		}
	}

	/// Attaches a message.
	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());

		self
	}

	/// Turns a lifecycle result into an HTTP status and envelope.
	pub fn from_result(result: Result<T>) -> (u16, Self) {
		match result {
			Ok(data) => (200, Self::ok(data)),
			Err(e) => (e.status_code(), Self::failure(&e)),
		}
	}
}

/// Payload of a disconnect response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectResponse {
	/// Whether a record existed and was removed.
	pub deleted: bool,
}

/// Maps a disconnect result, answering 404 when nothing was connected.
pub fn disconnect_response(
	company: &CompanyId,
	result: Result<bool>,
) -> (u16, ApiResponse<DisconnectResponse>) {
	match result {
		Ok(true) => (200, ApiResponse::ok(DisconnectResponse { deleted: true })),
		Ok(false) => {
			let error = Error::NotConnected { company: company.clone() };

			(error.status_code(), ApiResponse {
				data: Some(DisconnectResponse { deleted: false }),
				..ApiResponse::failure(&error)
			})
		},
		Err(e) => (e.status_code(), ApiResponse::failure(&e)),
	}
}

/// Maps a contacts sync result, attaching the completion message on success.
pub fn sync_response(result: Result<SyncReport>) -> (u16, ApiResponse<SyncReport>) {
	match ApiResponse::from_result(result) {
		(status, response) if response.success =>
			(status, response.with_message(SYNC_COMPLETED_MESSAGE)),
		failed => failed,
	}
}
