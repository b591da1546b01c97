#![cfg(all(feature = "reqwest", feature = "test"))]

// crates.io
use httpmock::prelude::*;
// self
use xero_connect::{
	_preludet::*,
	auth::CompanyId,
	clock::Clock,
	store::TokenStore,
	surface::{self, CallbackQuery},
};

const TOKEN_BODY: &str = "{\"access_token\":\"access-1\",\"refresh_token\":\"refresh-1\",\"token_type\":\"Bearer\",\"expires_in\":3600,\"scope\":\"accounting.contacts offline_access\"}";

fn company(value: &str) -> CompanyId {
	CompanyId::new(value).expect("Company fixture should be valid.")
}

async fn mock_token_exchange(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/connect/token")
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(200).header("content-type", "application/json").body(TOKEN_BODY);
		})
		.await
}

async fn mock_connections<'a>(server: &'a MockServer, body: &'static str) -> httpmock::Mock<'a> {
	server
		.mock_async(|when, then| {
			when.method(GET).path("/connections").header("authorization", "Bearer access-1");
			then.status(200).header("content-type", "application/json").body(body);
		})
		.await
}

#[tokio::test]
async fn authorization_persists_first_tenant_and_never_duplicates() {
	let server = MockServer::start_async().await;
	let (manager, store, clock) = build_reqwest_test_manager(test_config(&server.base_url()));
	let token = mock_token_exchange(&server).await;
	let connections = mock_connections(
		&server,
		"[{\"id\":\"conn-a\",\"tenantId\":\"A\",\"tenantType\":\"ORGANISATION\",\"tenantName\":\"Alpha\"},{\"tenantId\":\"B\"}]",
	)
	.await;

	for code in ["code-1", "code-2"] {
		let session = manager.begin_authorization();
		let company_id = manager
			.complete_authorization(&session.flow_id, &session.state, code)
			.await
			.expect("Authorization should complete.");

		assert_eq!(company_id.as_ref(), "A");
		assert_eq!(store.len(), 1, "Exactly one record may exist per company.");
	}

	token.assert_calls_async(2).await;
	connections.assert_calls_async(2).await;

	let record = store
		.find_by_company_id(&company("A"))
		.await
		.expect("Store lookup should succeed.")
		.expect("Record for the first tenant should exist.");

	assert_eq!(record.access_token.expose(), "access-1");
	assert_eq!(record.refresh_token.expose(), "refresh-1");
	assert_eq!(record.expires_at, clock.now() + Duration::seconds(3600));
	assert_eq!(record.scope.normalized(), "accounting.contacts offline_access");
	assert!(
		store
			.find_by_company_id(&company("B"))
			.await
			.expect("Store lookup should succeed.")
			.is_none()
	);
}

#[tokio::test]
async fn forged_state_is_rejected_before_any_exchange() {
	let server = MockServer::start_async().await;
	let (manager, store, _clock) = build_reqwest_test_manager(test_config(&server.base_url()));
	let token = mock_token_exchange(&server).await;
	let session = manager.begin_authorization();
	let err = manager
		.complete_authorization(&session.flow_id, "forged-state", "code-1")
		.await
		.expect_err("Mismatched state must be rejected.");

	assert!(matches!(err, Error::InvalidState { .. }));

	let err = manager
		.complete_authorization(&session.flow_id, &session.state, "code-1")
		.await
		.expect_err("A consumed flow cannot be completed again.");

	assert!(matches!(err, Error::InvalidState { .. }));
	assert!(store.is_empty());
	token.assert_calls_async(0).await;
}

#[tokio::test]
async fn authorization_without_tenants_stores_nothing() {
	let server = MockServer::start_async().await;
	let (manager, store, _clock) = build_reqwest_test_manager(test_config(&server.base_url()));
	let _token = mock_token_exchange(&server).await;
	let _connections = mock_connections(&server, "[]").await;
	let session = manager.begin_authorization();
	let err = manager
		.complete_authorization(&session.flow_id, &session.state, "code-1")
		.await
		.expect_err("An empty connection list must fail.");

	assert!(matches!(err, Error::NoTenantConnections));
	assert_eq!(err.status_code(), 403);
	assert!(store.is_empty());
}

#[tokio::test]
async fn rejected_code_exchange_is_an_upstream_auth_error() {
	let server = MockServer::start_async().await;
	let (manager, store, _clock) = build_reqwest_test_manager(test_config(&server.base_url()));
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/connect/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"code already used\"}");
		})
		.await;
	let session = manager.begin_authorization();
	let err = manager
		.complete_authorization(&session.flow_id, &session.state, "stale-code")
		.await
		.expect_err("Rejected codes must fail.");

	token.assert_async().await;

	assert!(matches!(err, Error::UpstreamAuth { status: Some(400), .. }));
	assert!(!err.is_retryable());
	assert!(store.is_empty());
}

#[tokio::test]
async fn callback_redirects_carry_only_company_or_category() {
	let server = MockServer::start_async().await;
	let (manager, _store, _clock) = build_reqwest_test_manager(test_config(&server.base_url()));
	let _token = mock_token_exchange(&server).await;
	let _connections = mock_connections(&server, "[{\"tenantId\":\"co1\"}]").await;
	let session = manager.begin_authorization();
	let query = CallbackQuery {
		code: Some("code-1".into()),
		state: Some(session.state.clone()),
		error: None,
	};
	let redirect = surface::callback_redirect(&manager, Some(&session.flow_id), &query).await;

	assert_eq!(redirect.as_str(), "http://localhost:5173/?success=true&company=co1");

	let missing_code = CallbackQuery { state: Some("whatever".into()), ..Default::default() };
	let redirect =
		surface::callback_redirect(&manager, Some(&session.flow_id), &missing_code).await;

	assert_eq!(
		redirect.query_pairs().find(|(key, _)| key == "error").map(|(_, value)| value.into_owned()),
		Some(surface::MISSING_CODE_MESSAGE.to_owned())
	);

	let replayed = surface::callback_redirect(&manager, Some(&session.flow_id), &query).await;

	assert!(!replayed.as_str().contains("access-1"));
	assert!(!replayed.as_str().contains(TEST_CLIENT_SECRET));
	assert!(replayed.query_pairs().any(|(key, _)| key == "error"));
}

#[tokio::test]
async fn denied_or_codeless_callbacks_consume_the_pending_flow() {
	let server = MockServer::start_async().await;
	let (manager, store, _clock) = build_reqwest_test_manager(test_config(&server.base_url()));
	let token = mock_token_exchange(&server).await;
	let _connections = mock_connections(&server, "[{\"tenantId\":\"co1\"}]").await;
	let denied = CallbackQuery { error: Some("access_denied".into()), ..Default::default() };
	let codeless = CallbackQuery { code: Some(String::new()), ..Default::default() };

	for failed in [denied, codeless] {
		let session = manager.begin_authorization();

		surface::callback_redirect(&manager, Some(&session.flow_id), &failed).await;

		let valid = CallbackQuery {
			code: Some("code-1".into()),
			state: Some(session.state.clone()),
			error: None,
		};
		let redirect = surface::callback_redirect(&manager, Some(&session.flow_id), &valid).await;

		assert!(redirect.query_pairs().any(|(key, _)| key == "error"));
		assert!(!redirect.query_pairs().any(|(key, _)| key == "success"));
	}

	token.assert_calls_async(0).await;
	assert!(store.is_empty());
}
