#![cfg(all(feature = "reqwest", feature = "test"))]

// crates.io
use httpmock::prelude::*;
// self
use xero_connect::{
	_preludet::*,
	auth::{CompanyId, ScopeSet, TokenSecret, TokenUpdate},
	clock::Clock,
	oauth::Operation,
	store::{MemoryStore, TokenStore},
	surface::{self, ApiResponse},
};

const CONTACTS_PATH: &str = "/api.xro/2.0/Contacts";
const TWO_CONTACTS: &str = "{\"Contacts\":[{\"ContactID\":\"c-1\",\"Name\":\"Acme\",\"EmailAddress\":\"ap@acme.test\"},{\"ContactID\":\"c-2\",\"Name\":\"Globex\",\"IsSupplier\":true}]}";

fn company(value: &str) -> CompanyId {
	CompanyId::new(value).expect("Company fixture should be valid.")
}

async fn seed(store: &MemoryStore, company_id: &CompanyId, expires_at: OffsetDateTime) {
	store
		.upsert(TokenUpdate {
			company_id: company_id.clone(),
			access_token: TokenSecret::new("access-1"),
			refresh_token: TokenSecret::new("refresh-1"),
			expires_at,
			token_type: "Bearer".into(),
			scope: ScopeSet::new(["accounting.contacts"]).expect("Scope fixture should be valid."),
		})
		.await
		.expect("Seeding the store should succeed.");
}

async fn mock_contacts<'a>(
	server: &'a MockServer,
	access_token: &str,
	status: u16,
	body: &'static str,
) -> httpmock::Mock<'a> {
	let bearer = format!("Bearer {access_token}");

	server
		.mock_async(|when, then| {
			when.method(GET)
				.path(CONTACTS_PATH)
				.header("authorization", bearer)
				.header("xero-tenant-id", "co1");
			then.status(status).header("content-type", "application/json").body(body);
		})
		.await
}

#[tokio::test]
async fn contacts_are_read_with_bearer_and_tenant_headers() {
	let server = MockServer::start_async().await;
	let (manager, store, clock) = build_reqwest_test_manager(test_config(&server.base_url()));
	let contacts = mock_contacts(&server, "access-1", 200, TWO_CONTACTS).await;
	let co1 = company("co1");

	seed(&store, &co1, clock.now() + Duration::hours(1)).await;

	let page = manager.fetch_contacts(&co1).await.expect("Contacts should be fetched.");

	contacts.assert_async().await;

	assert_eq!(page.total_count, 2);
	assert_eq!(page.company_id, co1);
	assert_eq!(page.fetched_at, clock.now());
	assert_eq!(page.contacts[0].contact_id, "c-1");
	assert_eq!(page.contacts[0].email_address.as_deref(), Some("ap@acme.test"));
	assert_eq!(page.contacts[1].extra.get("IsSupplier"), Some(&serde_json::Value::Bool(true)));
}

#[tokio::test]
async fn missing_or_null_collection_is_empty() {
	let server = MockServer::start_async().await;
	let (manager, store, clock) = build_reqwest_test_manager(test_config(&server.base_url()));
	let co1 = company("co1");

	seed(&store, &co1, clock.now() + Duration::hours(1)).await;

	for body in ["{}", "{\"Contacts\":null}"] {
		let contacts = mock_contacts(&server, "access-1", 200, body).await;
		let page = manager.fetch_contacts(&co1).await.expect("Contacts should be fetched.");

		assert!(page.contacts.is_empty());
		assert_eq!(page.total_count, 0);

		contacts.assert_async().await;
		contacts.delete_async().await;
	}
}

#[tokio::test]
async fn unconnected_company_never_reaches_the_api() {
	let server = MockServer::start_async().await;
	let (manager, _store, _clock) = build_reqwest_test_manager(test_config(&server.base_url()));
	let contacts = mock_contacts(&server, "access-1", 200, TWO_CONTACTS).await;
	let err = manager
		.fetch_contacts(&company("co1"))
		.await
		.expect_err("Unconnected company must fail.");

	assert!(matches!(err, Error::NotConnected { .. }));
	assert_eq!(err.status_code(), 404);
	contacts.assert_calls_async(0).await;
}

#[tokio::test]
async fn api_failure_is_reported_without_upstream_details() {
	let server = MockServer::start_async().await;
	let (manager, store, clock) = build_reqwest_test_manager(test_config(&server.base_url()));
	let _contacts =
		mock_contacts(&server, "access-1", 500, "{\"Message\":\"internal stack trace\"}").await;
	let co1 = company("co1");

	seed(&store, &co1, clock.now() + Duration::hours(1)).await;

	let err = manager.fetch_contacts(&co1).await.expect_err("Server errors must fail.");

	assert!(matches!(
		err,
		Error::UpstreamApi { operation: Operation::ResourceFetch, status: Some(500), .. }
	));

	let (status, response) = surface::sync_response(manager.sync_contacts(&co1).await);
	let encoded = serde_json::to_string(&response).expect("Envelope should serialize.");

	assert_eq!(status, 502);
	assert!(!response.success);
	assert!(!encoded.contains("stack trace"));
}

#[tokio::test]
async fn refused_access_token_is_refreshed_and_retried_once() {
	let server = MockServer::start_async().await;
	let (manager, store, clock) = build_reqwest_test_manager(test_config(&server.base_url()));
	let refused = mock_contacts(&server, "access-1", 401, "{\"Title\":\"Unauthorized\"}").await;
	let accepted = mock_contacts(&server, "access-2", 200, TWO_CONTACTS).await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/connect/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-2\",\"refresh_token\":\"refresh-2\",\"token_type\":\"Bearer\",\"expires_in\":1800}",
			);
		})
		.await;
	let co1 = company("co1");

	seed(&store, &co1, clock.now() + Duration::hours(1)).await;

	let page = manager.fetch_contacts(&co1).await.expect("Retry should succeed.");

	assert_eq!(page.total_count, 2);
	refused.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
	accepted.assert_calls_async(1).await;
}

#[tokio::test]
async fn repeated_refusal_is_not_retried_again() {
	let server = MockServer::start_async().await;
	let (manager, store, clock) = build_reqwest_test_manager(test_config(&server.base_url()));
	let refused = mock_contacts(&server, "access-1", 401, "{}").await;
	let refused_again = mock_contacts(&server, "access-2", 401, "{}").await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/connect/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-2\",\"token_type\":\"Bearer\",\"expires_in\":1800}",
			);
		})
		.await;
	let co1 = company("co1");

	seed(&store, &co1, clock.now() + Duration::hours(1)).await;

	let err = manager.fetch_contacts(&co1).await.expect_err("Second refusal must fail.");

	assert!(matches!(err, Error::UpstreamApi { status: Some(401), .. }));
	refused.assert_calls_async(1).await;
	refused_again.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn slow_api_times_out() {
	let server = MockServer::start_async().await;
	let mut config = test_config(&server.base_url());

	config.request_timeout = std::time::Duration::from_millis(200);

	let (manager, store, clock) = build_reqwest_test_manager(config);
	let _contacts = server
		.mock_async(|when, then| {
			when.method(GET).path(CONTACTS_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_secs(2))
				.body(TWO_CONTACTS);
		})
		.await;
	let co1 = company("co1");

	seed(&store, &co1, clock.now() + Duration::hours(1)).await;

	let err = manager.fetch_contacts(&co1).await.expect_err("Slow API must time out.");

	assert!(matches!(err, Error::Timeout { operation: Operation::ResourceFetch }));
	assert_eq!(err.status_code(), 504);
	assert!(err.is_retryable());
}

#[tokio::test]
async fn sync_reports_fetched_count() {
	let server = MockServer::start_async().await;
	let (manager, store, clock) = build_reqwest_test_manager(test_config(&server.base_url()));
	let _contacts = mock_contacts(&server, "access-1", 200, TWO_CONTACTS).await;
	let co1 = company("co1");

	seed(&store, &co1, clock.now() + Duration::hours(1)).await;

	let (status, response) = surface::sync_response(manager.sync_contacts(&co1).await);

	assert_eq!(status, 200);

	let ApiResponse { success, message, data, error } = response;
	let report = data.expect("Sync report should be present.");

	assert!(success);
	assert!(error.is_none());
	assert_eq!(message.as_deref(), Some("Customer sync completed successfully"));
	assert_eq!(report.sync_results.total_fetched, 2);
	assert_eq!(report.sync_results.new_contacts, 0);
	assert_eq!(report.company_id, co1);
	assert_eq!(report.synced_at, clock.now());
}
