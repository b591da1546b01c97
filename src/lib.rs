//! Xero OAuth 2.0 connector: authorize a company once, keep one token record per company, and
//! refresh on demand before every contacts call.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod clock;
pub mod config;
pub mod contacts;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod store;
pub mod surface;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		clock::{Clock, ManualClock},
		config::{ConnectorConfig, XeroEndpoints},
		flows::TokenLifecycleManager,
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		store::{MemoryStore, TokenStore},
	};

	/// Lifecycle manager type alias used by reqwest-backed integration tests.
	pub type ReqwestTestManager =
		TokenLifecycleManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Client identifier baked into [`test_config`].
	pub const TEST_CLIENT_ID: &str = "client-xero-test";
	/// Client secret baked into [`test_config`].
	pub const TEST_CLIENT_SECRET: &str = "secret-xero-test";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client(timeout: std::time::Duration) -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.timeout(timeout)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Connector configuration whose identity and API endpoints all point at `base`.
	pub fn test_config(base: &str) -> ConnectorConfig {
		let url = |path: &str| {
			Url::parse(&format!("{}{path}", base.trim_end_matches('/')))
				.expect("Mock endpoint URL should parse successfully.")
		};
		let endpoints = XeroEndpoints {
			authorization: url("/identity/connect/authorize"),
			token: url("/connect/token"),
			api_base: url("/"),
			..XeroEndpoints::default()
		};

		ConnectorConfig::builder(TEST_CLIENT_ID)
			.client_secret(TEST_CLIENT_SECRET)
			.redirect_uri(url("/auth/xero/callback"))
			.frontend_url(
				Url::parse("http://localhost:5173").expect("Frontend URL fixture should parse."),
			)
			.endpoints(endpoints)
			.build()
			.expect("Test connector configuration should build successfully.")
	}

	/// Constructs a [`TokenLifecycleManager`] backed by an in-memory store and a manual clock
	/// shared between the manager and the store.
	pub fn build_reqwest_test_manager(
		config: ConnectorConfig,
	) -> (ReqwestTestManager, Arc<MemoryStore>, Arc<ManualClock>) {
		let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
		let store_backend = Arc::new(MemoryStore::with_clock(clock.clone()));
		let store: Arc<dyn TokenStore> = store_backend.clone();
		let http_client = test_reqwest_http_client(config.request_timeout);
		let shared_clock: Arc<dyn Clock> = clock.clone();
		let manager = TokenLifecycleManager::with_http_client(
			config,
			store,
			http_client,
			Arc::new(ReqwestTransportErrorMapper),
		)
		.expect("Test lifecycle manager should build successfully.")
		.with_clock(shared_clock);

		(manager, store_backend, clock)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
