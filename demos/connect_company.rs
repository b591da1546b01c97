//! Starts a Xero authorization, then shows how a route layer would answer the callback and the
//! status endpoint. Nothing here talks to Xero; the callback below simulates a user who denied
//! access.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use url::Url;
// self
use xero_connect::{
	config::ConnectorConfig,
	flows::TokenLifecycleManager,
	store::{MemoryStore, TokenStore},
	surface::{self, ApiResponse, CallbackQuery},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = ConnectorConfig::builder("demo-client-id")
		.client_secret("demo-client-secret")
		.redirect_uri(Url::parse("http://localhost:3000/auth/xero/callback")?)
		.frontend_url(Url::parse("http://localhost:5173")?)
		.build()?;
	let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::default());
	let manager = TokenLifecycleManager::new(config, store)?;
	let session = manager.begin_authorization();

	println!("Send your user to {}.", &session.authorize_url);
	println!("Keep flow {} until the callback arrives.", &session.flow_id);

	let denied = CallbackQuery {
		state: Some(session.state.clone()),
		error: Some("access_denied".into()),
		..Default::default()
	};
	let redirect = surface::callback_redirect(&manager, Some(&session.flow_id), &denied).await;

	println!("Denied callback redirects to {redirect}.");

	let (status, body) = ApiResponse::from_result(manager.get_status(None).await);

	println!("GET /auth/xero/status -> {status} {}", serde_json::to_string(&body)?);

	Ok(())
}
