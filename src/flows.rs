//! Token lifecycle orchestration on top of [`OAuthClient`] and a [`TokenStore`].

pub mod authorize;
pub mod refresh;
pub mod status;

pub use authorize::*;
pub use refresh::*;
pub use status::*;

// self
use crate::{
	_prelude::*,
	auth::{CompanyId, TokenSecret},
	clock::{Clock, SystemClock},
	config::ConnectorConfig,
	http::TokenHttpClient,
	oauth::{OAuthClient, TransportErrorMapper},
	store::TokenStore,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Lifecycle manager specialized for the crate's default reqwest transport stack.
pub type ReqwestTokenLifecycleManager =
	TokenLifecycleManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

type GuardMap = Arc<Mutex<HashMap<CompanyId, Arc<AsyncMutex<()>>>>>;

/// Decides create-vs-update on callback and expired-vs-valid on every protected call.
///
/// Every read-check-refresh-write sequence and every authorization upsert or disconnect for a
/// company runs under that company's async guard, so two requests never replay the same refresh
/// token. Different companies never contend. Clones share the store, the guards, and the
/// pending authorization cache.
pub struct TokenLifecycleManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	client: Arc<OAuthClient<C, M>>,
	store: Arc<dyn TokenStore>,
	clock: Arc<dyn Clock>,
	pending: PendingAuthorizations,
	/// Shared counters for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	company_guards: GuardMap,
	rejected_refresh: Arc<Mutex<HashMap<CompanyId, TokenSecret>>>,
}
impl<C, M> TokenLifecycleManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a manager that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		config: ConnectorConfig,
		store: Arc<dyn TokenStore>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let pending = PendingAuthorizations::new(config.pending_flow_ttl);
		let client = OAuthClient::new(Arc::new(config), http_client, mapper)?;

		Ok(Self {
			client: Arc::new(client),
			store,
			clock: Arc::new(SystemClock),
			pending,
			refresh_metrics: Default::default(),
			company_guards: Default::default(),
			rejected_refresh: Default::default(),
		})
	}

	/// Replaces the time source used for expiry decisions and pending-flow TTLs.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// OAuth client used for every outbound call.
	pub fn client(&self) -> &OAuthClient<C, M> {
		&self.client
	}

	/// Store handle shared with the caller.
	pub fn store(&self) -> &Arc<dyn TokenStore> {
		&self.store
	}

	/// Validated configuration.
	pub fn config(&self) -> &ConnectorConfig {
		self.client.config()
	}

	pub(crate) fn now(&self) -> OffsetDateTime {
		self.clock.now()
	}

	/// Returns (and creates on demand) the guard serializing lifecycle writes for `company`.
	///
	/// Creating a guard first drops every guard nobody holds, so lookups for unknown or
	/// disconnected companies never accumulate.
	pub(crate) fn company_guard(&self, company: &CompanyId) -> Arc<AsyncMutex<()>> {
		let mut guards = self.company_guards.lock();

		if let Some(guard) = guards.get(company) {
			return guard.clone();
		}

		guards.retain(|_, guard| Arc::strong_count(guard) > 1);

		guards.entry(company.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	/// Forgets `company`'s guard unless another request still holds it.
	pub(crate) fn release_company_guard(&self, company: &CompanyId) {
		let mut guards = self.company_guards.lock();

		if guards.get(company).is_some_and(|guard| Arc::strong_count(guard) == 1) {
			guards.remove(company);
		}
	}

	#[cfg(all(test, feature = "reqwest"))]
	fn tracked_guards(&self) -> usize {
		self.company_guards.lock().len()
	}

	pub(crate) fn mark_refresh_rejected(&self, company: &CompanyId, refresh: &TokenSecret) {
		self.rejected_refresh.lock().insert(company.clone(), refresh.clone());
	}

	pub(crate) fn refresh_was_rejected(&self, company: &CompanyId, refresh: &TokenSecret) -> bool {
		self.rejected_refresh.lock().get(company).is_some_and(|rejected| rejected == refresh)
	}

	pub(crate) fn is_marked_rejected(&self, company: &CompanyId) -> bool {
		self.rejected_refresh.lock().contains_key(company)
	}

	pub(crate) fn clear_refresh_rejection(&self, company: &CompanyId) {
		self.rejected_refresh.lock().remove(company);
	}
}
#[cfg(feature = "reqwest")]
impl TokenLifecycleManager<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a manager with its own reqwest transport bounded by `config.request_timeout`.
	pub fn new(config: ConnectorConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
		let http_client = ReqwestHttpClient::with_timeout(config.request_timeout)?;

		Self::with_http_client(config, store, http_client, Arc::new(ReqwestTransportErrorMapper))
	}
}
impl<C, M> Clone for TokenLifecycleManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			client: self.client.clone(),
			store: self.store.clone(),
			clock: self.clock.clone(),
			pending: self.pending.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			company_guards: self.company_guards.clone(),
			rejected_refresh: self.rejected_refresh.clone(),
		}
	}
}
impl<C, M> Debug for TokenLifecycleManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenLifecycleManager")
			.field("client", &self.client)
			.field("pending_authorizations", &self.pending.len())
			.field("refresh_metrics", &self.refresh_metrics)
			.finish()
	}
}
