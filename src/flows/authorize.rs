//! Authorization code flow: authorize URL issuance, `state` validation, and first-tenant upsert.

// self
use crate::{
	_prelude::*,
	auth::{CompanyId, FlowId},
	flows::TokenLifecycleManager,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Handshake metadata returned by [`TokenLifecycleManager::begin_authorization`].
///
/// Callers keep `flow_id` (for example in a short-lived cookie) and send the user to
/// `authorize_url`; the callback must present both back.
#[derive(Clone, Debug)]
pub struct AuthorizationSession {
	/// Handle for the pending flow.
	pub flow_id: FlowId,
	/// Opaque value that must round-trip through the identity server.
	pub state: String,
	/// Fully-formed authorization URL.
	pub authorize_url: Url,
}

#[derive(Clone, Debug)]
struct PendingFlow {
	state: String,
	created_at: OffsetDateTime,
}

/// Short-lived cache of issued `state` values keyed by flow.
///
/// Entries are single use and expire after the configured TTL.
#[derive(Clone, Debug)]
pub struct PendingAuthorizations {
	flows: Arc<Mutex<HashMap<FlowId, PendingFlow>>>,
	ttl: Duration,
}
impl PendingAuthorizations {
	/// Creates an empty cache whose entries live for `ttl`.
	pub fn new(ttl: Duration) -> Self {
		Self { flows: Default::default(), ttl }
	}

	/// Number of cached flows, expired ones included until the next insert prunes them.
	pub fn len(&self) -> usize {
		self.flows.lock().len()
	}

	/// Returns `true` when no flow is pending.
	pub fn is_empty(&self) -> bool {
		self.flows.lock().is_empty()
	}

	/// Caches `state` for `flow_id`, dropping entries that have outlived the TTL.
	pub fn insert(&self, flow_id: FlowId, state: String, now: OffsetDateTime) {
		let mut flows = self.flows.lock();

		flows.retain(|_, pending| now - pending.created_at < self.ttl);
		flows.insert(flow_id, PendingFlow { state, created_at: now });
	}

	/// Consumes the entry for `flow_id` and checks it against `returned_state`.
	pub fn take_and_verify(
		&self,
		flow_id: &FlowId,
		returned_state: &str,
		now: OffsetDateTime,
	) -> Result<()> {
		let pending = self.flows.lock().remove(flow_id).ok_or_else(|| Error::InvalidState {
			reason: "no pending authorization for this flow".into(),
		})?;

		if now - pending.created_at >= self.ttl {
			return Err(Error::InvalidState { reason: "authorization flow expired".into() });
		}
		if pending.state != returned_state {
			return Err(Error::InvalidState { reason: "state mismatch".into() });
		}

		Ok(())
	}

	/// Drops the entry for `flow_id` without checking it, returning whether one was pending.
	pub fn discard(&self, flow_id: &FlowId) -> bool {
		self.flows.lock().remove(flow_id).is_some()
	}
}

impl<C, M> TokenLifecycleManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Issues a new authorization URL and remembers its `state` for the callback.
	pub fn begin_authorization(&self) -> AuthorizationSession {
		const KIND: FlowKind = FlowKind::Authorization;

		let _span = FlowSpan::new(KIND, "begin_authorization").entered();
		let request = self.client.build_authorization_url();
		let flow_id = FlowId::generate();

		self.pending.insert(flow_id.clone(), request.state.clone(), self.now());
		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		obs::record_flow_outcome(KIND, FlowOutcome::Success);
		obs::flow_event!(debug, flow = %flow_id, "Authorization flow started.");

		AuthorizationSession { flow_id, state: request.state, authorize_url: request.url }
	}

	/// Completes the callback: validates `state`, exchanges `code`, resolves the tenant, and
	/// upserts the company's single token record.
	///
	/// The first tenant returned by the connections endpoint becomes the company.
	pub async fn complete_authorization(
		&self,
		flow_id: &FlowId,
		state: &str,
		code: &str,
	) -> Result<CompanyId> {
		obs::observe(FlowKind::Authorization, "complete_authorization", None, async move {
			self.pending.take_and_verify(flow_id, state, self.now())?;

			let token = self.client.exchange_code_for_tokens(code).await?;
			let issued_at = self.now();
			let tenants = self.client.list_tenant_connections(&token.access_token).await?;
			let company = tenants.into_iter().next().ok_or(Error::NoTenantConnections)?.tenant_id;
			let update = token.into_update(company.clone(), issued_at, None)?;
			let guard = self.company_guard(&company);
			let _exclusive = guard.lock().await;

			self.store.upsert(update).await?;
			self.clear_refresh_rejection(&company);

			obs::flow_event!(info, company = %company, "Authorization completed.");

			Ok(company)
		})
		.await
	}

	/// Forgets a pending flow whose callback carried no usable code, so its `state` can never
	/// be redeemed later.
	pub fn abandon_authorization(&self, flow_id: &FlowId) -> bool {
		let abandoned = self.pending.discard(flow_id);

		if abandoned {
			obs::flow_event!(debug, flow = %flow_id, "Authorization flow abandoned.");
		}

		abandoned
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn pending() -> (PendingAuthorizations, FlowId, OffsetDateTime) {
		let cache = PendingAuthorizations::new(Duration::minutes(10));
		let flow = FlowId::generate();
		let now = macros::datetime!(2025-01-01 00:00 UTC);

		cache.insert(flow.clone(), "expected".into(), now);

		(cache, flow, now)
	}

	#[test]
	fn state_is_single_use() {
		let (cache, flow, now) = pending();

		cache.take_and_verify(&flow, "expected", now).expect("Matching state should pass.");

		let err = cache
			.take_and_verify(&flow, "expected", now)
			.expect_err("Replayed state must be rejected.");

		assert!(matches!(err, Error::InvalidState { .. }));
	}

	#[test]
	fn mismatched_state_consumes_the_flow() {
		let (cache, flow, now) = pending();
		let err = cache
			.take_and_verify(&flow, "forged", now)
			.expect_err("Mismatched state must be rejected.");

		assert!(matches!(err, Error::InvalidState { .. }));
		assert!(cache.is_empty());
	}

	#[test]
	fn expired_flows_are_rejected_and_pruned() {
		let (cache, flow, now) = pending();
		let later = now + Duration::minutes(10);
		let err = cache
			.take_and_verify(&flow, "expected", later)
			.expect_err("Expired state must be rejected.");

		assert!(err.to_string().contains("expired"));

		cache.insert(flow.clone(), "first".into(), now);
		cache.insert(FlowId::generate(), "second".into(), later);

		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn discarded_flows_cannot_be_redeemed() {
		let (cache, flow, now) = pending();

		assert!(cache.discard(&flow));
		assert!(!cache.discard(&flow));

		let err = cache
			.take_and_verify(&flow, "expected", now)
			.expect_err("Discarded state must be rejected.");

		assert!(matches!(err, Error::InvalidState { .. }));
	}
}
