//! On-demand refresh with per-company singleflight guards and compare-and-swap writes.
//!
//! [`TokenLifecycleManager::ensure_fresh_access_token`] is the only way callers obtain an
//! access token. Each call takes the company's guard, reads the record, and either returns the
//! stored token (`now < expires_at`) or performs a `grant_type=refresh_token` call and writes
//! the result through [`TokenStore::compare_and_swap_refresh`](crate::store::TokenStore). A
//! rejected refresh token is remembered per company so it is never sent again; the stored record
//! stays untouched until the company re-authorizes or disconnects.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{CompanyId, TokenRecord, TokenSecret},
	flows::TokenLifecycleManager,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind},
	store::CompareAndSwapOutcome,
};

const KIND: FlowKind = FlowKind::Refresh;

/// Outcome of a manual refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedToken {
	/// Refreshed company.
	pub company_id: CompanyId,
	/// New access token expiry.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
enum RefreshTrigger {
	/// Refresh only when `now >= expires_at`.
	Expired,
	/// Refresh unconditionally.
	Always,
	/// Refresh unless another request already replaced this access token.
	Rejected(TokenSecret),
}

impl<C, M> TokenLifecycleManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a usable access token for `company`, refreshing it first when expired.
	///
	/// Fails with [`Error::NotConnected`] when no record exists and with
	/// [`Error::ReauthorizationRequired`] when the identity server rejects the refresh token.
	/// Timeouts and transient upstream failures propagate unchanged and leave the record as is.
	pub async fn ensure_fresh_access_token(&self, company: &CompanyId) -> Result<TokenSecret> {
		obs::observe(KIND, "ensure_fresh_access_token", Some(company), async move {
			let record = self.fresh_record(company, RefreshTrigger::Expired).await?;

			Ok(record.access_token)
		})
		.await
	}

	/// Refreshes `company`'s token regardless of its expiry.
	pub async fn refresh_now(&self, company: &CompanyId) -> Result<RefreshedToken> {
		obs::observe(KIND, "refresh_now", Some(company), async move {
			let record = self.fresh_record(company, RefreshTrigger::Always).await?;

			Ok(RefreshedToken { company_id: record.company_id, expires_at: record.expires_at })
		})
		.await
	}

	/// Replaces an access token the resource API refused, unless a concurrent request already
	/// did so.
	pub(crate) async fn replace_rejected_access_token(
		&self,
		company: &CompanyId,
		rejected: &TokenSecret,
	) -> Result<TokenSecret> {
		obs::observe(KIND, "replace_rejected_access_token", Some(company), async move {
			self.fresh_record(company, RefreshTrigger::Rejected(rejected.clone()))
				.await
				.map(|record| record.access_token)
		})
		.await
	}

	async fn fresh_record(
		&self,
		company: &CompanyId,
		trigger: RefreshTrigger,
	) -> Result<TokenRecord> {
		self.refresh_metrics.record_attempt();

		let result = self.fresh_record_guarded(company, trigger).await;

		match &result {
			Ok(_) => self.refresh_metrics.record_success(),
			Err(_) => self.refresh_metrics.record_failure(),
		}

		result
	}

	async fn fresh_record_guarded(
		&self,
		company: &CompanyId,
		trigger: RefreshTrigger,
	) -> Result<TokenRecord> {
		let guard = self.company_guard(company);
		let _singleflight = guard.lock().await;
		let current = self
			.store
			.find_by_company_id(company)
			.await?
			.ok_or_else(|| Error::NotConnected { company: company.clone() })?;
		let due = match &trigger {
			RefreshTrigger::Expired => current.is_expired_at(self.now()),
			RefreshTrigger::Always => true,
			RefreshTrigger::Rejected(access_token) => current.access_token == *access_token,
		};

		if !due {
			return Ok(current);
		}
		if self.refresh_was_rejected(company, &current.refresh_token) {
			return Err(Error::ReauthorizationRequired {
				company: company.clone(),
				reason: "the stored refresh token was already rejected".into(),
			});
		}

		self.refresh_metrics.record_upstream_call();
		obs::flow_event!(debug, company = %company, "Refreshing access token.");

		let response = match self.client.refresh_access_token(&current.refresh_token).await {
			Ok(response) => response,
			Err(Error::UpstreamAuth { reason, .. }) => {
				self.mark_refresh_rejected(company, &current.refresh_token);
				obs::flow_event!(
					warn,
					company = %company,
					"Refresh token rejected; re-authorization required."
				);

				return Err(Error::ReauthorizationRequired { company: company.clone(), reason });
			},
			Err(e) => {
				obs::flow_event!(warn, company = %company, error = %e, "Token refresh failed.");

				return Err(e);
			},
		};
		let update = response.into_update(
			company.clone(),
			self.now(),
			Some(current.refresh_token.clone()),
		)?;

		match self.store.compare_and_swap_refresh(&current.refresh_token, update).await? {
			CompareAndSwapOutcome::Updated => {
				obs::flow_event!(info, company = %company, "Access token refreshed.");

				self.stored_record(company).await
			},
			CompareAndSwapOutcome::RefreshMismatch => {
				obs::flow_event!(
					debug,
					company = %company,
					"Concurrent refresh already rotated the token; using the stored record."
				);

				self.stored_record(company).await
			},
			CompareAndSwapOutcome::Missing => Err(Error::NotConnected { company: company.clone() }),
		}
	}

	async fn stored_record(&self, company: &CompanyId) -> Result<TokenRecord> {
		self.store
			.find_by_company_id(company)
			.await?
			.ok_or_else(|| Error::NotConnected { company: company.clone() })
	}
}
