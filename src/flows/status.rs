//! Read-only status projection and disconnect.

// self
use crate::{
	_prelude::*,
	auth::{CompanyId, TokenSummary},
	flows::TokenLifecycleManager,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind},
};

/// Connection status of one company, computed at read time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
	/// Connected company.
	pub company_id: CompanyId,
	/// `now >= expires_at` at the moment of the read.
	pub is_expired: bool,
	/// Access token expiry.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
	/// When the company first connected.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// The identity server rejected the stored refresh token; only a new authorization helps.
	pub reauthorization_required: bool,
}

impl<C, M> TokenLifecycleManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Lists the status of every connected company, or only `company` when given.
	///
	/// Expiry is evaluated against the clock on every call and never cached.
	pub async fn get_status(&self, company: Option<&CompanyId>) -> Result<Vec<ConnectionStatus>> {
		obs::observe(FlowKind::Status, "get_status", company, async move {
			let summaries: Vec<TokenSummary> = match company {
				Some(company) => self
					.store
					.find_by_company_id(company)
					.await?
					.map(|record| record.summary())
					.into_iter()
					.collect(),
				None => self.store.list_all().await?,
			};
			let now = self.now();

			Ok(summaries
				.into_iter()
				.map(|summary| ConnectionStatus {
					is_expired: summary.is_expired_at(now),
					expires_at: summary.expires_at,
					created_at: summary.created_at,
					reauthorization_required: self.is_marked_rejected(&summary.company_id),
					company_id: summary.company_id,
				})
				.collect())
		})
		.await
	}

	/// Removes `company`'s record, returning whether one existed.
	///
	/// Runs under the company guard, so an in-flight refresh either finishes first or finds
	/// the record gone and reports [`Error::NotConnected`]. The guard is forgotten afterwards.
	pub async fn disconnect(&self, company: &CompanyId) -> Result<bool> {
		obs::observe(FlowKind::Disconnect, "disconnect", Some(company), async move {
			let deleted = {
				let guard = self.company_guard(company);
				let _exclusive = guard.lock().await;
				let deleted = self.store.delete(company).await?;

				self.clear_refresh_rejection(company);

				deleted
			};

			self.release_company_guard(company);

			if deleted {
				obs::flow_event!(info, company = %company, "Company disconnected.");
			}

			Ok(deleted)
		})
		.await
	}
}
