//! Contacts proxy: reads the tenant's contacts with a freshly validated access token.

// self
use crate::{
	_prelude::*,
	auth::{CompanyId, TokenSecret},
	flows::TokenLifecycleManager,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind},
};

/// Envelope key holding the contacts array in Xero responses.
pub const CONTACTS_COLLECTION: &str = "Contacts";
/// Message accompanying a finished contacts sync.
pub const SYNC_COMPLETED_MESSAGE: &str = "Customer sync completed successfully";

/// One Xero contact.
///
/// The commonly used fields are typed; everything else is kept verbatim in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contact {
	/// Xero contact identifier.
	#[serde(rename = "ContactID")]
	pub contact_id: String,
	/// Display name.
	#[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Given name of the primary person.
	#[serde(rename = "FirstName", default, skip_serializing_if = "Option::is_none")]
	pub first_name: Option<String>,
	/// Family name of the primary person.
	#[serde(rename = "LastName", default, skip_serializing_if = "Option::is_none")]
	pub last_name: Option<String>,
	/// Primary email address.
	#[serde(rename = "EmailAddress", default, skip_serializing_if = "Option::is_none")]
	pub email_address: Option<String>,
	/// `ACTIVE`, `ARCHIVED`, or `GDPRREQUEST`.
	#[serde(rename = "ContactStatus", default, skip_serializing_if = "Option::is_none")]
	pub contact_status: Option<String>,
	/// Remaining upstream fields.
	#[serde(flatten)]
	pub extra: BTreeMap<String, serde_json::Value>,
}

/// Result of [`TokenLifecycleManager::fetch_contacts`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactsPage {
	/// Contacts in upstream order.
	pub contacts: Vec<Contact>,
	/// `contacts.len()`.
	pub total_count: usize,
	/// Company the contacts belong to.
	pub company_id: CompanyId,
	/// When the read completed.
	#[serde(with = "time::serde::rfc3339")]
	pub fetched_at: OffsetDateTime,
}

/// Counters reported by a contacts sync.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResults {
	/// Contacts read from Xero.
	pub total_fetched: usize,
	/// Contacts created locally.
	pub new_contacts: usize,
	/// Contacts updated locally.
	pub updated_contacts: usize,
	/// Per-contact failures.
	pub errors: Vec<String>,
}

/// Result of [`TokenLifecycleManager::sync_contacts`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
	/// Sync counters.
	pub sync_results: SyncResults,
	/// Synced company.
	pub company_id: CompanyId,
	/// When the sync completed.
	#[serde(with = "time::serde::rfc3339")]
	pub synced_at: OffsetDateTime,
}

impl<C, M> TokenLifecycleManager<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Fetches every contact of `company`.
	///
	/// When the API answers 401 for a token the store still considers valid, the token is
	/// refreshed once and the read retried once.
	pub async fn fetch_contacts(&self, company: &CompanyId) -> Result<ContactsPage> {
		obs::observe(FlowKind::ResourceFetch, "fetch_contacts", Some(company), async move {
			let contacts = self.read_contacts(company).await?;

			Ok(ContactsPage {
				total_count: contacts.len(),
				contacts,
				company_id: company.clone(),
				fetched_at: self.now(),
			})
		})
		.await
	}

	/// Reads the contacts and reports how many were seen.
	///
	/// Nothing is persisted locally, so `new_contacts` and `updated_contacts` stay zero.
	pub async fn sync_contacts(&self, company: &CompanyId) -> Result<SyncReport> {
		obs::observe(FlowKind::ResourceFetch, "sync_contacts", Some(company), async move {
			let contacts = self.read_contacts(company).await?;

			obs::flow_event!(
				info,
				company = %company,
				processed = contacts.len(),
				"Contacts sync completed."
			);

			Ok(SyncReport {
				sync_results: SyncResults { total_fetched: contacts.len(), ..Default::default() },
				company_id: company.clone(),
				synced_at: self.now(),
			})
		})
		.await
	}

	async fn read_contacts(&self, company: &CompanyId) -> Result<Vec<Contact>> {
		let access_token = self.ensure_fresh_access_token(company).await?;

		match self.request_contacts(company, &access_token).await {
			Err(Error::UpstreamApi { status: Some(401), .. }) => {
				obs::flow_event!(
					debug,
					company = %company,
					"Contacts API refused the access token; refreshing once."
				);

				let access_token =
					self.replace_rejected_access_token(company, &access_token).await?;

				self.request_contacts(company, &access_token).await
			},
			result => result,
		}
	}

	async fn request_contacts(
		&self,
		company: &CompanyId,
		access_token: &TokenSecret,
	) -> Result<Vec<Contact>> {
		let client = self.client();

		client
			.fetch_resource(access_token, company, client.contacts_url(), CONTACTS_COLLECTION)
			.await
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn contacts_keep_unknown_fields() {
		let contact: Contact = serde_json::from_str(
			"{\"ContactID\":\"c-1\",\"Name\":\"Acme\",\"IsCustomer\":true,\"Phones\":[]}",
		)
		.expect("Contact payload should deserialize.");

		assert_eq!(contact.contact_id, "c-1");
		assert_eq!(contact.name.as_deref(), Some("Acme"));
		assert!(contact.email_address.is_none());
		assert_eq!(contact.extra.get("IsCustomer"), Some(&serde_json::Value::Bool(true)));

		let encoded = serde_json::to_value(&contact).expect("Contact should serialize.");

		assert_eq!(encoded["Phones"], serde_json::json!([]));
		assert!(encoded.get("EmailAddress").is_none());
	}

	#[test]
	fn sync_report_uses_camel_case() {
		let report = SyncReport {
			sync_results: SyncResults { total_fetched: 3, ..Default::default() },
			company_id: CompanyId::new("co1").expect("Company fixture should be valid."),
			synced_at: OffsetDateTime::UNIX_EPOCH,
		};
		let encoded = serde_json::to_value(&report).expect("Sync report should serialize.");

		assert_eq!(
			encoded,
			serde_json::json!({
				"syncResults": {
					"totalFetched": 3,
					"newContacts": 0,
					"updatedContacts": 0,
					"errors": [],
				},
				"companyId": "co1",
				"syncedAt": "1970-01-01T00:00:00Z",
			})
		);
	}
}
