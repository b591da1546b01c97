//! Persisted per-company token records and their secret-free projection.

// self
use crate::{
	_prelude::*,
	auth::{CompanyId, ScopeSet, TokenSecret, TokenUpdate},
};

/// Credential scheme Xero issues when `token_type` is omitted.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// The single token record a store keeps for one company.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
	/// Unique key of the record.
	pub company_id: CompanyId,
	/// Short-lived bearer credential.
	pub access_token: TokenSecret,
	/// Long-lived credential used to mint new access tokens.
	pub refresh_token: TokenSecret,
	/// Absolute instant after which `access_token` must not be used.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
	/// Credential scheme label.
	pub token_type: String,
	/// Granted scopes.
	pub scope: ScopeSet,
	/// Set by the store on insert.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// Set by the store on every insert or update.
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl TokenRecord {
	/// Builds a fresh record from an upsert payload; both timestamps are set to `now`.
	pub fn from_update(update: TokenUpdate, now: OffsetDateTime) -> Self {
		Self {
			company_id: update.company_id,
			access_token: update.access_token,
			refresh_token: update.refresh_token,
			expires_at: update.expires_at,
			token_type: update.token_type,
			scope: update.scope,
			created_at: now,
			updated_at: now,
		}
	}

	/// Applies an upsert payload in place, keeping `created_at`.
	pub fn apply(&mut self, update: TokenUpdate, now: OffsetDateTime) {
		self.access_token = update.access_token;
		self.refresh_token = update.refresh_token;
		self.expires_at = update.expires_at;
		self.token_type = update.token_type;
		self.scope = update.scope;
		self.updated_at = now;
	}

	/// `true` once `instant` reaches `expires_at`; the expiry instant itself counts as expired.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Secret-free projection used by listings.
	pub fn summary(&self) -> TokenSummary {
		TokenSummary {
			company_id: self.company_id.clone(),
			expires_at: self.expires_at,
			token_type: self.token_type.clone(),
			scope: self.scope.clone(),
			created_at: self.created_at,
			updated_at: self.updated_at,
		}
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("company_id", &self.company_id)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.field("token_type", &self.token_type)
			.field("scope", &self.scope)
			.field("created_at", &self.created_at)
			.field("updated_at", &self.updated_at)
			.finish()
	}
}

/// Token record projection without any credential material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSummary {
	/// Company the record belongs to.
	pub company_id: CompanyId,
	/// Access token expiry.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
	/// Credential scheme label.
	pub token_type: String,
	/// Granted scopes.
	pub scope: ScopeSet,
	/// Insert instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// Last update instant.
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl TokenSummary {
	/// Same expiry rule as [`TokenRecord::is_expired_at`].
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}
}
