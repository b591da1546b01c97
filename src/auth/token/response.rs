//! Token endpoint responses and the upsert payload derived from them.

// self
use crate::{
	_prelude::*,
	auth::{CompanyId, ScopeSet, TokenSecret},
	error::ConfigError,
};

/// Normalized token endpoint response shared by code exchange and refresh.
#[derive(Clone, Debug)]
pub struct TokenResponse {
	/// Newly minted access token.
	pub access_token: TokenSecret,
	/// Refresh token, when the server issued (or rotated) one.
	pub refresh_token: Option<TokenSecret>,
	/// Server-declared access token lifetime.
	pub expires_in: Duration,
	/// Credential scheme label.
	pub token_type: String,
	/// Scopes the server reports as granted.
	pub scope: ScopeSet,
}
impl TokenResponse {
	/// Turns the response into an upsert payload with `expires_at = issued_at + expires_in`.
	///
	/// `previous_refresh` is kept when the server did not rotate the refresh token; without
	/// either value the response is rejected. A lifetime that overflows the calendar is rejected
	/// with [`ConfigError::ExpiresInOutOfRange`].
	pub fn into_update(
		self,
		company_id: CompanyId,
		issued_at: OffsetDateTime,
		previous_refresh: Option<TokenSecret>,
	) -> Result<TokenUpdate, ConfigError> {
		let refresh_token =
			self.refresh_token.or(previous_refresh).ok_or(ConfigError::MissingRefreshToken)?;
		let expires_at =
			issued_at.checked_add(self.expires_in).ok_or(ConfigError::ExpiresInOutOfRange)?;

		Ok(TokenUpdate {
			company_id,
			access_token: self.access_token,
			refresh_token,
			expires_at,
			token_type: self.token_type,
			scope: self.scope,
		})
	}
}

/// Mutable token fields written by [`TokenStore::upsert`](crate::store::TokenStore::upsert).
#[derive(Clone, Debug)]
pub struct TokenUpdate {
	/// Record key.
	pub company_id: CompanyId,
	/// Access token to store.
	pub access_token: TokenSecret,
	/// Refresh token to store.
	pub refresh_token: TokenSecret,
	/// Absolute expiry of `access_token`.
	pub expires_at: OffsetDateTime,
	/// Credential scheme label.
	pub token_type: String,
	/// Granted scopes.
	pub scope: ScopeSet,
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn response(refresh: Option<&str>) -> TokenResponse {
		TokenResponse {
			access_token: TokenSecret::new("access"),
			refresh_token: refresh.map(TokenSecret::new),
			expires_in: Duration::seconds(1800),
			token_type: "Bearer".into(),
			scope: ScopeSet::default(),
		}
	}

	#[test]
	fn update_derives_absolute_expiry() {
		let issued = macros::datetime!(2025-03-01 12:00 UTC);
		let company = CompanyId::new("co1").expect("Company fixture should be valid.");
		let update = response(Some("rotated"))
			.into_update(company, issued, Some(TokenSecret::new("previous")))
			.expect("Rotated refresh token should produce an update.");

		assert_eq!(update.expires_at, macros::datetime!(2025-03-01 12:30 UTC));
		assert_eq!(update.refresh_token.expose(), "rotated");
	}

	#[test]
	fn lifetime_past_the_calendar_is_rejected() {
		let company = CompanyId::new("co1").expect("Company fixture should be valid.");
		let response = TokenResponse {
			expires_in: Duration::seconds(9_999_999_999_999),
			..response(Some("rotated"))
		};

		assert!(matches!(
			response.into_update(company, macros::datetime!(2025-03-01 12:00 UTC), None),
			Err(ConfigError::ExpiresInOutOfRange)
		));
	}

	#[test]
	fn update_falls_back_to_previous_refresh_token() {
		let company = CompanyId::new("co1").expect("Company fixture should be valid.");
		let now = OffsetDateTime::now_utc();
		let update = response(None)
			.into_update(company.clone(), now, Some(TokenSecret::new("previous")))
			.expect("Previous refresh token should be reused.");

		assert_eq!(update.refresh_token.expose(), "previous");
		assert!(matches!(
			response(None).into_update(company, now, None),
			Err(ConfigError::MissingRefreshToken)
		));
	}
}
