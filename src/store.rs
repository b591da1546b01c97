//! Storage contract and built-in stores keeping one token record per company.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{CompanyId, TokenRecord, TokenSecret, TokenSummary, TokenUpdate},
};

/// Boxed future returned by [`TokenStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

type RecordMap = HashMap<CompanyId, TokenRecord>;

/// Persistence contract for per-company token records.
///
/// Every mutating method must be atomic per company: implementations apply the whole
/// find-and-modify-or-insert step under one lock or transaction, never as a separate read
/// followed by a write.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Fetches the record for `company`, if present.
	fn find_by_company_id<'a>(
		&'a self,
		company: &'a CompanyId,
	) -> StoreFuture<'a, Option<TokenRecord>>;

	/// Inserts a record (`created_at = updated_at = now`) or updates the existing one in place
	/// (keeping `created_at`, bumping `updated_at`).
	fn upsert(&self, update: TokenUpdate) -> StoreFuture<'_, TokenRecord>;

	/// Applies `update` only if the stored refresh token still equals `expected_refresh`.
	///
	/// Never inserts; a missing record yields [`CompareAndSwapOutcome::Missing`].
	fn compare_and_swap_refresh<'a>(
		&'a self,
		expected_refresh: &'a TokenSecret,
		update: TokenUpdate,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Removes the record for `company`, returning whether one existed.
	fn delete<'a>(&'a self, company: &'a CompanyId) -> StoreFuture<'a, bool>;

	/// Lists every record as a secret-free projection, ordered by company.
	fn list_all(&self) -> StoreFuture<'_, Vec<TokenSummary>>;
}

/// Result of a refresh-token compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The refresh secret matched the expected value and the record was updated.
	Updated,
	/// The record exists but the expected refresh secret did not match.
	RefreshMismatch,
	/// No record exists for the company.
	Missing,
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

fn upsert_locked(map: &mut RecordMap, update: TokenUpdate, now: OffsetDateTime) -> TokenRecord {
	match map.get_mut(&update.company_id) {
		Some(existing) => {
			existing.apply(update, now);

			existing.clone()
		},
		None => {
			let record = TokenRecord::from_update(update, now);

			map.insert(record.company_id.clone(), record.clone());

			record
		},
	}
}

fn compare_and_swap_locked(
	map: &mut RecordMap,
	expected_refresh: &TokenSecret,
	update: TokenUpdate,
	now: OffsetDateTime,
) -> CompareAndSwapOutcome {
	match map.get_mut(&update.company_id) {
		Some(existing) if existing.refresh_token == *expected_refresh => {
			existing.apply(update, now);

			CompareAndSwapOutcome::Updated
		},
		Some(_) => CompareAndSwapOutcome::RefreshMismatch,
		None => CompareAndSwapOutcome::Missing,
	}
}

fn summaries(map: &RecordMap) -> Vec<TokenSummary> {
	let mut summaries = map.values().map(TokenRecord::summary).collect::<Vec<_>>();

	summaries.sort_by(|a, b| a.company_id.cmp(&b.company_id));

	summaries
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;
	use crate::auth::ScopeSet;

	fn update(company: &str, refresh: &str) -> TokenUpdate {
		TokenUpdate {
			company_id: CompanyId::new(company).expect("Company fixture should be valid."),
			access_token: TokenSecret::new(format!("access-{refresh}")),
			refresh_token: TokenSecret::new(refresh),
			expires_at: OffsetDateTime::UNIX_EPOCH + Duration::days(20_000),
			token_type: "Bearer".into(),
			scope: ScopeSet::default(),
		}
	}

	#[test]
	fn store_error_converts_into_connector_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("database unreachable"));

		let source = StdError::source(&error)
			.expect("Connector error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn upsert_never_duplicates_a_company() {
		let mut map = RecordMap::new();
		let first = OffsetDateTime::UNIX_EPOCH;
		let second = first + Duration::hours(1);

		upsert_locked(&mut map, update("co1", "r1"), first);

		let record = upsert_locked(&mut map, update("co1", "r2"), second);

		assert_eq!(map.len(), 1);
		assert_eq!(record.created_at, first);
		assert_eq!(record.updated_at, second);
		assert_eq!(record.refresh_token.expose(), "r2");
	}

	#[test]
	fn compare_and_swap_checks_refresh_and_never_inserts() {
		let mut map = RecordMap::new();
		let now = OffsetDateTime::UNIX_EPOCH;

		assert_eq!(
			compare_and_swap_locked(&mut map, &TokenSecret::new("r1"), update("co1", "r2"), now),
			CompareAndSwapOutcome::Missing
		);
		assert!(map.is_empty());

		upsert_locked(&mut map, update("co1", "r1"), now);

		assert_eq!(
			compare_and_swap_locked(&mut map, &TokenSecret::new("stale"), update("co1", "r2"), now),
			CompareAndSwapOutcome::RefreshMismatch
		);
		assert_eq!(
			compare_and_swap_locked(&mut map, &TokenSecret::new("r1"), update("co1", "r2"), now),
			CompareAndSwapOutcome::Updated
		);
		assert_eq!(map["co1"].refresh_token.expose(), "r2");
	}

	#[test]
	fn compare_and_swap_outcome_can_be_serialized() {
		let payload = serde_json::to_string(&CompareAndSwapOutcome::RefreshMismatch)
			.expect("CompareAndSwapOutcome should serialize to JSON.");

		assert_eq!(payload, "\"RefreshMismatch\"");
	}
}
