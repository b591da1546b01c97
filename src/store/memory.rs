//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{CompanyId, TokenRecord, TokenSecret, TokenSummary, TokenUpdate},
	clock::{Clock, SystemClock},
	store::{self, CompareAndSwapOutcome, RecordMap, StoreError, StoreFuture, TokenStore},
};

/// Storage backend that keeps records in-process for tests and demos.
///
/// Clones share the same map.
#[derive(Clone)]
pub struct MemoryStore {
	records: Arc<RwLock<RecordMap>>,
	clock: Arc<dyn Clock>,
}
impl MemoryStore {
	/// Creates an empty store stamping records with the provided clock.
	pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
		Self { records: Default::default(), clock }
	}

	/// Number of stored records.
	pub fn len(&self) -> usize {
		self.records.read().len()
	}

	/// Returns `true` when no company is connected.
	pub fn is_empty(&self) -> bool {
		self.records.read().is_empty()
	}
}
impl Default for MemoryStore {
	fn default() -> Self {
		Self::with_clock(Arc::new(SystemClock))
	}
}
impl Debug for MemoryStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryStore").field("records", &self.len()).finish()
	}
}
impl TokenStore for MemoryStore {
	fn find_by_company_id<'a>(
		&'a self,
		company: &'a CompanyId,
	) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { Ok(self.records.read().get(company).cloned()) })
	}

	fn upsert(&self, update: TokenUpdate) -> StoreFuture<'_, TokenRecord> {
		Box::pin(async move {
			let now = self.clock.now();

			Ok(store::upsert_locked(&mut self.records.write(), update, now))
		})
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		expected_refresh: &'a TokenSecret,
		update: TokenUpdate,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move {
			let now = self.clock.now();

			Ok(store::compare_and_swap_locked(
				&mut self.records.write(),
				expected_refresh,
				update,
				now,
			))
		})
	}

	fn delete<'a>(&'a self, company: &'a CompanyId) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(self.records.write().remove(company).is_some()) })
	}

	fn list_all(&self) -> StoreFuture<'_, Vec<TokenSummary>> {
		Box::pin(async move { Ok::<_, StoreError>(store::summaries(&self.records.read())) })
	}
}
