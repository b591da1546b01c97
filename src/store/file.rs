//! JSON-file-backed [`TokenStore`] for single-process deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{CompanyId, TokenRecord, TokenSecret, TokenSummary, TokenUpdate},
	clock::{Clock, SystemClock},
	store::{self, CompareAndSwapOutcome, RecordMap, StoreError, StoreFuture, TokenStore},
};

/// Persists every record to a JSON file after each mutation.
///
/// The file holds a plain array of records; a company may appear at most once.
#[derive(Clone)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<RecordMap>>,
	clock: Arc<dyn Clock>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)), clock: Arc::new(SystemClock) })
	}

	/// Replaces the clock used to stamp `created_at`/`updated_at`.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<RecordMap, StoreError> {
		if !path.exists() {
			return Ok(RecordMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(RecordMap::new());
		}

		let entries: Vec<TokenRecord> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;
		let mut map = RecordMap::with_capacity(entries.len());

		for record in entries {
			let company = record.company_id.clone();

			if map.insert(company.clone(), record).is_some() {
				return Err(StoreError::Serialization {
					message: format!("Duplicate record for company {company} in {}", path.display()),
				});
			}
		}

		Ok(map)
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, contents: &RecordMap) -> Result<(), StoreError> {
		let mut snapshot = contents.values().collect::<Vec<_>>();

		snapshot.sort_by(|a, b| a.company_id.cmp(&b.company_id));

		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let tmp_path = self.path.with_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl Debug for FileStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FileStore")
			.field("path", &self.path)
			.field("records", &self.inner.read().len())
			.finish()
	}
}
impl TokenStore for FileStore {
	fn find_by_company_id<'a>(
		&'a self,
		company: &'a CompanyId,
	) -> StoreFuture<'a, Option<TokenRecord>> {
		Box::pin(async move { Ok(self.inner.read().get(company).cloned()) })
	}

	fn upsert(&self, update: TokenUpdate) -> StoreFuture<'_, TokenRecord> {
		Box::pin(async move {
			let now = self.clock.now();
			let mut guard = self.inner.write();
			let previous = guard.get(&update.company_id).cloned();
			let record = store::upsert_locked(&mut guard, update, now);

			if let Err(e) = self.persist_locked(&guard) {
				// Keep memory and disk in agreement when the write fails.
				match previous {
					Some(previous) => guard.insert(previous.company_id.clone(), previous),
					None => guard.remove(&record.company_id),
				};

				return Err(e);
			}

			Ok(record)
		})
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		expected_refresh: &'a TokenSecret,
		update: TokenUpdate,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move {
			let now = self.clock.now();
			let mut guard = self.inner.write();
			let previous = guard.get(&update.company_id).cloned();
			let outcome = store::compare_and_swap_locked(&mut guard, expected_refresh, update, now);

			if outcome != CompareAndSwapOutcome::Updated {
				return Ok(outcome);
			}
			if let Err(e) = self.persist_locked(&guard) {
				if let Some(previous) = previous {
					guard.insert(previous.company_id.clone(), previous);
				}

				return Err(e);
			}

			Ok(outcome)
		})
	}

	fn delete<'a>(&'a self, company: &'a CompanyId) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let Some(removed) = guard.remove(company) else {
				return Ok(false);
			};

			if let Err(e) = self.persist_locked(&guard) {
				guard.insert(removed.company_id.clone(), removed);

				return Err(e);
			}

			Ok(true)
		})
	}

	fn list_all(&self) -> StoreFuture<'_, Vec<TokenSummary>> {
		Box::pin(async move { Ok(store::summaries(&self.inner.read())) })
	}
}
