use crate::wallet::{AddressRecord, AddressStatus};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Error types for the address record store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Address index {0} already exists")]
	DuplicateIndex(u64),

	#[error("Inconsistent store: {0}")]
	Inconsistent(String),
}

/// Repository for derived address records.
///
/// Every query returns records ordered by ascending index.
#[async_trait::async_trait]
pub trait AddressRepository: Send + Sync {
	async fn find_by_index(&self, index: u64) -> Result<Option<AddressRecord>, StoreError>;
	/// Records with `index >= floor`.
	async fn find_from_index(&self, floor: u64) -> Result<Vec<AddressRecord>, StoreError>;
	async fn find_all(&self) -> Result<Vec<AddressRecord>, StoreError>;
	/// The record with the highest index.
	async fn find_last(&self) -> Result<Option<AddressRecord>, StoreError>;
	/// Records in status `New` with `index >= floor`.
	async fn find_new_from(&self, floor: u64) -> Result<Vec<AddressRecord>, StoreError>;
	async fn find_with_nonzero_balance(&self) -> Result<Vec<AddressRecord>, StoreError>;
	async fn insert(&self, record: AddressRecord) -> Result<(), StoreError>;
	/// Returns the number of updated records (0 or 1).
	async fn update_balance_and_status(
		&self,
		index: u64,
		balance: u64,
		status: AddressStatus,
	) -> Result<usize, StoreError>;
	async fn update_balance(&self, index: u64, balance: u64) -> Result<usize, StoreError>;
	async fn update_status(&self, index: u64, status: AddressStatus) -> Result<usize, StoreError>;
}

/// Index-ordered record table shared by the repository implementations.
#[derive(Debug, Default, Clone)]
struct RecordTable(BTreeMap<u64, AddressRecord>);

impl RecordTable {
	fn select(&self, filter: impl Fn(&AddressRecord) -> bool) -> Vec<AddressRecord> {
		self.0.values().filter(|r| filter(r)).cloned().collect()
	}

	fn get(&self, index: u64) -> Option<AddressRecord> {
		self.0.get(&index).cloned()
	}

	fn last(&self) -> Option<AddressRecord> {
		self.0.values().next_back().cloned()
	}

	fn from_index(&self, floor: u64) -> Vec<AddressRecord> {
		self.0.range(floor..).map(|(_, r)| r.clone()).collect()
	}

	fn insert(&mut self, record: AddressRecord) -> Result<(), StoreError> {
		if self.0.contains_key(&record.index) {
			return Err(StoreError::DuplicateIndex(record.index));
		}
		self.0.insert(record.index, record);
		Ok(())
	}

	fn update(&mut self, index: u64, apply: impl FnOnce(&mut AddressRecord)) -> usize {
		match self.0.get_mut(&index) {
			Some(record) => {
				apply(record);
				1
			}
			None => 0,
		}
	}
}

/// In-memory implementation of AddressRepository
#[derive(Default)]
pub struct InMemoryAddressRepository {
	records: Mutex<RecordTable>,
}

impl InMemoryAddressRepository {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_records(records: impl IntoIterator<Item = AddressRecord>) -> Self {
		let table = records.into_iter().map(|r| (r.index, r)).collect();
		Self {
			records: Mutex::new(RecordTable(table)),
		}
	}
}

#[async_trait::async_trait]
impl AddressRepository for InMemoryAddressRepository {
	async fn find_by_index(&self, index: u64) -> Result<Option<AddressRecord>, StoreError> {
		Ok(self.records.lock().await.get(index))
	}

	async fn find_from_index(&self, floor: u64) -> Result<Vec<AddressRecord>, StoreError> {
		Ok(self.records.lock().await.from_index(floor))
	}

	async fn find_all(&self) -> Result<Vec<AddressRecord>, StoreError> {
		Ok(self.records.lock().await.select(|_| true))
	}

	async fn find_last(&self) -> Result<Option<AddressRecord>, StoreError> {
		Ok(self.records.lock().await.last())
	}

	async fn find_new_from(&self, floor: u64) -> Result<Vec<AddressRecord>, StoreError> {
		Ok(self
			.records
			.lock()
			.await
			.select(|r| r.status == AddressStatus::New && r.index >= floor))
	}

	async fn find_with_nonzero_balance(&self) -> Result<Vec<AddressRecord>, StoreError> {
		Ok(self.records.lock().await.select(|r| r.balance != 0))
	}

	async fn insert(&self, record: AddressRecord) -> Result<(), StoreError> {
		self.records.lock().await.insert(record)
	}

	async fn update_balance_and_status(
		&self,
		index: u64,
		balance: u64,
		status: AddressStatus,
	) -> Result<usize, StoreError> {
		Ok(self.records.lock().await.update(index, |r| {
			r.balance = balance;
			r.status = status;
		}))
	}

	async fn update_balance(&self, index: u64, balance: u64) -> Result<usize, StoreError> {
		Ok(self
			.records
			.lock()
			.await
			.update(index, |r| r.balance = balance))
	}

	async fn update_status(&self, index: u64, status: AddressStatus) -> Result<usize, StoreError> {
		Ok(self.records.lock().await.update(index, |r| r.status = status))
	}
}

/// On-disk layout of the address store
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreDocument {
	updated_at: String,
	records: Vec<AddressRecord>,
}

/// File-based implementation of AddressRepository.
///
/// The whole table is loaded on open and written through after every mutation. Writes go
/// to a temporary file that is then renamed over the store, so a crash leaves either the
/// old or the new document in place.
pub struct FileAddressRepository {
	path: PathBuf,
	records: Mutex<RecordTable>,
}

impl FileAddressRepository {
	/// Opens the store at `path`, starting empty if the file does not exist.
	pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
		let path = path.as_ref().to_path_buf();

		let table = match tokio::fs::read_to_string(&path).await {
			Ok(content) => {
				let document: StoreDocument = serde_json::from_str(&content)?;
				let mut table = RecordTable::default();
				for record in document.records {
					table.insert(record)?;
				}
				info!(
					"Loaded {} address records from {:?} (written {})",
					table.0.len(),
					path,
					document.updated_at
				);
				table
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				info!("No address store at {:?}, starting empty", path);
				RecordTable::default()
			}
			Err(e) => return Err(StoreError::Io(e)),
		};

		Ok(Self {
			path,
			records: Mutex::new(table),
		})
	}

	async fn persist(&self, table: &RecordTable) -> Result<(), StoreError> {
		let document = StoreDocument {
			updated_at: chrono::Utc::now().to_rfc3339(),
			records: table.0.values().cloned().collect(),
		};
		let content = serde_json::to_string_pretty(&document)?;

		let tmp_path = self.path.with_extension("tmp");
		tokio::fs::write(&tmp_path, content).await?;
		tokio::fs::rename(&tmp_path, &self.path).await?;

		debug!("Wrote {} address records to {:?}", table.0.len(), self.path);
		Ok(())
	}

	async fn mutate(
		&self,
		apply: impl FnOnce(&mut RecordTable) -> Result<usize, StoreError>,
	) -> Result<usize, StoreError> {
		let mut table = self.records.lock().await;
		let mut staged = table.clone();
		let changed = apply(&mut staged)?;
		if changed > 0 {
			self.persist(&staged).await?;
			*table = staged;
		}
		Ok(changed)
	}
}

#[async_trait::async_trait]
impl AddressRepository for FileAddressRepository {
	async fn find_by_index(&self, index: u64) -> Result<Option<AddressRecord>, StoreError> {
		Ok(self.records.lock().await.get(index))
	}

	async fn find_from_index(&self, floor: u64) -> Result<Vec<AddressRecord>, StoreError> {
		Ok(self.records.lock().await.from_index(floor))
	}

	async fn find_all(&self) -> Result<Vec<AddressRecord>, StoreError> {
		Ok(self.records.lock().await.select(|_| true))
	}

	async fn find_last(&self) -> Result<Option<AddressRecord>, StoreError> {
		Ok(self.records.lock().await.last())
	}

	async fn find_new_from(&self, floor: u64) -> Result<Vec<AddressRecord>, StoreError> {
		Ok(self
			.records
			.lock()
			.await
			.select(|r| r.status == AddressStatus::New && r.index >= floor))
	}

	async fn find_with_nonzero_balance(&self) -> Result<Vec<AddressRecord>, StoreError> {
		Ok(self.records.lock().await.select(|r| r.balance != 0))
	}

	async fn insert(&self, record: AddressRecord) -> Result<(), StoreError> {
		self.mutate(|table| table.insert(record).map(|_| 1))
			.await
			.map(|_| ())
	}

	async fn update_balance_and_status(
		&self,
		index: u64,
		balance: u64,
		status: AddressStatus,
	) -> Result<usize, StoreError> {
		self.mutate(|table| {
			Ok(table.update(index, |r| {
				r.balance = balance;
				r.status = status;
			}))
		})
		.await
	}

	async fn update_balance(&self, index: u64, balance: u64) -> Result<usize, StoreError> {
		self.mutate(|table| Ok(table.update(index, |r| r.balance = balance)))
			.await
	}

	async fn update_status(&self, index: u64, status: AddressStatus) -> Result<usize, StoreError> {
		self.mutate(|table| Ok(table.update(index, |r| r.status = status)))
			.await
	}
}
