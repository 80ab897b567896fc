use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use thiserror::Error;
use tracing::{debug, warn};

use super::model::SnippetRecord;

const SNIPPETS: TableDefinition<&str, &[u8]> = TableDefinition::new("snippets");

/// Leading byte of every stored value, ahead of the bincode payload.
const RECORD_V1_MARKER: u8 = 0x01;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snippet id already exists: {0}")]
    DuplicateId(String),
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] redb::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

macro_rules! unavailable_from {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for StoreError {
                fn from(e: $err) -> Self {
                    Self::Unavailable(e.into())
                }
            }
        )*
    };
}

unavailable_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Thread-safe handle to the redb store. Cloning is cheap.
///
/// redb serializes write transactions and gives every read transaction a
/// committed snapshot, so a lookup never observes a half-written record and
/// two racing deletes of the same id remove it exactly once.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        write_txn.open_table(SNIPPETS)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Store a new record under `id`. Ids are never overwritten: an existing
    /// id fails with [`StoreError::DuplicateId`] and leaves the table untouched.
    pub fn insert(&self, id: &str, record: &SnippetRecord) -> Result<()> {
        let bytes = encode(record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SNIPPETS)?;
            let exists = table.get(id)?.is_some();
            if exists {
                return Err(StoreError::DuplicateId(id.to_owned()));
            }
            table.insert(id, bytes.as_slice())?;
        }
        write_txn.commit()?;

        debug!(id = %id, expires_at = record.expires_at, "stored snippet");
        Ok(())
    }

    /// Fetch a record by id. Expiry is not checked here.
    pub fn lookup(&self, id: &str) -> Result<Option<SnippetRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SNIPPETS)?;

        let raw_bytes: Option<Vec<u8>> = table.get(id)?.map(|guard| guard.value().to_vec());
        raw_bytes.map(|bytes| decode(&bytes)).transpose()
    }

    /// Delete a record by id. Returns true if it existed; deleting an absent
    /// id is not an error.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(SNIPPETS)?;
            let existed = table.remove(id)?.is_some();
            existed
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// Remove every record with `expires_at <= now` in a single write
    /// transaction. Returns how many expired records this call actually
    /// removed.
    ///
    /// Rows whose bytes cannot be decoded can never be served, so they are
    /// removed in the same transaction. They are logged but not counted.
    pub fn delete_expired(&self, now: i64) -> Result<usize> {
        let write_txn = self.db.begin_write()?;
        let (removed, purged) = {
            let mut table = write_txn.open_table(SNIPPETS)?;

            let mut expired_ids = Vec::new();
            let mut corrupt_ids = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                match decode(v.value()) {
                    Ok(record) if record.is_expired(now) => expired_ids.push(k.value().to_owned()),
                    Ok(_) => {}
                    Err(e) => {
                        warn!(id = %k.value(), error = %e, "removing undecodable record");
                        corrupt_ids.push(k.value().to_owned());
                    }
                }
            }

            let mut removed = 0usize;
            for id in &expired_ids {
                if table.remove(id.as_str())?.is_some() {
                    removed += 1;
                }
            }
            for id in &corrupt_ids {
                table.remove(id.as_str())?;
            }
            (removed, corrupt_ids.len())
        };
        write_txn.commit()?;

        if purged > 0 {
            warn!(purged, "purged undecodable records");
        }
        Ok(removed)
    }

    /// Write raw value bytes under `id`, bypassing the record encoding.
    #[cfg(test)]
    pub(crate) fn put_raw(&self, id: &str, bytes: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SNIPPETS)?;
            table.insert(id, bytes)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Number of records physically present, including expired ones that
    /// have not been swept yet.
    pub fn len(&self) -> Result<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SNIPPETS)?;
        Ok(table.len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Encode a record as `[RECORD_V1_MARKER] + bincode(record)`.
fn encode(record: &SnippetRecord) -> Result<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(record, bincode::config::standard())
        .map_err(|e| StoreError::Corrupt(format!("bincode encode: {e}")))?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(RECORD_V1_MARKER);
    out.extend_from_slice(&payload);
    Ok(out)
}

fn decode(bytes: &[u8]) -> Result<SnippetRecord> {
    match bytes.split_first() {
        Some((&RECORD_V1_MARKER, payload)) => {
            let (record, _) =
                bincode::serde::decode_from_slice(payload, bincode::config::standard())
                    .map_err(|e| StoreError::Corrupt(format!("bincode decode: {e}")))?;
            Ok(record)
        }
        Some((marker, _)) => Err(StoreError::Corrupt(format!(
            "unknown record format {marker:#04x}"
        ))),
        None => Err(StoreError::Corrupt("empty record".into())),
    }
}
