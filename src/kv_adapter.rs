//! Whole-table snapshots over a [`BlobStorage`].
//!
//! Each table is one blob keyed `table:<name>`. Every write rewrites the
//! affected table in full, which is all a plain key-value backend allows.

use crate::adapter::{SyncedAdapter, WriteThrough};
use crate::error::Result;
use crate::exec::Mutation;
use crate::memory::{KvStore, TableStore};
use crate::model::Row;
use crate::schema::Schema;
use crate::store::BlobStorage;
use async_trait::async_trait;
use tracing::{debug, warn};

pub type KeyValueAdapter<B> = SyncedAdapter<SnapshotSync<B>>;

impl<B: BlobStorage> KeyValueAdapter<B> {
    pub fn with_blob_storage(storage: B, schema: Schema) -> Self {
        SyncedAdapter::new(SnapshotSync::new(storage), schema)
    }
}

pub struct SnapshotSync<B> {
    storage: B,
}

impl<B: BlobStorage> SnapshotSync<B> {
    pub fn new(storage: B) -> Self {
        Self { storage }
    }

    fn snapshot_key(table: &str) -> String {
        format!("table:{table}")
    }

    fn encode(table: &TableStore) -> Result<Vec<u8>> {
        let rows: Vec<&Row> = table.rows().collect();
        Ok(bincode::serialize(&rows)?)
    }
}

#[async_trait]
impl<B: BlobStorage> WriteThrough for SnapshotSync<B> {
    fn name(&self) -> &'static str {
        "key-value"
    }

    async fn hydrate(&self, store: &mut KvStore) -> Result<()> {
        let names: Vec<String> = store.schema().table_names().map(str::to_string).collect();
        for name in names {
            let Some(bytes) = self.storage.read(&Self::snapshot_key(&name)).await? else {
                continue;
            };
            let rows: Vec<Row> = match bincode::deserialize(&bytes) {
                Ok(rows) => rows,
                Err(err) => {
                    // One unreadable table must not block the rest.
                    warn!(table = %name, error = %err, "corrupt snapshot, starting empty");
                    continue;
                }
            };
            let Some(table) = store.table_mut(&name) else {
                continue;
            };
            for row in rows {
                match table.key_of(&row) {
                    Some(key) => {
                        table.upsert(key, row);
                    }
                    None => warn!(table = %name, "snapshot row without primary key dropped"),
                }
            }
            debug!(table = %name, rows = table.len(), "hydrated");
        }
        Ok(())
    }

    async fn persist(&self, store: &KvStore, mutation: &Mutation) -> Result<()> {
        let Some(name) = mutation.table() else {
            return Ok(());
        };
        let Some(table) = store.table(name) else {
            return Ok(());
        };
        let bytes = Self::encode(table)?;
        self.storage.write(&Self::snapshot_key(name), bytes).await
    }

    async fn wipe(&self, schema: &Schema) -> Result<()> {
        let keys: Vec<String> = schema.table_names().map(Self::snapshot_key).collect();
        self.storage.remove_many(&keys).await
    }

    async fn release(&self) -> Result<()> {
        self.storage.flush().await
    }
}
