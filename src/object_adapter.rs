//! Per-row persistence over an [`ObjectStorage`].
//!
//! Each table is a collection of rows keyed by primary key, so a write only
//! touches the records it changed.

use crate::adapter::{SyncedAdapter, WriteThrough};
use crate::error::Result;
use crate::exec::Mutation;
use crate::memory::{KvStore, TableStore};
use crate::model::Row;
use crate::schema::Schema;
use crate::store::ObjectStorage;
use async_trait::async_trait;
use tracing::{debug, warn};

pub type ObjectStoreAdapter<O> = SyncedAdapter<RowSync<O>>;

impl<O: ObjectStorage> ObjectStoreAdapter<O> {
    pub fn with_object_storage(storage: O, schema: Schema) -> Self {
        SyncedAdapter::new(RowSync::new(storage), schema)
    }
}

pub struct RowSync<O> {
    storage: O,
}

impl<O: ObjectStorage> RowSync<O> {
    pub fn new(storage: O) -> Self {
        Self { storage }
    }

    fn encode_rows(table: &TableStore, keys: &[String]) -> Result<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(row) = table.get(key) {
                out.push((key.clone(), bincode::serialize(row)?));
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl<O: ObjectStorage> WriteThrough for RowSync<O> {
    fn name(&self) -> &'static str {
        "object-store"
    }

    async fn hydrate(&self, store: &mut KvStore) -> Result<()> {
        let names: Vec<String> = store.schema().table_names().map(str::to_string).collect();
        for name in names {
            let records = self.storage.load_all(&name).await?;
            let Some(table) = store.table_mut(&name) else {
                continue;
            };
            for (key, bytes) in records {
                match bincode::deserialize::<Row>(&bytes) {
                    Ok(row) => {
                        table.upsert(key, row);
                    }
                    Err(err) => warn!(table = %name, key = %key, error = %err, "corrupt row skipped"),
                }
            }
            debug!(table = %name, rows = table.len(), "hydrated");
        }
        Ok(())
    }

    async fn persist(&self, store: &KvStore, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::None => Ok(()),
            Mutation::Upserted { table, key } => {
                let Some(t) = store.table(table) else {
                    return Ok(());
                };
                let entries = Self::encode_rows(t, std::slice::from_ref(key))?;
                self.storage.put_many(table, entries).await
            }
            Mutation::Rewritten { table, keys } => {
                let Some(t) = store.table(table) else {
                    return Ok(());
                };
                let entries = Self::encode_rows(t, keys)?;
                self.storage.put_many(table, entries).await
            }
            Mutation::Removed { table, keys } => self.storage.delete_many(table, keys).await,
            Mutation::Cleared { table } => self.storage.clear(table).await,
        }
    }

    async fn wipe(&self, schema: &Schema) -> Result<()> {
        for name in schema.table_names() {
            self.storage.clear(name).await?;
        }
        Ok(())
    }

    async fn release(&self) -> Result<()> {
        self.storage.flush().await
    }
}
