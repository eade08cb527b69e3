use crate::adapter::DatabaseAdapter;
use crate::error::Result;
use crate::kv_adapter::KeyValueAdapter;
use crate::object_adapter::ObjectStoreAdapter;
use crate::schema::Schema;
use crate::store::{SledBlobStorage, SledObjectStorage};
use clap::ValueEnum;
use tracing::info;

/// Which backend a platform offers. Probing the host is left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AdapterKind {
    /// Per-key records; rows are persisted individually.
    ObjectStore,
    /// Whole-value storage; tables are persisted as snapshots.
    KeyValue,
    /// A relational engine provided outside this crate.
    Native,
}

/// Build the adapter for `kind` over `db`. Returns `None` for
/// [`AdapterKind::Native`], which callers supply themselves.
pub fn create_adapter(
    kind: AdapterKind,
    db: &sled::Db,
    schema: Schema,
) -> Result<Option<Box<dyn DatabaseAdapter>>> {
    let adapter: Box<dyn DatabaseAdapter> = match kind {
        AdapterKind::ObjectStore => Box::new(ObjectStoreAdapter::with_object_storage(
            SledObjectStorage::new(db.clone()),
            schema,
        )),
        AdapterKind::KeyValue => Box::new(KeyValueAdapter::with_blob_storage(
            SledBlobStorage::open(db)?,
            schema,
        )),
        AdapterKind::Native => {
            info!("native backend selected; no in-crate adapter");
            return Ok(None);
        }
    };
    Ok(Some(adapter))
}
