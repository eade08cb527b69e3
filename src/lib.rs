pub mod adapter;
pub mod error;
pub mod exec;
pub mod factory;
pub mod kv_adapter;
pub mod memory;
pub mod model;
pub mod object_adapter;
pub mod schema;
pub mod sql;
pub mod store;

pub use adapter::{AdapterExt, Batch, DatabaseAdapter};
pub use error::StoreError;
pub use factory::{create_adapter, AdapterKind};
pub use kv_adapter::KeyValueAdapter;
pub use model::{ResultSet, Row, Rows, Value};
pub use object_adapter::ObjectStoreAdapter;
pub use schema::{Schema, TableSpec};
