//! Durable backends behind the adapters.
//!
//! [`BlobStorage`] offers whole-value reads and writes by string key, the
//! shape of a generic async key-value store. [`ObjectStorage`] offers native
//! per-key records grouped in named collections, the shape of an object
//! store. Both have sled implementations; every write is flushed before the
//! call returns.

use crate::error::{Result, StoreError};
use async_trait::async_trait;
use sled::Batch;
use std::path::Path;
use tracing::debug;

#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn write(&self, key: &str, value: Vec<u8>) -> Result<()>;

    async fn remove_many(&self, keys: &[String]) -> Result<()>;

    async fn flush(&self) -> Result<()>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Every record of `collection`, in key order.
    async fn load_all(&self, collection: &str) -> Result<Vec<(String, Vec<u8>)>>;

    async fn put_many(&self, collection: &str, entries: Vec<(String, Vec<u8>)>) -> Result<()>;

    async fn delete_many(&self, collection: &str, keys: &[String]) -> Result<()>;

    async fn clear(&self, collection: &str) -> Result<()>;

    async fn flush(&self) -> Result<()>;
}

pub fn open_db(path: impl AsRef<Path>) -> Result<sled::Db> {
    Ok(sled::open(path)?)
}

/// Whole values in a single `snapshots` tree.
#[derive(Clone)]
pub struct SledBlobStorage {
    tree: sled::Tree,
}

impl SledBlobStorage {
    pub fn open(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree("snapshots")?,
        })
    }
}

#[async_trait]
impl BlobStorage for SledBlobStorage {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    async fn write(&self, key: &str, value: Vec<u8>) -> Result<()> {
        debug!(key, bytes = value.len(), "blob write");
        self.tree.insert(key.as_bytes(), value)?;
        self.tree.flush()?;
        Ok(())
    }

    async fn remove_many(&self, keys: &[String]) -> Result<()> {
        let mut batch = Batch::default();
        for key in keys {
            batch.remove(key.as_bytes());
        }
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }
}

/// One sled tree per collection, keyed by the record key's bytes.
#[derive(Clone)]
pub struct SledObjectStorage {
    db: sled::Db,
}

impl SledObjectStorage {
    pub fn new(db: sled::Db) -> Self {
        Self { db }
    }

    fn collection(&self, name: &str) -> Result<sled::Tree> {
        Ok(self.db.open_tree(Self::tree_name(name))?)
    }

    fn tree_name(collection: &str) -> Vec<u8> {
        let mut k = Vec::with_capacity(8 + collection.len());
        k.extend_from_slice(b"objects/");
        k.extend_from_slice(collection.as_bytes());
        k
    }
}

#[async_trait]
impl ObjectStorage for SledObjectStorage {
    async fn load_all(&self, collection: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let tree = self.collection(collection)?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (k, v) = item?;
            let key = String::from_utf8(k.to_vec())
                .map_err(|_| StoreError::Invalid(format!("non-utf8 key in {collection}")))?;
            out.push((key, v.to_vec()));
        }
        Ok(out)
    }

    async fn put_many(&self, collection: &str, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let tree = self.collection(collection)?;
        let mut batch = Batch::default();
        for (key, value) in entries {
            batch.insert(key.as_bytes(), value);
        }
        tree.apply_batch(batch)?;
        tree.flush()?;
        Ok(())
    }

    async fn delete_many(&self, collection: &str, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let tree = self.collection(collection)?;
        let mut batch = Batch::default();
        for key in keys {
            batch.remove(key.as_bytes());
        }
        tree.apply_batch(batch)?;
        tree.flush()?;
        Ok(())
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        let tree = self.collection(collection)?;
        tree.clear()?;
        tree.flush()?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
