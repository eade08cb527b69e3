//! The adapter contract shared by every storage backend, and the
//! connection state machine both in-memory adapters run on.
//!
//! An adapter hydrates a [`KvStore`] from its durable backend on
//! [`DatabaseAdapter::connect`], runs each statement through the recognizer
//! and executor, then hands the resulting [`Mutation`] to its
//! [`WriteThrough`] strategy before returning. Calls on one instance are
//! serialized by an internal async mutex.

use crate::error::{Result, StoreError};
use crate::exec::{self, Execution, Mutation};
use crate::memory::KvStore;
use crate::model::{ResultSet, Value};
use crate::schema::Schema;
use crate::sql;
use async_trait::async_trait;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Load durable state. A no-op once connected; fails after `close()`.
    async fn connect(&self) -> Result<()>;

    /// Run one statement. Unrecognized statements yield an empty result.
    async fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<ResultSet>;

    async fn is_connected(&self) -> bool;

    /// Release in-memory state. The instance cannot be reconnected.
    async fn close(&self) -> Result<()>;

    /// Clear every application table, in memory and durably.
    async fn delete_all_data(&self) -> Result<()>;
}

/// Statement handle given to [`AdapterExt::transaction`] callbacks.
///
/// This is a batch, not a transaction: each statement is persisted as it
/// runs and nothing is rolled back if a later one fails.
pub struct Batch<'a, A: ?Sized> {
    adapter: &'a A,
}

impl<A: ?Sized> Clone for Batch<'_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: ?Sized> Copy for Batch<'_, A> {}

impl<A: DatabaseAdapter + ?Sized> Batch<'_, A> {
    pub async fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        self.adapter.execute_sql(sql, params).await
    }
}

pub trait AdapterExt: DatabaseAdapter {
    /// Run `f` with a [`Batch`] bound to this adapter. Partial mutations
    /// from a failing callback stay in place.
    fn transaction<'a, T, F, Fut>(&'a self, f: F) -> impl Future<Output = Result<T>> + Send + 'a
    where
        F: FnOnce(Batch<'a, Self>) -> Fut + Send + 'a,
        Fut: Future<Output = Result<T>> + Send + 'a,
        T: Send + 'a;
}

impl<A: DatabaseAdapter + ?Sized> AdapterExt for A {
    fn transaction<'a, T, F, Fut>(&'a self, f: F) -> impl Future<Output = Result<T>> + Send + 'a
    where
        F: FnOnce(Batch<'a, Self>) -> Fut + Send + 'a,
        Fut: Future<Output = Result<T>> + Send + 'a,
        T: Send + 'a,
    {
        async move {
            if !self.is_connected().await {
                return Err(StoreError::NotConnected(self.name().to_string()));
            }
            f(Batch { adapter: self }).await
        }
    }
}

/// How an adapter keeps its durable backend in step with memory.
#[async_trait]
pub trait WriteThrough: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fill `store` from durable storage. Tables with nothing stored stay
    /// empty.
    async fn hydrate(&self, store: &mut KvStore) -> Result<()>;

    /// Persist `mutation`, already applied to `store`.
    async fn persist(&self, store: &KvStore, mutation: &Mutation) -> Result<()>;

    /// Durably remove every table in `schema`.
    async fn wipe(&self, schema: &Schema) -> Result<()>;

    async fn release(&self) -> Result<()>;
}

enum State {
    Unconnected,
    Connected(KvStore),
    Closed,
}

/// An in-memory store kept durable by a [`WriteThrough`] strategy.
pub struct SyncedAdapter<W> {
    schema: Schema,
    sync: W,
    state: Mutex<State>,
}

impl<W: WriteThrough> SyncedAdapter<W> {
    pub fn new(sync: W, schema: Schema) -> Self {
        Self {
            schema,
            sync,
            state: Mutex::new(State::Unconnected),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn not_connected(&self) -> StoreError {
        StoreError::NotConnected(self.sync.name().to_string())
    }
}

#[async_trait]
impl<W: WriteThrough> DatabaseAdapter for SyncedAdapter<W> {
    fn name(&self) -> &str {
        self.sync.name()
    }

    async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            State::Connected(_) => return Ok(()),
            State::Closed => return Err(StoreError::Closed(self.name().to_string())),
            State::Unconnected => {}
        }
        let mut store = KvStore::new(self.schema.clone());
        self.sync.hydrate(&mut store).await?;
        let rows: usize = self
            .schema
            .table_names()
            .filter_map(|t| store.table(t))
            .map(|t| t.len())
            .sum();
        info!(adapter = self.name(), rows, "connected");
        *state = State::Connected(store);
        Ok(())
    }

    async fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        let mut state = self.state.lock().await;
        let State::Connected(store) = &mut *state else {
            return Err(self.not_connected());
        };
        let Some(stmt) = sql::parse(sql) else {
            warn!(adapter = self.name(), sql, "statement not recognized");
            return Ok(ResultSet::empty());
        };
        let Execution { result, mutation } = exec::execute(store, &stmt, params);
        if mutation != Mutation::None {
            self.sync.persist(store, &mutation).await?;
        }
        debug!(
            adapter = self.name(),
            kind = stmt.kind(),
            rows = result.rows.len(),
            affected = result.rows_affected,
            "statement done"
        );
        Ok(result)
    }

    async fn is_connected(&self) -> bool {
        matches!(*self.state.lock().await, State::Connected(_))
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let State::Connected(_) = *state {
            self.sync.release().await?;
            info!(adapter = self.name(), "closed");
        }
        *state = State::Closed;
        Ok(())
    }

    async fn delete_all_data(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let State::Closed = *state {
            return Err(self.not_connected());
        }
        self.sync.wipe(&self.schema).await?;
        if let State::Connected(store) = &mut *state {
            store.clear_all();
        }
        info!(adapter = self.name(), "all data deleted");
        Ok(())
    }
}
