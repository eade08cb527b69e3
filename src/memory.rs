use crate::model::Row;
use crate::schema::Schema;
use std::collections::BTreeMap;

/// Rows of one table keyed by the string form of their primary key.
#[derive(Debug, Clone, Default)]
pub struct TableStore {
    primary_key: String,
    rows: BTreeMap<String, Row>,
}

impl TableStore {
    pub fn new(primary_key: impl Into<String>) -> Self {
        Self {
            primary_key: primary_key.into(),
            rows: BTreeMap::new(),
        }
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Key a row would be stored under, or `None` when its key column is
    /// missing or null.
    pub fn key_of(&self, row: &Row) -> Option<String> {
        row.get(&self.primary_key)
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.rows.contains_key(key)
    }

    /// Replaces any row already stored at `key`; never merges.
    pub fn upsert(&mut self, key: String, row: Row) -> Option<Row> {
        self.rows.insert(key, row)
    }

    pub fn remove(&mut self, key: &str) -> Option<Row> {
        self.rows.remove(key)
    }

    /// Empties the table and returns how many rows it held.
    pub fn clear(&mut self) -> usize {
        let n = self.rows.len();
        self.rows.clear();
        n
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Row)> {
        self.rows.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Row)> {
        self.rows.iter_mut()
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }
}

/// Every application table of one adapter, held in memory.
#[derive(Debug, Clone)]
pub struct KvStore {
    schema: Schema,
    tables: BTreeMap<String, TableStore>,
}

impl KvStore {
    /// One empty table per schema entry.
    pub fn new(schema: Schema) -> Self {
        let tables = schema
            .tables()
            .iter()
            .map(|t| (t.name.clone(), TableStore::new(t.primary_key.clone())))
            .collect();
        Self { schema, tables }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn table(&self, name: &str) -> Option<&TableStore> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut TableStore> {
        self.tables.get_mut(name)
    }

    pub fn clear_all(&mut self) {
        for table in self.tables.values_mut() {
            table.clear();
        }
    }
}
