use std::sync::Arc;

/// One application table and the column its rows are keyed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub primary_key: String,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
        }
    }
}

/// The closed set of tables an adapter hydrates and persists. Fixed at
/// construction and shared read-only between the adapter and its store.
#[derive(Debug, Clone)]
pub struct Schema {
    tables: Arc<[TableSpec]>,
}

pub const METADATA_TABLE: &str = "db_metadata";

impl Schema {
    pub fn new(tables: impl IntoIterator<Item = TableSpec>) -> Self {
        let mut out: Vec<TableSpec> = Vec::new();
        for spec in tables {
            // Later duplicates would be unreachable; keep the first.
            if !out.iter().any(|t| t.name == spec.name) {
                out.push(spec);
            }
        }
        Self { tables: out.into() }
    }

    /// The questionnaire application's tables. Everything is keyed by `id`
    /// except the metadata table, which is keyed by `key`.
    pub fn questionnaire() -> Self {
        Self::new([
            TableSpec::new("patients", "id"),
            TableSpec::new("questionnaires", "id"),
            TableSpec::new("responses", "id"),
            TableSpec::new("notes", "id"),
            TableSpec::new("lab_values", "id"),
            TableSpec::new("sync_queue", "id"),
            TableSpec::new(METADATA_TABLE, "key"),
        ])
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::questionnaire()
    }
}
