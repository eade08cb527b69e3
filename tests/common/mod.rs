#![allow(dead_code)]

use portable_sql::{create_adapter, AdapterKind, DatabaseAdapter, ResultSet, Row, Schema, Value};

pub const BACKENDS: [AdapterKind; 2] = [AdapterKind::ObjectStore, AdapterKind::KeyValue];

pub fn temp_db() -> anyhow::Result<sled::Db> {
    Ok(sled::Config::new().temporary(true).open()?)
}

pub fn adapter_for(kind: AdapterKind, db: &sled::Db) -> anyhow::Result<Box<dyn DatabaseAdapter>> {
    create_adapter(kind, db, Schema::questionnaire())?
        .ok_or_else(|| anyhow::anyhow!("no in-crate adapter for {kind:?}"))
}

pub async fn connected(
    kind: AdapterKind,
    db: &sled::Db,
) -> anyhow::Result<Box<dyn DatabaseAdapter>> {
    let adapter = adapter_for(kind, db)?;
    adapter.connect().await?;
    Ok(adapter)
}

pub async fn insert_patient(
    adapter: &dyn DatabaseAdapter,
    id: &str,
    name: &str,
    age: Option<i64>,
) -> anyhow::Result<()> {
    let res = adapter
        .execute_sql(
            "INSERT OR REPLACE INTO patients (id, name, age) VALUES (?, ?, ?)",
            &[id.into(), name.into(), age.into()],
        )
        .await?;
    anyhow::ensure!(res.rows_affected == 1, "insert of {id} affected {}", res.rows_affected);
    Ok(())
}

pub fn cell<'r>(row: &'r Row, column: &str) -> anyhow::Result<&'r Value> {
    row.get(column)
        .ok_or_else(|| anyhow::anyhow!("missing column {column}"))
}

/// String form of `column` for every row, in result order.
pub fn column_strings(result: &ResultSet, column: &str) -> Vec<String> {
    result
        .rows
        .iter()
        .map(|r| r.get(column).map(|v| v.to_string()).unwrap_or_default())
        .collect()
}

pub async fn count(adapter: &dyn DatabaseAdapter, table: &str) -> anyhow::Result<f64> {
    let res = adapter
        .execute_sql(&format!("SELECT COUNT(*) AS n FROM {table}"), &[])
        .await?;
    let row = res
        .rows
        .first()
        .ok_or_else(|| anyhow::anyhow!("COUNT returned no row"))?;
    cell(row, "n")?
        .as_f64()
        .ok_or_else(|| anyhow::anyhow!("COUNT is not a number"))
}
