mod common;

use portable_sql::store::{open_db, BlobStorage, ObjectStorage, SledBlobStorage, SledObjectStorage};
use portable_sql::{AdapterExt, AdapterKind, StoreError, Value};

#[tokio::test]
async fn verify_round_trip_and_upsert() -> anyhow::Result<()> {
    for kind in common::BACKENDS {
        let db = common::temp_db()?;
        let adapter = common::connected(kind, &db).await?;

        // Idempotent schema statements are accepted and do nothing.
        adapter
            .execute_sql(
                "CREATE TABLE IF NOT EXISTS patients (id TEXT PRIMARY KEY, name TEXT, age INTEGER)",
                &[],
            )
            .await?;
        adapter
            .execute_sql("CREATE INDEX IF NOT EXISTS idx_name ON patients (name);", &[])
            .await?;

        common::insert_patient(adapter.as_ref(), "p1", "Ada", Some(36)).await?;
        let res = adapter
            .execute_sql("SELECT * FROM patients WHERE id = ?", &["p1".into()])
            .await?;
        assert_eq!(res.rows.len(), 1, "{kind:?}");
        let row = res.rows.item(0).ok_or_else(|| anyhow::anyhow!("no row"))?;
        assert_eq!(common::cell(row, "name")?, &Value::from("Ada"));
        assert_eq!(common::cell(row, "age")?, &Value::Number(36.0));

        // Second insert at the same key replaces the row outright.
        adapter
            .execute_sql(
                "INSERT OR REPLACE INTO patients (id, name) VALUES (?, ?)",
                &["p1".into(), "Ada L.".into()],
            )
            .await?;
        assert_eq!(common::count(adapter.as_ref(), "patients").await?, 1.0);
        let res = adapter
            .execute_sql("SELECT * FROM patients WHERE id = ?", &["p1".into()])
            .await?;
        let row = res.rows.first().ok_or_else(|| anyhow::anyhow!("no row"))?;
        assert_eq!(common::cell(row, "name")?, &Value::from("Ada L."));
        assert!(row.get("age").is_none(), "{kind:?}: upsert must not merge");
    }
    Ok(())
}

#[tokio::test]
async fn verify_update_and_delete() -> anyhow::Result<()> {
    for kind in common::BACKENDS {
        let db = common::temp_db()?;
        let adapter = common::connected(kind, &db).await?;
        common::insert_patient(adapter.as_ref(), "p1", "A", Some(10)).await?;
        common::insert_patient(adapter.as_ref(), "p2", "B", Some(20)).await?;
        common::insert_patient(adapter.as_ref(), "p3", "C", Some(30)).await?;

        let res = adapter
            .execute_sql(
                "UPDATE patients SET name = ? WHERE id = ?",
                &["B2".into(), "p2".into()],
            )
            .await?;
        assert_eq!(res.rows_affected, 1);
        let res = adapter
            .execute_sql("SELECT id, name FROM patients ORDER BY id", &[])
            .await?;
        assert_eq!(common::column_strings(&res, "name"), vec!["A", "B2", "C"]);

        let res = adapter
            .execute_sql("DELETE FROM patients WHERE id = ?", &["p1".into()])
            .await?;
        assert_eq!(res.rows_affected, 1);
        assert_eq!(common::count(adapter.as_ref(), "patients").await?, 2.0);

        let res = adapter
            .execute_sql("DELETE FROM patients WHERE id = ?", &["missing".into()])
            .await?;
        assert_eq!(res.rows_affected, 0);

        let res = adapter.execute_sql("DELETE FROM patients", &[]).await?;
        assert_eq!(res.rows_affected, 2);
        assert_eq!(common::count(adapter.as_ref(), "patients").await?, 0.0);
    }
    Ok(())
}

#[tokio::test]
async fn verify_delete_by_key_leaves_other_rows() -> anyhow::Result<()> {
    for kind in common::BACKENDS {
        let db = common::temp_db()?;
        let adapter = common::connected(kind, &db).await?;
        common::insert_patient(adapter.as_ref(), "p1", "A", None).await?;
        common::insert_patient(adapter.as_ref(), "p2", "B", None).await?;

        let res = adapter
            .execute_sql("DELETE FROM patients WHERE id=?", &["p1".into()])
            .await?;
        assert_eq!(res.rows_affected, 1);
        adapter.close().await?;

        let reopened = common::connected(kind, &db).await?;
        let res = reopened.execute_sql("SELECT * FROM patients", &[]).await?;
        assert_eq!(common::column_strings(&res, "id"), vec!["p2"], "{kind:?}");
    }
    Ok(())
}

#[tokio::test]
async fn verify_durability_across_instances() -> anyhow::Result<()> {
    for kind in common::BACKENDS {
        let db = common::temp_db()?;
        let first = common::connected(kind, &db).await?;
        common::insert_patient(first.as_ref(), "p1", "A", Some(40)).await?;
        common::insert_patient(first.as_ref(), "p2", "B", Some(50)).await?;
        first
            .execute_sql(
                "UPDATE patients SET age = ? WHERE id = ?",
                &[41.into(), "p1".into()],
            )
            .await?;
        first
            .execute_sql(
                "INSERT OR REPLACE INTO db_metadata (key, value) VALUES (?, ?)",
                &["schema_version".into(), 3.into()],
            )
            .await?;
        first.close().await?;

        let second = common::connected(kind, &db).await?;
        let res = second
            .execute_sql("SELECT age FROM patients WHERE id = ?", &["p1".into()])
            .await?;
        assert_eq!(common::column_strings(&res, "age"), vec!["41"], "{kind:?}");
        assert_eq!(common::count(second.as_ref(), "patients").await?, 2.0);

        let res = second
            .execute_sql(
                "SELECT value FROM db_metadata WHERE key = ?",
                &["schema_version".into()],
            )
            .await?;
        assert_eq!(common::column_strings(&res, "value"), vec!["3"]);
    }
    Ok(())
}

#[tokio::test]
async fn verify_durability_across_reopen_from_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("store");
    {
        let db = open_db(&path)?;
        let adapter = common::connected(AdapterKind::ObjectStore, &db).await?;
        common::insert_patient(adapter.as_ref(), "p1", "Persisted", None).await?;
        adapter.close().await?;
    }

    let db = open_db(&path)?;
    let adapter = common::connected(AdapterKind::ObjectStore, &db).await?;
    let res = adapter
        .execute_sql("SELECT name FROM patients WHERE id = ?", &["p1".into()])
        .await?;
    assert_eq!(common::column_strings(&res, "name"), vec!["Persisted"]);
    Ok(())
}

#[tokio::test]
async fn verify_unrecognized_statements_are_absorbed() -> anyhow::Result<()> {
    for kind in common::BACKENDS {
        let db = common::temp_db()?;
        let adapter = common::connected(kind, &db).await?;
        for sql in [
            "DROP TABLE patients",
            "SELECT * FROM patients WHERE id = ? OR name = ?",
            "PRAGMA journal_mode = WAL",
        ] {
            let res = adapter.execute_sql(sql, &["x".into(), "y".into()]).await?;
            assert!(res.rows.is_empty());
            assert_eq!(res.rows_affected, 0);
        }
    }
    Ok(())
}

#[tokio::test]
async fn verify_state_errors() -> anyhow::Result<()> {
    for kind in common::BACKENDS {
        let db = common::temp_db()?;
        let adapter = common::adapter_for(kind, &db)?;
        assert_eq!(adapter.name(), match kind {
            AdapterKind::ObjectStore => "object-store",
            _ => "key-value",
        });

        let err = adapter.execute_sql("SELECT * FROM patients", &[]).await;
        assert!(matches!(err, Err(StoreError::NotConnected(_))), "{kind:?}");

        adapter.connect().await?;
        // Connecting twice is a no-op.
        adapter.connect().await?;
        assert!(adapter.is_connected().await);

        adapter.close().await?;
        let err = adapter.execute_sql("SELECT * FROM patients", &[]).await;
        assert!(matches!(err, Err(StoreError::NotConnected(_))));
        let err = adapter.connect().await;
        assert!(matches!(err, Err(StoreError::Closed(_))));
        let err = adapter.delete_all_data().await;
        assert!(matches!(err, Err(StoreError::NotConnected(_))));
    }
    Ok(())
}

#[tokio::test]
async fn verify_transaction_is_a_batch() -> anyhow::Result<()> {
    for kind in common::BACKENDS {
        let db = common::temp_db()?;
        let adapter = common::connected(kind, &db).await?;

        let inserted = adapter
            .transaction(|tx| async move {
                for id in ["n1", "n2"] {
                    tx.execute_sql(
                        "INSERT OR REPLACE INTO notes (id, patient_id, body) VALUES (?, ?, ?)",
                        &[id.into(), "p1".into(), "encrypted".into()],
                    )
                    .await?;
                }
                Ok::<_, StoreError>(2)
            })
            .await?;
        assert_eq!(inserted, 2);
        assert_eq!(common::count(adapter.as_ref(), "notes").await?, 2.0);

        // No rollback: the first write survives the failure.
        let failed: Result<(), StoreError> = adapter
            .transaction(|tx| async move {
                tx.execute_sql(
                    "INSERT OR REPLACE INTO notes (id, patient_id) VALUES (?, ?)",
                    &["n3".into(), "p1".into()],
                )
                .await?;
                Err(StoreError::Invalid("callback failed".into()))
            })
            .await;
        assert!(failed.is_err());
        assert_eq!(common::count(adapter.as_ref(), "notes").await?, 3.0);

        adapter.close().await?;
        let err = adapter
            .transaction(|_tx| async move { Ok::<_, StoreError>(()) })
            .await;
        assert!(matches!(err, Err(StoreError::NotConnected(_))));
    }
    Ok(())
}

#[tokio::test]
async fn verify_delete_all_data() -> anyhow::Result<()> {
    for kind in common::BACKENDS {
        let db = common::temp_db()?;
        let adapter = common::connected(kind, &db).await?;
        common::insert_patient(adapter.as_ref(), "p1", "A", None).await?;
        adapter
            .execute_sql(
                "INSERT OR REPLACE INTO lab_values (id, name, value) VALUES (?, ?, ?)",
                &["l1".into(), "HbA1c".into(), 6.1.into()],
            )
            .await?;

        adapter.delete_all_data().await?;
        assert_eq!(common::count(adapter.as_ref(), "patients").await?, 0.0);
        assert_eq!(common::count(adapter.as_ref(), "lab_values").await?, 0.0);
        adapter.close().await?;

        let reopened = common::connected(kind, &db).await?;
        assert_eq!(common::count(reopened.as_ref(), "patients").await?, 0.0);
        assert_eq!(common::count(reopened.as_ref(), "lab_values").await?, 0.0);
    }
    Ok(())
}

#[tokio::test]
async fn verify_delete_all_data_before_connect() -> anyhow::Result<()> {
    for kind in common::BACKENDS {
        let db = common::temp_db()?;
        let first = common::connected(kind, &db).await?;
        common::insert_patient(first.as_ref(), "p1", "A", None).await?;
        first.close().await?;

        let second = common::adapter_for(kind, &db)?;
        second.delete_all_data().await?;
        second.connect().await?;
        assert_eq!(common::count(second.as_ref(), "patients").await?, 0.0);
    }
    Ok(())
}

#[tokio::test]
async fn verify_corrupt_snapshot_hydrates_empty() -> anyhow::Result<()> {
    let db = common::temp_db()?;
    let first = common::connected(AdapterKind::KeyValue, &db).await?;
    common::insert_patient(first.as_ref(), "p1", "A", None).await?;
    first
        .execute_sql(
            "INSERT OR REPLACE INTO notes (id, body) VALUES (?, ?)",
            &["n1".into(), "hello".into()],
        )
        .await?;
    first.close().await?;

    let blobs = SledBlobStorage::open(&db)?;
    blobs.write("table:patients", vec![0xff; 3]).await?;

    let second = common::connected(AdapterKind::KeyValue, &db).await?;
    assert_eq!(common::count(second.as_ref(), "patients").await?, 0.0);
    assert_eq!(common::count(second.as_ref(), "notes").await?, 1.0);
    Ok(())
}

#[tokio::test]
async fn verify_corrupt_row_is_skipped() -> anyhow::Result<()> {
    let db = common::temp_db()?;
    let first = common::connected(AdapterKind::ObjectStore, &db).await?;
    common::insert_patient(first.as_ref(), "p1", "A", None).await?;
    first.close().await?;

    let objects = SledObjectStorage::new(db.clone());
    objects
        .put_many("patients", vec![("p2".to_string(), vec![0xff; 3])])
        .await?;

    let second = common::connected(AdapterKind::ObjectStore, &db).await?;
    let res = second.execute_sql("SELECT * FROM patients", &[]).await?;
    assert_eq!(common::column_strings(&res, "id"), vec!["p1"]);
    Ok(())
}

#[tokio::test]
async fn verify_native_backend_is_external() -> anyhow::Result<()> {
    let db = common::temp_db()?;
    let adapter = portable_sql::create_adapter(
        AdapterKind::Native,
        &db,
        portable_sql::Schema::questionnaire(),
    )?;
    assert!(adapter.is_none());
    Ok(())
}
