use gleaner_core::fields::{Field, FieldSet};
use gleaner_core::models::Record;
use gleaner_core::traits::{RecordStore, TargetStore};
use gleaner_db::{Database, DatabaseConfig};

use crate::integration::common::{fields, run_date, setup_test_db};

#[tokio::test]
async fn upsert_and_read_back_a_record() {
    let db = setup_test_db().await;
    let repo = db.record_repo();
    let date = run_date("20240105");

    let written = repo
        .upsert_batch(&[Record::new(date, "7203", fields("first"))])
        .await
        .unwrap();
    assert_eq!(written, 1);

    let record = repo.get(date, "7203").await.unwrap().expect("record stored");
    assert_eq!(record.key, "7203");
    assert_eq!(record.run_date, date);
    assert_eq!(record.fields.get(Field::ReturnRate), "first-return_rate");
    assert_eq!(record.fields, fields("first"));
}

#[tokio::test]
async fn second_upsert_replaces_the_row() {
    let db = setup_test_db().await;
    let repo = db.record_repo();
    let date = run_date("20240105");

    repo.upsert_batch(&[Record::new(date, "7203", fields("old"))])
        .await
        .unwrap();
    let newer = FieldSet::new().with(Field::Rating, "A").with(Field::Sales, "3.1%");
    repo.upsert_batch(&[Record::new(date, "7203", newer.clone())])
        .await
        .unwrap();

    assert_eq!(repo.count(date).await.unwrap(), 1);
    let record = repo.get(date, "7203").await.unwrap().unwrap();
    assert_eq!(record.fields, newer);
    assert_eq!(record.fields.get(Field::Technical), "");
}

#[tokio::test]
async fn large_batch_spans_several_statements() {
    let db = setup_test_db().await;
    let repo = db.record_repo();
    let date = run_date("20240105");

    let records: Vec<Record> = (0..250)
        .map(|i| Record::new(date, format!("{:04}", 1000 + i), fields(&i.to_string())))
        .collect();
    assert_eq!(repo.upsert_batch(&records).await.unwrap(), 250);
    assert_eq!(repo.count(date).await.unwrap(), 250);

    let record = repo.get(date, "1249").await.unwrap().unwrap();
    assert_eq!(record.fields.get(Field::Forex), "249-forex");
}

#[tokio::test]
async fn records_are_partitioned_by_run_date() {
    let db = setup_test_db().await;
    let repo = db.record_repo();
    let (jan, feb) = (run_date("20240105"), run_date("20240202"));

    repo.upsert_batch(&[
        Record::new(jan, "7203", fields("jan")),
        Record::new(feb, "7203", fields("feb")),
        Record::new(feb, "6758", fields("feb")),
    ])
    .await
    .unwrap();

    assert_eq!(repo.count(jan).await.unwrap(), 1);
    assert_eq!(repo.count(feb).await.unwrap(), 2);
    assert_eq!(
        db.target_repo().recorded_keys(feb).await.unwrap(),
        vec!["6758", "7203"]
    );
    assert!(repo.get(jan, "6758").await.unwrap().is_none());
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let db = setup_test_db().await;
    assert_eq!(db.record_repo().upsert_batch(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn file_database_is_created_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("market_data.db");
    let config = DatabaseConfig::new(format!("sqlite://{}", path.display()));
    let date = run_date("20240105");

    {
        let db = Database::connect(&config).await.unwrap();
        db.migrate().await.unwrap();
        db.record_repo()
            .upsert_batch(&[Record::new(date, "9984", fields("disk"))])
            .await
            .unwrap();

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await;
    }
    assert!(path.exists());

    let reopened = Database::connect(&config).await.unwrap();
    reopened.migrate().await.unwrap();
    let record = reopened.record_repo().get(date, "9984").await.unwrap().unwrap();
    assert_eq!(record.fields.get(Field::Cheap), "disk-cheap");
}
