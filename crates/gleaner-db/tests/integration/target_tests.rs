use gleaner_core::models::{Record, SelectionMode};
use gleaner_core::source::{JobSource, resolve_run_date};
use gleaner_core::traits::{RecordStore, TargetStore};

use crate::integration::common::{fields, pairs, run_date, setup_test_db, strings};

#[tokio::test]
async fn latest_run_date_is_the_maximum() {
    let db = setup_test_db().await;
    let targets = db.target_repo();
    assert_eq!(targets.latest_run_date().await.unwrap(), None);

    targets
        .save_targets(run_date("20240105"), &pairs(&[("7203", "https://a/7203")]))
        .await
        .unwrap();
    targets
        .save_targets(run_date("20240202"), &pairs(&[("7203", "https://a/7203")]))
        .await
        .unwrap();

    assert_eq!(
        targets.latest_run_date().await.unwrap().as_deref(),
        Some("20240202")
    );
    assert_eq!(
        resolve_run_date(&targets, None).await.unwrap(),
        Some(run_date("20240202"))
    );
}

#[tokio::test]
async fn null_urls_come_back_empty() {
    let db = setup_test_db().await;
    let date = run_date("20240105");

    sqlx::query("INSERT INTO target_urls (run_date, code, url) VALUES (?, ?, NULL)")
        .bind(date.to_string())
        .bind("6758")
        .execute(db.pool())
        .await
        .unwrap();
    db.target_repo()
        .save_targets(date, &pairs(&[("7203", "https://a/7203")]))
        .await
        .unwrap();

    let locations = db.target_repo().target_locations(date).await.unwrap();
    assert_eq!(
        locations,
        pairs(&[("6758", ""), ("7203", "https://a/7203")])
    );
}

#[tokio::test]
async fn population_insert_is_idempotent() {
    let db = setup_test_db().await;
    let targets = db.target_repo();
    let date = run_date("20240105");

    targets.save_population(date, &strings(&["B", "A"])).await.unwrap();
    targets.save_population(date, &strings(&["A", "C"])).await.unwrap();

    assert_eq!(targets.population_keys(date).await.unwrap(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn missing_mode_plans_against_stored_tables() {
    let db = setup_test_db().await;
    let targets = db.target_repo();
    let date = run_date("20240105");

    targets
        .save_targets(
            date,
            &pairs(&[("A", "https://a/A"), ("B", "https://a/B"), ("C", "")]),
        )
        .await
        .unwrap();
    targets.save_population(date, &strings(&["A", "B", "C"])).await.unwrap();
    db.record_repo()
        .upsert_batch(&[Record::new(date, "A", fields("A"))])
        .await
        .unwrap();

    let source = JobSource::new(targets);
    let missing = source.load_targets(date, SelectionMode::Missing).await.unwrap();
    let keys: Vec<&str> = missing.jobs.iter().map(|j| j.key.as_str()).collect();
    assert_eq!(keys, vec!["B"]);
    assert_eq!(missing.unresolved, vec!["C"]);

    let all = source.load_targets(date, SelectionMode::All).await.unwrap();
    let keys: Vec<&str> = all.jobs.iter().map(|j| j.key.as_str()).collect();
    assert_eq!(keys, vec!["A", "B"]);
}
