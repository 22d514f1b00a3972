use linesman_core::drift::{DriftSeverity, SchemaDriftDetector, SchemaSnapshot};
use linesman_core::traits::BaselineStore;
use linesman_db::PgBaselineRepository;
use serde_json::json;

use crate::integration::common::setup_test_db;

fn scoreboard() -> serde_json::Value {
    json!({"scoreboard": {"gameDate": "2025-01-15", "games": [{"gameId": "001", "period": 4}]}})
}

#[tokio::test]
async fn save_and_load_baseline() {
    let (pool, _container) = setup_test_db().await;
    let repo = PgBaselineRepository::new(pool);

    assert!(repo.load("nba-cdn", "scoreboard").await.unwrap().is_none());

    let snapshot = SchemaSnapshot::from_payload("nba-cdn", "scoreboard", &scoreboard());
    repo.save(&snapshot).await.unwrap();

    let loaded = repo
        .load("nba-cdn", "scoreboard")
        .await
        .unwrap()
        .expect("baseline should exist");
    assert_eq!(loaded, snapshot);
    assert!(loaded.verify_integrity());
}

#[tokio::test]
async fn save_overwrites_same_key() {
    let (pool, _container) = setup_test_db().await;
    let repo = PgBaselineRepository::new(pool.clone());

    repo.save(&SchemaSnapshot::from_payload("espn", "scoreboard", &json!({"events": []})))
        .await
        .unwrap();
    let mut v2 = SchemaSnapshot::from_payload("espn", "scoreboard", &json!({"events": [], "day": "x"}));
    v2.version = 2;
    repo.save(&v2).await.unwrap();

    let loaded = repo.load("espn", "scoreboard").await.unwrap().unwrap();
    assert_eq!(loaded.version, 2);
    assert_eq!(loaded.hash, v2.hash);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM schema_baselines")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn list_is_ordered_and_delete_reports_existence() {
    let (pool, _container) = setup_test_db().await;
    let repo = PgBaselineRepository::new(pool);

    for (provider, schema) in [("odds-primary", "odds"), ("espn", "scoreboard"), ("nba-cdn", "boxscore"), ("nba-cdn", "scoreboard")] {
        repo.save(&SchemaSnapshot::from_payload(provider, schema, &json!({"id": 1})))
            .await
            .unwrap();
    }

    let keys: Vec<String> = repo
        .list()
        .await
        .unwrap()
        .iter()
        .map(|s| format!("{}/{}", s.provider, s.schema_name))
        .collect();
    assert_eq!(
        keys,
        vec!["espn/scoreboard", "nba-cdn/boxscore", "nba-cdn/scoreboard", "odds-primary/odds"]
    );

    assert!(repo.delete("nba-cdn", "boxscore").await.unwrap());
    assert!(!repo.delete("nba-cdn", "boxscore").await.unwrap());
    assert_eq!(repo.list().await.unwrap().len(), 3);
}

#[tokio::test]
async fn detector_bootstraps_and_detects_against_postgres() {
    let (pool, _container) = setup_test_db().await;
    let detector = SchemaDriftDetector::new(PgBaselineRepository::new(pool));

    let first = detector
        .detect_drift("nba-cdn", "scoreboard", &scoreboard(), "cid-1")
        .await
        .unwrap();
    assert!(first.bootstrapped);
    assert!(!first.detected);

    let mut changed = scoreboard();
    changed["scoreboard"]
        .as_object_mut()
        .unwrap()
        .remove("gameDate");
    let second = detector
        .detect_drift("nba-cdn", "scoreboard", &changed, "cid-2")
        .await
        .unwrap();
    assert!(second.detected);
    assert_eq!(second.severity, DriftSeverity::Critical);
    assert_eq!(second.diff.removed, vec!["scoreboard.gameDate".to_string()]);

    // Drift checks never move the baseline.
    let baseline = detector.get_baseline("nba-cdn", "scoreboard").await.unwrap().unwrap();
    assert_eq!(baseline.version, 1);

    let rebased = detector.rebaseline("nba-cdn", "scoreboard", &changed).await.unwrap();
    assert_eq!(rebased.version, 2);
}
