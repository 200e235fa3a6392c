//! Trend cache behavior: idempotence, incremental correctness, persistence

use history_store::cache::*;
use history_store::storage::*;
use serde_json::json;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

const BASE_MILLIS: i64 = 819_170_640_000;

fn report(second: i64, count: i64) -> Report {
    Report::new()
        .field("date", json!(BASE_MILLIS + second * 1000))
        .field("status", json!({"sessionCount": count}))
}

async fn setup(counts: &[(i64, i64)]) -> (TempDir, Arc<ReportStore>) {
    let dir = tempdir().unwrap();
    let history = HistoryStore::new(StoreConfig::new(dir.path()).mode(RunMode::Test)).unwrap();
    let store = Arc::new(history.report("MyServer").unwrap());
    for &(second, count) in counts {
        store.put(report(second, count)).await.unwrap();
    }
    (dir, store)
}

async fn from_scratch(store: &ReportStore, query: &dyn Query) -> Vec<TrendPoint> {
    query.from_store(store, None).await.unwrap()
}

fn sessions() -> Arc<Timeserie> {
    Arc::new(Timeserie::new("status.sessionCount").unwrap().with_id("sessions"))
}

#[tokio::test]
async fn test_memory_cache_is_idempotent() {
    let (_dir, store) = setup(&[(0, 100), (10, 150)]).await;
    let mut cache = store.cache(sessions(), None);

    let first = cache.compute_trends().await.unwrap();
    assert!(first.changed);
    assert_eq!(first.trends.len(), 2);

    let second = cache.compute_trends().await.unwrap();
    assert!(!second.changed);
    assert!(Arc::ptr_eq(&first.trends, &second.trends));
}

#[tokio::test]
async fn test_memory_cache_appends_new_reports() {
    let (_dir, store) = setup(&[(0, 100), (10, 150)]).await;
    let query = sessions();
    let mut cache = store.cache(query.clone(), None);
    let before = cache.compute_trends().await.unwrap();

    store.put(report(20, 170)).await.unwrap();
    store.put(report(30, 120)).await.unwrap();

    let after = cache.compute_trends().await.unwrap();
    assert!(after.changed);
    assert!(!Arc::ptr_eq(&before.trends, &after.trends));
    assert_eq!(*after.trends, from_scratch(&store, query.as_ref()).await);
    assert_eq!(after.trends.len(), 4);
}

#[tokio::test]
async fn test_rate_incremental_matches_from_scratch() {
    let (_dir, store) = setup(&[(0, 100), (10, 150)]).await;
    let query = Arc::new(Rate::new("status.sessionCount").unwrap());
    let mut cache = store.cache(query.clone(), None);
    cache.compute_trends().await.unwrap();

    // Rates of the new points depend on the boundary report
    store.put(report(30, 130)).await.unwrap();
    store.put(report(40, 230)).await.unwrap();

    let update = cache.compute_trends().await.unwrap();
    let expected = from_scratch(&store, query.as_ref()).await;
    assert_eq!(*update.trends, expected);

    let rates: Vec<_> = update.trends.iter().map(|p| p.get("sessionCount").cloned().unwrap()).collect();
    assert_eq!(rates, vec![json!(null), json!(5.0), json!(-1.0), json!(10.0)]);
}

#[tokio::test]
async fn test_backdated_report_is_spliced_in() {
    let (_dir, store) = setup(&[(0, 100), (20, 200), (30, 300)]).await;
    let query = sessions();
    let mut cache = store.cache(query.clone(), None);
    cache.compute_trends().await.unwrap();

    store.put(report(10, 150)).await.unwrap();

    let update = cache.compute_trends().await.unwrap();
    assert!(update.changed);
    assert_eq!(*update.trends, from_scratch(&store, query.as_ref()).await);
    assert_eq!(update.trends[1].get("sessionCount"), Some(&json!(150)));
}

#[tokio::test]
async fn test_removed_report_is_dropped() {
    let (_dir, store) = setup(&[(0, 100), (10, 150), (20, 200)]).await;
    let query = sessions();
    let mut cache = store.cache(query.clone(), None);
    cache.compute_trends().await.unwrap();

    let view = store.catalog(None).await.unwrap();
    std::fs::remove_file(&view.entries()[2].location).unwrap();
    store.mark_dirty();

    let update = cache.compute_trends().await.unwrap();
    assert!(update.changed);
    assert_eq!(update.trends.len(), 2);
    assert_eq!(*update.trends, from_scratch(&store, query.as_ref()).await);
}

#[tokio::test]
async fn test_seeded_cache_skips_recompute() {
    let (_dir, store) = setup(&[(0, 100), (10, 150)]).await;
    let query = sessions();
    let seed = from_scratch(&store, query.as_ref()).await;

    let mut cache = store.cache(query, Some(seed.clone()));
    let update = cache.compute_trends().await.unwrap();
    assert!(!update.changed);
    assert_eq!(*update.trends, seed);
}

#[tokio::test]
async fn test_empty_store() {
    let (_dir, store) = setup(&[]).await;
    let mut cache = store.cache(sessions(), None);

    let update = cache.compute_trends().await.unwrap();
    assert!(update.trends.is_empty());
    let again = cache.compute_trends().await.unwrap();
    assert!(!again.changed);
}

#[tokio::test]
async fn test_fs_cache_persists_and_is_idempotent() {
    let (_dir, store) = setup(&[(0, 100), (10, 150)]).await;
    let mut cache = store.fs_cache(sessions()).unwrap();
    assert_eq!(cache.cache_file(), store.trends_dir().join("sessions.json"));

    let first = cache.compute_trends().await.unwrap();
    assert!(first.changed);
    let modified = std::fs::metadata(cache.cache_file()).unwrap().modified().unwrap();

    let second = cache.compute_trends().await.unwrap();
    assert!(!second.changed);
    assert!(Arc::ptr_eq(&first.trends, &second.trends));
    assert_eq!(
        std::fs::metadata(cache.cache_file()).unwrap().modified().unwrap(),
        modified
    );

    let persisted: Vec<TrendPoint> =
        serde_json::from_slice(&std::fs::read(cache.cache_file()).unwrap()).unwrap();
    assert_eq!(persisted, *second.trends);
}

#[tokio::test]
async fn test_fs_cache_resumes_from_disk() {
    let (_dir, store) = setup(&[(0, 100), (10, 150)]).await;
    let query = sessions();

    let mut cache = store.fs_cache(query.clone()).unwrap();
    cache.compute_trends().await.unwrap();
    drop(cache);

    // A fresh cache loads the file and finds nothing new
    let mut reopened = store.fs_cache(query.clone()).unwrap();
    let update = reopened.compute_trends().await.unwrap();
    assert!(!update.changed);
    assert_eq!(update.trends.len(), 2);

    store.put(report(20, 170)).await.unwrap();
    let update = reopened.compute_trends().await.unwrap();
    assert!(update.changed);
    assert_eq!(*update.trends, from_scratch(&store, query.as_ref()).await);

    let persisted: Vec<TrendPoint> =
        serde_json::from_slice(&std::fs::read(reopened.cache_file()).unwrap()).unwrap();
    assert_eq!(persisted.len(), 3);
}

#[tokio::test]
async fn test_trends_directory_is_not_a_report() {
    let (_dir, store) = setup(&[(0, 100)]).await;
    let mut cache = store.fs_cache(Arc::new(Timeserie::new("status.sessionCount").unwrap())).unwrap();
    cache.compute_trends().await.unwrap();
    assert!(store.trends_dir().join(ANONYMOUS_QUERY).with_extension("json").is_file());

    store.mark_dirty();
    assert_eq!(store.get().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_trend_cache_trait_object() {
    let (_dir, store) = setup(&[(0, 100)]).await;
    let caches: Vec<Box<dyn TrendCache>> = vec![
        Box::new(store.cache(sessions(), None)),
        Box::new(store.fs_cache(sessions()).unwrap()),
    ];

    for mut cache in caches {
        let update = cache.compute_trends().await.unwrap();
        assert_eq!(update.trends.len(), 1);
    }
}

#[tokio::test]
async fn test_cache_files_are_isolated_per_subject() {
    let dir = tempdir().unwrap();
    let history = HistoryStore::new(StoreConfig::new(dir.path()).mode(RunMode::Test)).unwrap();
    let a = Arc::new(history.report("A").unwrap());
    let b = Arc::new(history.report("B").unwrap());

    for (second, count) in [(0, 100), (10, 150)] {
        a.put(report(second, count)).await.unwrap();
    }
    b.put(report(100, 7)).await.unwrap();

    // Same query id under both subjects
    let mut cache_b = b.fs_cache(sessions()).unwrap();
    cache_b.compute_trends().await.unwrap();
    let file_b = b.trends_dir().join("sessions.json");
    let modified_b = std::fs::metadata(&file_b).unwrap().modified().unwrap();
    let before_b = std::fs::read(&file_b).unwrap();

    let mut cache_a = a.fs_cache(sessions()).unwrap();
    assert_ne!(cache_a.cache_file(), cache_b.cache_file());
    let update = cache_a.compute_trends().await.unwrap();
    a.put(report(20, 170)).await.unwrap();
    cache_a.compute_trends().await.unwrap();

    assert_eq!(std::fs::read(&file_b).unwrap(), before_b);
    assert_eq!(std::fs::metadata(&file_b).unwrap().modified().unwrap(), modified_b);

    let dates = |path: &std::path::Path| -> Vec<i64> {
        let points: Vec<TrendPoint> = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        points.iter().map(|p| p.date.timestamp_millis()).collect()
    };
    assert_eq!(
        dates(cache_a.cache_file()),
        vec![BASE_MILLIS, BASE_MILLIS + 10_000, BASE_MILLIS + 20_000]
    );
    assert_eq!(dates(&file_b), vec![BASE_MILLIS + 100_000]);
    assert_eq!(update.trends.len(), 2);
}
