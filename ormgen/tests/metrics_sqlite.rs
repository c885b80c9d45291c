#![cfg(all(feature = "sqlite", feature = "metrics"))]

mod common;

use common::{Item, setup_db};
use ormgen::metrics::install_prometheus_recorder;
use ormgen::prelude::*;

#[tokio::test]
async fn metrics_are_recorded_for_queries() {
    let handle = install_prometheus_recorder().expect("recorder");
    let db = setup_db(&POSTGRES).await;

    let mut item = Item::new("metric");
    Item::find(&db).create(&mut item).await.expect("create");
    let _ = Item::find(&db)
        .filter("name = ?", ["metric"])
        .all()
        .await
        .expect("all");
    db.record_pool_stats("sqlite");

    metrics::counter!("ormgen.test.counter").increment(1);

    let rendered = handle.render();
    assert!(rendered.contains("ormgen_query_count"));
    assert!(rendered.contains("ormgen_query_duration_ms"));
    assert!(rendered.contains("ormgen_pool_max_size"));
    assert!(rendered.contains("ormgen_test_counter"));
}
