use metrics_exporter_prometheus::PrometheusBuilder;
pub use metrics_exporter_prometheus::PrometheusHandle;
use std::time::Duration;

/// Installs the Prometheus recorder and returns the handle for scraping.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

/// Records one statement's latency and bumps the statement counter.
pub fn record_query_metrics(operation: &str, table: &str, elapsed: Duration) {
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    let labels = [
        ("operation", operation.to_owned()),
        ("table", table.to_owned()),
    ];
    metrics::histogram!("ormgen.query.duration_ms", &labels).record(elapsed_ms);
    metrics::counter!("ormgen.query.count", &labels).increment(1);
}

/// Records pool size gauges for `pool`, labelled with `db`.
pub fn record_pool_stats<DB: sqlx::Database>(pool: &sqlx::Pool<DB>, db: &'static str) {
    metrics::gauge!("ormgen.pool.size", "db" => db).set(f64::from(pool.size()));
    metrics::gauge!("ormgen.pool.idle", "db" => db).set(pool.num_idle() as f64);
    metrics::gauge!("ormgen.pool.max_size", "db" => db)
        .set(f64::from(pool.options().get_max_connections()));
}
