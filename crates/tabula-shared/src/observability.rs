//! Observability features: structured logging and Prometheus metrics

use metrics::{counter, histogram, Label};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::{LoggingConfig, MetricsConfig, ObservabilityConfig};

/// Global observability system
static OBSERVABILITY: OnceCell<ObservabilitySystem> = OnceCell::new();

/// Process wide logging and metrics setup
pub struct ObservabilitySystem {
    metrics_enabled: bool,
}

impl ObservabilitySystem {
    /// Installs the subscriber and, when enabled, the Prometheus exporter.
    /// The exporter needs a running tokio runtime.
    pub fn init(config: &ObservabilityConfig) -> anyhow::Result<()> {
        let system = Self { metrics_enabled: config.metrics.enabled };

        Self::init_logging(&config.logging)?;

        if config.metrics.enabled {
            Self::init_metrics(&config.metrics)?;
        }

        OBSERVABILITY
            .set(system)
            .map_err(|_| anyhow::anyhow!("Observability system already initialized"))?;

        info!("Observability system initialized");
        Ok(())
    }

    fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
        let env_filter = EnvFilter::builder()
            .with_default_directive(parse_level(&config.level).into())
            .from_env_lossy();

        let registry = tracing_subscriber::registry().with(env_filter);

        match config.format.to_lowercase().as_str() {
            "json" => {
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE);
                registry.with(json_layer).try_init()?;
            }
            _ => {
                let pretty_layer = tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_span_events(FmtSpan::CLOSE);
                registry.with(pretty_layer).try_init()?;
            }
        }

        Ok(())
    }

    fn init_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
        let bind_addr: SocketAddr = config.bind_address.parse()?;
        PrometheusBuilder::new().with_http_listener(bind_addr).install()?;
        info!("Prometheus metrics initialized on {}", bind_addr);
        Ok(())
    }

    pub fn get() -> Option<&'static ObservabilitySystem> {
        OBSERVABILITY.get()
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_enabled
    }
}

/// Unknown names fall back to `info`.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Table request metrics
pub struct TableMetrics;

impl TableMetrics {
    pub fn table_planned(table: &str, joins: usize) {
        counter!("tabula_tables_planned_total", "table" => table.to_string()).increment(1);
        histogram!("tabula_plan_joins", "table" => table.to_string()).record(joins as f64);
    }

    /// `kind` is one of `page`, `count` or `filtered_count`
    pub fn query_executed(table: &str, kind: &str, duration: Duration) {
        counter!("tabula_queries_executed_total",
                "table" => table.to_string(),
                "kind" => kind.to_string())
            .increment(1);
        histogram!("tabula_query_duration_seconds",
                  "table" => table.to_string(),
                  "kind" => kind.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn query_failed(table: &str, error_type: &str) {
        counter!("tabula_queries_failed_total",
                "table" => table.to_string(),
                "error_type" => error_type.to_string())
            .increment(1);
    }

    pub fn page_served(table: &str, records: usize, records_filtered: u64) {
        histogram!("tabula_page_records", "table" => table.to_string()).record(records as f64);
        histogram!("tabula_records_filtered", "table" => table.to_string())
            .record(records_filtered as f64);
    }
}

/// Records the time between creation and `finish` (or drop) into a histogram.
pub struct PerfTimer {
    start: Instant,
    metric_name: String,
    labels: Vec<(String, String)>,
    recorded: bool,
}

impl PerfTimer {
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            metric_name: metric_name.into(),
            labels: Vec::new(),
            recorded: false,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        let duration = self.start.elapsed();
        if !self.recorded {
            self.recorded = true;
            let labels: Vec<Label> = self
                .labels
                .iter()
                .map(|(k, v)| Label::new(k.clone(), v.clone()))
                .collect();
            histogram!(self.metric_name.clone(), labels).record(duration.as_secs_f64());
        }
        duration
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.record();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_perf_timer() {
        let timer = PerfTimer::new("test_metric").with_label("table", "posts");
        assert_eq!(timer.metric_name, "test_metric");
        assert_eq!(timer.labels.len(), 1);
        let elapsed = timer.finish();
        assert!(elapsed >= Duration::ZERO);
    }

    #[test]
    fn metrics_without_recorder_are_noops() {
        TableMetrics::table_planned("posts", 3);
        TableMetrics::query_executed("posts", "page", Duration::from_millis(4));
        TableMetrics::query_failed("posts", "execution");
        TableMetrics::page_served("posts", 10, 42);
    }
}
