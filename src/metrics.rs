//! Prometheus metrics and tracing spans for store traffic and rebuild runs.
//!
//! Metrics are collected through OpenTelemetry and exported into a private
//! Prometheus registry; [`SalonMetrics::render`] produces the text format for
//! a scrape endpoint owned by the embedding application.

#[cfg(feature = "metrics")]
pub use self::prom::{SalonMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prom {
    use std::time::Duration;

    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Registry, TextEncoder};

    pub static METRICS: Lazy<SalonMetrics> = Lazy::new(SalonMetrics::init);

    pub struct SalonMetrics {
        registry: Registry,
        _provider: SdkMeterProvider,
        pub batch_commits_total: Counter<u64>,
        pub batch_commit_failures_total: Counter<u64>,
        pub batch_ops_total: Counter<u64>,
        pub batch_commit_duration: Histogram<f64>,
        pub statements_total: Counter<u64>,
        pub statement_errors_total: Counter<u64>,
        pub statement_duration: Histogram<f64>,
        pub rebuild_runs_total: Counter<u64>,
        pub rebuild_appointments_total: Counter<u64>,
    }

    impl SalonMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let provider = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => SdkMeterProvider::builder().with_reader(exporter).build(),
                Err(e) => {
                    log::warn!("prometheus exporter unavailable, metrics will not be exported: {e}");
                    SdkMeterProvider::builder().build()
                }
            };
            let meter = provider.meter("salonbook");

            Self {
                batch_commits_total: meter
                    .u64_counter("salonbook_batch_commits_total")
                    .with_description("Write batches committed")
                    .build(),
                batch_commit_failures_total: meter
                    .u64_counter("salonbook_batch_commit_failures_total")
                    .with_description("Write batches the store rejected")
                    .build(),
                batch_ops_total: meter
                    .u64_counter("salonbook_batch_operations_total")
                    .with_description("Document operations applied through batches")
                    .build(),
                batch_commit_duration: meter
                    .f64_histogram("salonbook_batch_commit_duration_seconds")
                    .with_description("Time spent committing one batch")
                    .build(),
                statements_total: meter
                    .u64_counter("salonbook_pg_statements_total")
                    .with_description("Postgres statements executed")
                    .build(),
                statement_errors_total: meter
                    .u64_counter("salonbook_pg_statement_errors_total")
                    .with_description("Postgres statements that failed")
                    .build(),
                statement_duration: meter
                    .f64_histogram("salonbook_pg_statement_duration_seconds")
                    .with_description("Duration of Postgres statements")
                    .build(),
                rebuild_runs_total: meter
                    .u64_counter("salonbook_rebuild_runs_total")
                    .with_description("Appointment index rebuilds completed")
                    .build(),
                rebuild_appointments_total: meter
                    .u64_counter("salonbook_rebuild_appointments_total")
                    .with_description("Appointment documents written or removed by rebuilds")
                    .build(),
                registry,
                _provider: provider,
            }
        }

        pub fn record_commit(&self, ops: usize, elapsed: Duration) {
            self.batch_commits_total.add(1, &[]);
            self.batch_ops_total.add(ops as u64, &[]);
            self.batch_commit_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_commit_failure(&self) {
            self.batch_commit_failures_total.add(1, &[]);
        }

        pub fn record_statement(&self, elapsed: Duration) {
            self.statements_total.add(1, &[]);
            self.statement_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_statement_error(&self) {
            self.statement_errors_total.add(1, &[]);
        }

        pub fn record_rebuild(&self, upserted: usize, deleted: usize) {
            self.rebuild_runs_total.add(1, &[]);
            self.rebuild_appointments_total
                .add(upserted as u64, &[KeyValue::new("effect", "upsert")]);
            self.rebuild_appointments_total
                .add(deleted as u64, &[KeyValue::new("effect", "delete")]);
        }

        /// Prometheus text exposition of everything recorded so far
        pub fn render(&self) -> Result<String, prometheus::Error> {
            TextEncoder::new().encode_to_string(&self.registry.gather())
        }
    }

}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn commit_batch_span(label: &str, ops: usize) -> Span {
        info_span!("salonbook.commit_batch", label = %label, ops = ops)
    }

    pub fn rebuild_span(max_tickets: usize) -> Span {
        info_span!("salonbook.rebuild", max_tickets = max_tickets)
    }

    pub fn transaction_span(phase: &'static str) -> Span {
        info_span!("salonbook.pg.transaction", phase = phase)
    }

    /// Span for one statement; long statements are cut to keep span fields small
    pub fn execute_statement_span(statement: &str) -> Span {
        let mut end = statement.len().min(120);
        while !statement.is_char_boundary(end) {
            end -= 1;
        }
        info_span!("salonbook.pg.statement", db.statement = %&statement[..end])
    }
}

/// Prometheus text exposition of the process-wide metrics
#[cfg(feature = "metrics")]
pub fn render() -> Result<String, prometheus::Error> {
    METRICS.render()
}
