use std::sync::Arc;

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    operator_rows_in: CounterVec,
    operator_rows_out: CounterVec,
    operator_batches_out: CounterVec,
    operator_time_seconds: HistogramVec,
    statements: CounterVec,
    statement_errors: CounterVec,
    chunks_written: CounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    pub fn record_operator(
        &self,
        operator: &str,
        rows_in: u64,
        rows_out: u64,
        batches_out: u64,
        secs: f64,
    ) {
        let labels = [operator];
        self.inner
            .operator_rows_in
            .with_label_values(&labels)
            .inc_by(rows_in as f64);
        self.inner
            .operator_rows_out
            .with_label_values(&labels)
            .inc_by(rows_out as f64);
        self.inner
            .operator_batches_out
            .with_label_values(&labels)
            .inc_by(batches_out as f64);
        self.inner
            .operator_time_seconds
            .with_label_values(&labels)
            .observe(secs.max(0.0));
    }

    pub fn record_statement(&self, kind: &str, ok: bool) {
        self.inner.statements.with_label_values(&[kind]).inc();
        if !ok {
            self.inner.statement_errors.with_label_values(&[kind]).inc();
        }
    }

    pub fn record_chunks_written(&self, table: &str, chunks: u64) {
        self.inner
            .chunks_written
            .with_label_values(&[table])
            .inc_by(chunks as f64);
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();
        let operator_rows_in = counter_vec(
            &registry,
            "tessera_operator_rows_in_total",
            "Rows consumed by plan operators",
            &["operator"],
        );
        let operator_rows_out = counter_vec(
            &registry,
            "tessera_operator_rows_out_total",
            "Rows produced by plan operators",
            &["operator"],
        );
        let operator_batches_out = counter_vec(
            &registry,
            "tessera_operator_batches_out_total",
            "Batches produced by plan operators",
            &["operator"],
        );
        let operator_time_seconds = histogram_vec(
            &registry,
            "tessera_operator_time_seconds",
            "Operator wall time",
            &["operator"],
        );
        let statements = counter_vec(
            &registry,
            "tessera_statements_total",
            "Executed statements",
            &["kind"],
        );
        let statement_errors = counter_vec(
            &registry,
            "tessera_statement_errors_total",
            "Statements that failed",
            &["kind"],
        );
        let chunks_written = counter_vec(
            &registry,
            "tessera_chunks_written_total",
            "Chunks published to table chunk sets",
            &["table"],
        );

        Self {
            registry,
            operator_rows_in,
            operator_rows_out,
            operator_batches_out,
            operator_time_seconds,
            statements,
            statement_errors,
            chunks_written,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

#[cfg(test)]
mod tests {
    use super::MetricsRegistry;

    #[test]
    fn renders_prometheus_text() {
        let m = MetricsRegistry::new();
        m.record_operator("TableScanPlan", 0, 10, 1, 0.01);
        let text = m.render_prometheus();
        assert!(text.contains("tessera_operator_rows_out_total"));
        assert!(text.contains("TableScanPlan"));
    }

    #[test]
    fn renders_statement_families() {
        let m = MetricsRegistry::new();
        m.record_statement("select", true);
        m.record_statement("insert", false);
        m.record_chunks_written("users", 2);
        let text = m.render_prometheus();

        assert!(text.contains("tessera_statements_total"));
        assert!(text.contains("tessera_statement_errors_total"));
        assert!(text.contains("tessera_chunks_written_total"));
    }
}
