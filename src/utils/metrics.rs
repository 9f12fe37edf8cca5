use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::errors::Stage;

/// Process-wide metrics for generation runs and remote calls.
///
/// Cheap to clone; every clone shares the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Remote calls
    api_calls_total: AtomicUsize,
    api_calls_success: AtomicUsize,
    api_calls_failed: AtomicUsize,
    api_tokens_input: AtomicU64,
    api_tokens_output: AtomicU64,
    api_latency_ms: RwLock<Vec<u64>>,

    // Calls per pipeline stage
    script_calls: AtomicUsize,
    character_calls: AtomicUsize,
    panel_calls: AtomicUsize,

    // Stage wall-clock durations
    script_duration_ms: RwLock<Vec<u64>>,
    character_duration_ms: RwLock<Vec<u64>>,
    panel_duration_ms: RwLock<Vec<u64>>,

    // Runs
    runs_started: AtomicUsize,
    runs_completed: AtomicUsize,
    runs_failed: AtomicUsize,
    panels_drawn: AtomicUsize,

    endpoint_counters: DashMap<String, AtomicUsize>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                api_calls_total: AtomicUsize::new(0),
                api_calls_success: AtomicUsize::new(0),
                api_calls_failed: AtomicUsize::new(0),
                api_tokens_input: AtomicU64::new(0),
                api_tokens_output: AtomicU64::new(0),
                api_latency_ms: RwLock::new(Vec::new()),
                script_calls: AtomicUsize::new(0),
                character_calls: AtomicUsize::new(0),
                panel_calls: AtomicUsize::new(0),
                script_duration_ms: RwLock::new(Vec::new()),
                character_duration_ms: RwLock::new(Vec::new()),
                panel_duration_ms: RwLock::new(Vec::new()),
                runs_started: AtomicUsize::new(0),
                runs_completed: AtomicUsize::new(0),
                runs_failed: AtomicUsize::new(0),
                panels_drawn: AtomicUsize::new(0),
                endpoint_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_api_call(
        &self,
        stage: Stage,
        success: bool,
        duration: Duration,
        input_tokens: u64,
        output_tokens: u64,
    ) {
        self.inner.api_calls_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.api_calls_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.api_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        let stage_counter = match stage {
            Stage::Script => &self.inner.script_calls,
            Stage::CharacterImage => &self.inner.character_calls,
            Stage::PanelImage => &self.inner.panel_calls,
        };
        stage_counter.fetch_add(1, Ordering::Relaxed);
        self.inner.api_tokens_input.fetch_add(input_tokens, Ordering::Relaxed);
        self.inner.api_tokens_output.fetch_add(output_tokens, Ordering::Relaxed);
        self.inner.api_latency_ms.write().push(duration.as_millis() as u64);
    }

    pub fn record_stage_duration(&self, stage: Stage, duration: Duration) {
        let durations = match stage {
            Stage::Script => &self.inner.script_duration_ms,
            Stage::CharacterImage => &self.inner.character_duration_ms,
            Stage::PanelImage => &self.inner.panel_duration_ms,
        };
        durations.write().push(duration.as_millis() as u64);
    }

    pub fn record_run_started(&self) {
        self.inner.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_finished(&self, success: bool) {
        if success {
            self.inner.runs_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_panel_drawn(&self) {
        self.inner.panels_drawn.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.inner.api_latency_ms.read();
        let api_latency_avg_ms = avg(&latency);
        let api_latency_p50_ms = percentile(&latency, 0.5);
        let api_latency_p95_ms = percentile(&latency, 0.95);
        let api_latency_p99_ms = percentile(&latency, 0.99);
        drop(latency);

        let endpoint_requests = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            api_calls_total: self.inner.api_calls_total.load(Ordering::Relaxed),
            api_calls_success: self.inner.api_calls_success.load(Ordering::Relaxed),
            api_calls_failed: self.inner.api_calls_failed.load(Ordering::Relaxed),
            api_tokens_input: self.inner.api_tokens_input.load(Ordering::Relaxed),
            api_tokens_output: self.inner.api_tokens_output.load(Ordering::Relaxed),
            api_latency_avg_ms,
            api_latency_p50_ms,
            api_latency_p95_ms,
            api_latency_p99_ms,
            script_calls: self.inner.script_calls.load(Ordering::Relaxed),
            character_calls: self.inner.character_calls.load(Ordering::Relaxed),
            panel_calls: self.inner.panel_calls.load(Ordering::Relaxed),
            script_avg_ms: avg(&self.inner.script_duration_ms.read()),
            character_avg_ms: avg(&self.inner.character_duration_ms.read()),
            panel_avg_ms: avg(&self.inner.panel_duration_ms.read()),
            runs_started: self.inner.runs_started.load(Ordering::Relaxed),
            runs_completed: self.inner.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.inner.runs_failed.load(Ordering::Relaxed),
            panels_drawn: self.inner.panels_drawn.load(Ordering::Relaxed),
            endpoint_requests,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP api_calls_total Total number of generative API calls
# TYPE api_calls_total counter
api_calls_total {{}} {}

# HELP api_calls_failed Number of failed generative API calls
# TYPE api_calls_failed counter
api_calls_failed {{}} {}

# HELP api_calls_by_stage Generative API calls per pipeline stage
# TYPE api_calls_by_stage counter
api_calls_by_stage {{stage="script"}} {}
api_calls_by_stage {{stage="character-image"}} {}
api_calls_by_stage {{stage="panel-image"}} {}

# HELP api_tokens_input_total Total input tokens consumed
# TYPE api_tokens_input_total counter
api_tokens_input_total {{}} {}

# HELP api_tokens_output_total Total output tokens generated
# TYPE api_tokens_output_total counter
api_tokens_output_total {{}} {}

# HELP api_latency_avg_ms Average API latency in milliseconds
# TYPE api_latency_avg_ms gauge
api_latency_avg_ms {{}} {}

# HELP stage_avg_duration_ms Average stage duration in milliseconds
# TYPE stage_avg_duration_ms gauge
stage_avg_duration_ms {{stage="script"}} {}
stage_avg_duration_ms {{stage="character-image"}} {}
stage_avg_duration_ms {{stage="panel-image"}} {}

# HELP generation_runs_total Generation runs by outcome
# TYPE generation_runs_total counter
generation_runs_total {{outcome="started"}} {}
generation_runs_total {{outcome="completed"}} {}
generation_runs_total {{outcome="failed"}} {}

# HELP panels_drawn_total Panels illustrated and merged
# TYPE panels_drawn_total counter
panels_drawn_total {{}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            s.api_calls_total,
            s.api_calls_failed,
            s.script_calls,
            s.character_calls,
            s.panel_calls,
            s.api_tokens_input,
            s.api_tokens_output,
            s.api_latency_avg_ms,
            s.script_avg_ms,
            s.character_avg_ms,
            s.panel_avg_ms,
            s.runs_started,
            s.runs_completed,
            s.runs_failed,
            s.panels_drawn,
            s.uptime_seconds,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub api_calls_total: usize,
    pub api_calls_success: usize,
    pub api_calls_failed: usize,
    pub api_tokens_input: u64,
    pub api_tokens_output: u64,
    pub api_latency_avg_ms: u64,
    pub api_latency_p50_ms: u64,
    pub api_latency_p95_ms: u64,
    pub api_latency_p99_ms: u64,
    pub script_calls: usize,
    pub character_calls: usize,
    pub panel_calls: usize,
    pub script_avg_ms: u64,
    pub character_avg_ms: u64,
    pub panel_avg_ms: u64,
    pub runs_started: usize,
    pub runs_completed: usize,
    pub runs_failed: usize,
    pub panels_drawn: usize,
    pub endpoint_requests: std::collections::BTreeMap<String, usize>,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_run_started();
        metrics.record_api_call(Stage::Script, true, Duration::from_millis(100), 500, 200);
        metrics.record_api_call(Stage::PanelImage, false, Duration::from_millis(50), 0, 0);
        metrics.record_panel_drawn();
        metrics.record_run_finished(false);
        metrics.record_endpoint_request("/generate");
        metrics.record_endpoint_request("/generate");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.api_calls_total, 2);
        assert_eq!(snapshot.api_calls_success, 1);
        assert_eq!(snapshot.api_calls_failed, 1);
        assert_eq!(snapshot.script_calls, 1);
        assert_eq!(snapshot.panel_calls, 1);
        assert_eq!(snapshot.character_calls, 0);
        assert_eq!(snapshot.api_tokens_input, 500);
        assert_eq!(snapshot.runs_failed, 1);
        assert_eq!(snapshot.panels_drawn, 1);
        assert_eq!(snapshot.endpoint_requests.get("/generate"), Some(&2));
    }

    #[test]
    fn test_percentiles() {
        let values = vec![10, 20, 30, 40, 50];
        assert_eq!(percentile(&values, 0.5), 30);
        assert_eq!(percentile(&values, 0.99), 40);
        assert_eq!(avg(&values), 30);
        assert_eq!(percentile(&[], 0.5), 0);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_api_call(Stage::CharacterImage, true, Duration::from_millis(100), 0, 0);

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("api_calls_total {} 1"));
        assert!(prometheus.contains("api_calls_by_stage {stage=\"character-image\"} 1"));
    }
}
