//! Shared accumulation of per-operation latencies and error counts.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use sketches_ddsketch::DDSketch;

/// The operation an observation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// The `create` operation.
    Create,
    /// The `hit` operation.
    Hit,
    /// The `get` operation.
    Get,
    /// The `info` operation.
    Info,
    /// The `set` operation.
    Set,
    /// The `delete` operation.
    Delete,
}

impl Category {
    /// All categories, in scenario-step order.
    pub const ALL: [Category; 6] = [
        Category::Create,
        Category::Hit,
        Category::Get,
        Category::Info,
        Category::Set,
        Category::Delete,
    ];

    /// The category's name, as used in threshold declarations.
    pub fn name(self) -> &'static str {
        match self {
            Category::Create => "create",
            Category::Hit => "hit",
            Category::Get => "get",
            Category::Info => "info",
            Category::Set => "set",
            Category::Delete => "delete",
        }
    }

    /// Resolves a category from its threshold-declaration name.
    pub fn from_name(name: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// Whether a step succeeded, including all its checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The step met its contract.
    Ok,
    /// Transport error, unexpected status, or a failed value check.
    Error,
}

#[derive(Default)]
struct CategoryMetrics {
    /// Streaming summary, used for the printed report.
    timing: DDSketch,
    /// Exact samples in milliseconds, used for threshold evaluation.
    samples: Vec<f64>,
    errors: u64,
}

#[derive(Default)]
struct SinkInner {
    categories: [CategoryMetrics; Category::ALL.len()],
    dropped: u64,
}

/// Thread-safe sink all lanes record their observations into.
///
/// This is the only shared mutable state of a run. Lanes only ever append;
/// the aggregate is read once via [`MetricSink::snapshot`] after the
/// scheduler has drained.
#[derive(Default)]
pub struct MetricSink {
    inner: Mutex<SinkInner>,
}

impl MetricSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observation for a scenario step.
    ///
    /// Both outcomes contribute a latency sample, so the percentiles include
    /// the slow failing requests. Failures additionally increment the error
    /// counter.
    pub fn record(&self, category: Category, outcome: Outcome, latency: Duration) {
        let mut inner = self.inner.lock().unwrap();
        let metrics = &mut inner.categories[category as usize];
        let millis = latency.as_secs_f64() * 1_000.0;
        metrics.timing.add(millis);
        metrics.samples.push(millis);
        if outcome == Outcome::Error {
            metrics.errors += 1;
        }
    }

    /// Records the result of a checked step.
    pub fn check(&self, category: Category, passed: bool, latency: Duration) {
        let outcome = if passed { Outcome::Ok } else { Outcome::Error };
        self.record(category, outcome, latency);
    }

    /// Records one iteration the open-loop scheduler had to drop.
    pub fn record_dropped(&self) {
        self.inner.lock().unwrap().dropped += 1;
    }

    /// Takes a consistent snapshot of everything recorded so far.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().unwrap();
        let categories = inner.categories.each_ref().map(|metrics| {
            let mut sketch = DDSketch::default();
            sketch.merge(&metrics.timing).unwrap();
            let mut samples = metrics.samples.clone();
            samples.sort_by(f64::total_cmp);
            CategorySnapshot {
                sketch,
                samples,
                errors: metrics.errors,
            }
        });
        MetricsSnapshot {
            categories,
            dropped: inner.dropped,
        }
    }
}

impl fmt::Debug for MetricSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricSink").finish_non_exhaustive()
    }
}

struct CategorySnapshot {
    sketch: DDSketch,
    /// Sorted ascending.
    samples: Vec<f64>,
    errors: u64,
}

/// An immutable view of a run's aggregated metrics.
pub struct MetricsSnapshot {
    categories: [CategorySnapshot; Category::ALL.len()],
    dropped: u64,
}

impl MetricsSnapshot {
    /// The sorted latency samples (in milliseconds) of one category.
    pub fn samples(&self, category: Category) -> &[f64] {
        &self.categories[category as usize].samples
    }

    /// All latency samples of the run, sorted ascending.
    pub fn all_samples(&self) -> Vec<f64> {
        let mut all: Vec<f64> = self
            .categories
            .iter()
            .flat_map(|c| c.samples.iter().copied())
            .collect();
        all.sort_by(f64::total_cmp);
        all
    }

    /// The streaming summary of one category, for report printing.
    pub fn sketch(&self, category: Category) -> &DDSketch {
        &self.categories[category as usize].sketch
    }

    /// The number of failed checks in one category.
    pub fn errors(&self, category: Category) -> u64 {
        self.categories[category as usize].errors
    }

    /// The number of failed checks across all categories.
    pub fn total_errors(&self) -> u64 {
        self.categories.iter().map(|c| c.errors).sum()
    }

    /// The number of iterations the open-loop scheduler dropped.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// The number of iterations that ran.
    ///
    /// Every iteration starts with a create step and every create step
    /// records a latency sample, so the create samples count the iterations.
    pub fn iterations(&self) -> u64 {
        self.categories[Category::Create as usize].samples.len() as u64
    }
}

impl fmt::Debug for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsSnapshot")
            .field("iterations", &self.iterations())
            .field("errors", &self.total_errors())
            .field("dropped", &self.dropped)
            .finish()
    }
}
