//! Declaration and evaluation of pass/fail criteria.
//!
//! Thresholds pair a metric name with a predicate, e.g. `create` with
//! `p(95)<250` or `hit_errors` with `count<10`. Latency metrics are the
//! category names plus `duration` (all categories combined), in
//! milliseconds; count metrics are `<category>_errors`, `checks` (all failed
//! checks) and `dropped`.
//!
//! Percentiles use the nearest-rank method: the `ceil(p/100 * n)`-th
//! smallest sample (1-indexed). Identical sample sets therefore always
//! produce identical verdicts.

use serde::{Deserialize, Serialize};

use crate::metrics::{Category, MetricsSnapshot};

/// One declared pass/fail criterion.
#[derive(Debug, Clone, Deserialize)]
pub struct Threshold {
    /// The metric the predicate applies to.
    pub metric: String,
    /// The predicate, e.g. `p(95)<250` or `count<10`.
    pub predicate: String,
}

/// The evaluation result of one threshold.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    /// The threshold, as `metric: predicate`.
    pub threshold: String,
    /// Whether the predicate held.
    pub passed: bool,
    /// The observed value the predicate was applied to.
    pub observed: f64,
}

/// Errors in threshold declarations, reported before the run starts.
#[derive(Debug, thiserror::Error)]
pub enum ThresholdError {
    /// The metric name is not known.
    #[error("unknown metric `{0}`")]
    UnknownMetric(String),
    /// The predicate does not follow the `p(N)` / `count` grammar.
    #[error("cannot parse predicate `{0}`")]
    InvalidPredicate(String),
    /// The predicate does not fit the metric, e.g. a percentile of a count.
    #[error("predicate `{predicate}` does not apply to metric `{metric}`")]
    Mismatched {
        /// The offending metric name.
        metric: String,
        /// The offending predicate.
        predicate: String,
    },
}

/// A validated threshold, ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledThreshold {
    name: String,
    selector: Selector,
    predicate: Predicate,
}

#[derive(Debug, Clone, Copy)]
enum Selector {
    /// Latency samples of one category, or of all when `None`.
    Latency(Option<Category>),
    /// Failed checks of one category, or of all when `None`.
    Errors(Option<Category>),
    /// Dropped open-loop iterations.
    Dropped,
}

#[derive(Debug, Clone, Copy)]
enum Predicate {
    Percentile { p: f64, cmp: Cmp, bound: f64 },
    Count { cmp: Cmp, bound: f64 },
}

#[derive(Debug, Clone, Copy)]
enum Cmp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    fn holds(self, observed: f64, bound: f64) -> bool {
        match self {
            Cmp::Lt => observed < bound,
            Cmp::Le => observed <= bound,
            Cmp::Gt => observed > bound,
            Cmp::Ge => observed >= bound,
        }
    }
}

/// Validates the declared thresholds.
///
/// Called before the run starts so a bad declaration fails fast instead of
/// surfacing after minutes of load.
pub fn compile(thresholds: &[Threshold]) -> Result<Vec<CompiledThreshold>, ThresholdError> {
    thresholds
        .iter()
        .map(|threshold| {
            let selector = parse_selector(&threshold.metric)?;
            let predicate = parse_predicate(&threshold.predicate)?;

            let fits = match (selector, predicate) {
                (Selector::Latency(_), Predicate::Percentile { .. }) => true,
                (Selector::Errors(_) | Selector::Dropped, Predicate::Count { .. }) => true,
                _ => false,
            };
            if !fits {
                return Err(ThresholdError::Mismatched {
                    metric: threshold.metric.clone(),
                    predicate: threshold.predicate.clone(),
                });
            }

            Ok(CompiledThreshold {
                name: format!("{}: {}", threshold.metric, threshold.predicate),
                selector,
                predicate,
            })
        })
        .collect()
}

/// Applies the compiled thresholds to a metrics snapshot.
pub fn evaluate(thresholds: &[CompiledThreshold], snapshot: &MetricsSnapshot) -> Vec<Verdict> {
    thresholds
        .iter()
        .map(|threshold| {
            let (observed, passed) = match threshold.predicate {
                Predicate::Percentile { p, cmp, bound } => {
                    let samples = match threshold.selector {
                        Selector::Latency(Some(category)) => snapshot.samples(category).to_vec(),
                        _ => snapshot.all_samples(),
                    };
                    // a threshold over an empty sample set holds vacuously
                    let observed = nearest_rank(&samples, p).unwrap_or(0.0);
                    (observed, cmp.holds(observed, bound))
                }
                Predicate::Count { cmp, bound } => {
                    let observed = match threshold.selector {
                        Selector::Errors(Some(category)) => snapshot.errors(category) as f64,
                        Selector::Errors(None) => snapshot.total_errors() as f64,
                        Selector::Dropped => snapshot.dropped() as f64,
                        Selector::Latency(_) => unreachable!("rejected by compile"),
                    };
                    (observed, cmp.holds(observed, bound))
                }
            };

            Verdict {
                threshold: threshold.name.clone(),
                passed,
                observed,
            }
        })
        .collect()
}

fn parse_selector(metric: &str) -> Result<Selector, ThresholdError> {
    if metric == "duration" {
        return Ok(Selector::Latency(None));
    }
    if metric == "checks" {
        return Ok(Selector::Errors(None));
    }
    if metric == "dropped" {
        return Ok(Selector::Dropped);
    }
    if let Some(category) = metric
        .strip_suffix("_errors")
        .and_then(Category::from_name)
    {
        return Ok(Selector::Errors(Some(category)));
    }
    if let Some(category) = Category::from_name(metric) {
        return Ok(Selector::Latency(Some(category)));
    }
    Err(ThresholdError::UnknownMetric(metric.to_owned()))
}

fn parse_predicate(raw: &str) -> Result<Predicate, ThresholdError> {
    let invalid = || ThresholdError::InvalidPredicate(raw.to_owned());
    let input = raw.trim();

    if let Some(rest) = input.strip_prefix("p(") {
        let (percentile, rest) = rest.split_once(')').ok_or_else(invalid)?;
        let p: f64 = percentile.trim().parse().map_err(|_| invalid())?;
        if !(0.0..=100.0).contains(&p) {
            return Err(invalid());
        }
        let (cmp, bound) = parse_comparison(rest).ok_or_else(invalid)?;
        return Ok(Predicate::Percentile { p, cmp, bound });
    }

    if let Some(rest) = input.strip_prefix("count") {
        let (cmp, bound) = parse_comparison(rest).ok_or_else(invalid)?;
        return Ok(Predicate::Count { cmp, bound });
    }

    Err(invalid())
}

fn parse_comparison(input: &str) -> Option<(Cmp, f64)> {
    let input = input.trim();
    // two-character operators have to be tried first
    let operators = [
        ("<=", Cmp::Le),
        (">=", Cmp::Ge),
        ("<", Cmp::Lt),
        (">", Cmp::Gt),
    ];
    for (token, cmp) in operators {
        if let Some(rest) = input.strip_prefix(token) {
            return rest.trim().parse().ok().map(|bound| (cmp, bound));
        }
    }
    None
}

/// Nearest-rank percentile: the `ceil(p/100 * n)`-th smallest sample,
/// 1-indexed. `None` when there are no samples.
fn nearest_rank(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = ((p / 100.0) * n as f64).ceil().max(1.0) as usize;
    Some(sorted[rank.min(n) - 1])
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::metrics::{MetricSink, Outcome};

    fn threshold(metric: &str, predicate: &str) -> Threshold {
        Threshold {
            metric: metric.to_owned(),
            predicate: predicate.to_owned(),
        }
    }

    #[test]
    fn nearest_rank_picks_the_documented_sample() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(nearest_rank(&samples, 95.0), Some(95.0));
        assert_eq!(nearest_rank(&samples, 50.0), Some(50.0));
        assert_eq!(nearest_rank(&samples, 100.0), Some(100.0));
        assert_eq!(nearest_rank(&samples, 0.0), Some(1.0));

        // ceil(0.95 * 3) == 3
        assert_eq!(nearest_rank(&[1.0, 2.0, 3.0], 95.0), Some(3.0));
        assert_eq!(nearest_rank(&[], 95.0), None);
    }

    #[test]
    fn rejects_malformed_declarations() {
        assert!(matches!(
            compile(&[threshold("tea", "count<10")]),
            Err(ThresholdError::UnknownMetric(_))
        ));
        assert!(matches!(
            compile(&[threshold("create", "q(95)<250")]),
            Err(ThresholdError::InvalidPredicate(_))
        ));
        assert!(matches!(
            compile(&[threshold("create", "p(950)<250")]),
            Err(ThresholdError::InvalidPredicate(_))
        ));
        // a percentile of a count makes no sense
        assert!(matches!(
            compile(&[threshold("hit_errors", "p(95)<250")]),
            Err(ThresholdError::Mismatched { .. })
        ));
        assert!(matches!(
            compile(&[threshold("create", "count<10")]),
            Err(ThresholdError::Mismatched { .. })
        ));
    }

    #[test]
    fn evaluates_latency_and_count_thresholds() {
        let sink = MetricSink::new();
        for millis in [10, 20, 30, 40] {
            sink.record(
                Category::Create,
                Outcome::Ok,
                Duration::from_millis(millis),
            );
        }
        sink.record(Category::Hit, Outcome::Error, Duration::ZERO);
        let snapshot = sink.snapshot();

        let thresholds = compile(&[
            threshold("create", "p(95)<250"),
            threshold("create", "p(50)<=15"),
            threshold("hit_errors", "count<1"),
            threshold("dropped", "count<1"),
        ])
        .unwrap();

        let verdicts = evaluate(&thresholds, &snapshot);
        assert_eq!(verdicts.len(), 4);
        assert!(verdicts[0].passed);
        assert_eq!(verdicts[0].observed, 40.0);
        // ceil(0.5 * 4) == 2nd smallest
        assert!(!verdicts[1].passed);
        assert_eq!(verdicts[1].observed, 20.0);
        assert!(!verdicts[2].passed);
        assert_eq!(verdicts[2].observed, 1.0);
        assert!(verdicts[3].passed);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let sink = MetricSink::new();
        for millis in [7, 3, 12, 9, 4] {
            sink.record(Category::Get, Outcome::Ok, Duration::from_millis(millis));
        }

        let thresholds =
            compile(&[threshold("get", "p(90)<11"), threshold("duration", "p(50)<100")]).unwrap();

        let first = evaluate(&thresholds, &sink.snapshot());
        let second = evaluate(&thresholds, &sink.snapshot());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.passed, b.passed);
            assert_eq!(a.observed, b.observed);
        }
    }

    #[test]
    fn empty_sample_sets_pass_vacuously() {
        let sink = MetricSink::new();
        let thresholds = compile(&[threshold("set", "p(95)<250")]).unwrap();
        let verdicts = evaluate(&thresholds, &sink.snapshot());
        assert!(verdicts[0].passed);
        assert_eq!(verdicts[0].observed, 0.0);
    }
}
