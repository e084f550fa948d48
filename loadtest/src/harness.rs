//! Run a configured load test end to end and print the results.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Serialize;
use sketches_ddsketch::DDSketch;
use tracing::{error, info, warn};
use yansi::Paint;

use crate::config::{Config, Schedule};
use crate::keyspace::KeySpace;
use crate::lifecycle::Lifecycle;
use crate::metrics::{Category, MetricSink, MetricsSnapshot};
use crate::remote::CounterApi;
use crate::schedule;
use crate::thresholds::{self, Verdict};

/// The final output of a run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    /// Whether every threshold held. A run fails iff any threshold fails.
    pub passed: bool,
    /// One verdict per declared threshold, plus a `setup` entry when the run
    /// aborted before load started.
    pub verdicts: Vec<Verdict>,
    /// Non-fatal problems, such as a failed teardown.
    pub warnings: Vec<String>,
    /// The number of scenario iterations that ran.
    pub iterations: u64,
    /// The number of iterations the open-loop scheduler had to drop.
    pub dropped: u64,
}

/// Runs the configured load test against the given service.
///
/// Setup runs once before load starts; its failure aborts the run with a
/// failed report and zero iterations. Teardown runs once after the
/// scheduler has drained, and its failure only warns. The process-level
/// error path is reserved for invalid configuration.
pub async fn run(api: Arc<dyn CounterApi>, config: &Config) -> Result<RunReport> {
    let thresholds =
        thresholds::compile(&config.thresholds).context("invalid threshold declaration")?;

    // a per-run suffix so repeated runs against a persistent service get a
    // fresh namespace
    let run_prefix = format!("{}-{:08x}", config.prefix, rand::random::<u32>());
    let keyspace = KeySpace::new(config.keyspace.policy, config.keyspace.size, &run_prefix);

    let mut lifecycle = Lifecycle::new();
    let context = match lifecycle.setup(api.as_ref(), &run_prefix).await {
        Ok(context) => context,
        Err(err) => {
            error!("setup failed, aborting before any load: {err:#}");
            return Ok(RunReport {
                passed: false,
                verdicts: vec![Verdict {
                    threshold: "setup".to_owned(),
                    passed: false,
                    observed: 0.0,
                }],
                warnings: vec![format!("setup failed: {err:#}")],
                iterations: 0,
                dropped: 0,
            });
        }
    };

    info!(prefix = %run_prefix, duration = ?config.duration, "starting the load phase");
    let sink = Arc::new(MetricSink::new());
    schedule::drive(
        Arc::clone(&api),
        &config.schedule,
        config.duration,
        keyspace,
        Arc::clone(&sink),
    )
    .await;

    let mut warnings = Vec::new();
    if let Some(warning) = lifecycle.teardown(api.as_ref(), &context, &sink).await {
        warn!("{warning}");
        warnings.push(warning);
    }

    let snapshot = sink.snapshot();
    print_summary(&config.schedule, &snapshot, config.duration);

    let verdicts = thresholds::evaluate(&thresholds, &snapshot);
    print_verdicts(&verdicts);
    let passed = verdicts.iter().all(|verdict| verdict.passed);

    Ok(RunReport {
        passed,
        verdicts,
        warnings,
        iterations: snapshot.iterations(),
        dropped: snapshot.dropped(),
    })
}

fn print_summary(schedule: &Schedule, snapshot: &MetricsSnapshot, duration: Duration) {
    println!();
    match schedule {
        Schedule::ClosedLoop { lanes, .. } => println!(
            "{} ({} iterations, closed-loop, {} lanes)",
            "## RESULTS".bold(),
            snapshot.iterations().bold(),
            lanes.bold()
        ),
        Schedule::OpenLoop { rate, max_lanes } => println!(
            "{} ({} iterations, open-loop, {}/s over {} lanes)",
            "## RESULTS".bold(),
            snapshot.iterations().bold(),
            rate.bold(),
            max_lanes.bold()
        ),
    }

    for category in Category::ALL {
        let sketch = snapshot.sketch(category);
        let errors = snapshot.errors(category);
        if sketch.count() == 0 && errors == 0 {
            continue;
        }

        print!(
            "{} ({} ops",
            format!("{}:", category.name().to_uppercase()).bold().green(),
            sketch.count().bold()
        );
        if errors > 0 {
            print!(", {}", format!("{errors} FAILURES").bold().red());
        }
        println!(")");

        if sketch.count() > 0 {
            print_ops(sketch, duration);
            print_percentiles(sketch);
        }
    }

    if snapshot.dropped() > 0 {
        println!(
            "{}",
            format!("{} DROPPED ITERATIONS", snapshot.dropped())
                .bold()
                .red()
        );
    }
}

fn print_ops(sketch: &DDSketch, duration: Duration) {
    let ops = sketch.count();
    let ops_ps = ops as f64 / duration.as_secs_f64();
    println!("  {:.2} operations/s", ops_ps.bold());
}

fn print_percentiles(sketch: &DDSketch) {
    let ops = sketch.count();
    let avg = sketch.sum().unwrap() / ops as f64;
    let p50 = sketch.quantile(0.5).unwrap().unwrap();
    let p90 = sketch.quantile(0.9).unwrap().unwrap();
    let p99 = sketch.quantile(0.99).unwrap().unwrap();
    println!(
        "  avg: {:.2}ms; p50: {p50:.2}ms; p90: {p90:.2}ms; p99: {p99:.2}ms",
        avg.bold()
    );
}

fn print_verdicts(verdicts: &[Verdict]) {
    if verdicts.is_empty() {
        return;
    }

    println!();
    println!("{}", "## THRESHOLDS".bold());
    for verdict in verdicts {
        let status = if verdict.passed {
            "PASS".bold().green()
        } else {
            "FAIL".bold().red()
        };
        println!(
            "  {status} {} (observed {:.2})",
            verdict.threshold, verdict.observed
        );
    }
}
