use std::sync::Arc;
use std::time::{Duration, Instant};

use abacus_client::Client;
use abacus_test::server::TestServer;
use loadtest::config::{Config, KeySpaceConfig, Schedule};
use loadtest::keyspace::KeySpacePolicy;
use loadtest::thresholds::Threshold;

fn threshold(metric: &str, predicate: &str) -> Threshold {
    Threshold {
        metric: metric.to_owned(),
        predicate: predicate.to_owned(),
    }
}

fn config(remote: String, schedule: Schedule, policy: KeySpacePolicy) -> Config {
    Config {
        remote,
        prefix: "it".to_owned(),
        duration: Duration::from_millis(300),
        schedule,
        keyspace: KeySpaceConfig { policy, size: 10 },
        thresholds: Vec::new(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn closed_loop_run_meets_its_thresholds() {
    abacus_test::tracing::init();
    let server = TestServer::new().await;
    let client = Client::builder(server.url("/")).build().unwrap();

    let mut config = config(
        server.url("/"),
        Schedule::ClosedLoop {
            lanes: 4,
            think_time: None,
        },
        // wide: every iteration owns a fresh counter, so the value checks
        // (hit == 1, set echoes 10) must all hold
        KeySpacePolicy::Wide,
    );
    config.thresholds = vec![
        threshold("create", "p(95)<1000"),
        threshold("duration", "p(99)<1000"),
        threshold("checks", "count<1"),
        threshold("dropped", "count<1"),
    ];

    let report = loadtest::run(Arc::new(client), &config).await.unwrap();
    assert!(report.passed, "verdicts: {:?}", report.verdicts);
    assert!(report.iterations > 0);
    assert_eq!(report.dropped, 0);
    assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
}

#[tokio::test(flavor = "multi_thread")]
async fn narrow_key_reuse_is_not_an_error() {
    abacus_test::tracing::init();
    let server = TestServer::new().await;
    let client = Client::builder(server.url("/")).build().unwrap();

    let mut config = config(
        server.url("/"),
        Schedule::ClosedLoop {
            lanes: 4,
            think_time: None,
        },
        // narrow: iterations share a 10-key pool, so most creates answer 409
        // and value checks are skipped; nothing of this may count as failure
        KeySpacePolicy::Narrow,
    );
    config.thresholds = vec![threshold("checks", "count<1")];

    let report = loadtest::run(Arc::new(client), &config).await.unwrap();
    assert!(report.passed, "verdicts: {:?}", report.verdicts);
    assert!(report.iterations > 10, "iterations: {}", report.iterations);
}

#[tokio::test(flavor = "multi_thread")]
async fn open_loop_overload_reports_dropped_iterations() {
    abacus_test::tracing::init();
    let server = TestServer::with_response_delay(Duration::from_millis(50)).await;
    let client = Client::builder(server.url("/")).build().unwrap();

    let config = config(
        server.url("/"),
        Schedule::OpenLoop {
            rate: 200,
            max_lanes: 3,
        },
        KeySpacePolicy::Narrow,
    );

    let started = Instant::now();
    let report = loadtest::run(Arc::new(client), &config).await.unwrap();

    // the pool cannot keep up with the arrival rate: the surplus has to be
    // reported, and the run must still stop at the duration boundary
    assert!(report.dropped > 0);
    assert!(report.iterations > 0);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread")]
async fn setup_failure_aborts_before_any_load() {
    abacus_test::tracing::init();
    // nothing listens on the discard port
    let remote = "http://127.0.0.1:9/".to_owned();
    let client = Client::builder(remote.as_str())
        .timeout(Duration::from_millis(250))
        .build()
        .unwrap();

    let config = config(
        remote,
        Schedule::ClosedLoop {
            lanes: 2,
            think_time: None,
        },
        KeySpacePolicy::Narrow,
    );

    let report = loadtest::run(Arc::new(client), &config).await.unwrap();
    assert!(!report.passed);
    assert_eq!(report.iterations, 0);
    assert!(
        report
            .verdicts
            .iter()
            .any(|verdict| verdict.threshold == "setup" && !verdict.passed)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_thresholds_fail_before_the_run() {
    abacus_test::tracing::init();
    let server = TestServer::new().await;
    let client = Client::builder(server.url("/")).build().unwrap();

    let mut config = config(
        server.url("/"),
        Schedule::ClosedLoop {
            lanes: 1,
            think_time: None,
        },
        KeySpacePolicy::Narrow,
    );
    config.thresholds = vec![threshold("create", "q(95)<250")];

    let err = loadtest::run(Arc::new(client), &config).await.unwrap_err();
    assert!(err.to_string().contains("invalid threshold declaration"));
}
