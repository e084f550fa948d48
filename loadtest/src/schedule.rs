//! Dispatching of scenario iterations over time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::config::Schedule;
use crate::keyspace::{IterationIdentity, KeySpace};
use crate::metrics::MetricSink;
use crate::remote::CounterApi;
use crate::scenario;

/// Drives scenario iterations according to the configured policy until the
/// duration deadline.
///
/// The deadline only stops dispatch; iterations that are in flight when it
/// passes run to completion before this function returns.
pub async fn drive(
    api: Arc<dyn CounterApi>,
    schedule: &Schedule,
    duration: Duration,
    keyspace: KeySpace,
    sink: Arc<MetricSink>,
) {
    match *schedule {
        Schedule::ClosedLoop { lanes, think_time } => {
            closed_loop(api, lanes, think_time, duration, keyspace, sink).await
        }
        Schedule::OpenLoop { rate, max_lanes } => {
            open_loop(api, rate, max_lanes, duration, keyspace, sink).await
        }
    }
}

/// A fixed pool of lanes, each running iterations back-to-back.
async fn closed_loop(
    api: Arc<dyn CounterApi>,
    lanes: usize,
    think_time: Option<Duration>,
    duration: Duration,
    keyspace: KeySpace,
    sink: Arc<MetricSink>,
) {
    let deadline = tokio::time::Instant::now() + duration;

    let tasks: Vec<_> = (0..lanes)
        .map(|vu| {
            let api = Arc::clone(&api);
            let keyspace = keyspace.clone();
            let sink = Arc::clone(&sink);

            tokio::spawn(async move {
                let mut iter = 0;
                while deadline.elapsed() == Duration::ZERO {
                    let identity = IterationIdentity { vu, iter };
                    scenario::run_iteration(&*api, &keyspace, identity, &sink).await;
                    iter += 1;

                    if let Some(pause) = think_time {
                        tokio::time::sleep(pause).await;
                    }
                }
                debug!(vu, iterations = iter, "lane finished");
            })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        task.unwrap();
    }
}

/// Iterations are dispatched at a fixed cadence over a bounded lane pool.
///
/// When no lane is free at a tick, the iteration is dropped and counted;
/// nothing is ever queued, so overload stays observable instead of piling up
/// memory and distorting latencies.
async fn open_loop(
    api: Arc<dyn CounterApi>,
    rate: u32,
    max_lanes: usize,
    duration: Duration,
    keyspace: KeySpace,
    sink: Arc<MetricSink>,
) {
    let deadline = tokio::time::Instant::now() + duration;
    let semaphore = Arc::new(Semaphore::new(max_lanes));

    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / rate.max(1) as f64));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // See <https://docs.rs/tokio/latest/tokio/time/struct.Sleep.html#examples>
    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    let mut dispatched: u64 = 0;
    loop {
        if deadline.elapsed() > Duration::ZERO {
            break;
        }
        tokio::select! {
            _ = interval.tick() => {
                match Arc::clone(&semaphore).try_acquire_owned() {
                    Ok(permit) => {
                        let identity = IterationIdentity {
                            vu: (dispatched % max_lanes as u64) as usize,
                            iter: dispatched / max_lanes as u64,
                        };
                        dispatched += 1;

                        let api = Arc::clone(&api);
                        let keyspace = keyspace.clone();
                        let sink = Arc::clone(&sink);
                        tokio::spawn(async move {
                            scenario::run_iteration(&*api, &keyspace, identity, &sink).await;
                            drop(permit);
                        });
                    }
                    Err(_) => sink.record_dropped(),
                }
            }
            _ = &mut sleep => {
                break;
            }
        }
    }

    // by acquiring *all* the permits, we essentially wait for all outstanding iterations to finish
    let _permits = semaphore.acquire_many(max_lanes as u32).await;
}
