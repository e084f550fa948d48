//! The per-iteration unit of work.

use std::time::Instant;

use tracing::debug;

use crate::credentials::{self, AdminToken};
use crate::keyspace::{IterationIdentity, KeySpace};
use crate::metrics::{Category, MetricSink, Outcome};
use crate::remote::CounterApi;

/// The value the conditional `set` step writes, matching the echoed value
/// check.
pub(crate) const SET_VALUE: i64 = 10;

/// Runs one iteration of the scenario against its allocated counter.
///
/// The sequence is create → hit → get → (conditional) info → (conditional)
/// set. Every step is timed and checked independently; a failed step records
/// an error observation but never aborts the remaining steps, so an
/// iteration keeps producing signal under partial failure.
///
/// Value checks (`hit` returning 1 on a fresh counter, `set` echoing the
/// written value) only apply when the counter's state is deterministic: the
/// iteration created it (201) and owns it exclusively. Under the narrow
/// key-space policy concurrent iterations share counters and may race at the
/// service, so only status codes are checked there.
pub async fn run_iteration(
    api: &dyn CounterApi,
    keyspace: &KeySpace,
    identity: IterationIdentity,
    sink: &MetricSink,
) {
    let counter = keyspace.allocate(identity);

    // create: both 201 and 409 are successful outcomes for this step
    let start = Instant::now();
    let token: Option<AdminToken> = match api.create(&counter).await {
        Ok(outcome) => {
            sink.record(Category::Create, Outcome::Ok, start.elapsed());
            credentials::from_create(&outcome)
        }
        Err(err) => {
            debug!(namespace = %counter.namespace, key = %counter.key, "create failed: {err}");
            sink.record(Category::Create, Outcome::Error, start.elapsed());
            None
        }
    };
    let deterministic = token.is_some() && keyspace.is_exclusive();

    let start = Instant::now();
    match api.hit(&counter).await {
        Ok(value) => {
            let passed = !deterministic || value == 1;
            sink.check(Category::Hit, passed, start.elapsed());
        }
        Err(err) => {
            debug!(namespace = %counter.namespace, key = %counter.key, "hit failed: {err}");
            sink.record(Category::Hit, Outcome::Error, start.elapsed());
        }
    }

    let start = Instant::now();
    match api.get(&counter).await {
        Ok(value) => {
            let passed = !deterministic || value == 1;
            sink.check(Category::Get, passed, start.elapsed());
        }
        Err(err) => {
            debug!(namespace = %counter.namespace, key = %counter.key, "get failed: {err}");
            sink.record(Category::Get, Outcome::Error, start.elapsed());
        }
    }

    // info runs when this iteration holds the admin token, and occasionally
    // for long-lived counters
    if token.is_some() || identity.iter % 5 == 0 {
        let start = Instant::now();
        match api.info(&counter).await {
            // step 1 created or confirmed the counter, so it must exist
            Ok(info) => sink.check(Category::Info, info.exists, start.elapsed()),
            Err(err) => {
                debug!(namespace = %counter.namespace, key = %counter.key, "info failed: {err}");
                sink.record(Category::Info, Outcome::Error, start.elapsed());
            }
        }
    }

    // set is a privileged operation and only runs with this iteration's token
    if let Some(token) = &token {
        let start = Instant::now();
        match api.set(&counter, SET_VALUE, token).await {
            Ok(value) => sink.check(Category::Set, value == SET_VALUE, start.elapsed()),
            Err(err) => {
                debug!(namespace = %counter.namespace, key = %counter.key, "set failed: {err}");
                sink.record(Category::Set, Outcome::Error, start.elapsed());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use abacus_client::{CounterInfo, CreateOutcome, Error};
    use async_trait::async_trait;

    use super::*;
    use crate::keyspace::{CounterRef, KeySpacePolicy};

    /// A scripted counter service that records the calls it receives.
    #[derive(Default)]
    struct FakeApi {
        pre_existing: bool,
        fail_hit: bool,
        /// Value answered by `hit`, defaulting to the fresh-counter 1.
        hit_value: Option<i64>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn log(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CounterApi for FakeApi {
        async fn create(&self, _counter: &CounterRef) -> abacus_client::Result<CreateOutcome> {
            self.log("create");
            if self.pre_existing {
                Ok(CreateOutcome::AlreadyExists)
            } else {
                Ok(CreateOutcome::Created {
                    admin_key: "fake-admin-key".to_owned(),
                    value: 0,
                })
            }
        }

        async fn hit(&self, _counter: &CounterRef) -> abacus_client::Result<i64> {
            self.log("hit");
            if self.fail_hit {
                Err(Error::NotFound { operation: "hit" })
            } else {
                Ok(self.hit_value.unwrap_or(1))
            }
        }

        async fn get(&self, _counter: &CounterRef) -> abacus_client::Result<i64> {
            self.log("get");
            Ok(1)
        }

        async fn info(&self, _counter: &CounterRef) -> abacus_client::Result<CounterInfo> {
            self.log("info");
            Ok(CounterInfo {
                exists: true,
                value: Some(1),
            })
        }

        async fn set(
            &self,
            _counter: &CounterRef,
            value: i64,
            token: &AdminToken,
        ) -> abacus_client::Result<i64> {
            self.log(format!("set {value} with {}", token.reveal()));
            Ok(value)
        }

        async fn delete(
            &self,
            _counter: &CounterRef,
            _token: &AdminToken,
        ) -> abacus_client::Result<()> {
            self.log("delete");
            Ok(())
        }
    }

    fn wide_keyspace() -> KeySpace {
        KeySpace::new(KeySpacePolicy::Wide, 10, "test")
    }

    #[tokio::test]
    async fn fresh_counter_runs_the_full_sequence() {
        let api = FakeApi::default();
        let sink = MetricSink::new();

        run_iteration(
            &api,
            &wide_keyspace(),
            IterationIdentity { vu: 0, iter: 1 },
            &sink,
        )
        .await;

        assert_eq!(
            api.calls(),
            vec![
                "create",
                "hit",
                "get",
                "info",
                "set 10 with fake-admin-key"
            ]
        );

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.total_errors(), 0);
        for category in [Category::Create, Category::Hit, Category::Get, Category::Info, Category::Set] {
            assert_eq!(snapshot.samples(category).len(), 1, "{}", category.name());
        }
    }

    #[tokio::test]
    async fn failed_step_does_not_abort_the_iteration() {
        let api = FakeApi {
            fail_hit: true,
            ..Default::default()
        };
        let sink = MetricSink::new();

        run_iteration(
            &api,
            &wide_keyspace(),
            IterationIdentity { vu: 0, iter: 1 },
            &sink,
        )
        .await;

        let calls = api.calls();
        assert!(calls.iter().any(|c| c == "get"));
        assert!(calls.iter().any(|c| c.starts_with("set")));

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.errors(Category::Hit), 1);
        assert_eq!(snapshot.samples(Category::Get).len(), 1);
        assert_eq!(snapshot.samples(Category::Set).len(), 1);
    }

    #[tokio::test]
    async fn wrong_hit_value_on_an_owned_counter_fails_the_check() {
        // fresh counter, exclusively owned: hit answering anything but 1
        // is a correctness failure, not nondeterminism
        let api = FakeApi {
            hit_value: Some(7),
            ..Default::default()
        };
        let sink = MetricSink::new();

        run_iteration(
            &api,
            &wide_keyspace(),
            IterationIdentity { vu: 0, iter: 1 },
            &sink,
        )
        .await;

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.errors(Category::Hit), 1);
        // the failed check still carries its latency sample
        assert_eq!(snapshot.samples(Category::Hit).len(), 1);
        assert_eq!(snapshot.errors(Category::Get), 0);
    }

    #[tokio::test]
    async fn preexisting_counter_skips_privileged_operations() {
        let api = FakeApi {
            pre_existing: true,
            ..Default::default()
        };
        let sink = MetricSink::new();

        // iter 1: not a multiple of 5, so info is skipped along with set
        run_iteration(
            &api,
            &wide_keyspace(),
            IterationIdentity { vu: 0, iter: 1 },
            &sink,
        )
        .await;

        assert_eq!(api.calls(), vec!["create", "hit", "get"]);
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.samples(Category::Set).len(), 0);
        assert_eq!(snapshot.errors(Category::Set), 0);
    }

    #[tokio::test]
    async fn info_runs_every_fifth_iteration_without_a_token() {
        let api = FakeApi {
            pre_existing: true,
            ..Default::default()
        };
        let sink = MetricSink::new();

        run_iteration(
            &api,
            &wide_keyspace(),
            IterationIdentity { vu: 0, iter: 5 },
            &sink,
        )
        .await;

        assert_eq!(api.calls(), vec!["create", "hit", "get", "info"]);
    }

    #[tokio::test]
    async fn shared_counters_only_check_statuses() {
        // A narrow key space means counters are shared, so a hit value other
        // than 1 is expected nondeterminism, not an error.
        struct BusyCounter;

        #[async_trait]
        impl CounterApi for BusyCounter {
            async fn create(&self, _: &CounterRef) -> abacus_client::Result<CreateOutcome> {
                Ok(CreateOutcome::Created {
                    admin_key: "k".to_owned(),
                    value: 0,
                })
            }
            async fn hit(&self, _: &CounterRef) -> abacus_client::Result<i64> {
                Ok(7)
            }
            async fn get(&self, _: &CounterRef) -> abacus_client::Result<i64> {
                Ok(7)
            }
            async fn info(&self, _: &CounterRef) -> abacus_client::Result<CounterInfo> {
                Ok(CounterInfo {
                    exists: true,
                    value: Some(7),
                })
            }
            async fn set(
                &self,
                _: &CounterRef,
                value: i64,
                _: &AdminToken,
            ) -> abacus_client::Result<i64> {
                Ok(value)
            }
            async fn delete(&self, _: &CounterRef, _: &AdminToken) -> abacus_client::Result<()> {
                Ok(())
            }
        }

        let sink = MetricSink::new();
        let narrow = KeySpace::new(KeySpacePolicy::Narrow, 10, "test");
        run_iteration(&BusyCounter, &narrow, IterationIdentity { vu: 0, iter: 1 }, &sink).await;

        assert_eq!(sink.snapshot().total_errors(), 0);
    }
}
