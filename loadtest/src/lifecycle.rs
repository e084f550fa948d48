//! Setup and teardown around the load phase.

use std::time::Instant;

use anyhow::Context;
use tracing::{debug, info};

use crate::credentials::{self, AdminToken};
use crate::keyspace::CounterRef;
use crate::metrics::{Category, MetricSink, Outcome};
use crate::remote::CounterApi;

/// The phases a run moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing has happened yet.
    NotStarted,
    /// The shared baseline counter is being provisioned.
    SettingUp,
    /// Load is being generated.
    Running,
    /// The shared counter is being cleaned up.
    TearingDown,
    /// The run is over.
    Done,
}

/// Shared per-run state established by setup and consumed by teardown.
///
/// The admin key is written exactly once, before any lane starts, and is
/// read-only afterwards.
#[derive(Debug)]
pub struct RunContext {
    /// The shared baseline counter provisioned for this run.
    pub shared: CounterRef,
    /// The admin key captured when the shared counter was created, if any.
    pub shared_admin_key: Option<AdminToken>,
}

/// Runs setup exactly once before load starts and teardown exactly once
/// after the scheduler has drained.
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Lifecycle {
    /// Creates a controller in the [`LifecycleState::NotStarted`] state.
    pub fn new() -> Self {
        Self {
            state: LifecycleState::NotStarted,
        }
    }

    /// The current phase.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Provisions the shared baseline counter and captures its admin key.
    ///
    /// A failure here aborts the run before any load is generated; driving
    /// load against an unprovisioned baseline would only produce noise.
    pub async fn setup(
        &mut self,
        api: &dyn CounterApi,
        namespace: &str,
    ) -> anyhow::Result<RunContext> {
        debug_assert_eq!(self.state, LifecycleState::NotStarted);
        self.state = LifecycleState::SettingUp;

        // the namespace is already unique per run, so a fixed key is fine
        let shared = CounterRef {
            namespace: namespace.to_owned(),
            key: "shared-counter".to_owned(),
        };
        info!(namespace = %shared.namespace, key = %shared.key, "provisioning the shared counter");

        let outcome = api
            .create(&shared)
            .await
            .context("failed to provision the shared counter")?;
        let shared_admin_key = credentials::from_create(&outcome);

        self.state = LifecycleState::Running;
        Ok(RunContext {
            shared,
            shared_admin_key,
        })
    }

    /// Deletes the shared counter, best-effort.
    ///
    /// A successful delete is timed into the sink; a failed one only becomes
    /// a warning for the report, never a failed check, so cleanup failure
    /// cannot overturn the run's otherwise-computed verdict.
    pub async fn teardown(
        &mut self,
        api: &dyn CounterApi,
        context: &RunContext,
        sink: &MetricSink,
    ) -> Option<String> {
        debug_assert_eq!(self.state, LifecycleState::Running);
        self.state = LifecycleState::TearingDown;

        let warning = match &context.shared_admin_key {
            Some(token) => {
                let start = Instant::now();
                match api.delete(&context.shared, token).await {
                    Ok(()) => {
                        sink.record(Category::Delete, Outcome::Ok, start.elapsed());
                        None
                    }
                    Err(err) => Some(format!(
                        "failed to delete shared counter {}/{}: {err}",
                        context.shared.namespace, context.shared.key
                    )),
                }
            }
            None => {
                // without an admin key there is nothing we are allowed to delete
                debug!("no admin key was captured for the shared counter, skipping delete");
                None
            }
        };

        self.state = LifecycleState::Done;
        warning
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
