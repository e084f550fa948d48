//! This is a load-testing library which drives synthetic traffic against an
//! Abacus-style counter service and verifies both latency and functional
//! correctness under concurrent load.
//!
//! Every iteration walks one counter through a
//! `create → hit → get → info → set` sequence, with each step individually
//! timed and checked. Iterations are dispatched by one of two scheduling
//! policies: *closed-loop* (a fixed pool of lanes repeating iterations
//! back-to-back) or *open-loop* (a constant arrival rate over a bounded lane
//! pool, where pool exhaustion is reported as dropped iterations).
//!
//! After the run, the aggregated metrics are compared against declared
//! thresholds such as `p(95)<250` or `count<10`, yielding the final verdict.
//!
//! A configuration file looks like this:
//!
//! ```yaml
//! remote: http://localhost:8080
//! prefix: loadtest
//! duration: 30s
//! schedule:
//!   mode: closed-loop
//!   lanes: 10
//! keyspace:
//!   policy: narrow
//!   size: 10
//! thresholds:
//!   - metric: create
//!     predicate: p(95)<250
//!   - metric: hit_errors
//!     predicate: count<10
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod credentials;
pub mod harness;
pub mod keyspace;
pub mod lifecycle;
pub mod metrics;
pub mod remote;
pub mod scenario;
pub mod schedule;
pub mod thresholds;

pub use crate::config::Config;
pub use crate::harness::{RunReport, run};
pub use crate::remote::CounterApi;
