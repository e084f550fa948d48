//! # Abacus Client
//!
//! A typed async client for an Abacus-style counter service. Counters live
//! under a `{namespace}/{key}` pair; creating one returns an admin key that
//! authorizes the privileged `set` and `delete` operations on that counter.
//!
//! ## Usage
//!
//! ```no_run
//! use abacus_client::{Client, CreateOutcome};
//!
//! #[tokio::main]
//! # async fn main() -> abacus_client::Result<()> {
//! let client = Client::builder("http://localhost:8080/").build()?;
//!
//! if let CreateOutcome::Created { admin_key, .. } = client.create("test", "hits").await? {
//!     let value = client.hit("test", "hits").await?;
//!     assert_eq!(value, 1);
//!     client.delete("test", "hits", &admin_key).await?;
//! }
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod client;
mod error;

pub use client::*;
pub use error::*;
