//! The seam between the harness and the counter service.

use abacus_client::{Client, CounterInfo, CreateOutcome};
use async_trait::async_trait;

use crate::credentials::AdminToken;
use crate::keyspace::CounterRef;

/// The counter service operations the scenario depends on.
///
/// The harness only talks to the service through this trait, so tests can
/// substitute a scripted fake without a live network dependency.
#[async_trait]
pub trait CounterApi: Send + Sync {
    /// `POST /create/{namespace}/{key}`.
    async fn create(&self, counter: &CounterRef) -> abacus_client::Result<CreateOutcome>;
    /// `GET /hit/{namespace}/{key}`.
    async fn hit(&self, counter: &CounterRef) -> abacus_client::Result<i64>;
    /// `GET /get/{namespace}/{key}`.
    async fn get(&self, counter: &CounterRef) -> abacus_client::Result<i64>;
    /// `GET /info/{namespace}/{key}`.
    async fn info(&self, counter: &CounterRef) -> abacus_client::Result<CounterInfo>;
    /// `POST /set/{namespace}/{key}?value={n}` with the admin token.
    async fn set(
        &self,
        counter: &CounterRef,
        value: i64,
        token: &AdminToken,
    ) -> abacus_client::Result<i64>;
    /// `POST /delete/{namespace}/{key}` with the admin token.
    async fn delete(&self, counter: &CounterRef, token: &AdminToken) -> abacus_client::Result<()>;
}

#[async_trait]
impl CounterApi for Client {
    async fn create(&self, counter: &CounterRef) -> abacus_client::Result<CreateOutcome> {
        Client::create(self, &counter.namespace, &counter.key).await
    }

    async fn hit(&self, counter: &CounterRef) -> abacus_client::Result<i64> {
        Client::hit(self, &counter.namespace, &counter.key).await
    }

    async fn get(&self, counter: &CounterRef) -> abacus_client::Result<i64> {
        Client::get(self, &counter.namespace, &counter.key).await
    }

    async fn info(&self, counter: &CounterRef) -> abacus_client::Result<CounterInfo> {
        Client::info(self, &counter.namespace, &counter.key).await
    }

    async fn set(
        &self,
        counter: &CounterRef,
        value: i64,
        token: &AdminToken,
    ) -> abacus_client::Result<i64> {
        Client::set(self, &counter.namespace, &counter.key, value, token.reveal()).await
    }

    async fn delete(&self, counter: &CounterRef, token: &AdminToken) -> abacus_client::Result<()> {
        Client::delete(self, &counter.namespace, &counter.key, token.reveal()).await
    }
}
