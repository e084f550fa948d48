use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

const USER_AGENT: &str = concat!("abacus-client/", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
struct ClientBuilderInner {
    service_url: Url,
    reqwest_builder: reqwest::ClientBuilder,
}

/// Builder to create a [`Client`].
#[must_use]
#[derive(Debug)]
pub struct ClientBuilder(crate::Result<ClientBuilderInner>);

impl ClientBuilder {
    /// Creates a new [`ClientBuilder`], configured with the given `service_url`.
    pub fn new(service_url: impl reqwest::IntoUrl) -> Self {
        let service_url = match service_url.into_url() {
            Ok(url) => url,
            Err(err) => return Self(Err(err.into())),
        };

        let reqwest_builder = reqwest::Client::builder()
            // Conservative defaults for a service that is expected to answer
            // in well under a second; can be overridden by the caller.
            .connect_timeout(Duration::from_secs(1))
            .timeout(Duration::from_secs(5))
            .user_agent(USER_AGENT);

        Self(Ok(ClientBuilderInner {
            service_url,
            reqwest_builder,
        }))
    }

    /// Sets both the connect and the total request timeout for the
    /// [`reqwest::Client`]. For more fine-grained configuration, use
    /// [`Self::configure_reqwest`].
    pub fn timeout(self, timeout: Duration) -> Self {
        let Ok(inner) = self.0 else { return self };
        Self(Ok(ClientBuilderInner {
            service_url: inner.service_url,
            reqwest_builder: inner
                .reqwest_builder
                .connect_timeout(timeout)
                .timeout(timeout),
        }))
    }

    /// Calls the closure with the underlying [`reqwest::ClientBuilder`].
    pub fn configure_reqwest<F>(self, closure: F) -> Self
    where
        F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder,
    {
        let Ok(inner) = self.0 else { return self };
        Self(Ok(ClientBuilderInner {
            service_url: inner.service_url,
            reqwest_builder: closure(inner.reqwest_builder),
        }))
    }

    /// Returns a [`Client`] that uses this [`ClientBuilder`] configuration.
    ///
    /// # Errors
    ///
    /// This method fails if:
    /// - the given `service_url` is invalid
    /// - the [`reqwest::Client`] fails to build. Refer to [`reqwest::ClientBuilder::build`] for
    ///   more information on when this can happen.
    pub fn build(self) -> crate::Result<Client> {
        self.0.and_then(|inner| {
            let mut service_url = inner.service_url;
            // Operation paths are joined onto the base, which requires a
            // trailing slash to not swallow the last path segment.
            if !service_url.path().ends_with('/') {
                let path = format!("{}/", service_url.path());
                service_url.set_path(&path);
            }

            Ok(Client {
                inner: Arc::new(ClientInner {
                    reqwest: inner.reqwest_builder.build()?,
                    service_url,
                }),
            })
        })
    }
}

/// The outcome of a `create` call.
///
/// Both variants count as success: a counter that already exists is a normal
/// condition when keys are reused across iterations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The counter was created; the service issued an admin key for it.
    Created {
        /// The admin key authorizing `set` and `delete` on this counter.
        admin_key: String,
        /// The counter's initial value.
        value: i64,
    },
    /// A counter with this namespace/key already exists (HTTP 409).
    AlreadyExists,
}

/// Metadata about a counter, as reported by the `info` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterInfo {
    /// Whether the counter exists.
    pub exists: bool,
    /// The counter's current value, when it exists.
    pub value: Option<i64>,
}

#[derive(Debug)]
struct ClientInner {
    reqwest: reqwest::Client,
    service_url: Url,
}

/// An async client to interact with a counter service.
///
/// The client is cheap to clone and can be shared across tasks.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug, Deserialize)]
struct CreateBody {
    admin_key: Option<String>,
    value: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ValueBody {
    value: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct InfoBody {
    exists: Option<bool>,
    value: Option<i64>,
}

impl Client {
    /// Creates a new [`ClientBuilder`], configured with the given `service_url`.
    pub fn builder(service_url: impl reqwest::IntoUrl) -> ClientBuilder {
        ClientBuilder::new(service_url)
    }

    fn op_url(&self, operation: &str, namespace: &str, key: &str) -> crate::Result<Url> {
        let url = self
            .inner
            .service_url
            .join(&format!("{operation}/{namespace}/{key}"))?;
        Ok(url)
    }

    /// Creates the counter `{namespace}/{key}` with an initial value of 0.
    ///
    /// Answers [`CreateOutcome::AlreadyExists`] when the key is taken; any
    /// status other than 201 or 409 is an error.
    pub async fn create(&self, namespace: &str, key: &str) -> crate::Result<CreateOutcome> {
        self.create_inner(namespace, key, None).await
    }

    /// Creates the counter `{namespace}/{key}`, seeded with `initializer`.
    pub async fn create_with_value(
        &self,
        namespace: &str,
        key: &str,
        initializer: i64,
    ) -> crate::Result<CreateOutcome> {
        self.create_inner(namespace, key, Some(initializer)).await
    }

    async fn create_inner(
        &self,
        namespace: &str,
        key: &str,
        initializer: Option<i64>,
    ) -> crate::Result<CreateOutcome> {
        let mut url = self.op_url("create", namespace, key)?;
        if let Some(initializer) = initializer {
            url.query_pairs_mut()
                .append_pair("initializer", &initializer.to_string());
        }

        let response = self.inner.reqwest.post(url).send().await?;
        match response.status() {
            StatusCode::CREATED => {
                let body: CreateBody = response.json().await?;
                let admin_key = body.admin_key.ok_or(crate::Error::MissingField {
                    operation: "create",
                    field: "admin_key",
                })?;
                Ok(CreateOutcome::Created {
                    admin_key,
                    value: body.value.unwrap_or(0),
                })
            }
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            status => Err(crate::Error::UnexpectedStatus {
                operation: "create",
                status,
            }),
        }
    }

    /// Increments the counter and returns its new value.
    pub async fn hit(&self, namespace: &str, key: &str) -> crate::Result<i64> {
        self.value_op("hit", namespace, key).await
    }

    /// Returns the counter's current value.
    pub async fn get(&self, namespace: &str, key: &str) -> crate::Result<i64> {
        self.value_op("get", namespace, key).await
    }

    async fn value_op(
        &self,
        operation: &'static str,
        namespace: &str,
        key: &str,
    ) -> crate::Result<i64> {
        let url = self.op_url(operation, namespace, key)?;
        let response = self.inner.reqwest.get(url).send().await?;
        match response.status() {
            StatusCode::OK => {
                let body: ValueBody = response.json().await?;
                body.value.ok_or(crate::Error::MissingField {
                    operation,
                    field: "value",
                })
            }
            StatusCode::NOT_FOUND => Err(crate::Error::NotFound { operation }),
            status => Err(crate::Error::UnexpectedStatus { operation, status }),
        }
    }

    /// Returns metadata about the counter.
    pub async fn info(&self, namespace: &str, key: &str) -> crate::Result<CounterInfo> {
        let url = self.op_url("info", namespace, key)?;
        let response = self.inner.reqwest.get(url).send().await?;
        match response.status() {
            StatusCode::OK => {
                let body: InfoBody = response.json().await?;
                let exists = body.exists.ok_or(crate::Error::MissingField {
                    operation: "info",
                    field: "exists",
                })?;
                Ok(CounterInfo {
                    exists,
                    value: body.value,
                })
            }
            status => Err(crate::Error::UnexpectedStatus {
                operation: "info",
                status,
            }),
        }
    }

    /// Sets the counter to `value` and returns the value the service echoes
    /// back. Requires the counter's admin key.
    pub async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: i64,
        admin_key: &str,
    ) -> crate::Result<i64> {
        let mut url = self.op_url("set", namespace, key)?;
        url.query_pairs_mut()
            .append_pair("value", &value.to_string());

        let response = self
            .inner
            .reqwest
            .post(url)
            .bearer_auth(admin_key)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => {
                let body: ValueBody = response.json().await?;
                body.value.ok_or(crate::Error::MissingField {
                    operation: "set",
                    field: "value",
                })
            }
            StatusCode::UNAUTHORIZED => Err(crate::Error::Unauthorized { operation: "set" }),
            StatusCode::NOT_FOUND => Err(crate::Error::NotFound { operation: "set" }),
            status => Err(crate::Error::UnexpectedStatus {
                operation: "set",
                status,
            }),
        }
    }

    /// Permanently deletes the counter. Requires the counter's admin key.
    pub async fn delete(&self, namespace: &str, key: &str, admin_key: &str) -> crate::Result<()> {
        let url = self.op_url("delete", namespace, key)?;
        let response = self
            .inner
            .reqwest
            .post(url)
            .bearer_auth(admin_key)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::UNAUTHORIZED => Err(crate::Error::Unauthorized {
                operation: "delete",
            }),
            StatusCode::NOT_FOUND => Err(crate::Error::NotFound {
                operation: "delete",
            }),
            status => Err(crate::Error::UnexpectedStatus {
                operation: "delete",
                status,
            }),
        }
    }
}
