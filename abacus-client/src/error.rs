/// Errors that can happen within the abacus-client
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error emitted from the underlying [`reqwest`] client.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Errors assembling the request URL.
    #[error("invalid service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The service answered with a status code outside the operation's contract.
    #[error("unexpected status {status} from `{operation}`")]
    UnexpectedStatus {
        /// The operation that was performed.
        operation: &'static str,
        /// The status code the service answered with.
        status: reqwest::StatusCode,
    },
    /// The response body is missing a field the contract requires.
    #[error("`{operation}` response is missing the `{field}` field")]
    MissingField {
        /// The operation that was performed.
        operation: &'static str,
        /// The missing body field.
        field: &'static str,
    },
    /// The service rejected the admin key (HTTP 401).
    #[error("`{operation}` was rejected: invalid or missing admin key")]
    Unauthorized {
        /// The operation that was performed.
        operation: &'static str,
    },
    /// The addressed counter does not exist (HTTP 404).
    #[error("`{operation}` failed: counter not found")]
    NotFound {
        /// The operation that was performed.
        operation: &'static str,
    },
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
