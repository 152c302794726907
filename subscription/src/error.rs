//! Error types for the subscription lifecycle.

use thiserror::Error;

/// Errors from subscription operations
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// `renew` was called before any successful `subscribe`. This is a
    /// caller-ordering bug, surfaced without issuing any network request.
    #[error("cannot renew a subscription before subscribing")]
    NotSubscribed,

    /// The remote answered 412: it no longer recognizes the subscription id.
    /// The renew path recovers from this internally by re-subscribing.
    #[error("device does not recognize subscription id {sid:?}")]
    PreconditionFailed {
        /// The subscription id the request carried, if any
        sid: Option<String>,
    },

    /// The remote answered with a non-success status. Carries everything
    /// needed to diagnose the failure.
    #[error("request to {uri} with headers {headers:?} failed with status {status}: {body}")]
    RequestFailed {
        /// The target subscribe URI
        uri: String,
        /// The headers the request was sent with
        headers: Vec<(String, String)>,
        /// HTTP status code of the response
        status: u16,
        /// Response body text
        body: String,
    },

    /// A transport-level failure before any HTTP status was received
    #[error("network error: {0}")]
    Network(String),

    /// The SUBSCRIBE response did not carry a `SID` header
    #[error("SUBSCRIBE response is missing the SID header")]
    MissingSid,

    /// Callback registry cleanup failed, signalling a lifecycle bug
    #[error(transparent)]
    Registry(#[from] gena_server::RegistryError),
}

/// Result type alias for subscription operations
pub type Result<T> = std::result::Result<T, SubscriptionError>;
