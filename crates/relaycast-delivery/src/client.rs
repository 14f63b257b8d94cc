//! Request sending for delivery attempts.
//!
//! The executor only sees [`RequestSender`]. [`HttpSender`] is the reqwest
//! implementation: it POSTs the event as JSON to the target's receive path and
//! normalizes every transport outcome into either a success response or a
//! [`FailureDescriptor`].

use std::{error::Error as _, fmt, io, time::Duration};

use relaycast_core::{DeliveryTarget, Event};
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::{
    classify::FailureDescriptor,
    error::{DeliveryError, Result},
};

/// Sends one event to one target.
///
/// Implementations are shared by every concurrent executor and must not keep
/// per-call state.
#[async_trait::async_trait]
pub trait RequestSender: Send + Sync + fmt::Debug {
    /// Sends `event` to `target`. `attempt` is 1-based.
    ///
    /// # Errors
    ///
    /// Returns a descriptor for any outcome other than a 2xx response.
    async fn send(
        &self,
        target: &DeliveryTarget,
        event: &Event,
        attempt: u32,
    ) -> std::result::Result<SendResponse, FailureDescriptor>;
}

/// Successful response from a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResponse {
    /// HTTP status code (2xx).
    pub status: u16,
    /// Time from request start to response headers.
    pub duration: Duration,
}

/// Configuration for the HTTP sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// Path appended to every target address.
    pub receive_path: String,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            receive_path: "/receive".to_string(),
            user_agent: concat!("relaycast/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 3,
        }
    }
}

/// reqwest-backed sender.
///
/// One instance holds one connection pool and is shared across all targets.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpSender {
    /// Creates a sender with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built or the receive path is not absolute.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if !config.receive_path.starts_with('/') {
            return Err(DeliveryError::configuration(format!(
                "receive path must start with '/': {}",
                config.receive_path
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a sender with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Full URL an event for `target` is posted to.
    pub fn endpoint_url(&self, target: &DeliveryTarget) -> String {
        format!("{}{}", target.as_str().trim_end_matches('/'), self.config.receive_path)
    }
}

#[async_trait::async_trait]
impl RequestSender for HttpSender {
    async fn send(
        &self,
        target: &DeliveryTarget,
        event: &Event,
        attempt: u32,
    ) -> std::result::Result<SendResponse, FailureDescriptor> {
        let url = self.endpoint_url(target);
        let span = info_span!("http_send", url = %url, event_id = %event.id, attempt);

        async move {
            let start = tokio::time::Instant::now();

            let result = self
                .client
                .post(&url)
                .json(event)
                .header("X-Relaycast-Event-Id", event.id.to_string())
                .header("X-Relaycast-Delivery-Attempt", attempt.to_string())
                .send()
                .await;

            let duration = start.elapsed();

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(
                        duration_ms = duration.as_millis(),
                        error = %e,
                        "request failed"
                    );
                    return Err(describe_transport_error(&e));
                },
            };

            let status = response.status();
            tracing::debug!(
                status = status.as_u16(),
                duration_ms = duration.as_millis(),
                "received response"
            );

            if status.is_success() {
                Ok(SendResponse { status: status.as_u16(), duration })
            } else {
                Err(FailureDescriptor::status(status.as_u16()))
            }
        }
        .instrument(span)
        .await
    }
}

/// Maps a reqwest error onto the failure taxonomy.
fn describe_transport_error(err: &reqwest::Error) -> FailureDescriptor {
    if err.is_timeout() {
        return FailureDescriptor::Timeout;
    }
    if err.is_connect() {
        if is_connection_refused(err) {
            return FailureDescriptor::refused();
        }
        return FailureDescriptor::unreachable();
    }
    FailureDescriptor::other(error_chain(err))
}

fn is_connection_refused(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        if cause.to_string().to_lowercase().contains("connection refused") {
            return true;
        }
        source = cause.source();
    }
    false
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
