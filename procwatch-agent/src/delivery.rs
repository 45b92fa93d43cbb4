//! Snapshot delivery to the collector
//!
//! Handles:
//! - Timeout-bounded HTTP POST with the shared credential header
//! - Bounded retries with linear backoff (`base × attempt`)
//! - Converting every failure into a logged outcome, never an error

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::snapshot::Snapshot;

/// Header carrying the shared credential
pub const API_KEY_HEADER: &str = "API-Key";

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request timed out")]
    Timeout,
    #[error("collector answered with status {0}")]
    Status(u16),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result of one `deliver` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Dropped { attempts: u32 },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// One submission attempt
pub trait Transport: Send + Sync {
    fn send(&self, snapshot: &Snapshot) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

impl<T: Transport> Transport for &T {
    fn send(&self, snapshot: &Snapshot) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        (**self).send(snapshot)
    }
}

/// reqwest transport posting JSON to the collector
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("procwatch-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, snapshot: &Snapshot) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        async move {
            let response = self
                .client
                .post(&self.url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(snapshot)
                .send()
                .await
                .map_err(|e| if e.is_timeout() { DeliveryError::Timeout } else { DeliveryError::Http(e) })?;

            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), %body, "collector response");

            if status.is_success() {
                Ok(())
            } else {
                Err(DeliveryError::Status(status.as_u16()))
            }
        }
    }
}

/// Retrying delivery client
pub struct DeliveryClient<T, C> {
    transport: T,
    clock: C,
    max_retries: u32,
    backoff: Duration,
}

impl<T: Transport, C: Clock> DeliveryClient<T, C> {
    /// `max_retries` below 1 still makes one attempt.
    pub fn new(transport: T, clock: C, max_retries: u32, backoff: Duration) -> Self {
        Self {
            transport,
            clock,
            max_retries: max_retries.max(1),
            backoff,
        }
    }

    /// `base × attempt`, saturating at `Duration::MAX`
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.checked_mul(attempt).unwrap_or(Duration::MAX)
    }

    pub async fn deliver(&self, snapshot: &Snapshot) -> DeliveryOutcome {
        let attempts = self.max_retries;

        for attempt in 1..=attempts {
            match self.transport.send(snapshot).await {
                Ok(()) => {
                    info!(
                        hostname = %snapshot.hostname,
                        processes = snapshot.processes.len(),
                        attempt,
                        "snapshot delivered"
                    );
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(e) => {
                    warn!(attempt, max_attempts = attempts, error = %e, "delivery attempt failed");
                    if attempt < attempts {
                        self.clock.sleep(self.backoff_for(attempt)).await;
                    }
                }
            }
        }

        error!(
            hostname = %snapshot.hostname,
            attempts,
            "delivery failed, snapshot dropped"
        );
        DeliveryOutcome::Dropped { attempts }
    }
}
