//! State publishing infrastructure.
//!
//! The pipeline hands a resolved state string (or the absence marker) to a
//! [`StatePublisher`] exactly once per card event.  Delivery guarantees —
//! retry, ordering, at-least/most-once — belong to the implementation, not
//! to the pipeline; the production MQTT client already redelivers QoS 1
//! publishes on reconnect.

use async_trait::async_trait;
use thiserror::Error;

pub mod mock;
pub mod mqtt;

/// Error type for state publishing.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The MQTT client rejected the publish request.
    #[error("mqtt request failed: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// The publish was refused by the sink (used by test doubles).
    #[error("publish rejected: {0}")]
    Rejected(String),
}

/// Delivers resolved tag states to the outside world.
///
/// `Some(state)` publishes a tag state; `None` publishes the absence
/// marker (no tag present).
#[async_trait]
pub trait StatePublisher: Send + Sync {
    /// Publishes one state.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the sink refuses the request.  The
    /// caller logs and drops the error; it never retries.
    async fn publish_state(&self, state: Option<&str>) -> Result<(), PublishError>;
}
