//! MQTT implementation of the state publisher.
//!
//! Tag states are published retained at QoS 1 to a single state topic, so
//! subscribers joining late still see the current tag.  The absence marker
//! is an empty retained payload, which clears the retained state on the
//! broker.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::{debug, trace, warn};

use crate::infrastructure::storage::config::MqttConfig;

use super::{PublishError, StatePublisher};

/// Delay before re-polling the event loop after a connection error.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(3);

/// Publishes tag states to an MQTT broker.
pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
}

impl MqttPublisher {
    /// Creates the client and spawns the background event-loop task.
    ///
    /// The connection itself is established lazily by the event loop;
    /// rumqttc reconnects on the next poll after an error, so a dead
    /// broker degrades to logged warnings rather than failing startup.
    pub fn start(cfg: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, mut event_loop) = AsyncClient::new(options, 16);

        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(event) => trace!("mqtt event: {event:?}"),
                    Err(e) => {
                        warn!("mqtt connection error: {e}");
                        tokio::time::sleep(RECONNECT_BACKOFF).await;
                    }
                }
            }
        });

        Self {
            client,
            topic: cfg.state_topic.clone(),
        }
    }
}

#[async_trait]
impl StatePublisher for MqttPublisher {
    async fn publish_state(&self, state: Option<&str>) -> Result<(), PublishError> {
        let payload = state.unwrap_or("");
        debug!("publishing tag state {payload:?} to {}", self.topic);
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, true, payload)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::config::MqttConfig;

    #[tokio::test]
    async fn test_publisher_starts_without_a_broker() {
        // Creating the client must not require a reachable broker; the
        // event loop only warns until one appears.
        let cfg = MqttConfig::default();
        let publisher = MqttPublisher::start(&cfg);
        assert_eq!(publisher.topic, cfg.state_topic);
    }
}
