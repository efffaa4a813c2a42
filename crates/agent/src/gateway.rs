//! Viewer connection bridging.
//!
//! One bridge per live viewer connection. Outbound relays update events to
//! the client verbatim and in arrival order; inbound publishes client text
//! verbatim onto the session's input channel. Either direction ending tears
//! down both; the orchestrator run is unaffected.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use webpilot_core::{input_channel, updates_channel, Result};
use webpilot_store::EventChannel;

pub struct Gateway {
    events: Arc<dyn EventChannel>,
}

impl Gateway {
    pub fn new(events: Arc<dyn EventChannel>) -> Self {
        Self { events }
    }

    /// Relay between one client connection and the session's channels until
    /// the client disconnects or the updates channel closes.
    pub async fn bridge(
        &self,
        session_id: &str,
        to_client: mpsc::Sender<String>,
        mut from_client: mpsc::Receiver<String>,
    ) -> Result<()> {
        let mut updates = self.events.subscribe(&updates_channel(session_id)).await?;
        let input = input_channel(session_id);

        loop {
            tokio::select! {
                update = updates.next() => {
                    let Some(payload) = update else { break };
                    if to_client.send(payload).await.is_err() {
                        // Client gone; nothing left to relay to.
                        break;
                    }
                }
                message = from_client.recv() => {
                    let Some(text) = message else { break };
                    self.events.publish(&input, text).await?;
                }
            }
        }

        debug!(session_id, "Viewer bridge closed");
        Ok(())
    }
}
