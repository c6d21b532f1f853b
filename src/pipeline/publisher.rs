//! Publisher — posts rewritten text to the destination channel.

use tracing::{error, info};

use crate::channels::SharedChannelClient;
use crate::error::ChannelError;

/// Sends final text through the shared channel client.
#[derive(Clone)]
pub struct Publisher {
    client: SharedChannelClient,
}

impl Publisher {
    pub fn new(client: SharedChannelClient) -> Self {
        Self { client }
    }

    /// Post `text` to `destination`. Failures are logged and returned;
    /// the caller decides what a failed publish means.
    pub async fn publish(&self, destination: &str, text: &str) -> Result<(), ChannelError> {
        match self.client.send(destination, text).await {
            Ok(()) => {
                info!(destination = %destination, chars = text.chars().count(), "Published message");
                Ok(())
            }
            Err(e) => {
                error!(destination = %destination, error = %e, "Failed to publish message");
                Err(e)
            }
        }
    }
}
