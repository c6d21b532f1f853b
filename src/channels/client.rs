//! Channel client abstraction shared by the poller and the publisher.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::ChannelError;
use crate::pipeline::types::Message;

/// A resolved channel: the identifier the user gave plus the platform id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub identifier: String,
    pub chat_id: i64,
}

/// A connection to a messaging platform.
///
/// Implementations keep per-connection state (update offsets, resolved
/// channel cache), so every operation takes `&mut self`. Share a client
/// between tasks through [`SharedChannelClient`].
#[async_trait]
pub trait ChannelClient: Send {
    /// Platform name used in logs and errors.
    fn name(&self) -> &str;

    /// Establish the session. Called once at startup.
    async fn connect(&mut self) -> Result<(), ChannelError>;

    fn is_connected(&self) -> bool;

    /// Resolve a user-facing identifier (`@name`, link or numeric id).
    async fn resolve_channel(&mut self, identifier: &str) -> Result<ChannelHandle, ChannelError>;

    /// Most recent message in `channel`, if any is known.
    async fn fetch_latest(
        &mut self,
        channel: &ChannelHandle,
    ) -> Result<Option<Message>, ChannelError>;

    /// Post `text` to `channel`.
    async fn send(&mut self, channel: &ChannelHandle, text: &str) -> Result<(), ChannelError>;
}

/// Cloneable handle that serializes access to one [`ChannelClient`].
///
/// The poller and the publisher run concurrently but never touch the
/// underlying connection at the same time.
#[derive(Clone)]
pub struct SharedChannelClient {
    inner: Arc<Mutex<Box<dyn ChannelClient>>>,
}

impl SharedChannelClient {
    pub fn new(client: impl ChannelClient + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(client))),
        }
    }

    pub async fn connect(&self) -> Result<(), ChannelError> {
        self.inner.lock().await.connect().await
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.is_connected()
    }

    /// Resolve `identifier` and fetch its latest message.
    pub async fn fetch_latest(&self, identifier: &str) -> Result<Option<Message>, ChannelError> {
        let mut client = self.inner.lock().await;
        ensure_connected(client.as_ref())?;
        let channel = client.resolve_channel(identifier).await?;
        client.fetch_latest(&channel).await
    }

    /// Resolve `identifier` and post `text` to it.
    pub async fn send(&self, identifier: &str, text: &str) -> Result<(), ChannelError> {
        let mut client = self.inner.lock().await;
        ensure_connected(client.as_ref())?;
        let channel = client.resolve_channel(identifier).await?;
        client.send(&channel, text).await
    }
}

fn ensure_connected(client: &dyn ChannelClient) -> Result<(), ChannelError> {
    if client.is_connected() {
        Ok(())
    } else {
        Err(ChannelError::NotConnected {
            name: client.name().to_string(),
        })
    }
}
