use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;

use crate::directory::Directory;
use crate::identity::{Identity, Profile};
use crate::records::SharedFileRecord;
use crate::relay::MemoryRelay;
use crate::sharing::{ReceivedFile, SentShare, ShareRequest, SharingConfig, SharingCoordinator};

/// One user on a `TestNetwork`, with its own identity and coordinator
#[derive(Debug, Clone)]
pub struct TestUser {
    coordinator: SharingCoordinator<MemoryRelay>,
}

impl TestUser {
    pub fn new(user_id: String, relay: MemoryRelay, config: SharingConfig) -> Self {
        let profile = Profile::new(user_id.clone(), format!("{}@example.com", user_id));
        let identity = Arc::new(Identity::generate(user_id, profile));
        Self {
            coordinator: SharingCoordinator::new(relay, identity, config),
        }
    }

    pub fn user_id(&self) -> &str {
        self.coordinator.identity().user_id()
    }

    pub fn identity(&self) -> &Identity {
        self.coordinator.identity()
    }

    pub fn coordinator(&self) -> &SharingCoordinator<MemoryRelay> {
        &self.coordinator
    }

    pub fn directory(&self) -> &Directory<MemoryRelay> {
        self.coordinator.directory()
    }

    pub fn relay(&self) -> &MemoryRelay {
        self.coordinator.relay()
    }

    pub async fn publish(&self) -> Result<()> {
        self.directory().publish(self.identity()).await?;
        Ok(())
    }

    pub async fn send_bytes(
        &self,
        recipient_id: &str,
        file_name: &str,
        content: impl Into<Bytes>,
    ) -> Result<SentShare> {
        Ok(self
            .coordinator
            .send(ShareRequest::new(recipient_id, file_name, content))
            .await?)
    }

    pub async fn send_text(&self, recipient_id: &str, file_name: &str, text: &str) -> Result<SentShare> {
        self.send_bytes(recipient_id, file_name, Bytes::copy_from_slice(text.as_bytes()))
            .await
    }

    pub async fn incoming(&self) -> Result<Vec<SharedFileRecord>> {
        Ok(self.coordinator.incoming().await?)
    }

    /// Receive every incoming file, in listing order
    pub async fn receive_all(&self) -> Result<Vec<ReceivedFile>> {
        let mut received = Vec::new();
        for record in self.incoming().await? {
            received.push(self.coordinator.receive(&record).await?);
        }
        Ok(received)
    }
}
