//! Offline stand-ins for the chat platform, used by dry runs and the CLI.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChannelId, ServerId};
use crate::publisher::{ChatDirectory, Publisher, parse_channel_reference};

/// Writes each message to the log instead of a chat channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePublisher;

#[async_trait]
impl Publisher for ConsolePublisher {
    async fn send(&self, channel: &ChannelId, message: &str) -> Result<()> {
        log::info!("[dry-run] -> #{}\n{}", channel, message);
        Ok(())
    }
}

/// Accepts any `<#id>` or numeric id without asking the platform.
///
/// Channel names cannot be resolved offline.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineDirectory;

#[async_trait]
impl ChatDirectory for OfflineDirectory {
    async fn resolve_channel(
        &self,
        _server: &ServerId,
        reference: &str,
    ) -> Result<Option<ChannelId>> {
        Ok(parse_channel_reference(reference).map(ChannelId::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_directory_accepts_ids_only() {
        let directory = OfflineDirectory;
        let server = ServerId::new("1");

        assert_eq!(
            directory.resolve_channel(&server, "<#55>").await.unwrap(),
            Some(ChannelId::new("55"))
        );
        assert_eq!(directory.resolve_channel(&server, "ads").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_console_publisher_never_fails() {
        assert!(
            ConsolePublisher
                .send(&ChannelId::new("1"), "hello")
                .await
                .is_ok()
        );
    }
}
