//! Outbound chat-platform ports.
//!
//! The pipeline hands finished messages to a [`Publisher`]; command handlers
//! resolve user-supplied channel references through a [`ChatDirectory`].
//! [`DiscordClient`] implements both over the REST API;
//! [`ConsolePublisher`] and [`OfflineDirectory`] stand in for it offline.

mod console;
mod discord;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::Result;
use crate::models::{ChannelId, ServerId, UserId};

pub use console::{ConsolePublisher, OfflineDirectory};
pub use discord::DiscordClient;

/// Delivers messages to chat channels.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Post `message` to `channel`.
    async fn send(&self, channel: &ChannelId, message: &str) -> Result<()>;

    /// Token that pings `user` when embedded in a message.
    fn mention(&self, user: &UserId) -> String {
        format!("<@{user}>")
    }
}

/// Looks up chat entities on behalf of command handlers.
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    /// Resolve a channel reference typed by a user.
    ///
    /// Returns `Ok(None)` when no text channel of `server` matches.
    async fn resolve_channel(&self, server: &ServerId, reference: &str)
    -> Result<Option<ChannelId>>;
}

/// Clickable reference to a channel.
pub fn channel_mention(channel: &ChannelId) -> String {
    format!("<#{channel}>")
}

static MASS_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(everyone|here|[!&]?[0-9]{17,20})").expect("valid mention regex")
});

/// Defuse `@everyone`, `@here` and raw id mentions by inserting a
/// zero-width space after the `@`.
pub fn escape_mentions(text: &str) -> String {
    MASS_MENTION.replace_all(text, "@\u{200b}$1").into_owned()
}

/// Pull a channel id out of `<#id>` or a bare numeric id.
pub fn parse_channel_reference(reference: &str) -> Option<&str> {
    let reference = reference.trim();
    let id = reference
        .strip_prefix("<#")
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(reference);
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then_some(id)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::error::AppError;

    /// Records every message; channels listed in `failing` reject sends.
    #[derive(Default)]
    pub(crate) struct RecordingPublisher {
        pub(crate) sent: Mutex<Vec<(ChannelId, String)>>,
        pub(crate) failing: Mutex<Vec<ChannelId>>,
    }

    impl RecordingPublisher {
        pub(crate) fn messages(&self) -> Vec<(ChannelId, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn send(&self, channel: &ChannelId, message: &str) -> Result<()> {
            if self.failing.lock().unwrap().contains(channel) {
                return Err(AppError::publish(channel.as_str(), "403 Forbidden"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((channel.clone(), message.to_string()));
            Ok(())
        }
    }

    /// Directory over a fixed `(server, name) -> channel` table.
    #[derive(Default)]
    pub(crate) struct StaticDirectory {
        pub(crate) channels: HashMap<(ServerId, String), ChannelId>,
    }

    impl StaticDirectory {
        pub(crate) fn with(mut self, server: &str, name: &str, id: &str) -> Self {
            self.channels
                .insert((ServerId::new(server), name.to_string()), ChannelId::new(id));
            self
        }
    }

    #[async_trait]
    impl ChatDirectory for StaticDirectory {
        async fn resolve_channel(
            &self,
            server: &ServerId,
            reference: &str,
        ) -> Result<Option<ChannelId>> {
            let by_id = parse_channel_reference(reference).and_then(|id| {
                self.channels
                    .iter()
                    .find(|((s, _), c)| s == server && c.as_str() == id)
                    .map(|(_, c)| c.clone())
            });
            Ok(by_id.or_else(|| {
                self.channels
                    .get(&(server.clone(), reference.trim().to_string()))
                    .cloned()
            }))
        }
    }

    #[test]
    fn test_parse_channel_reference() {
        assert_eq!(parse_channel_reference("<#1234>"), Some("1234"));
        assert_eq!(parse_channel_reference(" 1234 "), Some("1234"));
        assert_eq!(parse_channel_reference("<#>"), None);
        assert_eq!(parse_channel_reference("ads"), None);
        assert_eq!(parse_channel_reference("<#12a4>"), None);
    }

    #[test]
    fn test_escape_mentions() {
        assert_eq!(escape_mentions("@everyone bike"), "@\u{200b}everyone bike");
        assert_eq!(
            escape_mentions("<@123456789012345678>"),
            "<@\u{200b}123456789012345678>"
        );
        assert_eq!(escape_mentions("me@home"), "me@home");
    }

    #[test]
    fn test_default_mention_format() {
        let publisher = RecordingPublisher::default();
        assert_eq!(publisher.mention(&UserId::new("42")), "<@42>");
        assert_eq!(channel_mention(&ChannelId::new("7")), "<#7>");
    }
}
