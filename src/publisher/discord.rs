// src/publisher/discord.rs

//! Discord REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{BotConfig, ChannelId, CrawlerConfig, ServerId};
use crate::publisher::{ChatDirectory, Publisher, parse_channel_reference};

/// Channel types that accept ordinary text messages.
const TEXT_CHANNEL_TYPES: [u8; 2] = [0, 5];

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    id: String,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
}

impl ChannelInfo {
    fn is_text(&self) -> bool {
        TEXT_CHANNEL_TYPES.contains(&self.kind)
    }
}

/// Bot-token authenticated client for the Discord HTTP API.
pub struct DiscordClient {
    client: Client,
    api_base: Url,
    token: String,
}

impl DiscordClient {
    pub fn new(bot: &BotConfig, crawler: &CrawlerConfig) -> Result<Self> {
        let token = bot.token.trim();
        if token.is_empty() {
            return Err(AppError::config("Discord client requires a bot token"));
        }

        let mut base = bot.api_base.clone();
        if !base.ends_with('/') {
            base.push('/');
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(crawler.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: Url::parse(&base)?,
            token: token.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.api_base.join(path)?)
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn get_channel(&self, id: &str) -> Result<Option<ChannelInfo>> {
        let url = self.endpoint(&format!("channels/{id}"))?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(AppError::not_found(format!(
                "channel {id} lookup failed with status {status}"
            ))),
        }
    }

    async fn list_server_channels(&self, server: &ServerId) -> Result<Vec<ChannelInfo>> {
        let url = self.endpoint(&format!("guilds/{server}/channels"))?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Publisher for DiscordClient {
    async fn send(&self, channel: &ChannelId, message: &str) -> Result<()> {
        let url = self.endpoint(&format!("channels/{channel}/messages"))?;
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&json!({
                "content": message,
                "allowed_mentions": { "parse": ["users"] },
            }))
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(AppError::publish(channel.as_str(), format!("{status} {body}")))
    }
}

#[async_trait]
impl ChatDirectory for DiscordClient {
    /// Accepts `<#id>`, a bare id, or a channel name.
    async fn resolve_channel(
        &self,
        server: &ServerId,
        reference: &str,
    ) -> Result<Option<ChannelId>> {
        if let Some(id) = parse_channel_reference(reference) {
            let channel = self.get_channel(id).await?;
            return Ok(channel
                .filter(|c| c.is_text() && c.guild_id.as_deref() == Some(server.as_str()))
                .map(|c| ChannelId::new(c.id)));
        }

        let name = reference.trim().trim_start_matches('#');
        let channels = self.list_server_channels(server).await?;
        Ok(channels
            .into_iter()
            .find(|c| c.is_text() && c.name.as_deref() == Some(name))
            .map(|c| ChannelId::new(c.id)))
    }
}
