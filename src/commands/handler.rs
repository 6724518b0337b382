// src/commands/handler.rs

//! Command execution.
//!
//! Every mutation is written to the store first and mirrored into the
//! in-memory state while holding the state lock, so a tick never sees a
//! change that has not been persisted.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::sync::Mutex;

use crate::commands::{Command, parse};
use crate::error::{AppError, Result, StoreError};
use crate::models::{ChannelId, Config, ServerId, State, UserId};
use crate::publisher::{ChatDirectory, channel_mention, escape_mentions};
use crate::services::ListingFetcher;
use crate::storage::ListingStore;

/// Accepted search result URLs. Query strings are rejected.
static KIJIJI_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://www\.kijiji\.ca/b-[\w+-]+(/[\w+-]+)?(/[\w+-]+)?/[\w+-]+$")
        .expect("valid url regex")
});

mod replies {
    pub const URL_ADDED: &str = "Added URL for tracking!";
    pub const URL_ALREADY_TRACKED: &str = "This URL is already being tracked.";
    pub const URL_INVALID: &str = "Invalid Kijiji URL. Make sure you are copying the URL from \
                                   your browser and that there are no extra query params.";
    pub const URL_NO_ADS: &str =
        "Cannot parse Kijiji URL. Make sure that the URL you provided actually shows ads.";
    pub const URL_REMOVED: &str = "That URL won't be tracked anymore";
    pub const URL_NOT_TRACKED: &str = "Nothing to do. URL is not being tracked.";
    pub const URL_LIST_HEADER: &str = "List of Kijiji URLs being tracked: \n";
    pub const URL_LIST_EMPTY: &str =
        "There are no Kijiji URLs currently being tracked for this guild.";
    pub const NOTIFY_ADDED: &str =
        "Ok. You will be pinged if an ad with the provided keyword is found.";
    pub const NOTIFY_REMOVED: &str = "Ok. You will not be pinged for this keyword anymore.";
    pub const NOTIFY_UNKNOWN: &str = "You did not setup notifications for this keyword.";
    pub const NOTIFY_LIST_HEADER: &str =
        "You have setup notifications for the following keywords:\n";
    pub const NOTIFY_LIST_EMPTY: &str = "You do not have any keyword notifications setup.";
    pub const CHANNEL_NOT_FOUND: &str = "Channel could not be found and was not set as a result.";
    pub const MISSING_PARAMETER: &str = "A parameter is missing. Check help.";
    pub const STORE_FAILED: &str = "Something went wrong while saving that. Please try again later.";
    pub const INTERNAL_ERROR: &str = "Something went wrong. Please try again later.";
}

/// Who issued a command, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub server: ServerId,
    pub user: UserId,
    /// Channel the command was typed in
    pub channel: ChannelId,
}

/// Executes commands against the store and the shared state.
pub struct CommandHandler {
    store: Arc<dyn ListingStore>,
    state: Arc<Mutex<State>>,
    fetcher: Arc<ListingFetcher>,
    directory: Arc<dyn ChatDirectory>,
    prefix: String,
    max_keyword_length: usize,
}

impl CommandHandler {
    pub fn new(
        store: Arc<dyn ListingStore>,
        state: Arc<Mutex<State>>,
        fetcher: Arc<ListingFetcher>,
        directory: Arc<dyn ChatDirectory>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            state,
            fetcher,
            directory,
            prefix: config.bot.prefix.clone(),
            max_keyword_length: config.notify.max_keyword_length,
        }
    }

    /// Parse and run a chat message. Returns the reply, or `None` when the
    /// message is not a command.
    pub async fn handle_message(&self, ctx: &CommandContext, text: &str) -> Option<String> {
        match parse(&self.prefix, text) {
            Ok(Some(command)) => Some(self.respond(ctx, command).await),
            Ok(None) => None,
            Err(e) => Some(self.reply_for_error(e)),
        }
    }

    /// Run a command and render the outcome as a user-facing reply.
    pub async fn respond(&self, ctx: &CommandContext, command: Command) -> String {
        let name = command.name();
        match self.execute(ctx, command).await {
            Ok(reply) => reply,
            Err(e) => {
                log::debug!("Command {} from {} failed: {}", name, ctx.user, e);
                self.reply_for_error(e)
            }
        }
    }

    fn reply_for_error(&self, error: AppError) -> String {
        match error {
            AppError::MissingParameter(_) => replies::MISSING_PARAMETER.to_string(),
            AppError::Validation(message) | AppError::NotFound(message) => message,
            AppError::Probe { .. } => replies::URL_NO_ADS.to_string(),
            AppError::Store(e) => {
                log::error!("Store failure while handling command: {}", e);
                replies::STORE_FAILED.to_string()
            }
            other => {
                log::error!("Unexpected command failure: {}", other);
                replies::INTERNAL_ERROR.to_string()
            }
        }
    }

    /// Run a command. User-correctable rejections come back as
    /// `Validation`, `NotFound` or `Probe` errors carrying the reply.
    pub async fn execute(&self, ctx: &CommandContext, command: Command) -> Result<String> {
        match command {
            Command::AddUrl(url) => self.add_url(&ctx.server, &url).await,
            Command::RemoveUrl(url) => self.remove_url(&ctx.server, &url).await,
            Command::ListUrls => Ok(self.list_urls(&ctx.server).await),
            Command::Notify(keyword) => self.notify(ctx, &keyword).await,
            Command::Unnotify(keyword) => self.unnotify(ctx, &keyword).await,
            Command::ViewNotify => self.view_notify(ctx).await,
            Command::SetChannel(reference) => self.set_channel(ctx, reference.as_deref()).await,
        }
    }

    async fn add_url(&self, server: &ServerId, url: &str) -> Result<String> {
        if self.state.lock().await.is_tracked(server, url) {
            return Ok(replies::URL_ALREADY_TRACKED.to_string());
        }
        if !KIJIJI_URL.is_match(url) {
            return Err(AppError::validation(replies::URL_INVALID));
        }

        // Probe without holding the state lock; it is a network round trip.
        self.fetcher.probe(url).await.map_err(|e| match e {
            AppError::Probe { .. } => e,
            other => AppError::probe(url, other),
        })?;

        let mut state = self.state.lock().await;
        match self.store.add_url(server, url).await {
            Ok(()) => {}
            Err(StoreError::AlreadyTracked) => {
                state.track_url(server, url);
                return Ok(replies::URL_ALREADY_TRACKED.to_string());
            }
            Err(e) => return Err(e.into()),
        }
        state.track_url(server, url);
        log::info!("Server {} now tracks {}", server, url);
        Ok(replies::URL_ADDED.to_string())
    }

    async fn remove_url(&self, server: &ServerId, url: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        if !state.is_tracked(server, url) {
            return Ok(replies::URL_NOT_TRACKED.to_string());
        }
        self.store.remove_url(server, url).await?;
        state.untrack_url(server, url);
        log::info!("Server {} stopped tracking {}", server, url);
        Ok(replies::URL_REMOVED.to_string())
    }

    async fn list_urls(&self, server: &ServerId) -> String {
        let state = self.state.lock().await;
        let urls = state.urls_for(server);
        if urls.is_empty() {
            return replies::URL_LIST_EMPTY.to_string();
        }
        // Angle brackets suppress link previews.
        urls.iter().fold(replies::URL_LIST_HEADER.to_string(), |mut out, url| {
            out.push_str(&format!("<{url}>\n"));
            out
        })
    }

    async fn notify(&self, ctx: &CommandContext, keyword: &str) -> Result<String> {
        if keyword.chars().count() > self.max_keyword_length {
            return Err(AppError::validation(format!(
                "The maximum length of a keyword is currently {} characters.",
                self.max_keyword_length
            )));
        }

        let mut state = self.state.lock().await;
        self.store
            .add_subscription(&ctx.server, &ctx.user, keyword)
            .await?;
        state.subscribe(&ctx.server, &ctx.user, keyword);
        Ok(replies::NOTIFY_ADDED.to_string())
    }

    async fn unnotify(&self, ctx: &CommandContext, keyword: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        let removed = self
            .store
            .remove_subscription(&ctx.server, &ctx.user, keyword)
            .await?;
        let mirrored = state.unsubscribe(&ctx.server, &ctx.user, keyword);

        if removed || mirrored {
            Ok(replies::NOTIFY_REMOVED.to_string())
        } else {
            Ok(replies::NOTIFY_UNKNOWN.to_string())
        }
    }

    async fn view_notify(&self, ctx: &CommandContext) -> Result<String> {
        let keywords = self
            .store
            .list_subscriptions(&ctx.server, &ctx.user)
            .await?;
        if keywords.is_empty() {
            return Ok(replies::NOTIFY_LIST_EMPTY.to_string());
        }

        let mut reply = replies::NOTIFY_LIST_HEADER.to_string();
        for keyword in keywords {
            reply.push_str(&escape_mentions(&keyword));
            reply.push('\n');
        }
        Ok(reply)
    }

    async fn set_channel(&self, ctx: &CommandContext, reference: Option<&str>) -> Result<String> {
        let channel = match reference {
            None => ctx.channel.clone(),
            Some(reference) => self.resolve_channel(&ctx.server, reference).await?,
        };

        let mut state = self.state.lock().await;
        if state.channel_for(&ctx.server) == Some(&channel) {
            return Ok(format!(
                "All ads are already going into {}.",
                channel_mention(&channel)
            ));
        }

        self.store.bind_channel(&ctx.server, &channel).await?;
        state.bind_channel(ctx.server.clone(), channel.clone());
        log::info!("Server {} now publishes to channel {}", ctx.server, channel);
        Ok(format!(
            "Done! All ads will be sent to {}.",
            channel_mention(&channel)
        ))
    }

    async fn resolve_channel(&self, server: &ServerId, reference: &str) -> Result<ChannelId> {
        match self.directory.resolve_channel(server, reference).await {
            Ok(Some(channel)) => Ok(channel),
            Ok(None) => Err(AppError::not_found(replies::CHANNEL_NOT_FOUND)),
            Err(e) => {
                log::warn!("Channel lookup for '{}' failed: {}", reference, e);
                Err(AppError::not_found(replies::CHANNEL_NOT_FOUND))
            }
        }
    }
}
