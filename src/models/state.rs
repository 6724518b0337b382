// src/models/state.rs

//! In-memory projection of the persisted bot state.
//!
//! Mirrors the store's channel bindings, tracked URLs and keyword
//! subscriptions. Command handlers mutate it after each successful store
//! write; the pipeline reloads it from the store and reads a [`TickPlan`]
//! copy at the start of every tick.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::{ChannelId, ServerId, UserId};
use crate::storage::Snapshot;

/// Per-server view of bindings, URLs and subscriptions.
#[derive(Debug, Clone, Default)]
pub struct State {
    channels: HashMap<ServerId, ChannelId>,
    urls: HashMap<ServerId, Vec<String>>,
    keywords: HashMap<ServerId, BTreeMap<String, BTreeSet<UserId>>>,
}

impl State {
    /// Rebuild the projection from a store snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut state = Self::default();
        for (server, channel) in &snapshot.bindings {
            state.bind_channel(server.clone(), channel.clone());
        }
        for (server, url) in &snapshot.urls {
            state.track_url(server, url);
        }
        for sub in &snapshot.subscriptions {
            state.subscribe(&sub.server, &sub.user, &sub.keyword);
        }
        state
    }

    pub fn channel_for(&self, server: &ServerId) -> Option<&ChannelId> {
        self.channels.get(server)
    }

    pub fn bind_channel(&mut self, server: ServerId, channel: ChannelId) {
        self.channels.insert(server, channel);
    }

    pub fn unbind_channel(&mut self, server: &ServerId) {
        self.channels.remove(server);
    }

    /// Every channel binding, in server id order.
    pub fn bindings(&self) -> Vec<(ServerId, ChannelId)> {
        let mut bindings: Vec<_> = self
            .channels
            .iter()
            .map(|(server, channel)| (server.clone(), channel.clone()))
            .collect();
        bindings.sort();
        bindings
    }

    pub fn is_tracked(&self, server: &ServerId, url: &str) -> bool {
        self.urls
            .get(server)
            .is_some_and(|urls| urls.iter().any(|u| u == url))
    }

    /// Track a URL. Returns `false` when it was already tracked.
    pub fn track_url(&mut self, server: &ServerId, url: &str) -> bool {
        if self.is_tracked(server, url) {
            return false;
        }
        self.urls
            .entry(server.clone())
            .or_default()
            .push(url.to_string());
        true
    }

    /// Stop tracking a URL. Returns `false` when it was not tracked.
    pub fn untrack_url(&mut self, server: &ServerId, url: &str) -> bool {
        let Some(urls) = self.urls.get_mut(server) else {
            return false;
        };
        let before = urls.len();
        urls.retain(|u| u != url);
        let removed = urls.len() != before;
        if urls.is_empty() {
            self.urls.remove(server);
        }
        removed
    }

    pub fn urls_for(&self, server: &ServerId) -> &[String] {
        self.urls.get(server).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record a keyword subscription. Duplicates are ignored.
    pub fn subscribe(&mut self, server: &ServerId, user: &UserId, keyword: &str) {
        self.keywords
            .entry(server.clone())
            .or_default()
            .entry(keyword.to_string())
            .or_default()
            .insert(user.clone());
    }

    /// Drop a keyword subscription. Returns `false` when it did not exist.
    pub fn unsubscribe(&mut self, server: &ServerId, user: &UserId, keyword: &str) -> bool {
        let Some(by_keyword) = self.keywords.get_mut(server) else {
            return false;
        };
        let Some(users) = by_keyword.get_mut(keyword) else {
            return false;
        };
        let removed = users.remove(user);
        if users.is_empty() {
            by_keyword.remove(keyword);
        }
        if by_keyword.is_empty() {
            self.keywords.remove(server);
        }
        removed
    }

    /// Keywords with at least one subscriber on `server`.
    pub fn keywords_for(&self, server: &ServerId) -> Vec<String> {
        self.keywords
            .get(server)
            .map(|by_keyword| by_keyword.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn binding_count(&self) -> usize {
        self.channels.len()
    }

    pub fn url_count(&self) -> usize {
        self.urls.values().map(Vec::len).sum()
    }

    pub fn subscription_count(&self) -> usize {
        self.keywords
            .values()
            .flat_map(|by_keyword| by_keyword.values())
            .map(BTreeSet::len)
            .sum()
    }

    /// Copy out everything a tick needs, servers in id order.
    pub fn plan(&self) -> TickPlan {
        let mut servers: Vec<ServerPlan> = self
            .urls
            .iter()
            .map(|(server, urls)| ServerPlan {
                server: server.clone(),
                channel: self.channels.get(server).cloned(),
                urls: urls.clone(),
                keywords: self.keywords_for(server),
            })
            .collect();
        servers.sort_by(|a, b| a.server.cmp(&b.server));
        TickPlan { servers }
    }
}

/// One server's share of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPlan {
    pub server: ServerId,
    /// Output channel; `None` means fetch but do not publish
    pub channel: Option<ChannelId>,
    /// Tracked URLs in insertion order
    pub urls: Vec<String>,
    /// Subscribed keywords
    pub keywords: Vec<String>,
}

/// Snapshot of the projection taken at the start of a tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickPlan {
    pub servers: Vec<ServerPlan>,
}

impl TickPlan {
    /// Every `(server, url)` pair to fetch, in plan order.
    pub fn targets(&self) -> Vec<FetchTarget> {
        self.servers
            .iter()
            .flat_map(|plan| {
                plan.urls.iter().map(move |url| FetchTarget {
                    server: plan.server.clone(),
                    url: url.clone(),
                })
            })
            .collect()
    }

    pub fn server(&self, server: &ServerId) -> Option<&ServerPlan> {
        self.servers.iter().find(|plan| &plan.server == server)
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// A single page to fetch on behalf of a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTarget {
    pub server: ServerId,
    pub url: String,
}
