//! The scheduling engine — reacts to channel events and a periodic tick.
//!
//! All state lives in the engine's pending list; event handlers and the
//! tick loop serialize access through one `tokio::sync::Mutex`, so append,
//! cancel, and fire never interleave. `now` is always passed in by the
//! caller, which keeps the timing contracts deterministic under test.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::directory::ChannelDirectory;
use crate::scheduler::Outbound;
use crate::scheduler::model::ScheduledMessage;

/// Owns the pending set of delayed replies and decides when to enqueue,
/// cancel, or fire them.
pub struct SchedulerEngine {
    config: Arc<BotConfig>,
    directory: Arc<ChannelDirectory>,
    outbound: Arc<dyn Outbound>,
    pending: Vec<ScheduledMessage>,
}

impl SchedulerEngine {
    pub fn new(
        config: Arc<BotConfig>,
        directory: Arc<ChannelDirectory>,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            config,
            directory,
            outbound,
            pending: Vec::new(),
        }
    }

    /// Route an inbound channel message.
    ///
    /// A message is a thread reply only when it carries a thread anchor
    /// different from its own timestamp; everything else is treated as a
    /// thread root and is eligible for new scheduling.
    pub fn handle_message(
        &mut self,
        now: DateTime<Utc>,
        channel: &str,
        user: &str,
        text: &str,
        event_ts: &str,
        thread_ts: Option<&str>,
    ) {
        debug!(
            channel = %self.directory.display(channel),
            "received message"
        );
        match thread_ts {
            Some(anchor) if anchor != event_ts => self.on_thread_reply(channel, anchor, user),
            _ => self.on_channel_message(now, channel, event_ts, user, text),
        }
    }

    /// Schedule a delayed follow-up for the first rule whose pattern
    /// occurs in `text`. No side effect when no rule matches.
    pub fn on_channel_message(
        &mut self,
        now: DateTime<Utc>,
        channel: &str,
        thread_key: &str,
        author: &str,
        text: &str,
    ) {
        let Some(rule) = self.config.match_rule(text) else {
            return;
        };

        info!(
            channel = %self.directory.display(channel),
            pattern = %rule.pattern,
            delay_secs = rule.delay,
            "add scheduled message"
        );

        // Entries for the same thread are not deduplicated; each matching
        // root message stacks its own follow-up.
        self.pending.push(ScheduledMessage::new(
            channel,
            thread_key,
            author,
            now + TimeDelta::seconds(rule.delay as i64),
            rule.message.clone(),
        ));
    }

    /// Cancel the first pending entry for `(channel, thread_key)` whose
    /// author differs from the replier. At most one entry is removed; a
    /// reply from the original author never cancels. No match is a silent
    /// no-op.
    pub fn on_thread_reply(&mut self, channel: &str, thread_key: &str, author: &str) {
        let position = self.pending.iter().position(|entry| {
            entry.channel == channel && entry.thread_key == thread_key && entry.author != author
        });

        if let Some(i) = position {
            info!(
                channel = %self.directory.display(channel),
                "delete scheduled message"
            );
            self.pending.remove(i);
        }
    }

    /// Greet a new channel member with the channel's welcome template, if
    /// one is configured for its display name. Send failures are logged
    /// and swallowed.
    pub async fn on_member_joined(&self, channel: &str, user: &str) {
        let channel_name = self.directory.display(channel);
        info!(channel = %channel_name, "somebody joined");

        let Some(template) = self
            .directory
            .resolve(channel)
            .and_then(|name| self.config.welcome_for(name))
        else {
            return;
        };

        info!(channel = %channel_name, user = %user, "send welcome message");
        if let Err(e) = self.outbound.post_ephemeral(channel, user, template).await {
            warn!(
                channel = %channel_name,
                user = %user,
                error = %e,
                "failed to send welcome message"
            );
        }
    }

    /// Fire every entry whose `fire_at` has passed.
    ///
    /// Removal is decided in one partition pass before any send, so a
    /// multi-entry tick can never skip or double-process the remainder.
    /// A fired entry is dropped regardless of the send outcome; delivery
    /// is best-effort and failures are logged.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        let (due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|entry| entry.is_due(now));
        self.pending = rest;

        for entry in due {
            let channel_name = self.directory.display(&entry.channel);
            info!(channel = %channel_name, "send scheduled message");

            if let Err(e) = self
                .outbound
                .post_thread_message(&entry.channel, &entry.thread_key, &entry.template)
                .await
            {
                warn!(
                    channel = %channel_name,
                    thread = %entry.thread_key,
                    error = %e,
                    "failed to send scheduled message"
                );
            }
        }
    }

    /// Number of pending entries.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Pending entries, in insertion order.
    pub fn pending(&self) -> &[ScheduledMessage] {
        &self.pending
    }
}

/// Spawn the periodic scan-and-fire task.
///
/// The loop locks the engine once per period; sends run under that lock,
/// so a slow send delays the next tick by a bounded amount rather than
/// firing concurrently with event handling.
pub fn spawn_tick_loop(engine: Arc<Mutex<SchedulerEngine>>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Scheduler tick loop started — scanning every {:?}", period);
        let mut tick = tokio::time::interval(period);

        loop {
            tick.tick().await;
            engine.lock().await.tick(Utc::now()).await;
        }
    })
}
