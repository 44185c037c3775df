//! Typed views of `events_api` payloads.

use serde::Deserialize;

/// A `message` event in a channel the bot can see.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEvent {
    pub channel: String,
    /// Absent on bot/system messages.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    pub event_ts: String,
    /// Thread anchor; present only on messages tied to a thread.
    #[serde(default)]
    pub thread_ts: Option<String>,
    /// Edits, deletes, joins, bot_message, … — all skipped.
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

impl MessageEvent {
    /// True for plain user messages the scheduler should see.
    ///
    /// Messages with a subtype, a bot author, or no user are dropped so
    /// the bot's own follow-ups cannot cancel other pending entries.
    pub fn is_user_message(&self) -> bool {
        self.subtype.is_none() && self.bot_id.is_none() && self.user.is_some()
    }
}

/// A `member_joined_channel` event.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberJoinedEvent {
    pub channel: String,
    pub user: String,
}

/// Events the bot reacts to; everything else lands in `Other`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Message(MessageEvent),
    MemberJoinedChannel(MemberJoinedEvent),
    #[serde(other)]
    Other,
}
