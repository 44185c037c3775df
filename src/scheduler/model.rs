//! Data model for pending delayed messages.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::MessageTemplate;

/// One pending delayed reply.
///
/// Created when a root channel message matches an autoresponse rule.
/// Removed exactly once: cancelled by a reply from a different author in
/// the same thread, or fired by a tick once `fire_at` has passed — never
/// both.
#[derive(Debug, Clone)]
pub struct ScheduledMessage {
    /// Synthetic id; stable handle for deferred removal.
    pub id: Uuid,
    /// Slack channel id.
    pub channel: String,
    /// Timestamp of the thread's root message.
    pub thread_key: String,
    /// User whose message triggered scheduling.
    pub author: String,
    /// Eligible to send once this instant has passed.
    pub fire_at: DateTime<Utc>,
    /// Payload copied verbatim from the matched rule.
    pub template: MessageTemplate,
}

impl ScheduledMessage {
    pub fn new(
        channel: &str,
        thread_key: &str,
        author: &str,
        fire_at: DateTime<Utc>,
        template: MessageTemplate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            thread_key: thread_key.to_string(),
            author: author.to_string(),
            fire_at,
            template,
        }
    }

    /// True once the message is eligible to send.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.fire_at <= now
    }
}
