//! Scheduling engine for delayed thread replies and member welcomes.

pub mod engine;
pub mod model;

use async_trait::async_trait;

use crate::config::MessageTemplate;
use crate::error::SlackError;

pub use engine::{SchedulerEngine, spawn_tick_loop};
pub use model::ScheduledMessage;

/// Outbound message delivery — the engine's only side-effect seam.
///
/// Implemented by the Slack Web API client; tests substitute a recording
/// mock.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Post a message into a channel thread, visible to the channel.
    async fn post_thread_message(
        &self,
        channel: &str,
        thread_ts: &str,
        template: &MessageTemplate,
    ) -> Result<(), SlackError>;

    /// Post an ephemeral message visible only to `user` in `channel`.
    async fn post_ephemeral(
        &self,
        channel: &str,
        user: &str,
        template: &MessageTemplate,
    ) -> Result<(), SlackError>;
}
