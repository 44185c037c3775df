use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::Mutex;

use nudgebot::config::BotConfig;
use nudgebot::directory::ChannelDirectory;
use nudgebot::error::CredentialError;
use nudgebot::scheduler::{self, SchedulerEngine};
use nudgebot::slack::SlackApi;
use nudgebot::slack::socket::SocketModeListener;

/// Seconds between scheduler scans.
const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Read a required token from the environment, failing fast with a usable
/// diagnostic.
fn require_token(name: &str, hint: &str) -> Result<SecretString, CredentialError> {
    std::env::var(name)
        .map(SecretString::from)
        .map_err(|_| CredentialError::MissingEnvVar {
            name: name.to_string(),
            hint: hint.to_string(),
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Sole positional argument: the config file path
    let config_path = std::env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: nudgebot <config.yaml|config.json>");
        std::process::exit(2);
    });

    let app_token = require_token("SLACK_APP_TOKEN", "xapp-...")?;
    let bot_token = require_token("SLACK_BOT_TOKEN", "xoxb-...")?;

    let config = Arc::new(BotConfig::load(Path::new(&config_path))?);

    eprintln!("🤖 nudgebot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Config: {}", config_path);
    eprintln!(
        "   Rules: {} autoresponse, {} welcome",
        config.autoresponse.len(),
        config.welcome.len()
    );

    let api = Arc::new(SlackApi::new(bot_token));

    // Fail fast on bad credentials and log who we are.
    let identity = api.auth_test().await?;
    tracing::info!(
        bot_user = %identity.user.as_deref().unwrap_or("unknown"),
        bot_user_id = %identity.user_id,
        "authenticated with Slack"
    );

    // The directory must exist before any event arrives: handlers use it
    // for logging and welcome-message matching.
    let directory = Arc::new(ChannelDirectory::new(api.list_channels().await?));
    tracing::info!(channels = directory.len(), "channel directory loaded");

    let engine = Arc::new(Mutex::new(SchedulerEngine::new(
        config,
        directory,
        Arc::clone(&api) as Arc<dyn scheduler::Outbound>,
    )));

    let _tick_handle = scheduler::spawn_tick_loop(Arc::clone(&engine), TICK_PERIOD);

    // Runs until the reconnect attempt cap is hit.
    let listener = SocketModeListener::new(api, app_token, engine);
    listener.run().await?;

    Ok(())
}
