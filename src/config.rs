//! Bot configuration — autoresponse rules and welcome templates.
//!
//! Loaded once at startup from a YAML or JSON file (selected by extension)
//! and read-only thereafter. Rule evaluation is sequential first-match:
//! the first rule whose pattern is a substring of the message text wins,
//! later rules are never consulted. A match-all evaluation would change
//! behavior for overlapping patterns.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Payload of an outbound message: plain text and/or Block Kit blocks.
///
/// At least one of `text`/`blocks` must be populated (validated at load).
/// Any further keys are kept verbatim in `extra` and forwarded as send
/// parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MessageTemplate {
    /// True if neither text nor blocks is set.
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.blocks.is_none()
    }
}

/// One autoresponse rule: substring pattern, delay, reply template.
#[derive(Debug, Clone, Deserialize)]
pub struct AutoresponseRule {
    /// Substring matched against inbound message text.
    pub pattern: String,
    /// Seconds to wait before posting the follow-up into the thread.
    pub delay: u64,
    /// Reply payload, copied verbatim into the scheduled message.
    pub message: MessageTemplate,
}

/// Parsed bot configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfig {
    /// Ordered autoresponse rules; order is the match priority.
    #[serde(default)]
    pub autoresponse: Vec<AutoresponseRule>,
    /// Welcome templates keyed by channel display name.
    #[serde(default)]
    pub welcome: HashMap<String, MessageTemplate>,
}

impl BotConfig {
    /// Load configuration from `path`.
    ///
    /// `.json` files are parsed as JSON, everything else as YAML (the
    /// config is typically `rules.yaml`). Missing, unreadable, or
    /// malformed files are fatal.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
                path: display.clone(),
                message: e.to_string(),
            })?
        } else {
            serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
                path: display.clone(),
                message: e.to_string(),
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that every template carries text or blocks.
    fn validate(&self) -> Result<(), ConfigError> {
        for (i, rule) in self.autoresponse.iter().enumerate() {
            if rule.message.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("autoresponse[{i}]"),
                    message: format!(
                        "message for pattern {:?} must set text or blocks",
                        rule.pattern
                    ),
                });
            }
        }
        for (name, template) in &self.welcome {
            if template.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("welcome.{name}"),
                    message: "welcome message must set text or blocks".to_string(),
                });
            }
        }
        Ok(())
    }

    /// First rule whose pattern occurs in `text`, in configured order.
    ///
    /// Returns `None` when no rule matches.
    pub fn match_rule(&self, text: &str) -> Option<&AutoresponseRule> {
        self.autoresponse
            .iter()
            .find(|rule| text.contains(&rule.pattern))
    }

    /// Welcome template for a channel display name, if configured.
    pub fn welcome_for(&self, channel_name: &str) -> Option<&MessageTemplate> {
        self.welcome.get(channel_name)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "rules.yaml",
            r#"
autoresponse:
  - pattern: "help"
    delay: 5
    message:
      text: "Still need a hand?"
welcome:
  general:
    text: "Welcome aboard!"
"#,
        );

        let config = BotConfig::load(&path).unwrap();
        assert_eq!(config.autoresponse.len(), 1);
        assert_eq!(config.autoresponse[0].pattern, "help");
        assert_eq!(config.autoresponse[0].delay, 5);
        assert_eq!(
            config.autoresponse[0].message.text.as_deref(),
            Some("Still need a hand?")
        );
        assert!(config.welcome_for("general").is_some());
        assert!(config.welcome_for("random").is_none());
    }

    #[test]
    fn loads_json_config_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "rules.json",
            r#"{
                "autoresponse": [
                    {"pattern": "deploy", "delay": 60, "message": {"text": "Deploy done?"}}
                ],
                "welcome": {}
            }"#,
        );

        let config = BotConfig::load(&path).unwrap();
        assert_eq!(config.autoresponse[0].pattern, "deploy");
        assert_eq!(config.autoresponse[0].delay, 60);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = BotConfig::load(Path::new("/nonexistent/rules.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "rules.yaml", "autoresponse: [pattern: {{");
        let err = BotConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn empty_template_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "rules.yaml",
            r#"
autoresponse:
  - pattern: "help"
    delay: 5
    message: {}
"#,
        );
        let err = BotConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn empty_welcome_template_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "rules.yaml",
            r#"
welcome:
  general: {}
"#,
        );
        let err = BotConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn blocks_only_template_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "rules.yaml",
            r#"
welcome:
  general:
    blocks:
      - type: section
        text:
          type: mrkdwn
          text: ":wave: hello"
"#,
        );
        let config = BotConfig::load(&path).unwrap();
        let template = config.welcome_for("general").unwrap();
        assert!(template.text.is_none());
        assert!(template.blocks.is_some());
    }

    #[test]
    fn welcome_extra_fields_are_kept_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "rules.yaml",
            r#"
welcome:
  general:
    text: "hi"
    unfurl_links: false
"#,
        );
        let config = BotConfig::load(&path).unwrap();
        let template = config.welcome_for("general").unwrap();
        assert_eq!(
            template.extra.get("unfurl_links"),
            Some(&serde_json::Value::Bool(false))
        );
    }

    #[test]
    fn first_matching_rule_wins() {
        let config = BotConfig {
            autoresponse: vec![
                AutoresponseRule {
                    pattern: "help".into(),
                    delay: 5,
                    message: MessageTemplate {
                        text: Some("first".into()),
                        ..Default::default()
                    },
                },
                AutoresponseRule {
                    pattern: "help me".into(),
                    delay: 10,
                    message: MessageTemplate {
                        text: Some("second".into()),
                        ..Default::default()
                    },
                },
            ],
            welcome: HashMap::new(),
        };

        // Both patterns are substrings; the earlier rule must win.
        let rule = config.match_rule("please help me out").unwrap();
        assert_eq!(rule.message.text.as_deref(), Some("first"));
    }

    #[test]
    fn match_is_substring_not_equality() {
        let config = BotConfig {
            autoresponse: vec![AutoresponseRule {
                pattern: "help".into(),
                delay: 5,
                message: MessageTemplate {
                    text: Some("follow-up".into()),
                    ..Default::default()
                },
            }],
            welcome: HashMap::new(),
        };

        assert!(config.match_rule("need help").is_some());
        assert!(config.match_rule("helpless").is_some());
        assert!(config.match_rule("HELP").is_none()); // case-sensitive
        assert!(config.match_rule("nothing relevant").is_none());
    }

    #[test]
    fn no_rules_matches_nothing() {
        let config = BotConfig::default();
        assert!(config.match_rule("anything at all").is_none());
    }
}
