//! Application-level configuration loading: game settings plus runtime paths and timings.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use crate::{services::session_service::RunnerOptions, state::game::GameSettings};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BUZZ_ARCADE_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Scoring and clock tunables.
    #[validate(nested)]
    pub settings: GameSettings,
    /// Quiz document loaded at startup.
    pub quiz_path: PathBuf,
    /// Where the best score survives restarts.
    pub high_score_path: PathBuf,
    /// Shuffle the question order once at load time.
    pub shuffle_questions: bool,
    /// Delay before a revealed round moves on by itself.
    pub reveal_hold_ms: u64,
    /// Whether revealed rounds advance without a host request.
    pub auto_advance: bool,
    /// Buffered events per SSE subscriber.
    #[validate(range(min = 1))]
    pub sse_capacity: usize,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to the built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|message| {
                warn!(
                    path = %path.display(),
                    error = %message,
                    "failed to load config; falling back to defaults"
                );
                Self::default()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    fn parse(contents: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(contents).map_err(|err| err.to_string())?;
        config.validate().map_err(|err| err.to_string())?;
        info!(
            policy = ?config.settings.policy,
            seconds = config.settings.seconds_per_question,
            quiz = %config.quiz_path.display(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Timings handed to the session queue.
    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            tick_interval: Duration::from_secs(1),
            reveal_hold: self
                .auto_advance
                .then(|| Duration::from_millis(self.reveal_hold_ms)),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settings: GameSettings::default(),
            quiz_path: PathBuf::from("quiz.json"),
            high_score_path: PathBuf::from("data/high_score.json"),
            shuffle_questions: false,
            reveal_hold_ms: 4000,
            auto_advance: true,
            sse_capacity: 64,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::ScoringPolicy;

    #[test]
    fn partial_document_keeps_defaults() {
        let config = AppConfig::parse(
            r#"{"settings":{"policy":"open_speed","racing":{"lockout_ms":1500}},"auto_advance":false}"#,
        )
        .unwrap();
        assert_eq!(config.settings.policy, ScoringPolicy::OpenSpeed);
        assert_eq!(config.settings.racing.lockout, Duration::from_millis(1500));
        assert_eq!(config.settings.seconds_per_question, 30);
        assert_eq!(config.quiz_path, PathBuf::from("quiz.json"));
        assert_eq!(config.runner_options().reveal_hold, None);
    }

    #[test]
    fn out_of_range_settings_are_refused() {
        assert!(AppConfig::parse(r#"{"settings":{"seconds_per_question":2}}"#).is_err());
        assert!(AppConfig::parse(r#"{"sse_capacity":0}"#).is_err());
        assert!(AppConfig::parse("not json").is_err());
    }

    #[test]
    fn defaults_enable_auto_advance() {
        let options = AppConfig::default().runner_options();
        assert_eq!(options.reveal_hold, Some(Duration::from_millis(4000)));
        assert_eq!(options.tick_interval, Duration::from_secs(1));
    }
}
