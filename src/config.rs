use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::compose::MessageTemplate;
use crate::types::SequenceState;

pub const ENV_CONFIG: &str = "COMPOSE_PILOT_CONFIG";
pub const ENV_DEBUG_URL: &str = "COMPOSE_PILOT_DEBUG_URL";
pub const ENV_STATE_FILE: &str = "COMPOSE_PILOT_STATE_FILE";

pub const DEFAULT_FLAG_KEY: &str = "composer.last_sent";

/// CSS selectors for the composer UI being driven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub unread_messages: String,
    pub new_message: String,
    pub subject: String,
    pub body: String,
    pub recipient: String,
    /// Container of the type-ahead rows.
    pub results: String,
    /// Name element inside a type-ahead row.
    pub candidate_name: String,
    pub submit: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            unread_messages: r#"button[aria-label*="unread message"]"#.to_string(),
            new_message: r#"button[aria-label="New Message"]"#.to_string(),
            subject: "#edit-subject".to_string(),
            body: "#edit-body".to_string(),
            recipient: "#edit-recipient".to_string(),
            results: ".ac_results".to_string(),
            candidate_name: ".ac-name".to_string(),
            submit: "#edit-submit".to_string(),
        }
    }
}

/// Settle delays and poll bounds, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub after_open_list_ms: u64,
    pub after_open_composer_ms: u64,
    pub after_populate_ms: u64,
    pub poll_interval_ms: u64,
    pub element_timeout_ms: u64,
    pub candidate_timeout_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            after_open_list_ms: 3000,
            after_open_composer_ms: 2000,
            after_populate_ms: 1500,
            poll_interval_ms: 250,
            element_timeout_ms: 10_000,
            candidate_timeout_ms: 5000,
        }
    }
}

impl Timing {
    /// Minimum settle time after `state` before the next state starts.
    pub fn delay_after(&self, state: SequenceState) -> Duration {
        let ms = match state {
            SequenceState::OpenMessageList => self.after_open_list_ms,
            SequenceState::OpenComposer => self.after_open_composer_ms,
            SequenceState::PopulateFields => self.after_populate_ms,
            SequenceState::SelectCandidate
            | SequenceState::Submit
            | SequenceState::RecordCompletion => 0,
        };
        Duration::from_millis(ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn candidate_timeout(&self) -> Duration {
        Duration::from_millis(self.candidate_timeout_ms)
    }
}

/// What to do when the type-ahead never shows the recipient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    /// Submit with whatever recipient state the field was left in.
    #[default]
    SubmitAnyway,
    AbortIfUnmatched,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// DevTools endpoint of an already running Chrome.
    pub debug_url: String,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    /// Profile used when Chrome has to be launched; logins persist there.
    pub profile_dir: Option<PathBuf>,
    pub start_url: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            debug_url: "http://127.0.0.1:9222".to_string(),
            chrome_path: None,
            headless: false,
            profile_dir: None,
            start_url: None,
        }
    }
}

impl BrowserConfig {
    pub fn profile_dir(&self) -> PathBuf {
        self.profile_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("compose-pilot")
                .join("profile")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub selectors: Selectors,
    pub timing: Timing,
    pub unmatched: UnmatchedPolicy,
    pub flag_key: String,
    /// Allow another run this long after the last one; `None` means never.
    pub rerun_after_secs: Option<u64>,
    pub state_file: Option<PathBuf>,
    pub browser: BrowserConfig,
    pub message: MessageTemplate,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            selectors: Selectors::default(),
            timing: Timing::default(),
            unmatched: UnmatchedPolicy::default(),
            flag_key: DEFAULT_FLAG_KEY.to_string(),
            rerun_after_secs: None,
            state_file: None,
            browser: BrowserConfig::default(),
            message: MessageTemplate::default(),
        }
    }
}

impl PilotConfig {
    /// Defaults, then the JSON file (explicit path or `COMPOSE_PILOT_CONFIG`),
    /// then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("writing config {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_DEBUG_URL) {
            self.browser.debug_url = url;
        }
        if let Some(state) = std::env::var_os(ENV_STATE_FILE) {
            self.state_file = Some(PathBuf::from(state));
        }
    }

    pub fn rerun_after(&self) -> Option<Duration> {
        self.rerun_after_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_delays() {
        let timing = Timing::default();
        assert_eq!(timing.after_open_list_ms, 3000);
        assert_eq!(timing.after_open_composer_ms, 2000);
        assert_eq!(timing.after_populate_ms, 1500);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: PilotConfig = serde_json::from_str(
            r#"{"unmatched":"abort_if_unmatched","timing":{"after_populate_ms":500}}"#,
        )
        .unwrap();
        assert_eq!(config.unmatched, UnmatchedPolicy::AbortIfUnmatched);
        assert_eq!(config.timing.after_populate_ms, 500);
        assert_eq!(config.timing.after_open_list_ms, 3000);
        assert_eq!(config.selectors.submit, "#edit-submit");
        assert_eq!(config.flag_key, DEFAULT_FLAG_KEY);
    }

    #[test]
    fn config_file_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot.json");
        let mut config = PilotConfig::default();
        config.rerun_after_secs = Some(86_400);
        config.write_to(&path).unwrap();

        let loaded = PilotConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.rerun_after(), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn poll_interval_is_never_zero() {
        let timing = Timing {
            poll_interval_ms: 0,
            ..Timing::default()
        };
        assert_eq!(timing.poll_interval(), Duration::from_millis(1));
    }
}
