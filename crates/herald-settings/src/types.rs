//! Settings type definitions.
//!
//! Every section is `#[serde(default)]` so a user file may carry any subset
//! of fields.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldSettings {
    pub hub: HubSettings,
    pub client: ClientSettings,
    pub logging: LoggingSettings,
}

impl HeraldSettings {
    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.client.default_language.trim().is_empty() {
            return Err(SettingsError::InvalidValue("default_language is empty".into()));
        }
        if self.hub.history_limit == 0 {
            return Err(SettingsError::InvalidValue("history_limit must be at least 1".into()));
        }
        if !self.client.hub_url.starts_with("http://") && !self.client.hub_url.starts_with("https://") {
            return Err(SettingsError::InvalidValue(format!(
                "hub_url must be an http(s) URL: {}",
                self.client.hub_url
            )));
        }
        Ok(())
    }
}

/// Reference hub settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    pub host: String,
    pub port: u16,
    /// Bearer token required by `POST /api/clear-history`. Clearing is
    /// disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
    /// Announcements kept in the log, newest first.
    pub history_limit: usize,
    /// Per-client outbound queue before frames are dropped.
    pub max_send_queue: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            admin_token: None,
            history_limit: 50,
            max_send_queue: 256,
        }
    }
}

/// Publisher, subscriber and history-browser settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Base URL of the hub; the socket lives at `<hub_url>/ws`.
    pub hub_url: String,
    pub default_language: String,
    pub sound_enabled: bool,
    /// Command used to play audio clips, e.g. `mpv --no-video`. The clip URL
    /// is appended as the last argument.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_player: Option<String>,
    /// Token sent with privileged history requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
    /// Directory holding the client database (draft text).
    pub data_dir: PathBuf,
    pub reconnect_delay_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            hub_url: "http://127.0.0.1:5000".to_string(),
            default_language: "en".to_string(),
            sound_enabled: true,
            audio_player: None,
            admin_token: None,
            data_dir: herald_home().join("database"),
            reconnect_delay_ms: 2_000,
        }
    }
}

impl ClientSettings {
    pub fn ws_url(&self) -> String {
        let base = self.hub_url.trim_end_matches('/');
        let ws = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws}/ws")
    }

    pub fn draft_db_path(&self) -> PathBuf {
        self.data_dir.join("client.db")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// `~/.herald`, falling back to `/tmp/.herald` without a home directory.
pub fn herald_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".herald")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_from_http() {
        let client = ClientSettings {
            hub_url: "http://10.0.0.5:5000/".into(),
            ..Default::default()
        };
        assert_eq!(client.ws_url(), "ws://10.0.0.5:5000/ws");
    }

    #[test]
    fn ws_url_from_https() {
        let client = ClientSettings {
            hub_url: "https://pa.example.org".into(),
            ..Default::default()
        };
        assert_eq!(client.ws_url(), "wss://pa.example.org/ws");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: HeraldSettings =
            serde_json::from_str(r#"{"client": {"default_language": "hi"}}"#).unwrap();
        assert_eq!(settings.client.default_language, "hi");
        assert!(settings.client.sound_enabled);
        assert_eq!(settings.hub.port, 5000);
    }

    #[test]
    fn validate_rejects_zero_history_limit() {
        let mut settings = HeraldSettings::default();
        settings.hub.history_limit = 0;
        assert!(matches!(settings.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn validate_rejects_non_http_hub_url() {
        let mut settings = HeraldSettings::default();
        settings.client.hub_url = "ftp://hub".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn tokens_are_omitted_when_unset() {
        let json = serde_json::to_value(HeraldSettings::default()).unwrap();
        assert!(json["hub"].get("admin_token").is_none());
        assert!(json["client"].get("audio_player").is_none());
    }
}
