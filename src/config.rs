use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::app::player::{PlaybackPolicy, PlaylistDirection};
use crate::paths::settings_file_path;

pub const DEFAULT_WEBHOOK_URL: &str = "http://localhost:5678/webhook/generate-story";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub webhook_url: String,
    pub main_voice: String,
    pub guest_voice: String,
    pub duration_minutes: u32,
    pub policy: PlaybackPolicy,
    pub playlist_direction: PlaylistDirection,
    pub player_bin: String,
    pub connect_timeout_secs: u64,
    /// Generation synthesizes audio before replying, so reads wait a long time.
    pub read_timeout_secs: u64,
    #[serde(skip)]
    webhook_url_override: Option<Override>,
    #[serde(skip)]
    player_bin_override: Option<Override>,
}

/// An environment value shadowing the one read from the settings file.
#[derive(Debug, Clone, PartialEq)]
struct Override {
    file_value: String,
    env_value: String,
}

impl Override {
    /// Puts the file value back unless the field was changed since loading.
    fn restore(&self, field: &mut String) {
        if *field == self.env_value {
            field.clone_from(&self.file_value);
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            webhook_url: DEFAULT_WEBHOOK_URL.to_string(),
            main_voice: "albo".to_string(),
            guest_voice: "lachlan".to_string(),
            duration_minutes: 5,
            policy: PlaybackPolicy::Single,
            playlist_direction: PlaylistDirection::Older,
            player_bin: "mpv".to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 600,
            webhook_url_override: None,
            player_bin_override: None,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let path = settings_file_path()?;
        let mut settings = Self::load_from(&path)?;
        settings.apply_env_overrides(
            env::var_os("LINGOCAST_WEBHOOK_URL"),
            env::var_os("LINGOCAST_PLAYER_BIN"),
        );
        Ok(settings)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings at {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings at {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let path = settings_file_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create settings directory {}", parent.display())
            })?;
        }
        let raw = serde_json::to_string_pretty(&self.persisted())
            .context("failed to encode settings")?;
        fs::write(path, raw)
            .with_context(|| format!("failed to write settings at {}", path.display()))
    }

    pub fn apply_env_overrides(
        &mut self,
        webhook_url: Option<OsString>,
        player_bin: Option<OsString>,
    ) {
        if let Some(value) = non_empty(webhook_url) {
            self.webhook_url_override = Some(Override {
                file_value: std::mem::replace(&mut self.webhook_url, value.clone()),
                env_value: value,
            });
        }
        if let Some(value) = non_empty(player_bin) {
            self.player_bin_override = Some(Override {
                file_value: std::mem::replace(&mut self.player_bin, value.clone()),
                env_value: value,
            });
        }
    }

    /// The settings as they belong on disk, without environment overrides.
    fn persisted(&self) -> Self {
        let mut out = self.clone();
        if let Some(shadow) = &self.webhook_url_override {
            shadow.restore(&mut out.webhook_url);
        }
        if let Some(shadow) = &self.player_bin_override {
            shadow.restore(&mut out.player_bin);
        }
        out
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(1))
    }
}

fn non_empty(value: Option<OsString>) -> Option<String> {
    match value {
        Some(value) if !value.is_empty() => Some(value.to_string_lossy().into_owned()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("lingocast-settings-{tag}-{}", std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = temp_settings_path("missing");
        let settings = Settings::load_from(&path).expect("defaults");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn save_then_load_keeps_policy_and_direction() {
        let path = temp_settings_path("persist");
        let settings = Settings {
            policy: PlaybackPolicy::Playlist,
            playlist_direction: PlaylistDirection::Newer,
            ..Settings::default()
        };
        settings.save_to(&path).expect("save");
        let loaded = Settings::load_from(&path).expect("load");
        assert_eq!(loaded.policy, PlaybackPolicy::Playlist);
        assert_eq!(loaded.playlist_direction, PlaylistDirection::Newer);
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn partial_file_fills_remaining_fields_from_defaults() {
        let path = temp_settings_path("partial");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, r#"{"webhookUrl":"https://n8n.example/webhook/x","policy":"loop"}"#)
            .expect("write");
        let loaded = Settings::load_from(&path).expect("load");
        assert_eq!(loaded.webhook_url, "https://n8n.example/webhook/x");
        assert_eq!(loaded.policy, PlaybackPolicy::Loop);
        assert_eq!(loaded.main_voice, "albo");
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn env_override_is_not_written_back_on_save() {
        let path = temp_settings_path("override");
        Settings {
            webhook_url: "https://n8n.example/webhook/story".to_string(),
            ..Settings::default()
        }
        .save_to(&path)
        .expect("seed");

        let mut settings = Settings::load_from(&path).expect("load");
        settings.apply_env_overrides(Some(OsString::from("http://temp-override")), None);
        assert_eq!(settings.webhook_url, "http://temp-override");
        settings.policy = PlaybackPolicy::Loop;
        settings.save_to(&path).expect("save");

        let reloaded = Settings::load_from(&path).expect("reload");
        assert_eq!(reloaded.webhook_url, "https://n8n.example/webhook/story");
        assert_eq!(reloaded.policy, PlaybackPolicy::Loop);
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn explicit_change_wins_over_env_override_on_save() {
        let path = temp_settings_path("override-change");
        let mut settings = Settings::default();
        settings.apply_env_overrides(None, Some(OsString::from("/opt/mpv")));
        settings.player_bin = "/usr/local/bin/mpv".to_string();
        settings.save_to(&path).expect("save");

        let reloaded = Settings::load_from(&path).expect("reload");
        assert_eq!(reloaded.player_bin, "/usr/local/bin/mpv");
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn env_overrides_ignore_empty_values() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(Some(OsString::new()), Some(OsString::from("/opt/mpv")));
        assert_eq!(settings.webhook_url, DEFAULT_WEBHOOK_URL);
        assert_eq!(settings.player_bin, "/opt/mpv");
    }
}
