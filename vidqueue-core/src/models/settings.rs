use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::media::{OutputFormat, Quality};

pub const DEFAULT_MIN_FREE_SPACE_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub appearance: AppearanceSettings,
    #[serde(default)]
    pub window: WindowSettings,
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default)]
    pub advanced: AdvancedSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppearanceSettings {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_color_theme")]
    pub color_theme: String,
    #[serde(default = "default_font_family")]
    pub font_family: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    #[serde(default = "default_output_dir")]
    pub default_output_dir: PathBuf,
    #[serde(default)]
    pub default_quality: Quality,
    #[serde(default)]
    pub default_format: OutputFormat,
    /// kbps, used for mp3 extraction when a task carries no bitrate.
    #[serde(default = "default_audio_bitrate")]
    pub default_audio_bitrate: u32,
    #[serde(default = "default_filename_template")]
    pub filename_template: String,
    #[serde(default)]
    pub extra_ytdlp_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_socket_timeout_secs")]
    pub socket_timeout_secs: u64,
    #[serde(default = "default_min_free_space_bytes")]
    pub min_free_space_bytes: u64,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_schema_version() -> u32 {
    1
}

fn default_theme() -> String {
    "dark".into()
}

fn default_color_theme() -> String {
    "blue".into()
}

fn default_font_family() -> String {
    "Arial".into()
}

fn default_audio_bitrate() -> u32 {
    192
}

pub fn default_filename_template() -> String {
    "%(title)s [%(id)s].%(ext)s".into()
}

fn default_max_retries() -> u32 {
    5
}

fn default_socket_timeout_secs() -> u64 {
    30
}

fn default_min_free_space_bytes() -> u64 {
    DEFAULT_MIN_FREE_SPACE_BYTES
}

fn default_progress_interval_ms() -> u64 {
    1000
}

pub fn default_output_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Default for AppearanceSettings {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            color_theme: default_color_theme(),
            font_family: default_font_family(),
        }
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "vidqueue".into(),
            width: 800,
            height: 600,
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            default_output_dir: default_output_dir(),
            default_quality: Quality::default(),
            default_format: OutputFormat::default(),
            default_audio_bitrate: default_audio_bitrate(),
            filename_template: default_filename_template(),
            extra_ytdlp_flags: Vec::new(),
        }
    }
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            socket_timeout_secs: default_socket_timeout_secs(),
            min_free_space_bytes: default_min_free_space_bytes(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            appearance: AppearanceSettings::default(),
            window: WindowSettings::default(),
            download: DownloadSettings::default(),
            advanced: AdvancedSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let settings: AppSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.advanced.max_retries, 5);
        assert_eq!(settings.advanced.min_free_space_bytes, DEFAULT_MIN_FREE_SPACE_BYTES);
        assert_eq!(settings.download.default_audio_bitrate, 192);
        assert_eq!(settings.download.default_quality, Quality::MaxHeight(720));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let settings: AppSettings = serde_json::from_str(
            r#"{"advanced": {"max_retries": 2}, "download": {"default_output_dir": "/tmp/x", "default_quality": "best"}}"#,
        )
        .unwrap();
        assert_eq!(settings.advanced.max_retries, 2);
        assert_eq!(settings.advanced.socket_timeout_secs, 30);
        assert_eq!(settings.download.default_quality, Quality::Best);
        assert_eq!(settings.download.filename_template, default_filename_template());
    }
}
