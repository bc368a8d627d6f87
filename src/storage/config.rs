use std::path::{Path, PathBuf};

use vidqueue_core::fs_paths::{AppPaths, DesktopPaths};
use vidqueue_core::models::settings::AppSettings;

const SETTINGS_FILE: &str = "settings.json";

pub fn settings_path() -> PathBuf {
    DesktopPaths.config_dir().join(SETTINGS_FILE)
}

pub fn load_settings() -> AppSettings {
    load_settings_from(&settings_path())
}

/// Reads settings from `path`. A missing file is normal; an unreadable or
/// malformed one is logged and replaced by defaults.
pub fn load_settings_from(path: &Path) -> AppSettings {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AppSettings::default(),
        Err(e) => {
            tracing::warn!("could not read {}: {}", path.display(), e);
            return AppSettings::default();
        }
    };

    match serde_json::from_str::<AppSettings>(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("ignoring malformed settings in {}: {}", path.display(), e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(settings: &AppSettings) -> anyhow::Result<PathBuf> {
    let path = settings_path();
    save_settings_to(&path, settings)?;
    Ok(path)
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)?;
    tracing::info!("settings saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vidqueue_core::models::media::{OutputFormat, Quality};

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(&dir.path().join("nope.json"));
        assert_eq!(settings.advanced.max_retries, 5);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings_from(&path).download.default_audio_bitrate, 192);
    }

    #[test]
    fn partial_file_fills_missing_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        let raw = json!({ "download": { "default_quality": "1080p", "default_format": "mkv" } });
        std::fs::write(&path, raw.to_string()).unwrap();

        let settings = load_settings_from(&path);
        assert_eq!(settings.download.default_quality, Quality::MaxHeight(1080));
        assert_eq!(settings.download.default_format, OutputFormat::Mkv);
        assert_eq!(settings.window.width, 800);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let mut settings = AppSettings::default();
        settings.download.default_audio_bitrate = 320;
        save_settings_to(&path, &settings).unwrap();
        assert_eq!(load_settings_from(&path).download.default_audio_bitrate, 320);
    }
}
