use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("task id must not be empty")]
    EmptyId,
    #[error("unknown output format: {0}")]
    UnknownFormat(String),
    #[error("invalid quality: {0}")]
    InvalidQuality(String),
}

/// Target container/codec of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Keep whatever container the source provides.
    #[default]
    #[serde(alias = "none")]
    Original,
    Mp4,
    Mkv,
    Mp3,
    Wav,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Original,
        OutputFormat::Mp4,
        OutputFormat::Mkv,
        OutputFormat::Mp3,
        OutputFormat::Wav,
    ];

    pub fn is_audio(self) -> bool {
        matches!(self, OutputFormat::Mp3 | OutputFormat::Wav)
    }

    pub fn extension(self) -> Option<&'static str> {
        match self {
            OutputFormat::Original => None,
            OutputFormat::Mp4 => Some("mp4"),
            OutputFormat::Mkv => Some("mkv"),
            OutputFormat::Mp3 => Some("mp3"),
            OutputFormat::Wav => Some("wav"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Original => "original",
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mkv => "mkv",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "original" | "none" | "" => Ok(OutputFormat::Original),
            "mp4" => Ok(OutputFormat::Mp4),
            "mkv" => Ok(OutputFormat::Mkv),
            "mp3" => Ok(OutputFormat::Mp3),
            "wav" => Ok(OutputFormat::Wav),
            other => Err(ModelError::UnknownFormat(other.to_string())),
        }
    }
}

/// Video height ceiling used when picking a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Quality {
    Best,
    MaxHeight(u32),
}

impl Quality {
    pub fn height(self) -> Option<u32> {
        match self {
            Quality::Best => None,
            Quality::MaxHeight(h) => Some(h),
        }
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::MaxHeight(720)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Best => f.write_str("best"),
            Quality::MaxHeight(h) => write!(f, "{}p", h),
        }
    }
}

impl FromStr for Quality {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "best" || s == "highest" {
            return Ok(Quality::Best);
        }
        match s.trim_end_matches('p').parse::<u32>() {
            Ok(h) if h > 0 => Ok(Quality::MaxHeight(h)),
            _ => Err(ModelError::InvalidQuality(s)),
        }
    }
}

impl TryFrom<String> for Quality {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quality> for String {
    fn from(q: Quality) -> Self {
        q.to_string()
    }
}

/// One downloadable item produced by resolving a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub url: String,
    pub title: String,
    pub duration_seconds: f64,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResolutionResult {
    Video {
        entry: Entry,
    },
    Playlist {
        title: String,
        uploader: Option<String>,
        entries: Vec<Entry>,
    },
    Error {
        message: String,
    },
}

impl ResolutionResult {
    pub fn entries(&self) -> &[Entry] {
        match self {
            ResolutionResult::Video { entry } => std::slice::from_ref(entry),
            ResolutionResult::Playlist { entries, .. } => entries,
            ResolutionResult::Error { .. } => &[],
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResolutionResult::Error { .. })
    }
}

/// A fully specified download request. Fields are fixed at construction;
/// the `with_*` adapters are meant to be used before the task is enqueued.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    id: String,
    url: String,
    title: String,
    format: OutputFormat,
    quality: Quality,
    audio_bitrate: Option<u32>,
    duration_seconds: f64,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Self, ModelError> {
        let id = id.into();
        let url = url.into();
        if id.trim().is_empty() {
            return Err(ModelError::EmptyId);
        }
        validate_url(&url)?;
        Ok(Self {
            title: id.clone(),
            id,
            url,
            format,
            quality,
            audio_bitrate: None,
            duration_seconds: 0.0,
        })
    }

    /// Builds a task for a resolved entry. Entries without an id get a random one
    /// so progress events can still be correlated.
    pub fn from_entry(
        entry: &Entry,
        format: OutputFormat,
        quality: Quality,
        audio_bitrate: Option<u32>,
    ) -> Result<Self, ModelError> {
        let id = if entry.id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            entry.id.clone()
        };
        Ok(Self::new(id, entry.url.clone(), format, quality)?
            .with_title(entry.title.clone())
            .with_duration(entry.duration_seconds)
            .with_audio_bitrate(audio_bitrate))
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        if !title.trim().is_empty() {
            self.title = title;
        }
        self
    }

    pub fn with_audio_bitrate(mut self, kbps: Option<u32>) -> Self {
        self.audio_bitrate = kbps.filter(|k| *k > 0);
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = if seconds.is_finite() && seconds > 0.0 {
            seconds
        } else {
            0.0
        };
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn audio_bitrate(&self) -> Option<u32> {
        self.audio_bitrate
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }
}

pub fn validate_url(url: &str) -> Result<(), ModelError> {
    match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() => {
            Ok(())
        }
        _ => Err(ModelError::InvalidUrl(url.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> Entry {
        Entry {
            id: id.to_string(),
            url: "https://www.youtube.com/watch?v=abc".to_string(),
            title: "Some Title".to_string(),
            duration_seconds: 42.0,
            thumbnail_url: None,
        }
    }

    #[test]
    fn quality_parses_common_labels() {
        assert_eq!("best".parse::<Quality>().unwrap(), Quality::Best);
        assert_eq!("720p".parse::<Quality>().unwrap(), Quality::MaxHeight(720));
        assert_eq!("1080".parse::<Quality>().unwrap(), Quality::MaxHeight(1080));
        assert!("0p".parse::<Quality>().is_err());
        assert!("hd".parse::<Quality>().is_err());
    }

    #[test]
    fn quality_serializes_as_label() {
        let json = serde_json::to_string(&Quality::MaxHeight(480)).unwrap();
        assert_eq!(json, "\"480p\"");
        let back: Quality = serde_json::from_str("\"best\"").unwrap();
        assert_eq!(back, Quality::Best);
    }

    #[test]
    fn format_parses_none_as_original() {
        assert_eq!("none".parse::<OutputFormat>().unwrap(), OutputFormat::Original);
        assert_eq!("MP3".parse::<OutputFormat>().unwrap(), OutputFormat::Mp3);
        assert!("avi".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn format_audio_flags() {
        assert!(OutputFormat::Mp3.is_audio());
        assert!(OutputFormat::Wav.is_audio());
        assert!(!OutputFormat::Mkv.is_audio());
        assert_eq!(OutputFormat::Original.extension(), None);
    }

    #[test]
    fn task_rejects_bad_url() {
        let err = Task::new("id", "not a url", OutputFormat::Mp4, Quality::Best).unwrap_err();
        assert!(matches!(err, ModelError::InvalidUrl(_)));
        let err = Task::new("id", "ftp://host/file", OutputFormat::Mp4, Quality::Best).unwrap_err();
        assert!(matches!(err, ModelError::InvalidUrl(_)));
    }

    #[test]
    fn task_rejects_empty_id() {
        let err = Task::new("  ", "https://example.com/v", OutputFormat::Mp4, Quality::Best)
            .unwrap_err();
        assert_eq!(err, ModelError::EmptyId);
    }

    #[test]
    fn task_from_entry_copies_fields() {
        let task = Task::from_entry(&entry("abc"), OutputFormat::Mp3, Quality::Best, Some(256))
            .unwrap();
        assert_eq!(task.id(), "abc");
        assert_eq!(task.title(), "Some Title");
        assert_eq!(task.duration_seconds(), 42.0);
        assert_eq!(task.audio_bitrate(), Some(256));
    }

    #[test]
    fn task_from_entry_without_id_gets_generated_one() {
        let task =
            Task::from_entry(&entry(""), OutputFormat::Mp4, Quality::default(), None).unwrap();
        assert!(!task.id().is_empty());
    }

    #[test]
    fn resolution_entries_view() {
        let video = ResolutionResult::Video { entry: entry("a") };
        assert_eq!(video.entries().len(), 1);
        let err = ResolutionResult::Error {
            message: "boom".into(),
        };
        assert!(err.entries().is_empty());
        assert!(err.is_error());
    }
}
