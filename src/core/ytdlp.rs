use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::Value;
use vidqueue_core::models::media::{Entry, OutputFormat, ResolutionResult, Task};
use vidqueue_core::models::settings::AppSettings;

use crate::core::error::{EngineError, EngineResult};
use crate::core::filename::display_title;
use crate::core::process;
use crate::core::progress::PROGRESS_TEMPLATE;

pub const FILE_MARKER: &str = "vidqueue-file|";

const DEFAULT_PLAYLIST_TITLE: &str = "Playlist";

/// Queries metadata without downloading. Playlists are expanded flat: one
/// shallow record per item.
pub async fn dump_metadata(ytdlp: &Path, url: &str) -> EngineResult<Value> {
    let output = process::command(ytdlp)
        .args([
            "--dump-single-json",
            "--flat-playlist",
            "--no-warnings",
            url,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| EngineError::Process(format!("failed to run yt-dlp: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::Process(error_tail(&stderr).unwrap_or_else(|| {
            format!("yt-dlp exited with {}", output.status)
        })));
    }

    Ok(serde_json::from_slice(&output.stdout)?)
}

/// Last `ERROR:` line of yt-dlp's stderr, or the last non-empty line.
pub fn error_tail(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.trim_start_matches("ERROR:").trim().to_string())
}

pub fn parse_resolution(json: &Value) -> ResolutionResult {
    let is_playlist_type = json.get("_type").and_then(|v| v.as_str()) == Some("playlist");

    if let Some(raw_entries) = json.get("entries").and_then(|v| v.as_array()) {
        let entries: Vec<Entry> = raw_entries
            .iter()
            .filter(|e| e.as_object().map(|o| !o.is_empty()).unwrap_or(false))
            .map(parse_entry)
            .collect();

        if is_playlist_type || !entries.is_empty() {
            let title = json
                .get("title")
                .and_then(|v| v.as_str())
                .map(crate::core::filename::clean_title)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_PLAYLIST_TITLE.to_string());
            let uploader = json
                .get("uploader")
                .or_else(|| json.get("channel"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            return ResolutionResult::Playlist {
                title,
                uploader,
                entries,
            };
        }
    }

    ResolutionResult::Video {
        entry: parse_entry(json),
    }
}

fn string_field(json: &Value, key: &str) -> Option<String> {
    match json.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn http_field(json: &Value, key: &str) -> Option<String> {
    string_field(json, key).filter(|u| u.starts_with("http://") || u.starts_with("https://"))
}

pub fn canonical_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

pub fn parse_entry(json: &Value) -> Entry {
    let id = string_field(json, "id").unwrap_or_default();

    let url = http_field(json, "webpage_url")
        .or_else(|| http_field(json, "url"))
        .unwrap_or_else(|| {
            if id.is_empty() {
                String::new()
            } else {
                canonical_url(&id)
            }
        });

    let title = display_title(json.get("title").and_then(|v| v.as_str()));

    let duration_seconds = json
        .get("duration")
        .and_then(|v| v.as_f64())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0);

    Entry {
        id,
        url,
        title,
        duration_seconds,
        thumbnail_url: best_thumbnail(json),
    }
}

/// Largest thumbnail by pixel area; yt-dlp lists them in ascending preference,
/// so the last one wins when dimensions are missing.
pub fn best_thumbnail(json: &Value) -> Option<String> {
    let from_list = json
        .get("thumbnails")
        .and_then(|v| v.as_array())
        .and_then(|thumbs| {
            thumbs
                .iter()
                .enumerate()
                .filter_map(|(idx, t)| {
                    let url = t.get("url").and_then(|v| v.as_str())?;
                    let w = t.get("width").and_then(|v| v.as_u64()).unwrap_or(0);
                    let h = t.get("height").and_then(|v| v.as_u64()).unwrap_or(0);
                    Some((w * h, idx, url))
                })
                .max_by_key(|(area, idx, _)| (*area, *idx))
                .map(|(_, _, url)| url.to_string())
        });

    from_list.or_else(|| string_field(json, "thumbnail"))
}

pub fn format_selector(task: &Task) -> String {
    match task.format() {
        OutputFormat::Mp3 | OutputFormat::Wav => "bestaudio/best".to_string(),
        OutputFormat::Mkv => "bestvideo*+bestaudio/best".to_string(),
        OutputFormat::Mp4 | OutputFormat::Original => match task.quality().height() {
            Some(h) => format!(
                "bestvideo*[height<={}]+bestaudio/best[height<={}]/bestvideo*+bestaudio/best",
                h, h
            ),
            None => "bestvideo*+bestaudio/best".to_string(),
        },
    }
}

pub fn build_download_args(task: &Task, output_dir: &Path, settings: &AppSettings) -> Vec<String> {
    let output_template = output_dir
        .join(&settings.download.filename_template)
        .to_string_lossy()
        .to_string();

    let mut args = vec!["-f".to_string(), format_selector(task)];

    match task.format() {
        OutputFormat::Mp3 => {
            let kbps = task
                .audio_bitrate()
                .unwrap_or(settings.download.default_audio_bitrate);
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
                "--audio-quality".to_string(),
                format!("{}K", kbps),
            ]);
        }
        OutputFormat::Wav => {
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                "wav".to_string(),
            ]);
        }
        OutputFormat::Mkv | OutputFormat::Mp4 => {
            args.push("--merge-output-format".to_string());
            args.push(task.format().as_str().to_string());
        }
        OutputFormat::Original => {}
    }

    let retries = settings.advanced.max_retries.to_string();
    args.extend([
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--newline".to_string(),
        "--progress".to_string(),
        "--progress-template".to_string(),
        PROGRESS_TEMPLATE.to_string(),
        "--no-simulate".to_string(),
        "--print".to_string(),
        format!("after_move:{}%(filepath)s", FILE_MARKER),
        "--retries".to_string(),
        retries.clone(),
        "--fragment-retries".to_string(),
        retries,
        "--socket-timeout".to_string(),
        settings.advanced.socket_timeout_secs.to_string(),
    ]);

    args.extend(settings.download.extra_ytdlp_flags.iter().cloned());

    args.extend([
        "-o".to_string(),
        output_template,
        task.url().to_string(),
    ]);

    args
}

pub fn parse_file_line(line: &str) -> Option<PathBuf> {
    let line = line.trim();
    let start = line.find(FILE_MARKER)?;
    let path = line[start + FILE_MARKER.len()..].trim();
    if path.is_empty() || path == "NA" {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

/// Audio extraction replaces the container, so the reported name may still
/// carry the source extension.
pub fn final_path(reported: PathBuf, format: OutputFormat) -> PathBuf {
    match format {
        OutputFormat::Mp3 | OutputFormat::Wav => match format.extension() {
            Some(ext) => reported.with_extension(ext),
            None => reported,
        },
        _ => reported,
    }
}

fn is_partial(name: &str) -> bool {
    name.ends_with(".part") || name.ends_with(".ytdl") || name.starts_with('.')
}

/// Newest finished file in `output_dir` whose name contains `id`. Files of
/// other tasks are never returned.
pub async fn find_downloaded_file(output_dir: &Path, id: &str) -> EngineResult<PathBuf> {
    let not_found = || {
        EngineError::InvalidOutput(format!(
            "downloaded file for {} not found in {}",
            id,
            output_dir.display()
        ))
    };
    if id.trim().is_empty() {
        return Err(not_found());
    }

    let mut entries = tokio::fs::read_dir(output_dir).await?;
    let mut newest: Option<(PathBuf, std::time::SystemTime)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();
        if is_partial(&name) || !name.contains(id) {
            continue;
        }

        let modified = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => continue,
        };

        if newest.as_ref().map(|(_, t)| modified > *t).unwrap_or(true) {
            newest = Some((path, modified));
        }
    }

    newest.map(|(p, _)| p).ok_or_else(not_found)
}

pub async fn list_extractors(ytdlp: &Path) -> EngineResult<Vec<String>> {
    let output = process::command(ytdlp)
        .arg("--list-extractors")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(EngineError::Process(format!(
            "yt-dlp --list-extractors exited with {}",
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
