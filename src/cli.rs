//! Command-line front-end: resolve a URL, queue every entry and download them
//! one after another.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use vidqueue_core::core::cancel::CancellationFlag;
use vidqueue_core::core::events::QueueSnapshot;
use vidqueue_core::models::media::{validate_url, Entry, OutputFormat, Quality, ResolutionResult, Task};
use vidqueue_core::models::settings::AppSettings;

use crate::core::engine::{DownloadEngine, YtdlpEngine};
use crate::core::events::ConsoleEmitter;
use crate::core::queue::QueueWorker;
use crate::core::{dependencies, ffmpeg, logging, ytdlp};
use crate::storage::config;

const SUPPORTED_SITES_URL: &str =
    "https://github.com/yt-dlp/yt-dlp/blob/master/supportedsites.md";

#[derive(Debug, Parser)]
#[command(name = "vidqueue", version, about = "Download videos and playlists with yt-dlp, one at a time")]
pub struct Cli {
    /// Video or playlist URL
    #[arg(short, long)]
    pub url: Option<String>,

    /// Maximum video height (480p, 720p, 1080p, ...) or "best"
    #[arg(short, long)]
    pub quality: Option<Quality>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// original, mp4, mkv, mp3 or wav
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// Audio bitrate in kbps for mp3
    #[arg(long)]
    pub audio_bitrate: Option<u32>,

    #[arg(long)]
    pub gui: bool,

    /// Print the sites yt-dlp can extract from
    #[arg(long)]
    pub list_sites: bool,

    /// Show what the URL resolves to without downloading
    #[arg(long)]
    pub info: bool,

    #[arg(short, long)]
    pub verbose: bool,

    /// Store quality, format, bitrate and output directory as the new defaults
    #[arg(long)]
    pub save_defaults: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Selection {
    format: OutputFormat,
    quality: Quality,
    audio_bitrate: u32,
}

/// Folds command-line choices into the loaded settings.
fn apply_overrides(cli: &Cli, settings: &mut AppSettings) -> Selection {
    if let Some(q) = cli.quality {
        settings.download.default_quality = q;
    }
    if let Some(f) = cli.format {
        settings.download.default_format = f;
    }
    if let Some(kbps) = cli.audio_bitrate.filter(|k| *k > 0) {
        settings.download.default_audio_bitrate = kbps;
    }
    if let Some(dir) = &cli.output {
        settings.download.default_output_dir = dir.clone();
    }
    Selection {
        format: settings.download.default_format,
        quality: settings.download.default_quality,
        audio_bitrate: settings.download.default_audio_bitrate,
    }
}

fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "--:--".into();
    }
    let total = seconds.round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

fn print_entry(index: usize, entry: &Entry) {
    println!(
        "{:>3}. {} [{}] ({})",
        index + 1,
        entry.title,
        entry.id,
        format_duration(entry.duration_seconds)
    );
    println!("     {}", entry.url);
}

fn print_resolution(result: &ResolutionResult) {
    match result {
        ResolutionResult::Video { entry } => print_entry(0, entry),
        ResolutionResult::Playlist {
            title,
            uploader,
            entries,
        } => {
            match uploader {
                Some(u) => println!("{} by {} ({} items)", title, u, entries.len()),
                None => println!("{} ({} items)", title, entries.len()),
            }
            for (i, entry) in entries.iter().enumerate() {
                print_entry(i, entry);
            }
        }
        ResolutionResult::Error { message } => eprintln!("error: {}", message),
    }
}

fn build_tasks(entries: &[Entry], selection: Selection) -> Vec<Task> {
    entries
        .iter()
        .filter_map(|entry| {
            match Task::from_entry(entry, selection.format, selection.quality, Some(selection.audio_bitrate)) {
                Ok(task) => Some(task),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", entry.url, e);
                    None
                }
            }
        })
        .collect()
}

fn exit_code(snapshot: &QueueSnapshot) -> ExitCode {
    if snapshot.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn list_sites() -> ExitCode {
    let listed = match dependencies::ensure_ytdlp().await {
        Ok(path) => ytdlp::list_extractors(&path).await.map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    match listed {
        Ok(sites) => {
            for site in sites {
                println!("{}", site);
            }
        }
        Err(e) => {
            tracing::warn!("could not list extractors: {}", e);
            println!("See {} for the list of supported sites.", SUPPORTED_SITES_URL);
        }
    }
    ExitCode::SUCCESS
}

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init(cli.verbose);

    if cli.gui {
        eprintln!("no graphical front-end is bundled with this build; use -u/--url");
        return Ok(ExitCode::FAILURE);
    }

    if cli.list_sites {
        return Ok(list_sites().await);
    }

    let mut settings = config::load_settings();
    let selection = apply_overrides(&cli, &mut settings);

    if cli.save_defaults {
        let path = config::save_settings(&settings)?;
        eprintln!("defaults saved to {}", path.display());
    }

    let url = match cli.url.as_deref() {
        Some(url) => url,
        None if cli.save_defaults => return Ok(ExitCode::SUCCESS),
        None => {
            eprintln!("error: a URL is required (-u/--url)");
            return Ok(ExitCode::FAILURE);
        }
    };
    if let Err(e) = validate_url(url) {
        eprintln!("error: {}", e);
        return Ok(ExitCode::FAILURE);
    }

    if let Some(version) = dependencies::check_version("yt-dlp").await {
        tracing::debug!("yt-dlp {}", version);
    }

    let engine = Arc::new(YtdlpEngine::new(Arc::new(settings))?);
    if let Some(dir) = &cli.output {
        engine.set_output_path(dir)?;
    }

    let resolution = engine.resolve(url).await;
    if resolution.is_error() || cli.info {
        print_resolution(&resolution);
        return Ok(if resolution.is_error() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        });
    }

    let tasks = build_tasks(resolution.entries(), selection);
    if tasks.is_empty() {
        eprintln!("nothing to download");
        return Ok(ExitCode::SUCCESS);
    }
    eprintln!(
        "{} item(s) -> {} ({}, {})",
        tasks.len(),
        engine.output_path().display(),
        selection.format,
        selection.quality
    );

    if selection.format == OutputFormat::Mp4 && !ffmpeg::is_ffmpeg_available().await {
        tracing::warn!("ffmpeg not found; downloads that need an mp4 remux will fail");
    }

    let emitter = if std::io::stderr().is_terminal() {
        ConsoleEmitter::new()
    } else {
        ConsoleEmitter::new().quiet()
    };
    let cancel = CancellationFlag::new();
    let worker = QueueWorker::with_cancel_flag(engine, emitter, cancel.clone());
    worker.start(tasks).await;

    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ncancelling...");
            cancel.set();
        }
    });

    worker.wait().await;
    ctrl_c.abort();

    Ok(exit_code(&worker.snapshot().await))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> Entry {
        Entry {
            id: id.into(),
            url: format!("https://www.youtube.com/watch?v={}", id),
            title: id.to_uppercase(),
            duration_seconds: 30.0,
            thumbnail_url: None,
        }
    }

    #[test]
    fn parses_short_flags() {
        let cli = Cli::try_parse_from([
            "vidqueue", "-u", "https://x.test/v", "-q", "1080p", "-o", "/tmp/out", "-f", "mp3", "-v",
        ])
        .unwrap();
        assert_eq!(cli.url.as_deref(), Some("https://x.test/v"));
        assert_eq!(cli.quality, Some(Quality::MaxHeight(1080)));
        assert_eq!(cli.output, Some(PathBuf::from("/tmp/out")));
        assert_eq!(cli.format, Some(OutputFormat::Mp3));
        assert!(cli.verbose);
    }

    #[test]
    fn rejects_unknown_quality() {
        assert!(Cli::try_parse_from(["vidqueue", "-q", "huge"]).is_err());
    }

    #[test]
    fn overrides_replace_settings() {
        let cli = Cli::try_parse_from(["vidqueue", "-q", "best", "--audio-bitrate", "320"]).unwrap();
        let mut settings = AppSettings::default();
        let selection = apply_overrides(&cli, &mut settings);
        assert_eq!(selection.quality, Quality::Best);
        assert_eq!(selection.audio_bitrate, 320);
        assert_eq!(selection.format, OutputFormat::Original);
        assert_eq!(settings.download.default_quality, Quality::Best);
    }

    #[test]
    fn zero_bitrate_keeps_default() {
        let cli = Cli::try_parse_from(["vidqueue", "--audio-bitrate", "0"]).unwrap();
        let mut settings = AppSettings::default();
        assert_eq!(apply_overrides(&cli, &mut settings).audio_bitrate, 192);
    }

    #[test]
    fn tasks_follow_entry_order() {
        let selection = Selection {
            format: OutputFormat::Mkv,
            quality: Quality::Best,
            audio_bitrate: 192,
        };
        let tasks = build_tasks(&[entry("a"), entry("b"), entry("c")], selection);
        let ids: Vec<&str> = tasks.iter().map(|t| t.id()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(tasks[0].format(), OutputFormat::Mkv);
        assert_eq!(tasks[1].title(), "B");
    }

    #[test]
    fn durations_are_formatted() {
        assert_eq!(format_duration(0.0), "--:--");
        assert_eq!(format_duration(65.4), "1:05");
        assert_eq!(format_duration(3725.0), "1:02:05");
    }

    #[test]
    fn failures_set_exit_code() {
        let ok = QueueSnapshot {
            completed: 2,
            cancelled: 1,
            ..Default::default()
        };
        let failed = QueueSnapshot {
            failed: 1,
            ..Default::default()
        };
        assert_eq!(exit_code(&ok), ExitCode::SUCCESS);
        assert_eq!(exit_code(&failed), ExitCode::FAILURE);
    }
}
