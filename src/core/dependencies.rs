use std::path::PathBuf;
use std::process::Stdio;

use anyhow::anyhow;
use vidqueue_core::fs_paths::{AppPaths, DesktopPaths};

fn managed_bin_dir() -> Option<PathBuf> {
    DesktopPaths.bin_dir()
}

fn bin_name(tool: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", tool)
    } else {
        tool.to_string()
    }
}

fn version_flag_for(tool: &str) -> &'static str {
    match tool {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    }
}

/// Looks for `tool` on PATH, then in the managed bin dir.
pub async fn find_tool(tool: &str) -> Option<PathBuf> {
    let name = bin_name(tool);

    if let Ok(status) = crate::core::process::command(&name)
        .arg(version_flag_for(tool))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        if status.success() {
            tracing::debug!("found {} on PATH", tool);
            return Some(PathBuf::from(&name));
        }
    }

    let managed = managed_bin_dir()?.join(&name);
    if managed.exists() {
        tracing::debug!("using managed {} at {}", tool, managed.display());
        return Some(managed);
    }

    None
}

pub async fn check_version(tool: &str) -> Option<String> {
    let path = find_tool(tool).await?;
    let output = crate::core::process::command(&path)
        .arg(version_flag_for(tool))
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first_line = stdout.lines().next().unwrap_or("");
    if tool == "ffmpeg" {
        first_line.split_whitespace().nth(2).map(|s| s.to_string())
    } else {
        Some(first_line.trim().to_string())
    }
}

pub async fn ensure_ytdlp() -> anyhow::Result<PathBuf> {
    if let Some(path) = find_tool("yt-dlp").await {
        return Ok(path);
    }

    download_ytdlp_binary().await
}

fn ytdlp_release_url() -> &'static str {
    if cfg!(target_os = "windows") {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp.exe"
    } else if cfg!(target_os = "macos") {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp_macos"
    } else {
        "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp"
    }
}

async fn download_ytdlp_binary() -> anyhow::Result<PathBuf> {
    let target = managed_bin_dir()
        .ok_or_else(|| anyhow!("could not determine data directory"))?
        .join(bin_name("yt-dlp"));

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let download_url = ytdlp_release_url();
    tracing::info!("yt-dlp not found, fetching {}", download_url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()?;

    let response = client.get(download_url).send().await?;

    if !response.status().is_success() {
        return Err(anyhow!("failed to download yt-dlp: HTTP {}", response.status()));
    }

    let bytes = response.bytes().await?;
    let tmp = target.with_extension("download");
    tokio::fs::write(&tmp, &bytes).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        tokio::fs::set_permissions(&tmp, perms).await?;
    }

    tokio::fs::rename(&tmp, &target).await?;
    tracing::info!("installed yt-dlp at {}", target.display());

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_flags() {
        assert_eq!(version_flag_for("ffmpeg"), "-version");
        assert_eq!(version_flag_for("yt-dlp"), "--version");
    }

    #[test]
    fn release_url_points_at_ytdlp() {
        assert!(ytdlp_release_url().contains("yt-dlp/releases/latest"));
    }
}
