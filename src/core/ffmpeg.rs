use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::core::error::{EngineError, EngineResult};
use crate::core::process;

pub async fn is_ffmpeg_available() -> bool {
    process::command("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn remux_target(input: &Path, ext: &str) -> PathBuf {
    input.with_extension(ext)
}

/// Repackages `input` into `output` without re-encoding. Runs to completion;
/// there is no way to interrupt it once started.
pub async fn remux(input: &Path, output: &Path) -> EngineResult<()> {
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let result = process::command("ffmpeg")
        .args([
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            &input.to_string_lossy(),
            "-map",
            "0",
            "-c",
            "copy",
            &output.to_string_lossy(),
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await;

    let out = match result {
        Ok(out) => out,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EngineError::ToolMissing("ffmpeg".into()));
        }
        Err(e) => return Err(EngineError::Process(format!("failed to run ffmpeg: {}", e))),
    };

    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(EngineError::Process(format!(
            "ffmpeg remux failed ({}): {}",
            out.status,
            stderr.trim()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remux_target_swaps_extension() {
        assert_eq!(
            remux_target(Path::new("/out/clip [id].webm"), "mp4"),
            PathBuf::from("/out/clip [id].mp4")
        );
    }
}
