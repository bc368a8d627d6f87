use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use tokio::process::Command;
use vidqueue_core::fs_paths::{AppPaths, DesktopPaths};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// `current` with `front` prepended, unless it is already listed.
fn search_path(front: Option<PathBuf>, current: Option<OsString>) -> Option<OsString> {
    let front = front?;
    let mut dirs: Vec<PathBuf> = current
        .as_deref()
        .map(|p| std::env::split_paths(p).collect())
        .unwrap_or_default();
    if dirs.iter().any(|d| *d == front) {
        return None;
    }
    dirs.insert(0, front);
    std::env::join_paths(dirs).ok()
}

/// Builds a command for an external tool. The managed bin dir is searched
/// before the inherited PATH and Python is forced to UTF-8 I/O.
pub fn command<S: AsRef<OsStr>>(program: S) -> Command {
    let mut cmd = Command::new(program);

    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    if let Some(path) = search_path(DesktopPaths.bin_dir(), std::env::var_os("PATH")) {
        cmd.env("PATH", path);
    }
    cmd.env("PYTHONIOENCODING", "utf-8").env("PYTHONUTF8", "1");
    cmd
}

/// Like [`command`], but on unix the child leads its own process group so a
/// terminal Ctrl-C reaches only us and we decide how to stop it.
pub fn detached<S: AsRef<OsStr>>(program: S) -> Command {
    let mut cmd = command(program);

    #[cfg(unix)]
    cmd.process_group(0);

    cmd
}
