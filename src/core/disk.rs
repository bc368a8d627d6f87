use std::path::Path;

use crate::core::error::{EngineError, EngineResult};

/// Free bytes on the volume holding `path`. Walks up to the nearest existing
/// ancestor so the check works before the output directory is created.
pub fn free_space(path: &Path) -> std::io::Result<u64> {
    let mut probe = path;
    while !probe.exists() {
        match probe.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => probe = parent,
            _ => {
                probe = Path::new(".");
                break;
            }
        }
    }
    fs2::available_space(probe)
}

/// Free space has to exceed the threshold, not just reach it.
fn check_space(available: u64, required: u64) -> EngineResult<u64> {
    if available <= required {
        return Err(EngineError::InsufficientSpace {
            required,
            available,
        });
    }
    Ok(available)
}

/// Pre-flight check run before a task touches the network.
pub fn ensure_free_space(path: &Path, required: u64) -> EngineResult<u64> {
    check_space(free_space(path)?, required)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_space_of_missing_dir_uses_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("a").join("b");
        assert!(free_space(&missing).unwrap() > 0);
    }

    #[test]
    fn ensure_reports_shortfall() {
        let dir = tempfile::tempdir().unwrap();
        let err = ensure_free_space(dir.path(), u64::MAX).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientSpace { required: u64::MAX, .. }));
    }

    #[test]
    fn exact_threshold_is_not_enough() {
        let err = check_space(1024, 1024).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientSpace {
                required: 1024,
                available: 1024
            }
        ));
        assert_eq!(check_space(1025, 1024).unwrap(), 1025);
        assert!(check_space(0, 0).is_err());
    }

    #[test]
    fn ensure_passes_with_zero_requirement() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_free_space(dir.path(), 0).is_ok());
    }
}
