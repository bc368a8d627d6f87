use std::path::PathBuf;

pub trait AppPaths: Send + Sync {
    fn data_dir(&self) -> PathBuf;
    fn config_dir(&self) -> PathBuf;
    fn log_dir(&self) -> PathBuf;
    fn bin_dir(&self) -> Option<PathBuf>;
}

/// Platform directories from `dirs`, overridable through the environment.
#[cfg(feature = "desktop")]
pub struct DesktopPaths;

#[cfg(feature = "desktop")]
impl AppPaths for DesktopPaths {
    fn data_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var("VIDQUEUE_DATA_DIR") {
            return PathBuf::from(dir);
        }
        dirs::data_dir()
            .map(|d| d.join("vidqueue"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn config_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var("VIDQUEUE_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        dirs::config_dir()
            .map(|d| d.join("vidqueue"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    fn bin_dir(&self) -> Option<PathBuf> {
        Some(self.data_dir().join("bin"))
    }
}

#[cfg(all(test, feature = "desktop"))]
mod tests {
    use super::*;

    #[test]
    fn logs_and_bin_live_under_data_dir() {
        let paths = DesktopPaths;
        let data = paths.data_dir();
        assert_eq!(paths.log_dir(), data.join("logs"));
        assert_eq!(paths.bin_dir(), Some(data.join("bin")));
    }
}
