use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// Filesystem layout for everything the manager persists. All state lives
/// under one data directory, overridable with `MCSM_DATA_DIR`.
#[derive(Debug, Clone)]
pub struct Paths {
    data_dir: PathBuf,
}

impl Paths {
    pub fn new() -> Result<Self> {
        if let Ok(dir) = std::env::var("MCSM_DATA_DIR") {
            return Ok(Self {
                data_dir: PathBuf::from(dir),
            });
        }
        let base = dirs::data_dir().ok_or_else(|| {
            AppError::Config("could not determine a data directory for this platform".to_string())
        })?;
        Ok(Self {
            data_dir: base.join("mcsm"),
        })
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { data_dir: base }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The one persisted registry document (`{servers: [...]}`).
    pub fn manifest_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// Parent directory for per-server directories created by `create`.
    pub fn servers_dir(&self) -> PathBuf {
        self.data_dir.join("servers")
    }

    /// Where world archives produced by the backup operation land.
    pub fn worlds_dir(&self) -> PathBuf {
        self.data_dir.join("worlds")
    }

    /// Directory owned by a server provisioned with the given identity.
    pub fn server_dir(&self, name: &str, edition: &str, version: &str) -> PathBuf {
        self.servers_dir()
            .join(format!("{name}-{edition}-{version}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_file_under_data_dir() {
        let paths = Paths::with_base(PathBuf::from("/tmp/mcsm-test"));
        assert!(paths.manifest_file().starts_with(paths.data_dir()));
        assert!(paths.manifest_file().ends_with("config.json"));
    }

    #[test]
    fn server_dir_joins_identity() {
        let paths = Paths::with_base(PathBuf::from("/tmp/mcsm-test"));
        let dir = paths.server_dir("survival", "vanilla", "1.15.2");
        assert!(dir.ends_with("servers/survival-vanilla-1.15.2"));
    }
}
