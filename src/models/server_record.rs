use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which server distribution family an instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    Vanilla,
    Paper,
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edition::Vanilla => write!(f, "vanilla"),
            Edition::Paper => write!(f, "paper"),
        }
    }
}

impl FromStr for Edition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vanilla" => Ok(Edition::Vanilla),
            "paper" => Ok(Edition::Paper),
            other => Err(format!("unknown edition: {other}")),
        }
    }
}

/// One managed server instance as persisted in the registry document.
///
/// `id` is allocated once at creation and never reused; `directory` is owned
/// exclusively by this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub id: Uuid,
    pub name: String,
    pub edition: Edition,
    pub game_version: String,
    pub directory: PathBuf,
    pub binary_file: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Updated on meaningful access; best-effort, not load-bearing.
    pub last_accessed_at: i64,
}

impl ServerRecord {
    pub fn new(
        name: String,
        edition: Edition,
        game_version: String,
        directory: PathBuf,
        binary_file: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4(),
            name,
            edition,
            game_version,
            directory,
            binary_file,
            created_at: now,
            last_accessed_at: now,
        }
    }

    pub fn properties_file(&self) -> PathBuf {
        self.directory.join("server.properties")
    }

    pub fn eula_file(&self) -> PathBuf {
        self.directory.join("eula.txt")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.directory.join(".pid")
    }
}
