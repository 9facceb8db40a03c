use std::io;

use uuid::Uuid;

use crate::backup::BackupError;
use crate::commands::launcher::LaunchError;
use crate::config::store::StoreError;
use crate::net::download::DownloadError;
use crate::net::playerdb::LookupError;
use crate::net::query::QueryError;
use crate::net::rcon::RconError;
use crate::utils::java_detector::JavaError;

/// Top-level error type. Component modules define their own closed error
/// enums; everything funnels through here so the HTTP layer can turn any
/// failure into the uniform response envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("a server already exists at that path")]
    Conflict,

    #[error("no such server: {0}")]
    NotFound(Uuid),

    #[error("server is already running")]
    AlreadyRunning,

    #[error("server is not running")]
    NotRunning,

    #[error("server is still running; stop it before deleting")]
    ServerBusy,

    #[error("querying is disabled in server.properties")]
    QueryDisabled,

    #[error("timed out waiting for process {0} to exit")]
    RestartTimeout(u32),

    #[error("missing server.properties in {0}")]
    MissingProperties(std::path::PathBuf),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Java(#[from] JavaError),

    #[error(transparent)]
    Rcon(#[from] RconError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
