//! Zips a server directory into the shared worlds archive folder. The
//! archive walk and compression are blocking work, so they run on the
//! blocking pool.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::info;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::models::server_record::ServerRecord;
use crate::paths::Paths;

const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y.%m.%d-%H.%M.%S";

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("backup archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("backup io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backup task was cancelled")]
    Cancelled,
}

/// Archives the whole server directory and returns the archive path.
pub async fn backup_server(paths: &Paths, record: &ServerRecord) -> Result<PathBuf, BackupError> {
    let stamp = chrono::Local::now().format(ARCHIVE_TIMESTAMP_FORMAT);
    let archive_name = format!("{}-{}-{}.zip", record.name, record.game_version, stamp);
    let worlds_dir = paths.worlds_dir();
    tokio::fs::create_dir_all(&worlds_dir).await?;
    let archive_path = worlds_dir.join(archive_name);

    info!(
        "backing up {} -> {}",
        record.directory.display(),
        archive_path.display()
    );

    let source = record.directory.clone();
    let target = archive_path.clone();
    tokio::task::spawn_blocking(move || zip_directory(&source, &target))
        .await
        .map_err(|_| BackupError::Cancelled)??;

    Ok(archive_path)
}

fn zip_directory(source: &Path, target: &Path) -> Result<(), BackupError> {
    let file = File::create(target)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut buffer = Vec::new();
    for entry in WalkDir::new(source).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let relative = match path.strip_prefix(source) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let name = relative.to_string_lossy();

        if path.is_dir() {
            zip.add_directory(name.as_ref(), options)?;
        } else {
            zip.start_file(name.as_ref(), options)?;
            let mut f = File::open(path)?;
            buffer.clear();
            f.read_to_end(&mut buffer)?;
            zip.write_all(&buffer)?;
        }
    }

    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::server_record::Edition;

    #[tokio::test]
    async fn backup_produces_archive_with_entries() {
        let base = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(base.path().to_path_buf());

        let record = ServerRecord::new(
            "alpha".to_string(),
            Edition::Vanilla,
            "1.8.8".to_string(),
            paths.server_dir("alpha", "vanilla", "1.8.8"),
            "server.jar".to_string(),
        );
        std::fs::create_dir_all(record.directory.join("world")).unwrap();
        std::fs::write(record.directory.join("server.properties"), "motd=hi\n").unwrap();
        std::fs::write(record.directory.join("world/level.dat"), b"\x0a\x00").unwrap();

        let archive = backup_server(&paths, &record).await.unwrap();
        assert!(archive.starts_with(paths.worlds_dir()));

        let zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let names: Vec<&str> = zip.file_names().collect();
        assert!(names.contains(&"server.properties"));
        assert!(names.iter().any(|n| n.ends_with("level.dat")));
    }
}
