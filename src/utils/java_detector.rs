//! Locates a Java runtime compatible with the managed server jars.
//!
//! The supported distribution targets Java 8; a newer runtime is rejected
//! with a distinct error rather than launched with unverified flags. Both
//! failure modes carry the download link so the dashboard can point the
//! operator at a fix.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use which::which;

/// Where to send the operator when no usable runtime is found.
pub const JAVA_DOWNLOAD_URL: &str = "https://www.java.com/en/download/manual.jsp";

/// Major version the managed jars are validated against.
pub const REQUIRED_MAJOR: u32 = 8;

#[derive(Debug, thiserror::Error)]
pub enum JavaError {
    #[error("no java installation found; install one from {JAVA_DOWNLOAD_URL}")]
    NotInstalled,
    #[error(
        "java {found} is not supported, java {REQUIRED_MAJOR} is required; \
         see {JAVA_DOWNLOAD_URL}"
    )]
    WrongVersion { found: u32 },
    #[error("could not determine java version: {0}")]
    VersionUnknown(String),
}

// `java -version` prints e.g. `version "1.8.0_292"` or `version "17.0.1"`.
static VERSION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"version "(\d+)(?:\.(\d+))?"#).expect("static regex"));

/// A resolved runtime: executable path plus effective major version.
#[derive(Debug, Clone)]
pub struct JavaRuntime {
    pub path: PathBuf,
    pub major: u32,
}

/// Finds a Java executable whose major version matches [`REQUIRED_MAJOR`].
///
/// Candidates come from `JAVA_HOME`, the `PATH`, and common install
/// locations, in that order. If installations exist but none match, the
/// error reports the first version seen so the operator knows what they
/// have.
pub async fn resolve_java() -> Result<JavaRuntime, JavaError> {
    let mut first_seen: Option<u32> = None;

    for candidate in candidate_paths() {
        debug!("checking java candidate: {}", candidate.display());
        match java_major(&candidate).await {
            Ok(major) if major == REQUIRED_MAJOR => {
                info!("using java {} at {}", major, candidate.display());
                return Ok(JavaRuntime {
                    path: candidate,
                    major,
                });
            }
            Ok(major) => {
                warn!("java {} at {} is unusable", major, candidate.display());
                first_seen.get_or_insert(major);
            }
            Err(e) => debug!("candidate {} rejected: {}", candidate.display(), e),
        }
    }

    match first_seen {
        Some(found) => Err(JavaError::WrongVersion { found }),
        None => Err(JavaError::NotInstalled),
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(home) = env::var_os("JAVA_HOME") {
        candidates.push(java_executable(Path::new(&home)));
    }
    if let Ok(path) = which("java") {
        candidates.push(path);
    }
    for home in common_install_homes() {
        let exec = java_executable(&home);
        if exec.exists() {
            candidates.push(exec);
        }
    }

    candidates.retain(|p| p.exists());
    candidates.dedup();
    candidates
}

fn java_executable(home: &Path) -> PathBuf {
    let name = if cfg!(windows) { "java.exe" } else { "java" };
    home.join("bin").join(name)
}

fn common_install_homes() -> Vec<PathBuf> {
    let literals: &[&str] = if cfg!(windows) {
        &[
            r"C:\Program Files\Eclipse Adoptium\jdk-8",
            r"C:\Program Files\Java\jdk-8",
            r"C:\Program Files\Java\jre1.8.0",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Library/Java/JavaVirtualMachines/temurin-8.jdk/Contents/Home",
            "/Library/Java/JavaVirtualMachines/adoptopenjdk-8.jdk/Contents/Home",
        ]
    } else {
        &[
            "/usr/lib/jvm/java-8-openjdk",
            "/usr/lib/jvm/java-8-openjdk-amd64",
            "/usr/lib/jvm/java-1.8.0-openjdk",
            "/usr/lib/jvm/default-java",
        ]
    };
    literals.iter().map(PathBuf::from).collect()
}

/// Runs `<bin> -version` and extracts the effective major version
/// (`1.8.x` counts as 8).
pub async fn java_major(bin: &Path) -> Result<u32, JavaError> {
    let output = tokio::process::Command::new(bin)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| JavaError::VersionUnknown(e.to_string()))?;

    // `-version` prints to stderr.
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(JavaError::VersionUnknown(stderr.trim().to_string()));
    }
    parse_major(&stderr).ok_or_else(|| JavaError::VersionUnknown(stderr.trim().to_string()))
}

fn parse_major(version_output: &str) -> Option<u32> {
    let captures = VERSION_REGEX.captures(version_output)?;
    let first: u32 = captures.get(1)?.as_str().parse().ok()?;
    if first == 1 {
        captures.get(2)?.as_str().parse().ok()
    } else {
        Some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_version_format() {
        let out = r#"openjdk version "1.8.0_292""#;
        assert_eq!(parse_major(out), Some(8));
    }

    #[test]
    fn parses_modern_version_format() {
        assert_eq!(parse_major(r#"openjdk version "11.0.11" 2021-04-20"#), Some(11));
        assert_eq!(parse_major(r#"openjdk version "17" 2021-09-14"#), Some(17));
    }

    #[test]
    fn garbage_output_yields_none() {
        assert_eq!(parse_major("command not found"), None);
    }

    #[test]
    fn wrong_version_error_names_the_link() {
        let err = JavaError::WrongVersion { found: 17 };
        let msg = err.to_string();
        assert!(msg.contains("17"));
        assert!(msg.contains(JAVA_DOWNLOAD_URL));
        assert!(JavaError::NotInstalled.to_string().contains(JAVA_DOWNLOAD_URL));
    }
}
