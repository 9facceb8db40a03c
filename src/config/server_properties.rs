//! Codec for the server's own `server.properties` file.
//!
//! The file is line-oriented `key=value` text. Parsing skips blank lines and
//! `#` comments and splits on the first `=` only, so values may themselves
//! contain `=` (MOTDs frequently do). Serialization preserves every key in
//! its original order; the only rewrites we ever apply are the operational
//! flags the dashboard depends on (query + RCON) and an auto-generated RCON
//! password when none is set.

use std::path::Path;

use log::info;
use once_cell::sync::Lazy;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::{AppError, Result};

pub const DEFAULT_RCON_PORT: u16 = 25575;
pub const DEFAULT_QUERY_PORT: u16 = 25565;
const RCON_PASSWORD_LEN: usize = 12;

/// Static help table for known properties (defaults, types, descriptions).
/// Packaged with the binary; not user-mutable at runtime.
static PROPERTY_INFO: Lazy<serde_json::Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../assets/properties-info.json"))
        .unwrap_or(serde_json::Value::Null)
});

pub fn property_info() -> &'static serde_json::Value {
    &PROPERTY_INFO
}

/// An ordered view of a `server.properties` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertiesDocument {
    entries: Vec<(String, String)>,
}

impl PropertiesDocument {
    pub fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => entries.push((key.to_string(), value.to_string())),
                None => entries.push((line.to_string(), String::new())),
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replaces the value for `key`, appending the pair when absent.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Host/port helpers used by the RCON client and liveness prober.
    pub fn server_ip(&self) -> &str {
        self.get("server-ip").unwrap_or("")
    }

    pub fn rcon_port(&self) -> u16 {
        self.get("rcon.port")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RCON_PORT)
    }

    pub fn rcon_password(&self) -> &str {
        self.get("rcon.password").unwrap_or("")
    }

    pub fn query_port(&self) -> u16 {
        self.get("query.port")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_QUERY_PORT)
    }

    /// True only when the file explicitly disables querying.
    pub fn query_disabled(&self) -> bool {
        self.get("enable-query") == Some("false")
    }

    /// Forces the operational flags the dashboard relies on: query and RCON
    /// enabled, an RCON password present (generated when blank), and the
    /// `rcon.password`/`rcon.port` keys existing at all.
    pub fn apply_forced(&mut self) {
        self.set("enable-query", "true");
        self.set("enable-rcon", "true");
        if self.get("rcon.port").is_none() {
            self.set("rcon.port", &DEFAULT_RCON_PORT.to_string());
        }
        match self.get("rcon.password") {
            Some(p) if !p.trim().is_empty() => {}
            _ => self.set("rcon.password", &generate_rcon_password()),
        }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

fn generate_rcon_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RCON_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Reads and parses `<dir>/server.properties`.
pub async fn read_document(dir: &Path) -> Result<PropertiesDocument> {
    let path = dir.join("server.properties");
    if !path.exists() {
        return Err(AppError::MissingProperties(dir.to_path_buf()));
    }
    let text = tokio::fs::read_to_string(&path).await?;
    Ok(PropertiesDocument::parse(&text))
}

/// Writes `doc` back to `<dir>/server.properties` with the forced flags
/// applied. Every write path goes through here so a server can never be
/// persisted with query or RCON turned off.
pub async fn write_document(dir: &Path, mut doc: PropertiesDocument) -> Result<PropertiesDocument> {
    doc.apply_forced();
    tokio::fs::write(dir.join("server.properties"), doc.serialize()).await?;
    info!("wrote server.properties in {}", dir.display());
    Ok(doc)
}

/// Re-reads, forces, and rewrites the properties file in place.
pub async fn enforce_flags(dir: &Path) -> Result<PropertiesDocument> {
    let doc = read_document(dir).await?;
    write_document(dir, doc).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
#Minecraft server properties
#Thu Apr 02 12:00:00 UTC 2020
enable-query=false
enable-rcon=false
motd=A Minecraft Server with = signs = inside
server-port=25565
some-unknown-key=still here
rcon.password=
";

    #[test]
    fn parse_skips_comments_and_blanks() {
        let doc = PropertiesDocument::parse("# comment\n\nkey=value\n");
        assert_eq!(doc.get("key"), Some("value"));
        assert_eq!(doc.iter().count(), 1);
    }

    #[test]
    fn values_keep_equals_signs() {
        let doc = PropertiesDocument::parse(SAMPLE);
        assert_eq!(
            doc.get("motd"),
            Some("A Minecraft Server with = signs = inside")
        );
    }

    #[test]
    fn forced_flags_turn_on_query_and_rcon() {
        let mut doc = PropertiesDocument::parse(SAMPLE);
        doc.apply_forced();
        assert_eq!(doc.get("enable-query"), Some("true"));
        assert_eq!(doc.get("enable-rcon"), Some("true"));
    }

    #[test]
    fn blank_rcon_password_gets_generated_token() {
        let mut doc = PropertiesDocument::parse(SAMPLE);
        doc.apply_forced();
        let password = doc.get("rcon.password").unwrap();
        assert_eq!(password.len(), 12);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn existing_rcon_password_is_preserved() {
        let mut doc = PropertiesDocument::parse("rcon.password=hunter2\n");
        doc.apply_forced();
        assert_eq!(doc.get("rcon.password"), Some("hunter2"));
    }

    #[test]
    fn missing_rcon_keys_are_added() {
        let mut doc = PropertiesDocument::parse("motd=hi\n");
        doc.apply_forced();
        assert_eq!(doc.get("rcon.port"), Some("25575"));
        assert!(doc.get("rcon.password").is_some());
    }

    #[test]
    fn unknown_keys_round_trip_unchanged() {
        let mut doc = PropertiesDocument::parse(SAMPLE);
        doc.apply_forced();
        let text = doc.serialize();
        assert!(text.contains("some-unknown-key=still here\n"));
        assert!(text.contains("motd=A Minecraft Server with = signs = inside\n"));
        // Order of pre-existing keys is preserved.
        let motd_pos = text.find("motd=").unwrap();
        let unknown_pos = text.find("some-unknown-key=").unwrap();
        assert!(motd_pos < unknown_pos);
    }

    #[test]
    fn query_disabled_only_when_explicit() {
        assert!(PropertiesDocument::parse("enable-query=false\n").query_disabled());
        assert!(!PropertiesDocument::parse("enable-query=true\n").query_disabled());
        assert!(!PropertiesDocument::parse("motd=hi\n").query_disabled());
    }

    #[test]
    fn port_helpers_fall_back_to_defaults() {
        let doc = PropertiesDocument::parse("motd=hi\n");
        assert_eq!(doc.rcon_port(), DEFAULT_RCON_PORT);
        assert_eq!(doc.query_port(), DEFAULT_QUERY_PORT);
        let doc = PropertiesDocument::parse("rcon.port=4000\nquery.port=4001\n");
        assert_eq!(doc.rcon_port(), 4000);
        assert_eq!(doc.query_port(), 4001);
    }
}
