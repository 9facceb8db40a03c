use serde::{Deserialize, Serialize};

/// Timestamp format the game expects in the `created` field of ban entries.
pub const BAN_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Value written to the `source` field of ban entries we author.
pub const BAN_SOURCE: &str = "mcsm";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpEntry {
    pub uuid: String,
    pub name: String,
    /// Taken from the server's `op-permission-level` property at op time.
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerBanEntry {
    pub uuid: String,
    pub name: String,
    pub created: String,
    pub source: String,
    pub expires: String,
    pub reason: String,
}

impl PlayerBanEntry {
    pub fn new(uuid: String, name: String, reason: String) -> Self {
        Self {
            uuid,
            name,
            created: chrono::Local::now().format(BAN_TIMESTAMP_FORMAT).to_string(),
            source: BAN_SOURCE.to_string(),
            expires: "forever".to_string(),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpBanEntry {
    pub ip: String,
    pub created: String,
    pub source: String,
    pub expires: String,
    pub reason: String,
}

impl IpBanEntry {
    pub fn new(ip: String, reason: String) -> Self {
        Self {
            ip,
            created: chrono::Local::now().format(BAN_TIMESTAMP_FORMAT).to_string(),
            source: BAN_SOURCE.to_string(),
            expires: "forever".to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_ban_defaults() {
        let ban = PlayerBanEntry::new("some-uuid".into(), "steve".into(), "griefing".into());
        assert_eq!(ban.source, BAN_SOURCE);
        assert_eq!(ban.expires, "forever");
        assert!(!ban.created.is_empty());
    }

    #[test]
    fn ip_ban_serializes_with_ip_key() {
        let ban = IpBanEntry::new("10.0.0.7".into(), "spam".into());
        let json = serde_json::to_value(&ban).unwrap();
        assert_eq!(json["ip"], "10.0.0.7");
        assert_eq!(json["reason"], "spam");
    }
}
