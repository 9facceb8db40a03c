//! Username-to-UUID resolution through the playerdb.co lookup service.

use log::debug;
use serde::Deserialize;

const PLAYERDB_URL: &str = "https://playerdb.co/api/player/minecraft";

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("no player named {0:?} exists")]
    NotFound(String),
    #[error("player lookup service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Deserialize)]
struct LookupResponse {
    success: bool,
    data: Option<LookupData>,
}

#[derive(Deserialize)]
struct LookupData {
    player: PlayerData,
}

#[derive(Deserialize)]
struct PlayerData {
    id: String,
}

/// Resolves a username to its canonical hyphenated UUID. An answer from
/// the service that does not carry a player is a [`LookupError::NotFound`];
/// failing to reach or parse the service at all is
/// [`LookupError::Unavailable`].
pub async fn resolve_player_uuid(name: &str) -> Result<String, LookupError> {
    let url = format!("{PLAYERDB_URL}/{name}");
    debug!("resolving player uuid via {url}");

    let response = reqwest::get(&url)
        .await
        .map_err(|e| LookupError::Unavailable(e.to_string()))?;

    // The service answers 400/404 with a well-formed envelope where
    // success is false, so decode the body before judging the status.
    let body: LookupResponse = response
        .json()
        .await
        .map_err(|e| LookupError::Unavailable(e.to_string()))?;

    match body.data {
        Some(data) if body.success => Ok(data.player.id),
        _ => Err(LookupError::NotFound(name.to_string())),
    }
}
