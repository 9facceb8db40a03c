//! HTTP surface for the dashboard. Every route is a GET carrying its
//! arguments in the path, and every reply rides the same
//! `{success, message, data}` envelope, failures included, so the frontend
//! has exactly one decode path. Only I/O faults the caller cannot act on
//! become a bare 500.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::Engine;
use log::error;
use serde::Serialize;
use uuid::Uuid;

use crate::config::server_properties::{self, PropertiesDocument};
use crate::config::store::StoreError;
use crate::error::AppError;
use crate::models::server_record::{Edition, ServerRecord};
use crate::registry::Registry;

pub type AppState = Arc<Registry>;

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Io(e) => {
                error!("internal io error: {e}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            AppError::Store(StoreError::Io(e)) => {
                error!("registry store io error: {e}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            _ => ApiResponse::failure(self.to_string()).into_response(),
        }
    }
}

type Reply<T> = std::result::Result<ApiResponse<T>, AppError>;

/// Path extractor whose rejection (bad UUID, wrong arity) rides the
/// envelope instead of axum's plain-text 400.
struct ApiPath<T>(T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: serde::de::DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(ApiPath(value)),
            Err(rejection) => Err(ApiResponse::failure(rejection.body_text()).into_response()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/servers", get(list_servers))
        .route("/servers/new/:edition/:version/:name", get(create_server))
        .route(
            "/servers/import/:edition/:version/:name/:directory/:jar",
            get(import_server),
        )
        .route("/servers/start/:id", get(start_server))
        .route("/servers/stop/:id", get(stop_server))
        .route("/servers/restart/:id", get(restart_server))
        .route("/servers/delete/:id", get(delete_server))
        .route("/servers/query/:id", get(query_server))
        .route("/servers/properties/:id", get(read_properties))
        .route(
            "/servers/update/server.properties/:id/:properties",
            get(update_properties),
        )
        .route("/servers/whitelist/add/:id/:player", get(whitelist_add))
        .route("/servers/whitelist/remove/:id/:uuid", get(whitelist_remove))
        .route("/servers/op/add/:id/:player", get(op_add))
        .route("/servers/op/remove/:id/:uuid", get(op_remove))
        .route("/servers/ban/add/:id/:player/:reason", get(ban_add))
        .route("/servers/ban/remove/:id/:uuid", get(ban_remove))
        .route("/servers/ban-ip/add/:id/:ip/:reason", get(ban_ip_add))
        .route("/servers/ban-ip/remove/:id/:ip", get(ban_ip_remove))
        .route("/servers/download/:id", get(backup_server))
        .with_state(state)
}

fn parse_edition(raw: &str) -> Result<Edition, AppError> {
    Edition::from_str(raw).map_err(AppError::Config)
}

/// Path payloads are base64 in the URL-safe alphabet; the standard one
/// would put `/` into a path segment.
fn decode_base64(raw: &str, what: &str) -> Result<String, AppError> {
    let bytes = base64::engine::general_purpose::URL_SAFE
        .decode(raw)
        .map_err(|e| AppError::Config(format!("{what} is not base64: {e}")))?;
    String::from_utf8(bytes).map_err(|e| AppError::Config(format!("{what} is not utf-8: {e}")))
}

async fn list_servers(State(registry): State<AppState>) -> Reply<Vec<ServerRecord>> {
    let servers = registry.list().await?;
    Ok(ApiResponse::ok("servers listed", servers))
}

async fn create_server(
    State(registry): State<AppState>,
    ApiPath((edition, version, name)): ApiPath<(String, String, String)>,
) -> Reply<ServerRecord> {
    let edition = parse_edition(&edition)?;
    let record = registry.create(edition, &version, &name).await?;
    Ok(ApiResponse::ok("server created", record))
}

async fn import_server(
    State(registry): State<AppState>,
    ApiPath((edition, version, name, directory, jar)): ApiPath<(String, String, String, String, String)>,
) -> Reply<ServerRecord> {
    let edition = parse_edition(&edition)?;
    let directory = PathBuf::from(decode_base64(&directory, "directory")?);
    let record = registry
        .import(edition, &version, &name, directory, &jar)
        .await?;
    Ok(ApiResponse::ok("server imported", record))
}

async fn start_server(State(registry): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Reply<()> {
    registry.start(id).await?;
    Ok(ApiResponse::ok("server starting", ()))
}

async fn stop_server(State(registry): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Reply<String> {
    let reply = registry.stop(id).await?;
    Ok(ApiResponse::ok("server stopping", reply))
}

async fn restart_server(State(registry): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Reply<()> {
    registry.restart(id).await?;
    Ok(ApiResponse::ok("server restarted", ()))
}

async fn delete_server(State(registry): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Reply<ServerRecord> {
    let record = registry.remove(id).await?;
    Ok(ApiResponse::ok("server deleted", record))
}

async fn query_server(
    State(registry): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Reply<crate::net::query::QueryStatus> {
    let status = registry.query(id).await?;
    Ok(ApiResponse::ok("server queried", status))
}

#[derive(Serialize)]
struct PropertiesView {
    server: ServerRecord,
    properties: BTreeMap<String, String>,
    info: &'static serde_json::Value,
}

fn properties_map(doc: &PropertiesDocument) -> BTreeMap<String, String> {
    doc.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn read_properties(
    State(registry): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Reply<PropertiesView> {
    let (server, doc) = registry.read_properties(id).await?;
    Ok(ApiResponse::ok(
        "properties read",
        PropertiesView {
            server,
            properties: properties_map(&doc),
            info: server_properties::property_info(),
        },
    ))
}

async fn update_properties(
    State(registry): State<AppState>,
    ApiPath((id, properties)): ApiPath<(Uuid, String)>,
) -> Reply<BTreeMap<String, String>> {
    let doc = registry.update_properties(id, &properties).await?;
    Ok(ApiResponse::ok("properties updated", properties_map(&doc)))
}

async fn whitelist_add(
    State(registry): State<AppState>,
    ApiPath((id, player)): ApiPath<(Uuid, String)>,
) -> Reply<Vec<crate::models::player_lists::WhitelistEntry>> {
    let list = registry.whitelist_add(id, &player).await?;
    Ok(ApiResponse::ok("player whitelisted", list))
}

async fn whitelist_remove(
    State(registry): State<AppState>,
    ApiPath((id, uuid)): ApiPath<(Uuid, String)>,
) -> Reply<Vec<crate::models::player_lists::WhitelistEntry>> {
    let list = registry.whitelist_remove(id, &uuid).await?;
    Ok(ApiResponse::ok("player removed from whitelist", list))
}

async fn op_add(
    State(registry): State<AppState>,
    ApiPath((id, player)): ApiPath<(Uuid, String)>,
) -> Reply<Vec<crate::models::player_lists::OpEntry>> {
    let list = registry.op_add(id, &player).await?;
    Ok(ApiResponse::ok("player opped", list))
}

async fn op_remove(
    State(registry): State<AppState>,
    ApiPath((id, uuid)): ApiPath<(Uuid, String)>,
) -> Reply<Vec<crate::models::player_lists::OpEntry>> {
    let list = registry.op_remove(id, &uuid).await?;
    Ok(ApiResponse::ok("player deopped", list))
}

async fn ban_add(
    State(registry): State<AppState>,
    ApiPath((id, player, reason)): ApiPath<(Uuid, String, String)>,
) -> Reply<Vec<crate::models::player_lists::PlayerBanEntry>> {
    let reason = decode_base64(&reason, "ban reason")?;
    let list = registry.ban_add(id, &player, &reason).await?;
    Ok(ApiResponse::ok("player banned", list))
}

async fn ban_remove(
    State(registry): State<AppState>,
    ApiPath((id, uuid)): ApiPath<(Uuid, String)>,
) -> Reply<Vec<crate::models::player_lists::PlayerBanEntry>> {
    let list = registry.ban_remove(id, &uuid).await?;
    Ok(ApiResponse::ok("player unbanned", list))
}

async fn ban_ip_add(
    State(registry): State<AppState>,
    ApiPath((id, ip, reason)): ApiPath<(Uuid, String, String)>,
) -> Reply<Vec<crate::models::player_lists::IpBanEntry>> {
    let reason = decode_base64(&reason, "ban reason")?;
    let list = registry.ban_ip_add(id, &ip, &reason).await?;
    Ok(ApiResponse::ok("ip banned", list))
}

async fn ban_ip_remove(
    State(registry): State<AppState>,
    ApiPath((id, ip)): ApiPath<(Uuid, String)>,
) -> Reply<Vec<crate::models::player_lists::IpBanEntry>> {
    let list = registry.ban_ip_remove(id, &ip).await?;
    Ok(ApiResponse::ok("ip unbanned", list))
}

async fn backup_server(State(registry): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Reply<String> {
    let archive = registry.backup(id).await?;
    Ok(ApiResponse::ok(
        "backup created",
        archive.to_string_lossy().into_owned(),
    ))
}
