//! The server registry: owns every managed instance, its runtime state, and
//! all lifecycle transitions.
//!
//! Persistent truth lives in the [`ConfigStore`] document; runtime truth is
//! split between the handle map (children this process spawned) and the
//! believed-running set (instances a startup probe found answering query).
//! Lifecycle operations on one id are serialized by a per-id async mutex so
//! e.g. a stop cannot interleave with a restart of the same server.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use futures_util::future::BoxFuture;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::backup;
use crate::commands::launcher;
use crate::config::eula_manager;
use crate::config::server_properties::{self, PropertiesDocument};
use crate::config::store::ConfigStore;
use crate::error::{AppError, Result};
use crate::models::player_lists::{IpBanEntry, OpEntry, PlayerBanEntry, WhitelistEntry};
use crate::models::server_record::{Edition, ServerRecord};
use crate::net::{download, playerdb, query, rcon};
use crate::paths::Paths;

const WHITELIST_FILE: &str = "whitelist.json";
const OPS_FILE: &str = "ops.json";
const BANNED_PLAYERS_FILE: &str = "banned-players.json";
const BANNED_IPS_FILE: &str = "banned-ips.json";

const DEFAULT_OP_LEVEL: &str = "4";
const SERVER_JAR: &str = "server.jar";

const RESTART_DEADLINE: Duration = Duration::from_secs(60);
const RESTART_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Runtime state of a child this process spawned.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    pub pid: u32,
    pub started_at: i64,
}

/// The edition-specific provisioning steps of `create`: fetching the server
/// jar and running it once to generate its default configuration. Behind a
/// trait so provisioning flows can run without the network or a Java
/// runtime.
pub trait Provisioner: Send + Sync {
    fn fetch_jar<'a>(
        &'a self,
        edition: Edition,
        version: &'a str,
        target: &'a Path,
    ) -> BoxFuture<'a, Result<()>>;

    fn generate_defaults<'a>(
        &'a self,
        directory: &'a Path,
        binary_file: &'a str,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Production provisioner: download from the distribution endpoints, then
/// run the jar once in wait mode with default JVM settings.
pub struct DistProvisioner;

impl Provisioner for DistProvisioner {
    fn fetch_jar<'a>(
        &'a self,
        edition: Edition,
        version: &'a str,
        target: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let url = download::resolve_jar_url(edition, version).await?;
            download::download_jar(&url, target).await?;
            Ok(())
        })
    }

    fn generate_defaults<'a>(
        &'a self,
        directory: &'a Path,
        binary_file: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(launcher::run_to_completion(directory, binary_file, false))
    }
}

pub struct Registry {
    paths: Paths,
    store: ConfigStore,
    provisioner: Box<dyn Provisioner>,
    handles: Arc<RwLock<HashMap<Uuid, RuntimeHandle>>>,
    believed_running: Arc<RwLock<HashSet<Uuid>>>,
    id_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Registry {
    pub fn new(paths: Paths) -> Self {
        Self::with_provisioner(paths, Box::new(DistProvisioner))
    }

    pub fn with_provisioner(paths: Paths, provisioner: Box<dyn Provisioner>) -> Self {
        let store = ConfigStore::new(paths.manifest_file());
        Self {
            paths,
            store,
            provisioner,
            handles: Arc::new(RwLock::new(HashMap::new())),
            believed_running: Arc::new(RwLock::new(HashSet::new())),
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The mutex serializing lifecycle operations for one id. Entries are
    /// tiny and ids are few, so the map is never pruned.
    async fn id_lock(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.id_locks.lock().await;
        Arc::clone(locks.entry(id).or_default())
    }

    pub async fn list(&self) -> Result<Vec<ServerRecord>> {
        Ok(self.store.load().await?.servers)
    }

    pub async fn get(&self, id: Uuid) -> Result<ServerRecord> {
        self.store
            .find(id)
            .await?
            .ok_or(AppError::NotFound(id))
    }

    pub async fn is_running(&self, id: Uuid) -> bool {
        self.handles.read().await.contains_key(&id)
            || self.believed_running.read().await.contains(&id)
    }

    /// Provisions a brand new instance end to end: directory, jar download,
    /// generate-defaults first run, EULA, forced properties, empty player
    /// lists, and finally the persisted record.
    ///
    /// There is no rollback; a mid-sequence failure leaves the directory
    /// behind, and retrying the same identity reports the conflict.
    pub async fn create(
        &self,
        edition: Edition,
        version: &str,
        name: &str,
    ) -> Result<ServerRecord> {
        let directory = self
            .paths
            .server_dir(name, &edition.to_string(), version);
        if directory.exists() {
            return Err(AppError::Conflict);
        }
        tokio::fs::create_dir_all(&directory).await?;
        info!("provisioning {name} ({edition} {version}) in {}", directory.display());

        self.provisioner
            .fetch_jar(edition, version, &directory.join(SERVER_JAR))
            .await?;

        // First run; the jar writes eula.txt and server.properties, then
        // exits.
        self.provisioner.generate_defaults(&directory, SERVER_JAR).await?;

        eula_manager::sign_eula(&directory.join("eula.txt")).await?;
        server_properties::enforce_flags(&directory).await?;
        for list in [
            WHITELIST_FILE,
            OPS_FILE,
            BANNED_PLAYERS_FILE,
            BANNED_IPS_FILE,
        ] {
            tokio::fs::write(directory.join(list), "[]").await?;
        }

        let record = ServerRecord::new(
            name.to_string(),
            edition,
            version.to_string(),
            directory,
            SERVER_JAR.to_string(),
        );
        self.store.add(record.clone()).await?;
        info!("created server {} ({})", record.name, record.id);
        Ok(record)
    }

    /// Adopts an already-provisioned directory. The jar and a
    /// `server.properties` must exist; the properties get the forced flags
    /// applied before the record is persisted.
    pub async fn import(
        &self,
        edition: Edition,
        version: &str,
        name: &str,
        directory: PathBuf,
        binary_file: &str,
    ) -> Result<ServerRecord> {
        let jar = directory.join(binary_file);
        if !jar.is_file() {
            return Err(AppError::Config(format!(
                "no jar named {binary_file} in {}",
                directory.display()
            )));
        }
        server_properties::enforce_flags(&directory).await?;

        let record = ServerRecord::new(
            name.to_string(),
            edition,
            version.to_string(),
            directory,
            binary_file.to_string(),
        );
        self.store.add(record.clone()).await?;
        info!("imported server {} ({})", record.name, record.id);
        Ok(record)
    }

    pub async fn start(&self, id: Uuid) -> Result<()> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;
        self.start_locked(id).await
    }

    async fn start_locked(&self, id: Uuid) -> Result<()> {
        let record = self.get(id).await?;
        if self.is_running(id).await {
            return Err(AppError::AlreadyRunning);
        }

        // The flags may have been hand-edited while the server was down.
        server_properties::enforce_flags(&record.directory).await?;

        let spawned = launcher::spawn_server(&record.directory, &record.binary_file, true).await?;
        let pid = spawned.pid;
        self.handles.write().await.insert(
            id,
            RuntimeHandle {
                pid,
                started_at: chrono::Utc::now().timestamp_millis(),
            },
        );

        let handles = Arc::clone(&self.handles);
        let believed = Arc::clone(&self.believed_running);
        let mut child = spawned.child;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!("server {id} exited with {status}"),
                Err(e) => warn!("failed to reap server {id}: {e}"),
            }
            Self::clear_handle_for_pid(&handles, &believed, id, pid).await;
        });

        self.store.touch(id).await;
        Ok(())
    }

    /// Clears the runtime state for `id`, but only while the mapped handle
    /// still belongs to the child that exited. A stop followed by a fresh
    /// start can install a successor child before the old one finishes
    /// shutting down; the old child's monitor must not tear down the
    /// successor's handle.
    async fn clear_handle_for_pid(
        handles: &RwLock<HashMap<Uuid, RuntimeHandle>>,
        believed: &RwLock<HashSet<Uuid>>,
        id: Uuid,
        pid: u32,
    ) {
        let removed = {
            let mut map = handles.write().await;
            match map.get(&id) {
                Some(handle) if handle.pid == pid => {
                    map.remove(&id);
                    true
                }
                _ => false,
            }
        };
        if removed {
            believed.write().await.remove(&id);
        }
    }

    pub async fn stop(&self, id: Uuid) -> Result<String> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;
        self.stop_locked(id).await
    }

    async fn stop_locked(&self, id: Uuid) -> Result<String> {
        let record = self.get(id).await?;
        if !self.is_running(id).await {
            return Err(AppError::NotRunning);
        }

        let doc = server_properties::read_document(&record.directory).await?;
        let reply = rcon::send_command(
            doc.server_ip(),
            doc.rcon_port(),
            doc.rcon_password(),
            "stop",
        )
        .await?;

        self.handles.write().await.remove(&id);
        self.believed_running.write().await.remove(&id);
        self.store.touch(id).await;
        info!("stopped server {id}: {reply}");
        Ok(reply)
    }

    /// Stop, wait for the recorded pid to leave the process table, start.
    pub async fn restart(&self, id: Uuid) -> Result<()> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;

        let record = self.get(id).await?;
        let pid = launcher::read_pid(&record.directory).await;
        self.stop_locked(id).await?;

        if let Some(pid) = pid {
            let exited =
                launcher::wait_for_pid_exit(pid, RESTART_DEADLINE, RESTART_POLL_INTERVAL).await;
            if !exited {
                return Err(AppError::RestartTimeout(pid));
            }
        }

        self.start_locked(id).await
    }

    /// Deletes a server. Evidence of liveness comes from an actual query
    /// probe, not the handle map, so an instance started outside this
    /// process is still protected.
    pub async fn remove(&self, id: Uuid) -> Result<ServerRecord> {
        let lock = self.id_lock(id).await;
        let _guard = lock.lock().await;

        let record = self.get(id).await?;
        if let Ok(doc) = server_properties::read_document(&record.directory).await {
            if query::query_status(doc.server_ip(), doc.query_port())
                .await
                .is_ok()
            {
                return Err(AppError::ServerBusy);
            }
        }

        self.handles.write().await.remove(&id);
        self.believed_running.write().await.remove(&id);
        if record.directory.exists() {
            tokio::fs::remove_dir_all(&record.directory).await?;
        }
        self.store.remove(id).await?;
        info!("removed server {} ({id})", record.name);
        Ok(record)
    }

    /// Live status probe. Explicitly disabled querying short-circuits
    /// without sending a datagram.
    pub async fn query(&self, id: Uuid) -> Result<query::QueryStatus> {
        let record = self.get(id).await?;
        let doc = server_properties::read_document(&record.directory).await?;
        if doc.query_disabled() {
            return Err(AppError::QueryDisabled);
        }
        let status = query::query_status(doc.server_ip(), doc.query_port()).await?;
        self.store.touch(id).await;
        Ok(status)
    }

    /// Probes every persisted record once and marks the ones that answer as
    /// believed running. Probe failures are expected (most servers are
    /// stopped) and never surface as errors.
    pub async fn reconcile_on_startup(&self) -> Result<()> {
        for record in self.list().await? {
            let doc = match server_properties::read_document(&record.directory).await {
                Ok(doc) => doc,
                Err(e) => {
                    debug!("skipping reconcile of {}: {e}", record.id);
                    continue;
                }
            };
            if doc.query_disabled() {
                continue;
            }
            match query::query_status(doc.server_ip(), doc.query_port()).await {
                Ok(status) => {
                    info!(
                        "server {} ({}) is already running with {}/{} players",
                        record.name, record.id, status.players, status.max_players
                    );
                    self.believed_running.write().await.insert(record.id);
                }
                Err(e) => debug!("server {} ({}) not reachable: {e}", record.name, record.id),
            }
        }
        Ok(())
    }

    pub async fn read_properties(&self, id: Uuid) -> Result<(ServerRecord, PropertiesDocument)> {
        let record = self.get(id).await?;
        let doc = server_properties::read_document(&record.directory).await?;
        Ok((record, doc))
    }

    /// Replaces the whole properties file with the base64-encoded text from
    /// the dashboard; the forced flags are re-applied on the way down.
    pub async fn update_properties(&self, id: Uuid, encoded: &str) -> Result<PropertiesDocument> {
        let record = self.get(id).await?;
        let bytes = base64::engine::general_purpose::URL_SAFE
            .decode(encoded)
            .map_err(|e| AppError::Config(format!("properties payload is not base64: {e}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| AppError::Config(format!("properties payload is not utf-8: {e}")))?;
        let doc = server_properties::write_document(
            &record.directory,
            PropertiesDocument::parse(&text),
        )
        .await?;
        self.store.touch(id).await;
        Ok(doc)
    }

    async fn read_list<T: DeserializeOwned>(&self, record: &ServerRecord, file: &str) -> Result<Vec<T>> {
        let path = record.directory.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = tokio::fs::read_to_string(&path).await?;
        serde_json::from_str(&text)
            .map_err(|e| AppError::Config(format!("{file} is corrupt: {e}")))
    }

    async fn write_list<T: Serialize>(
        &self,
        record: &ServerRecord,
        file: &str,
        list: &[T],
    ) -> Result<()> {
        let json = serde_json::to_string_pretty(list)
            .map_err(|e| AppError::Config(format!("could not serialize {file}: {e}")))?;
        tokio::fs::write(record.directory.join(file), json).await?;
        Ok(())
    }

    pub async fn whitelist_add(&self, id: Uuid, player: &str) -> Result<Vec<WhitelistEntry>> {
        let record = self.get(id).await?;
        let uuid = playerdb::resolve_player_uuid(player).await?;
        let mut list: Vec<WhitelistEntry> = self.read_list(&record, WHITELIST_FILE).await?;
        if !list.iter().any(|e| e.uuid == uuid) {
            list.push(WhitelistEntry {
                uuid,
                name: player.to_string(),
            });
            self.write_list(&record, WHITELIST_FILE, &list).await?;
        }
        self.store.touch(id).await;
        Ok(list)
    }

    pub async fn whitelist_remove(&self, id: Uuid, uuid: &str) -> Result<Vec<WhitelistEntry>> {
        let record = self.get(id).await?;
        let mut list: Vec<WhitelistEntry> = self.read_list(&record, WHITELIST_FILE).await?;
        list.retain(|e| e.uuid != uuid);
        self.write_list(&record, WHITELIST_FILE, &list).await?;
        self.store.touch(id).await;
        Ok(list)
    }

    /// Grants operator status at the level the server's own
    /// `op-permission-level` property names.
    pub async fn op_add(&self, id: Uuid, player: &str) -> Result<Vec<OpEntry>> {
        let record = self.get(id).await?;
        let uuid = playerdb::resolve_player_uuid(player).await?;
        let doc = server_properties::read_document(&record.directory).await?;
        let level = doc
            .get("op-permission-level")
            .unwrap_or(DEFAULT_OP_LEVEL)
            .to_string();

        let mut list: Vec<OpEntry> = self.read_list(&record, OPS_FILE).await?;
        if !list.iter().any(|e| e.uuid == uuid) {
            list.push(OpEntry {
                uuid,
                name: player.to_string(),
                level,
            });
            self.write_list(&record, OPS_FILE, &list).await?;
        }
        self.store.touch(id).await;
        Ok(list)
    }

    pub async fn op_remove(&self, id: Uuid, uuid: &str) -> Result<Vec<OpEntry>> {
        let record = self.get(id).await?;
        let mut list: Vec<OpEntry> = self.read_list(&record, OPS_FILE).await?;
        list.retain(|e| e.uuid != uuid);
        self.write_list(&record, OPS_FILE, &list).await?;
        self.store.touch(id).await;
        Ok(list)
    }

    pub async fn ban_add(&self, id: Uuid, player: &str, reason: &str) -> Result<Vec<PlayerBanEntry>> {
        let record = self.get(id).await?;
        let uuid = playerdb::resolve_player_uuid(player).await?;
        let mut list: Vec<PlayerBanEntry> = self.read_list(&record, BANNED_PLAYERS_FILE).await?;
        if !list.iter().any(|e| e.uuid == uuid) {
            list.push(PlayerBanEntry::new(
                uuid,
                player.to_string(),
                reason.to_string(),
            ));
            self.write_list(&record, BANNED_PLAYERS_FILE, &list).await?;
        }
        self.store.touch(id).await;
        Ok(list)
    }

    pub async fn ban_remove(&self, id: Uuid, uuid: &str) -> Result<Vec<PlayerBanEntry>> {
        let record = self.get(id).await?;
        let mut list: Vec<PlayerBanEntry> = self.read_list(&record, BANNED_PLAYERS_FILE).await?;
        list.retain(|e| e.uuid != uuid);
        self.write_list(&record, BANNED_PLAYERS_FILE, &list).await?;
        self.store.touch(id).await;
        Ok(list)
    }

    pub async fn ban_ip_add(&self, id: Uuid, ip: &str, reason: &str) -> Result<Vec<IpBanEntry>> {
        let record = self.get(id).await?;
        let mut list: Vec<IpBanEntry> = self.read_list(&record, BANNED_IPS_FILE).await?;
        if !list.iter().any(|e| e.ip == ip) {
            list.push(IpBanEntry::new(ip.to_string(), reason.to_string()));
            self.write_list(&record, BANNED_IPS_FILE, &list).await?;
        }
        self.store.touch(id).await;
        Ok(list)
    }

    pub async fn ban_ip_remove(&self, id: Uuid, ip: &str) -> Result<Vec<IpBanEntry>> {
        let record = self.get(id).await?;
        let mut list: Vec<IpBanEntry> = self.read_list(&record, BANNED_IPS_FILE).await?;
        list.retain(|e| e.ip != ip);
        self.write_list(&record, BANNED_IPS_FILE, &list).await?;
        self.store.touch(id).await;
        Ok(list)
    }

    /// Zips the whole server directory into the worlds archive folder.
    pub async fn backup(&self, id: Uuid) -> Result<PathBuf> {
        let record = self.get(id).await?;
        let archive = backup::backup_server(&self.paths, &record).await?;
        self.store.touch(id).await;
        Ok(archive)
    }

    #[cfg(test)]
    pub(crate) async fn mark_running_for_tests(&self, id: Uuid, pid: u32) {
        self.handles.write().await.insert(
            id,
            RuntimeHandle {
                pid,
                started_at: 0,
            },
        );
    }
}
