//! End-to-end exercises of the HTTP surface: a real router bound to an
//! ephemeral port, driven with a real HTTP client, asserting on the
//! response envelope the dashboard consumes.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use mcsm::api::rest;
use mcsm::paths::Paths;
use mcsm::registry::Registry;

async fn serve(data_dir: &Path) -> String {
    let registry = Arc::new(Registry::new(Paths::with_base(data_dir.to_path_buf())));
    let router = rest::router(registry);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn get_json(url: &str) -> serde_json::Value {
    reqwest::get(url).await.unwrap().json().await.unwrap()
}

/// Lays down a directory that import will accept.
async fn provision_fake_server(dir: &Path) {
    tokio::fs::create_dir_all(dir).await.unwrap();
    tokio::fs::write(dir.join("server.jar"), b"not a real jar")
        .await
        .unwrap();
    tokio::fs::write(
        dir.join("server.properties"),
        "motd=Imported\nserver-ip=127.0.0.1\n",
    )
    .await
    .unwrap();
}

fn b64(text: &str) -> String {
    base64::engine::general_purpose::URL_SAFE.encode(text)
}

#[tokio::test]
async fn empty_registry_lists_no_servers() {
    let data = tempfile::tempdir().unwrap();
    let base = serve(data.path()).await;

    let body = get_json(&format!("{base}/servers")).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], serde_json::json!([]));
}

#[tokio::test]
async fn import_then_list_then_delete() {
    let data = tempfile::tempdir().unwrap();
    let base = serve(data.path()).await;

    let dir = data.path().join("external");
    provision_fake_server(&dir).await;

    let body = get_json(&format!(
        "{base}/servers/import/vanilla/1.15.2/imported/{}/server.jar",
        b64(dir.to_str().unwrap())
    ))
    .await;
    assert_eq!(body["success"], true, "import failed: {body}");
    let id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["edition"], "vanilla");

    let body = get_json(&format!("{base}/servers")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Import rewrote the properties with the operational flags forced on.
    let props = tokio::fs::read_to_string(dir.join("server.properties"))
        .await
        .unwrap();
    assert!(props.contains("enable-rcon=true"));
    assert!(props.contains("enable-query=true"));

    let body = get_json(&format!("{base}/servers/properties/{id}")).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["properties"]["motd"], "Imported");
    assert!(body["data"]["info"].is_object());

    // Nothing answers its query port, so delete goes through and removes
    // both the directory and the record.
    let body = get_json(&format!("{base}/servers/delete/{id}")).await;
    assert_eq!(body["success"], true, "delete failed: {body}");
    assert!(!dir.exists());

    let body = get_json(&format!("{base}/servers")).await;
    assert_eq!(body["data"], serde_json::json!([]));
}

#[tokio::test]
async fn stop_of_stopped_server_rides_the_envelope() {
    let data = tempfile::tempdir().unwrap();
    let base = serve(data.path()).await;

    let dir = data.path().join("external");
    provision_fake_server(&dir).await;
    let body = get_json(&format!(
        "{base}/servers/import/vanilla/1.15.2/srv/{}/server.jar",
        b64(dir.to_str().unwrap())
    ))
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let body = get_json(&format!("{base}/servers/stop/{id}")).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "server is not running");
}

#[tokio::test]
async fn unknown_server_id_is_reported_in_envelope() {
    let data = tempfile::tempdir().unwrap();
    let base = serve(data.path()).await;

    let id = uuid::Uuid::new_v4();
    let body = get_json(&format!("{base}/servers/start/{id}")).await;
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("no such server"));
}

#[tokio::test]
async fn malformed_id_is_reported_in_envelope() {
    let data = tempfile::tempdir().unwrap();
    let base = serve(data.path()).await;

    for route in ["start", "stop", "restart", "delete", "query"] {
        let body = get_json(&format!("{base}/servers/{route}/not-a-uuid")).await;
        assert_eq!(body["success"], false, "{route} should fail in-envelope");
        assert!(body["message"].as_str().is_some());
    }
}

#[tokio::test]
async fn bad_edition_is_reported_in_envelope() {
    let data = tempfile::tempdir().unwrap();
    let base = serve(data.path()).await;

    let body = get_json(&format!("{base}/servers/new/bedrock/1.15.2/srv")).await;
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("bedrock"));
}

#[tokio::test]
async fn ip_ban_routes_manage_the_list_file() {
    let data = tempfile::tempdir().unwrap();
    let base = serve(data.path()).await;

    let dir = data.path().join("external");
    provision_fake_server(&dir).await;
    let body = get_json(&format!(
        "{base}/servers/import/vanilla/1.15.2/srv/{}/server.jar",
        b64(dir.to_str().unwrap())
    ))
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let body = get_json(&format!(
        "{base}/servers/ban-ip/add/{id}/10.0.0.7/{}",
        b64("spamming chat")
    ))
    .await;
    assert_eq!(body["success"], true, "ban failed: {body}");
    assert_eq!(body["data"][0]["ip"], "10.0.0.7");
    assert_eq!(body["data"][0]["reason"], "spamming chat");
    assert_eq!(body["data"][0]["expires"], "forever");

    let body = get_json(&format!("{base}/servers/ban-ip/remove/{id}/10.0.0.7")).await;
    assert_eq!(body["data"], serde_json::json!([]));
}

#[tokio::test]
async fn properties_update_round_trips_base64() {
    let data = tempfile::tempdir().unwrap();
    let base = serve(data.path()).await;

    let dir = data.path().join("external");
    provision_fake_server(&dir).await;
    let body = get_json(&format!(
        "{base}/servers/import/vanilla/1.15.2/srv/{}/server.jar",
        b64(dir.to_str().unwrap())
    ))
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let payload = b64("motd=Rewritten\nmax-players=12\n");
    let body = get_json(&format!(
        "{base}/servers/update/server.properties/{id}/{payload}"
    ))
    .await;
    assert_eq!(body["success"], true, "update failed: {body}");
    assert_eq!(body["data"]["motd"], "Rewritten");
    assert_eq!(body["data"]["max-players"], "12");
    // Forced flags survive a full rewrite.
    assert_eq!(body["data"]["enable-rcon"], "true");
}
