use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tuya_cloud::{
    Bridge, CloudClient, Command, Credentials, DeviceCatalog, EntityRegistry, EntityUpdate, Error,
    HvacMode, PollOutcome, Poller, Publisher, Secrets, Token, TokenManager, TokenStore,
};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEVICES: &str = r#"
devices:
  - tuya_device_id: dev1
    friendly_name: Living Room Heater
    poll_interval: 3600
    entities:
      - platform: switch
        code: switch_1
      - platform: sensor
        code: temp_current
        type: float
      - platform: climate
        name: Thermostat
        current_temperature: { code: temp_indoor }
        target_temperature: { code: temp_set, min_temp: 5, max_temp: 30 }
        hvac_mode: { code: mode, modes: { heat: hot, cool: cold } }
        on_off: { code: power }
      - platform: number
        code: brightness
        passive: true
        min: 0
        max: 100
"#;

struct Harness {
    _dir: tempfile::TempDir,
    poller: Poller,
    registry: Arc<EntityRegistry>,
    updates: Arc<Mutex<Vec<EntityUpdate>>>,
}

async fn harness(server: &MockServer, with_token: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = TokenStore::new(dir.path().join("token.json"));
    if with_token {
        store
            .store(&Token {
                access_token: "a1".into(),
                refresh_token: Some("r1".into()),
                expire_time: 7200,
                uid: None,
                obtained_at: None,
            })
            .await
            .unwrap();
    }

    let client = Arc::new(
        CloudClient::builder(server.uri(), Credentials::new("id", "secret"))
            .build()
            .unwrap(),
    );
    let tokens = Arc::new(TokenManager::new(Arc::clone(&client), store));
    let registry = Arc::new(EntityRegistry::from_catalog(
        &DeviceCatalog::from_yaml_str(DEVICES).unwrap(),
    ));

    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    let mut publisher = Publisher::new();
    publisher.subscribe(move |u: &EntityUpdate| sink.lock().unwrap().push(u.clone()));

    Harness {
        _dir: dir,
        poller: Poller::new(client, tokens, Arc::clone(&registry), Arc::new(publisher)),
        registry,
        updates,
    }
}

fn status_body(entries: Value) -> Value {
    json!({ "success": true, "result": entries, "t": 1700000000000i64 })
}

fn value(registry: &EntityRegistry, device_id: &str, code: &str) -> Value {
    let id = registry.lookup(device_id, code).unwrap();
    registry.with_entity(id, |e| e.current_value()).unwrap()
}

#[tokio::test]
async fn poll_applies_known_codes_and_skips_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/devices/dev1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(json!([
            {"code": "switch_1", "value": true},
            {"code": "countdown_1", "value": 0},
            {"code": "temp_current", "value": 215}
        ]))))
        .mount(&server)
        .await;

    let h = harness(&server, true).await;
    let PollOutcome::Applied(report) = h.poller.poll_device("dev1").await.unwrap() else {
        panic!("poll should not be skipped");
    };
    assert_eq!(report.updated, 2);
    assert_eq!(report.unmatched, vec!["countdown_1".to_string()]);

    assert_eq!(value(&h.registry, "dev1", "switch_1"), json!(true));
    assert_eq!(value(&h.registry, "dev1", "temp_current"), json!(21.5));

    let updates = h.updates.lock().unwrap();
    let ids: Vec<_> = updates.iter().map(|u| u.unique_id.as_str()).collect();
    assert_eq!(ids, vec!["dev1_switch_1", "dev1_temp_current"]);
}

#[tokio::test]
async fn polling_twice_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/devices/dev1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(json!([
            {"code": "temp_indoor", "value": 205},
            {"code": "mode", "value": "cold"},
            {"code": "power", "value": true}
        ]))))
        .mount(&server)
        .await;

    let h = harness(&server, true).await;
    h.poller.poll_device("dev1").await.unwrap();
    let first = value(&h.registry, "dev1", "mode");
    h.poller.poll_device("dev1").await.unwrap();
    assert_eq!(value(&h.registry, "dev1", "mode"), first);
    assert_eq!(first["hvac_mode"], "cool");
    assert_eq!(first["current_temperature"], json!(20.5));
}

#[tokio::test]
async fn non_success_response_applies_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/devices/dev1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false, "code": 2001, "msg": "device is offline"
        })))
        .mount(&server)
        .await;

    let h = harness(&server, true).await;
    assert!(h.poller.poll_device("dev1").await.is_err());
    assert_eq!(value(&h.registry, "dev1", "switch_1"), Value::Null);
    assert!(h.updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn overlapping_poll_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/devices/dev1/status"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(status_body(json!([{"code": "switch_1", "value": false}])))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, true).await;
    let (slow, overlapping) = tokio::join!(h.poller.poll_device("dev1"), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.poller.poll_device("dev1").await
    });
    assert!(matches!(slow.unwrap(), PollOutcome::Applied(_)));
    assert_eq!(overlapping.unwrap(), PollOutcome::Skipped);
}

#[tokio::test]
async fn missing_token_aborts_cycle_and_reauthenticates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": {"access_token": "fresh", "refresh_token": "r", "expire_time": 7200}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/devices/dev1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(json!([]))))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, false).await;
    let err = h.poller.poll_device("dev1").await.unwrap_err();
    assert!(matches!(err, Error::NoToken));

    // The next cycle uses the token obtained by the re-authentication.
    assert!(matches!(
        h.poller.poll_device("dev1").await.unwrap(),
        PollOutcome::Applied(_)
    ));
}

#[tokio::test]
async fn rejected_token_triggers_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/devices/dev1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false, "code": 1010, "msg": "token invalid"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/token/r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": {"access_token": "a2", "refresh_token": "r2", "expire_time": 7200}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, true).await;
    assert!(h.poller.poll_device("dev1").await.is_err());
}

// -- Bridge --

type Updates = Arc<Mutex<Vec<EntityUpdate>>>;

async fn bridge(server: &MockServer, dir: &tempfile::TempDir) -> (Bridge, Updates) {
    Mock::given(method("GET"))
        .and(path("/v1.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": {"access_token": "a1", "refresh_token": "r1", "expire_time": 7200}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/devices/dev1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(json!([]))))
        .mount(server)
        .await;

    let secrets = Secrets::new(Credentials::new("id", "secret"), server.uri());
    let catalog = DeviceCatalog::from_yaml_str(DEVICES).unwrap();
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    let bridge = Bridge::builder(secrets, catalog)
        .token_path(dir.path().join("token.json"))
        .on_update(move |u| sink.lock().unwrap().push(u.clone()))
        .start()
        .await
        .unwrap();
    (bridge, updates)
}

#[tokio::test]
async fn bridge_start_writes_token_file() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let (bridge, _) = bridge(&server, &dir).await;

    assert_eq!(bridge.tokens().access_token().await.unwrap(), "a1");
    assert!(dir.path().join("token.json").exists());
    assert_eq!(bridge.registry().len(), 4);
    bridge.shutdown().await;
}

#[tokio::test]
async fn climate_mode_command_sends_switch_and_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/devices/dev1/commands"))
        .and(body_json(json!({
            "commands": [
                {"code": "power", "value": true},
                {"code": "mode", "value": "hot"}
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "result": true})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (bridge, updates) = bridge(&server, &dir).await;
    bridge
        .command("dev1", "mode", Command::SetHvacMode(HvacMode::Heat))
        .await
        .unwrap();

    assert_eq!(bridge.value("dev1", "mode").unwrap()["hvac_mode"], "heat");
    assert!(updates.lock().unwrap().iter().any(|u| u.code == "mode"));
    bridge.shutdown().await;
}

#[tokio::test]
async fn rejected_command_leaves_state_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1.0/devices/dev1/commands"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false, "code": 2008, "msg": "command or value not support"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (bridge, _) = bridge(&server, &dir).await;
    let err = bridge
        .command("dev1", "switch_1", Command::TurnOn)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { code: 2008, .. }));
    assert_eq!(bridge.value("dev1", "switch_1"), Some(Value::Null));
    bridge.shutdown().await;
}

#[tokio::test]
async fn passive_entity_updates_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (bridge, _) = bridge(&server, &dir).await;
    bridge
        .command("dev1", "brightness", Command::SetValue(40.0))
        .await
        .unwrap();
    assert_eq!(bridge.value("dev1", "brightness"), Some(json!(40.0)));

    let err = bridge
        .command("dev1", "brightness", Command::SetValue(400.0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidCommand(_)));
    bridge.shutdown().await;
}

#[tokio::test]
async fn command_to_unknown_code_fails() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let (bridge, _) = bridge(&server, &dir).await;
    let err = bridge
        .command("dev1", "nope", Command::TurnOn)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownEntity { .. }));
    bridge.shutdown().await;
}
