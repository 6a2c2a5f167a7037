use std::sync::Arc;

use autogen_registry::{
    HomeAssistantRegistryProvider, RegistryError, RegistryProvider, RegistrySnapshot, SnapshotStore,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "long-lived-token";

async fn mount_instance(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .and(header("authorization", "Bearer long-lived-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "entity_id": "light.kitchen",
                "state": "off",
                "attributes": {"friendly_name": "Kitchen Light", "supported_color_modes": ["brightness"]}
            },
            {
                "entity_id": "sensor.kitchen_temp",
                "state": "21.5",
                "attributes": {"friendly_name": "Kitchen Temperature", "device_class": "temperature"}
            },
            {
                "entity_id": "automation.porch_at_sunset",
                "state": "on",
                "attributes": {"friendly_name": "Porch at sunset", "id": "1700000000001"}
            },
            {
                "entity_id": "automation.from_package",
                "state": "on",
                "attributes": {"friendly_name": "Package automation"}
            }
        ])))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/template"))
        .and(body_string_contains("area_entities"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"[{"area_id": "kitchen", "name": "Kitchen", "entities": ["light.kitchen", "sensor.kitchen_temp"]}]"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "domain": "light",
                "services": {
                    "turn_on": {"description": "Turn on", "fields": {"brightness": {"required": false}}}
                }
            }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/config/automation/config/1700000000001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "1700000000001",
            "alias": "Porch at sunset",
            "trigger": [{"platform": "sun", "event": "sunset"}],
            "action": [{"service": "light.turn_on", "target": {"entity_id": "light.porch"}}]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn live_instance_fetch_builds_a_snapshot() {
    let server = MockServer::start().await;
    mount_instance(&server).await;

    let provider = HomeAssistantRegistryProvider::new(server.uri(), TOKEN).expect("provider");
    let data = provider.fetch_snapshot().await.expect("fetch");
    let snapshot = RegistrySnapshot::build(data, 1).expect("snapshot");

    let light = snapshot.entity("light.kitchen").expect("light");
    assert_eq!(light.name.as_deref(), Some("Kitchen Light"));
    assert_eq!(light.area_id.as_deref(), Some("kitchen"));
    assert_eq!(
        snapshot.entity("sensor.kitchen_temp").and_then(|e| e.attributes.get("device_class")),
        Some(&json!("temperature"))
    );
    assert_eq!(snapshot.area_name("kitchen"), Some("Kitchen"));
    assert!(snapshot.service("light", "turn_on").is_some());

    let stored = snapshot.automation("1700000000001").expect("stored config");
    assert_eq!(stored.alias.as_deref(), Some("Porch at sunset"));
    assert!(stored.config.get("trigger").is_some());

    let aliases: Vec<Option<&str>> = snapshot.automations().map(|a| a.alias.as_deref()).collect();
    assert!(aliases.contains(&Some("Package automation")));
    assert_eq!(snapshot.summary().dashboard_views, 0);
}

#[tokio::test]
async fn rejected_token_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(401).set_body_string("401: Unauthorized"))
        .mount(&server)
        .await;

    let provider = HomeAssistantRegistryProvider::new(server.uri(), "stale").expect("provider");
    let err = provider.fetch_snapshot().await.expect_err("rejected");
    match err {
        RegistryError::Unavailable(reason) => assert!(reason.contains("access token rejected"), "{reason}"),
        other => panic!("expected unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_instance_is_unavailable() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let provider = HomeAssistantRegistryProvider::new(uri, TOKEN).expect("provider");
    let err = provider.fetch_snapshot().await.expect_err("unreachable");
    assert!(matches!(err, RegistryError::Unavailable(_)), "{err:?}");
}

#[tokio::test]
async fn server_error_keeps_last_good_snapshot() {
    let server = MockServer::start().await;
    mount_instance(&server).await;

    let provider = Arc::new(HomeAssistantRegistryProvider::new(server.uri(), TOKEN).expect("provider"));
    let store = SnapshotStore::new(provider);
    let first = store.refresh().await.expect("first refresh");

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = store.refresh().await.expect_err("upstream down");
    assert!(matches!(err, RegistryError::Unavailable(_)));
    let pinned = store.pin().await.expect("last good");
    assert_eq!(pinned.version(), first.version());
    assert!(pinned.contains_entity("light.kitchen"));
}

#[tokio::test]
async fn template_that_is_not_json_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/template"))
        .respond_with(ResponseTemplate::new(200).set_body_string("UndefinedError: 'areas' is undefined"))
        .mount(&server)
        .await;

    let provider = HomeAssistantRegistryProvider::new(server.uri(), TOKEN).expect("provider");
    let err = provider.fetch_snapshot().await.expect_err("malformed");
    assert!(matches!(err, RegistryError::Malformed { .. }), "{err:?}");
}
