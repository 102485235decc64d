//! # ServiceBinding Lifecycle Tests
//!
//! Binding creation waits for a Ready instance, and returned credentials land in
//! an owned Secret.

mod common;

use common::*;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use service_broker_controller::broker::HttpMethod;
use service_broker_controller::constants::FIELD_MANAGER;
use service_broker_controller::controller::reconciler::secrets;
use service_broker_controller::crd::Reason;
use std::collections::BTreeMap;
use std::time::Duration;

fn credentials(password: &str) -> serde_json::Value {
    serde_json::json!({"username": "app", "password": password, "port": 5432})
}

fn bytes(value: &str) -> ByteString {
    ByteString(value.as_bytes().to_vec())
}

/// Ready instance `db` (id X) and a converged binding `app` (id B1)
async fn ready_binding(h: &Harness) {
    h.ready_instance("db", "X").await;
    h.bindings.insert(binding("app", "db"));
    h.http.expect(
        HttpMethod::Post,
        "/v1/service_bindings?",
        json(201, serde_json::json!({"id": "B1", "credentials": credentials("p1")})),
    );
    h.reconcile_binding("app").await.unwrap();
    assert_eq!(reason(&h.binding("app")), Some(Reason::Provisioned));
}

#[tokio::test]
async fn test_binding_waits_for_instance_readiness() {
    let h = Harness::with_broker();
    h.instances.insert(instance("db", "small"));
    h.bindings.insert(binding("app", "db"));

    let action = h.reconcile_binding("app").await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(10)));
    let app = h.binding("app");
    assert_eq!(reason(&app), Some(Reason::Blocked));
    assert_eq!(message(&app), "ServiceInstance db is not Ready");
    assert!(h.http.requests().is_empty());

    h.http.expect(
        HttpMethod::Post,
        "/v1/service_instances?",
        json(201, serde_json::json!({"id": "X"})),
    );
    h.reconcile_instance("db").await.unwrap();
    h.http.expect(
        HttpMethod::Post,
        "/v1/service_bindings?",
        json(201, serde_json::json!({"id": "B1", "credentials": credentials("p1")})),
    );
    h.reconcile_binding("app").await.unwrap();

    let app = h.binding("app");
    let status = app.status.as_ref().unwrap();
    assert_eq!(status.instance_id.as_deref(), Some("X"));
    assert_eq!(status.binding_id.as_deref(), Some("B1"));
    assert_eq!(status.broker.observed_generation, Some(1));
    assert!(is_ready(&app));

    let create = h.http.broker_calls().pop().unwrap();
    assert_eq!(create.url, "https://broker.example.com/v1/service_bindings?async=true");
    let body: serde_json::Value = serde_json::from_slice(create.body.as_ref().unwrap()).unwrap();
    assert_eq!(body["service_instance_id"], "X");
    assert_eq!(body["name"], "app");
}

#[tokio::test]
async fn test_binding_to_missing_instance_is_blocked() {
    let h = Harness::with_broker();
    h.bindings.insert(binding("app", "nope"));

    h.reconcile_binding("app").await.unwrap();

    let app = h.binding("app");
    assert_eq!(reason(&app), Some(Reason::Blocked));
    assert_eq!(message(&app), "ServiceInstance nope not found");
    assert!(h.http.requests().is_empty());
}

#[tokio::test]
async fn test_credentials_materialized_into_owned_secret() {
    let h = Harness::with_broker();
    ready_binding(&h).await;

    let app = h.binding("app");
    let secret = h.secrets.get_secret(NAMESPACE, "app").unwrap();
    let data = secret.data.as_ref().unwrap();
    assert_eq!(data["username"], bytes("app"));
    assert_eq!(data["password"], bytes("p1"));
    assert_eq!(data["port"], bytes("5432"));
    assert_eq!(secret.type_.as_deref(), Some("Opaque"));
    assert_eq!(
        secret.labels().get("app.kubernetes.io/managed-by").map(String::as_str),
        Some(FIELD_MANAGER)
    );

    let owners = secret.owner_references();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].kind, "ServiceBinding");
    assert_eq!(owners[0].name, "app");
    assert_eq!(Some(owners[0].uid.clone()), app.uid());
    assert_eq!(owners[0].controller, Some(true));
}

#[tokio::test]
async fn test_custom_secret_name_is_used() {
    let h = Harness::with_broker();
    h.ready_instance("db", "X").await;
    let mut app = binding("app", "db");
    app.spec.secret_name = Some("app-db-credentials".to_string());
    h.bindings.insert(app);
    h.http.expect(
        HttpMethod::Post,
        "/v1/service_bindings?",
        json(201, serde_json::json!({"id": "B1", "credentials": credentials("p1")})),
    );

    h.reconcile_binding("app").await.unwrap();

    assert!(h.secrets.get_secret(NAMESPACE, "app-db-credentials").is_some());
    assert!(h.secrets.get_secret(NAMESPACE, "app").is_none());
}

#[tokio::test]
async fn test_async_binding_fetches_credentials_after_operation() {
    let h = Harness::with_broker();
    h.ready_instance("db", "X").await;
    h.bindings.insert(binding("app", "db"));
    h.http.expect(
        HttpMethod::Post,
        "/v1/service_bindings?",
        accepted("/v1/service_bindings/B2/operations/op-7"),
    );
    h.http.expect(
        HttpMethod::Get,
        "/operations/op-7",
        operation_state("succeeded", Some("B2")),
    );

    let action = h.reconcile_binding("app").await.unwrap();

    assert_eq!(action, Action::requeue(Duration::ZERO));
    let app = h.binding("app");
    let status = app.status.as_ref().unwrap();
    assert_eq!(status.binding_id.as_deref(), Some("B2"));
    assert!(status.broker.operation().is_none());
    assert_eq!(reason(&app), Some(Reason::InProgress));
    assert_eq!(message(&app), "fetching binding credentials");
    assert!(h.secrets.get_secret(NAMESPACE, "app").is_none());

    h.http.expect(
        HttpMethod::Get,
        "/v1/service_bindings/B2",
        json(200, serde_json::json!({"id": "B2", "credentials": credentials("p2")})),
    );
    h.reconcile_binding("app").await.unwrap();

    let app = h.binding("app");
    assert_eq!(reason(&app), Some(Reason::Provisioned));
    assert_eq!(app.status.as_ref().unwrap().broker.observed_generation, Some(1));
    let secret = h.secrets.get_secret(NAMESPACE, "app").unwrap();
    assert_eq!(secret.data.as_ref().unwrap()["password"], bytes("p2"));
}

#[tokio::test]
async fn test_foreign_secret_is_not_overwritten() {
    let h = Harness::with_broker();
    h.ready_instance("db", "X").await;
    h.secrets.insert(Secret {
        metadata: ObjectMeta {
            name: Some("app".to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("password".to_string(), bytes("mine"))])),
        ..Default::default()
    });
    h.bindings.insert(binding("app", "db"));
    h.http.expect(
        HttpMethod::Post,
        "/v1/service_bindings?",
        json(201, serde_json::json!({"id": "B1", "credentials": credentials("p1")})),
    );

    let action = h.reconcile_binding("app").await.unwrap();

    assert_eq!(action, Action::await_change());
    let app = h.binding("app");
    assert_eq!(reason(&app), Some(Reason::Failed));
    assert!(message(&app).contains("not owned by ServiceBinding"));
    let secret = h.secrets.get_secret(NAMESPACE, "app").unwrap();
    assert_eq!(secret.data.as_ref().unwrap()["password"], bytes("mine"));
}

#[tokio::test]
async fn test_identical_credentials_are_not_rewritten() {
    let h = Harness::with_broker();
    ready_binding(&h).await;
    let before = h.secrets.get_secret(NAMESPACE, "app").unwrap();
    let writes = h.secrets.writes();

    h.bindings.edit_spec("app", |app| {
        app.spec.parameters = Some(serde_json::json!({"role": "reader"}));
    });
    h.http.expect(
        HttpMethod::Get,
        "/v1/service_bindings/B1",
        json(200, serde_json::json!({"id": "B1", "credentials": credentials("p1")})),
    );
    h.reconcile_binding("app").await.unwrap();

    let app = h.binding("app");
    assert_eq!(reason(&app), Some(Reason::Updated));
    assert_eq!(app.status.as_ref().unwrap().broker.observed_generation, Some(2));
    assert_eq!(h.secrets.writes(), writes);
    assert_eq!(h.secrets.get_secret(NAMESPACE, "app").unwrap(), before);
}

#[tokio::test]
async fn test_rotated_credentials_replace_secret_data() {
    let h = Harness::with_broker();
    ready_binding(&h).await;

    h.bindings.edit_spec("app", |app| {
        app.spec.parameters = Some(serde_json::json!({"rotate": true}));
    });
    h.http.expect(
        HttpMethod::Get,
        "/v1/service_bindings/B1",
        json(200, serde_json::json!({"id": "B1", "credentials": credentials("p2")})),
    );
    h.reconcile_binding("app").await.unwrap();

    let secret = h.secrets.get_secret(NAMESPACE, "app").unwrap();
    assert_eq!(secret.data.as_ref().unwrap()["password"], bytes("p2"));
    assert_eq!(secret.owner_references().len(), 1);
}

#[tokio::test]
async fn test_materialize_twice_is_a_no_op() {
    let h = Harness::with_broker();
    let app = h.bindings.insert(binding("app", "db"));
    let payload = credentials("p1");
    let payload = payload.as_object().unwrap();

    let name = secrets::materialize(h.secrets.as_ref(), &app, payload).await.unwrap();
    let first = h.secrets.get_secret(NAMESPACE, &name).unwrap();
    let name = secrets::materialize(h.secrets.as_ref(), &app, payload).await.unwrap();

    assert_eq!(name, "app");
    assert_eq!(h.secrets.writes(), 1);
    assert_eq!(h.secrets.get_secret(NAMESPACE, &name).unwrap(), first);
}

#[tokio::test]
async fn test_deleted_secret_of_converged_binding_is_restored() {
    let h = Harness::with_broker();
    ready_binding(&h).await;
    assert!(h.secrets.remove(NAMESPACE, "app").is_some());

    h.http.expect(
        HttpMethod::Get,
        "/v1/service_bindings/B1",
        json(200, serde_json::json!({"id": "B1", "credentials": credentials("p1")})),
    );
    let action = h.reconcile_binding("app").await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(600)));
    let secret = h.secrets.get_secret(NAMESPACE, "app").unwrap();
    assert_eq!(secret.data.as_ref().unwrap()["password"], bytes("p1"));
    assert!(is_ready(&h.binding("app")));
    assert_eq!(h.http.unused(), 0);

    // Restored: back to resync without broker calls
    let calls = h.http.broker_calls().len();
    h.reconcile_binding("app").await.unwrap();
    assert_eq!(h.http.broker_calls().len(), calls);
}

#[tokio::test]
async fn test_renamed_secret_replaces_previous_one() {
    let h = Harness::with_broker();
    ready_binding(&h).await;
    assert_eq!(
        h.binding("app").status.as_ref().unwrap().secret_name.as_deref(),
        Some("app")
    );

    h.bindings.edit_spec("app", |app| {
        app.spec.secret_name = Some("app-credentials".to_string());
    });
    h.http.expect(
        HttpMethod::Get,
        "/v1/service_bindings/B1",
        json(200, serde_json::json!({"id": "B1", "credentials": credentials("p1")})),
    );
    h.reconcile_binding("app").await.unwrap();

    assert!(h.secrets.get_secret(NAMESPACE, "app-credentials").is_some());
    assert!(h.secrets.get_secret(NAMESPACE, "app").is_none());
    let app = h.binding("app");
    assert_eq!(
        app.status.as_ref().unwrap().secret_name.as_deref(),
        Some("app-credentials")
    );
    assert_eq!(app.status.as_ref().unwrap().broker.observed_generation, Some(2));
}

#[tokio::test]
async fn test_rename_never_deletes_foreign_secret() {
    let h = Harness::with_broker();
    ready_binding(&h).await;
    // Someone else takes over the old name
    h.secrets.remove(NAMESPACE, "app");
    h.secrets.insert(Secret {
        metadata: ObjectMeta {
            name: Some("app".to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("password".to_string(), bytes("mine"))])),
        ..Default::default()
    });

    h.bindings.edit_spec("app", |app| {
        app.spec.secret_name = Some("app-credentials".to_string());
    });
    h.http.expect(
        HttpMethod::Get,
        "/v1/service_bindings/B1",
        json(200, serde_json::json!({"id": "B1", "credentials": credentials("p1")})),
    );
    h.reconcile_binding("app").await.unwrap();

    assert!(h.secrets.get_secret(NAMESPACE, "app-credentials").is_some());
    let foreign = h.secrets.get_secret(NAMESPACE, "app").unwrap();
    assert_eq!(foreign.data.as_ref().unwrap()["password"], bytes("mine"));
}
