//! Common test utilities for reconciliation tests
//!
//! Provides an in-memory store that enforces resourceVersion checks the way the
//! API server does, a scripted broker transport, and fixtures for instances,
//! bindings and the broker credentials secret.

#![allow(dead_code, reason = "each test binary uses a different subset of the helpers")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::ByteString;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use service_broker_controller::broker::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, TransportError,
};
use service_broker_controller::config::ControllerConfig;
use service_broker_controller::constants::{BROKER_SECRET_NAME, RETRY_ANNOTATION};
use service_broker_controller::controller::reconciler::{
    reconcile, reconcile::run, Reconciler, ReconcilerError, ResourceKind,
};
use service_broker_controller::crd::{
    BrokerResource, Reason, ServiceBinding, ServiceBindingSpec, ServiceInstance,
    ServiceInstanceSpec,
};
use service_broker_controller::store::{ResourceStore, SecretStore, StoreError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const NAMESPACE: &str = "shop";
pub const MANAGEMENT_NAMESPACE: &str = "service-broker-system";
pub const BROKER_URL: &str = "https://broker.example.com";
pub const TOKEN_URL: &str = "https://auth.example.com";

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn deletion_time() -> Time {
    serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).unwrap()
}

/// Copy the status sub-object of `source` onto `target`
fn with_status_of<K: BrokerResource>(target: &K, source: &K) -> K {
    let mut value = serde_json::to_value(target).unwrap();
    value["status"] = serde_json::to_value(source).unwrap()["status"].clone();
    serde_json::from_value(value).unwrap()
}

/// In-memory object store with API-server write semantics:
/// - every write must carry the stored resourceVersion and bumps it
/// - `update` never touches status, `update_status` never touches spec or metadata
/// - an object with a deletion timestamp and no finalizers is removed
pub struct MemoryStore<K> {
    objects: Mutex<BTreeMap<Key, K>>,
    version: AtomicU64,
    status_writes: AtomicUsize,
    conflict_next_status_write: AtomicBool,
}

impl<K: BrokerResource> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            version: AtomicU64::new(1),
            status_writes: AtomicUsize::new(0),
            conflict_next_status_write: AtomicBool::new(false),
        }
    }
}

impl<K: BrokerResource> MemoryStore<K> {
    fn bump(&self, meta: &mut ObjectMeta) {
        let version = self.version.fetch_add(1, Ordering::SeqCst);
        meta.resource_version = Some(version.to_string());
    }

    /// Insert a new object as the API server would on create
    pub fn insert(&self, mut object: K) -> K {
        let meta = object.meta_mut();
        meta.namespace.get_or_insert_with(|| NAMESPACE.to_string());
        meta.uid.get_or_insert_with(|| uuid::Uuid::new_v4().to_string());
        meta.generation.get_or_insert(1);
        self.bump(object.meta_mut());
        let k = key(&object.namespace().unwrap_or_default(), &object.name_any());
        self.objects.lock().unwrap().insert(k, object.clone());
        object
    }

    pub fn get_object(&self, name: &str) -> Option<K> {
        self.objects.lock().unwrap().get(&key(NAMESPACE, name)).cloned()
    }

    /// Change metadata (annotations, labels); generation is unchanged
    pub fn modify(&self, name: &str, f: impl FnOnce(&mut K)) {
        let mut objects = self.objects.lock().unwrap();
        let object = objects.get_mut(&key(NAMESPACE, name)).unwrap();
        f(object);
        self.bump(object.meta_mut());
    }

    /// Change the spec; bumps generation
    pub fn edit_spec(&self, name: &str, f: impl FnOnce(&mut K)) {
        let mut objects = self.objects.lock().unwrap();
        let object = objects.get_mut(&key(NAMESPACE, name)).unwrap();
        f(object);
        let meta = object.meta_mut();
        meta.generation = Some(meta.generation.unwrap_or(1) + 1);
        self.bump(object.meta_mut());
    }

    /// Seed status directly, bypassing the controller
    pub fn seed_status(&self, name: &str, f: impl FnOnce(&mut K)) {
        self.modify(name, f);
    }

    /// Request deletion; objects with finalizers get a deletion timestamp and a
    /// new generation, others are removed immediately
    pub fn request_deletion(&self, name: &str) {
        let mut objects = self.objects.lock().unwrap();
        let k = key(NAMESPACE, name);
        let Some(object) = objects.get_mut(&k) else {
            return;
        };
        if object.finalizers().is_empty() {
            objects.remove(&k);
            return;
        }
        let meta = object.meta_mut();
        if meta.deletion_timestamp.is_none() {
            meta.deletion_timestamp = Some(deletion_time());
            meta.generation = Some(meta.generation.unwrap_or(1) + 1);
        }
        self.bump(object.meta_mut());
    }

    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    /// Make the next status write fail as if another writer got there first
    pub fn conflict_next_status_write(&self) {
        self.conflict_next_status_write.store(true, Ordering::SeqCst);
    }

    fn check_version(stored: &K, object: &K) -> Result<(), StoreError> {
        if stored.meta().resource_version == object.meta().resource_version {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!("{}/{}", K::kind(&()), object.name_any())))
        }
    }
}

#[async_trait]
impl<K: BrokerResource> ResourceStore<K> for MemoryStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        Ok(self.objects.lock().unwrap().get(&key(namespace, name)).cloned())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<K>, StoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn update(&self, object: &K) -> Result<K, StoreError> {
        let k = key(&object.namespace().unwrap_or_default(), &object.name_any());
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get(&k)
            .ok_or_else(|| StoreError::NotFound(object.name_any()))?;
        Self::check_version(stored, object)?;

        let mut next = with_status_of(object, stored);
        let meta = next.meta_mut();
        meta.generation = stored.meta().generation;
        meta.uid.clone_from(&stored.meta().uid);
        meta.deletion_timestamp.clone_from(&stored.meta().deletion_timestamp);
        self.bump(next.meta_mut());

        if next.meta().deletion_timestamp.is_some() && next.finalizers().is_empty() {
            objects.remove(&k);
        } else {
            objects.insert(k, next.clone());
        }
        Ok(next)
    }

    async fn update_status(&self, object: &K) -> Result<K, StoreError> {
        if self.conflict_next_status_write.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Conflict(object.name_any()));
        }
        let k = key(&object.namespace().unwrap_or_default(), &object.name_any());
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get(&k)
            .ok_or_else(|| StoreError::NotFound(object.name_any()))?;
        Self::check_version(stored, object)?;

        let mut next = with_status_of(stored, object);
        self.bump(next.meta_mut());
        objects.insert(k, next.clone());
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(next)
    }
}

/// In-memory secret store
#[derive(Default)]
pub struct MemorySecrets {
    secrets: Mutex<BTreeMap<Key, Secret>>,
    version: AtomicU64,
    writes: AtomicUsize,
}

impl MemorySecrets {
    pub fn insert(&self, mut secret: Secret) {
        secret.metadata.resource_version = Some("1".to_string());
        let k = key(
            secret.metadata.namespace.as_deref().unwrap_or_default(),
            secret.metadata.name.as_deref().unwrap_or_default(),
        );
        self.secrets.lock().unwrap().insert(k, secret);
    }

    pub fn get_secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Delete behind the controller's back
    pub fn remove(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets.lock().unwrap().remove(&key(namespace, name))
    }

    /// Number of create/replace calls
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 2).to_string()
    }
}

#[async_trait]
impl SecretStore for MemorySecrets {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.get_secret(namespace, name))
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let k = key(
            secret.metadata.namespace.as_deref().unwrap_or_default(),
            secret.metadata.name.as_deref().unwrap_or_default(),
        );
        let mut secrets = self.secrets.lock().unwrap();
        if secrets.contains_key(&k) {
            return Err(StoreError::Conflict(format!("Secret/{}", k.1)));
        }
        let mut created = secret.clone();
        created.metadata.resource_version = Some(self.next_version());
        created.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        secrets.insert(k, created.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    async fn replace(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let k = key(
            secret.metadata.namespace.as_deref().unwrap_or_default(),
            secret.metadata.name.as_deref().unwrap_or_default(),
        );
        let mut secrets = self.secrets.lock().unwrap();
        let stored = secrets
            .get(&k)
            .ok_or_else(|| StoreError::NotFound(format!("Secret/{}", k.1)))?;
        if secret.metadata.resource_version.is_some()
            && secret.metadata.resource_version != stored.metadata.resource_version
        {
            return Err(StoreError::Conflict(format!("Secret/{}", k.1)));
        }
        let mut replaced = secret.clone();
        replaced.metadata.resource_version = Some(self.next_version());
        replaced.metadata.uid.clone_from(&stored.metadata.uid);
        secrets.insert(k, replaced.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(replaced)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.secrets.lock().unwrap().remove(&key(namespace, name));
        Ok(())
    }
}

struct Route {
    method: HttpMethod,
    url_contains: String,
    response: Result<HttpResponse, TransportError>,
}

/// Broker transport answering from a script
///
/// Each scripted response is used once, by the first request whose method matches
/// and whose URL contains the given fragment. Token requests are answered with a
/// fresh token unless a token response is scripted. Unscripted requests get a 500.
#[derive(Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn expect(&self, method: HttpMethod, url_contains: &str, response: HttpResponse) {
        self.routes.lock().unwrap().push(Route {
            method,
            url_contains: url_contains.to_string(),
            response: Ok(response),
        });
    }

    pub fn expect_transport_error(&self, method: HttpMethod, url_contains: &str) {
        self.routes.lock().unwrap().push(Route {
            method,
            url_contains: url_contains.to_string(),
            response: Err(TransportError("connection refused".to_string())),
        });
    }

    /// Every request sent, token requests included
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests sent to the broker API
    pub fn broker_calls(&self) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| !is_token_request(r))
            .collect()
    }

    /// `METHOD url` of each broker call, for readable assertions
    pub fn broker_call_lines(&self) -> Vec<String> {
        self.broker_calls()
            .iter()
            .map(|r| format!("{} {}", r.method.as_str(), r.url))
            .collect()
    }

    pub fn token_calls(&self) -> usize {
        self.requests().iter().filter(|r| is_token_request(r)).count()
    }

    /// Scripted responses not consumed yet
    pub fn unused(&self) -> usize {
        self.routes.lock().unwrap().len()
    }
}

fn is_token_request(request: &HttpRequest) -> bool {
    request.url.ends_with("/oauth/token")
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut routes = self.routes.lock().unwrap();
        if let Some(index) = routes
            .iter()
            .position(|r| r.method == request.method && request.url.contains(&r.url_contains))
        {
            return routes.remove(index).response;
        }
        drop(routes);

        if is_token_request(&request) {
            return Ok(json(
                200,
                serde_json::json!({"access_token": "token-1", "token_type": "bearer", "expires_in": 3600}),
            ));
        }
        Ok(json(500, serde_json::json!({"error": "unscripted request"})))
    }
}

pub fn json(status: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse::new(status)
        .with_header("Content-Type", "application/json")
        .with_json(&body)
}

/// 202 with the operation Location
pub fn accepted(location: &str) -> HttpResponse {
    json(202, serde_json::json!({})).with_header("Location", location)
}

pub fn operation_state(state: &str, resource_id: Option<&str>) -> HttpResponse {
    json(200, serde_json::json!({"state": state, "resource_id": resource_id}))
}

pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        management_namespace: MANAGEMENT_NAMESPACE.to_string(),
        poll_interval_secs: 0,
        ..ControllerConfig::default()
    }
}

pub fn broker_secret(namespace: &str, url: &str) -> Secret {
    let data = [
        ("clientid", "client-1"),
        ("clientsecret", "s3cr3t"),
        ("url", url),
        ("tokenurl", TOKEN_URL),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
    .collect();
    Secret {
        metadata: ObjectMeta {
            name: Some(BROKER_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

pub fn instance(name: &str, plan: &str) -> ServiceInstance {
    let mut instance = ServiceInstance::new(
        name,
        ServiceInstanceSpec {
            external_name: None,
            service_offering_name: "postgresql".to_string(),
            service_plan_name: plan.to_string(),
            parameters: None,
        },
    );
    instance.metadata.namespace = Some(NAMESPACE.to_string());
    instance
}

pub fn binding(name: &str, instance_name: &str) -> ServiceBinding {
    let mut binding = ServiceBinding::new(
        name,
        ServiceBindingSpec {
            service_instance_name: instance_name.to_string(),
            external_name: None,
            secret_name: None,
            parameters: None,
        },
    );
    binding.metadata.namespace = Some(NAMESPACE.to_string());
    binding
}

/// Stores, transport and reconciler wired together
pub struct Harness {
    pub instances: Arc<MemoryStore<ServiceInstance>>,
    pub bindings: Arc<MemoryStore<ServiceBinding>>,
    pub secrets: Arc<MemorySecrets>,
    pub http: Arc<ScriptedHttpClient>,
    pub ctx: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        let instances = Arc::new(MemoryStore::<ServiceInstance>::default());
        let bindings = Arc::new(MemoryStore::<ServiceBinding>::default());
        let secrets = Arc::new(MemorySecrets::default());
        let http = Arc::new(ScriptedHttpClient::default());
        let ctx = Reconciler::with_parts(
            Arc::clone(&instances) as Arc<dyn ResourceStore<ServiceInstance>>,
            Arc::clone(&bindings) as Arc<dyn ResourceStore<ServiceBinding>>,
            Arc::clone(&secrets) as Arc<dyn SecretStore>,
            Arc::clone(&http) as Arc<dyn HttpClient>,
            config,
        );
        Self {
            instances,
            bindings,
            secrets,
            http,
            ctx,
        }
    }

    /// Harness with the broker credentials secret in the management namespace
    pub fn with_broker() -> Self {
        let harness = Self::new();
        harness
            .secrets
            .insert(broker_secret(MANAGEMENT_NAMESPACE, BROKER_URL));
        harness
    }

    pub async fn reconcile_instance(&self, name: &str) -> Result<Action, ReconcilerError> {
        self.reconcile::<ServiceInstance>(self.instances.get_object(name), name)
            .await
    }

    pub async fn reconcile_binding(&self, name: &str) -> Result<Action, ReconcilerError> {
        self.reconcile::<ServiceBinding>(self.bindings.get_object(name), name)
            .await
    }

    /// Deliver the object as the runtime would; a vanished object is still delivered by name
    async fn reconcile<K: ResourceKind>(
        &self,
        object: Option<K>,
        name: &str,
    ) -> Result<Action, ReconcilerError> {
        match object {
            Some(object) => reconcile(&object, &self.ctx).await,
            None => run::<K>(&self.ctx, NAMESPACE, name).await,
        }
    }

    pub fn instance(&self, name: &str) -> ServiceInstance {
        self.instances.get_object(name).unwrap()
    }

    pub fn binding(&self, name: &str) -> ServiceBinding {
        self.bindings.get_object(name).unwrap()
    }

    /// Create an instance and converge it synchronously to broker id `id`
    pub async fn ready_instance(&self, name: &str, id: &str) -> ServiceInstance {
        self.instances.insert(instance(name, "small"));
        self.http.expect(
            HttpMethod::Post,
            "/v1/service_instances?",
            json(201, serde_json::json!({"id": id})),
        );
        self.reconcile_instance(name).await.unwrap();
        let ready = self.instance(name);
        assert_eq!(reason(&ready), Some(Reason::Provisioned));
        ready
    }

    /// Ask for another attempt of a failed generation
    pub fn request_retry<K: BrokerResource>(store: &MemoryStore<K>, name: &str) {
        store.modify(name, |object| {
            object
                .annotations_mut()
                .insert(RETRY_ANNOTATION.to_string(), "true".to_string());
        });
    }
}

pub fn reason<K: BrokerResource>(object: &K) -> Option<Reason> {
    object.broker_status().and_then(|s| s.current_reason())
}

pub fn message<K: BrokerResource>(object: &K) -> String {
    object
        .broker_status()
        .and_then(|s| s.current_condition())
        .and_then(|c| c.message.clone())
        .unwrap_or_default()
}

pub fn is_ready<K: BrokerResource>(object: &K) -> bool {
    object.broker_status().is_some_and(|s| s.is_ready())
}
