
use crate::{
    Config, Dispatcher, GroupVersionKind, MiddlewareStore, Operation, Patch, ReviewRequest,
};
use acp_controller_core::{
    apikey,
    policy::{BasicAuthConfig, JwtConfig},
    Controller, IngressClassError, IngressClasses, PolicyConfig, PolicyError, PolicyGetter,
    ANNOTATION_ACP,
};
use acp_controller_k8s_api::traefik::Middleware;
use maplit::*;
use serde_json::{json, Value};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

const AUTH_SERVER_URL: &str = "http://acp-controller.acp.svc:8080";

#[derive(Default)]
struct FakeClasses {
    controllers: HashMap<String, Controller>,
    defaults: Vec<(String, Controller)>,
}

#[derive(Default)]
struct FakePolicies {
    configs: HashMap<String, Arc<PolicyConfig>>,
}

#[derive(Default)]
struct FakeStore {
    applied: parking_lot::Mutex<Vec<Middleware>>,
    fail: bool,
}

struct TestConfig {
    classes: Arc<FakeClasses>,
    policies: Arc<FakePolicies>,
    store: Arc<FakeStore>,
    _tracing: tracing::subscriber::DefaultGuard,
}

// === impl FakeClasses ===

impl FakeClasses {
    fn with(mut self, name: &str, controller: Controller) -> Self {
        self.controllers.insert(name.to_string(), controller);
        self
    }

    fn with_default(mut self, name: &str, controller: Controller) -> Self {
        self.defaults.push((name.to_string(), controller));
        self.with(name, controller)
    }
}

impl IngressClasses for FakeClasses {
    fn get_controller(&self, class_name: &str) -> Option<Controller> {
        self.controllers.get(class_name).copied()
    }

    fn get_default_controller(&self) -> Result<Option<Controller>, IngressClassError> {
        let Some(((first_name, first), rest)) = self.defaults.split_first() else {
            return Ok(None);
        };
        if let Some((name, _)) = rest.iter().find(|(_, c)| c != first) {
            return Err(IngressClassError::ConflictingDefaults(
                first_name.clone(),
                name.clone(),
            ));
        }
        Ok(Some(*first))
    }
}

// === impl FakePolicies ===

impl FakePolicies {
    fn with(mut self, canonical: &str, config: PolicyConfig) -> Self {
        self.configs.insert(canonical.to_string(), Arc::new(config));
        self
    }
}

impl PolicyGetter for FakePolicies {
    fn get_config(&self, canonical_name: &str) -> Result<Arc<PolicyConfig>, PolicyError> {
        self.configs
            .get(canonical_name)
            .cloned()
            .ok_or_else(|| PolicyError::NotFound(canonical_name.to_string()))
    }
}

// === impl FakeStore ===

impl FakeStore {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn applied(&self) -> Vec<Middleware> {
        self.applied.lock().clone()
    }
}

#[async_trait::async_trait]
impl MiddlewareStore for FakeStore {
    async fn apply(&self, middleware: Middleware) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("connection refused");
        }
        self.applied.lock().push(middleware);
        Ok(())
    }
}

// === impl TestConfig ===

impl TestConfig {
    fn new(classes: FakeClasses, policies: FakePolicies) -> Self {
        Self::with_store(classes, policies, FakeStore::default())
    }

    fn with_store(classes: FakeClasses, policies: FakePolicies, store: FakeStore) -> Self {
        Self {
            classes: Arc::new(classes),
            policies: Arc::new(policies),
            store: Arc::new(store),
            _tracing: init_tracing(),
        }
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Config {
                auth_server_url: AUTH_SERVER_URL.to_string(),
            },
            self.classes.clone(),
            self.policies.clone(),
            self.store.clone(),
        )
    }

    /// Reviews a request, expecting a reviewer to claim it.
    async fn review(&self, req: &ReviewRequest) -> Option<Patch> {
        self.dispatcher()
            .review(req)
            .await
            .expect("review must succeed")
            .expect("a reviewer must claim the request")
            .patch
    }
}

fn init_tracing() -> tracing::subscriber::DefaultGuard {
    tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .finish(),
    )
}

fn ingress_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("networking.k8s.io", "v1", "Ingress")
}

fn ingress_route_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("traefik.containo.us", "v1alpha1", "IngressRoute")
}

fn mk_request(kind: GroupVersionKind, object: Value) -> ReviewRequest {
    let name = object["metadata"]["name"].as_str().unwrap_or_default().to_string();
    ReviewRequest {
        kind,
        operation: Operation::Create,
        namespace: object["metadata"]["namespace"].as_str().map(str::to_string),
        name,
        object: Some(object),
        old_object: None,
    }
}

fn mk_update(kind: GroupVersionKind, old: Value, object: Value) -> ReviewRequest {
    ReviewRequest {
        operation: Operation::Update,
        old_object: Some(old),
        ..mk_request(kind, object)
    }
}

/// An `Ingress` in the `test` namespace.
fn mk_ingress(class_name: Option<&str>, annotations: BTreeMap<&str, &str>) -> Value {
    let mut ingress = json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "metadata": {
            "name": "ing",
            "namespace": "test",
        },
        "spec": {
            "rules": [{ "host": "example.com" }],
        },
    });
    if !annotations.is_empty() {
        ingress["metadata"]["annotations"] = json!(annotations);
    }
    if let Some(class_name) = class_name {
        ingress["spec"]["ingressClassName"] = json!(class_name);
    }
    ingress
}

fn api_key_config(forward_headers: &[(&str, &str)]) -> PolicyConfig {
    PolicyConfig::ApiKey(apikey::Config {
        header: Some("Api-Key".to_string()),
        forward_headers: forward_headers
            .iter()
            .map(|(h, f)| (h.to_string(), f.to_string()))
            .collect(),
        ..Default::default()
    })
}

fn jwt_config(forward_headers: &[(&str, &str)]) -> PolicyConfig {
    PolicyConfig::Jwt(JwtConfig {
        forward_headers: forward_headers
            .iter()
            .map(|(h, f)| (h.to_string(), f.to_string()))
            .collect(),
        ..Default::default()
    })
}

fn basic_auth_config() -> PolicyConfig {
    PolicyConfig::BasicAuth(BasicAuthConfig {
        strip_authorization_header: true,
        forward_username_header: Some("User".to_string()),
        ..Default::default()
    })
}

/// Returns the single operation of a patch as `(op, path, value)`.
fn single_op(patch: &Patch) -> (String, String, Value) {
    let ops = serde_json::to_value(patch).expect("patch must serialize");
    let ops = ops.as_array().expect("patch must be a list");
    assert_eq!(ops.len(), 1, "{ops:?}");
    (
        ops[0]["op"].as_str().unwrap().to_string(),
        ops[0]["path"].as_str().unwrap().to_string(),
        ops[0]["value"].clone(),
    )
}

/// Applies a patch's value to the object it was computed for.
fn apply(object: &Value, patch: &Patch) -> Value {
    let mut object = object.clone();
    json_patch::patch(&mut object, patch).expect("patch must apply");
    object
}
