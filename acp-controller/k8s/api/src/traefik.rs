//! The subset of Traefik's CRDs read and written by the controller.
//!
//! Fields the controller does not manage are carried through untouched so
//! that rewriting a resource never drops user configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const GROUP: &str = "traefik.containo.us";
pub const VERSION: &str = "v1alpha1";

/// Provider suffix used by Traefik to reference CRD middlewares from
/// annotations.
pub const KUBERNETES_CRD_PROVIDER: &str = "kubernetescrd";

#[derive(Clone, Debug, Default, PartialEq, kube::CustomResource, Deserialize, Serialize)]
#[kube(
    group = "traefik.containo.us",
    version = "v1alpha1",
    kind = "IngressRoute",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct IngressRouteSpec {
    #[serde(default)]
    pub routes: Vec<Route>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middlewares: Option<Vec<MiddlewareRef>>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MiddlewareRef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, kube::CustomResource, Deserialize, Serialize)]
#[kube(
    group = "traefik.containo.us",
    version = "v1alpha1",
    kind = "Middleware",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_auth: Option<ForwardAuth>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardAuth {
    pub address: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auth_response_headers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_forward_header: Option<bool>,
}

// === impl MiddlewareRef ===

impl MiddlewareRef {
    /// Indicates whether this reference targets the named middleware, given
    /// the namespace of the referencing resource.
    pub fn targets(&self, name: &str, namespace: &str) -> bool {
        self.name == name && self.namespace.as_deref().unwrap_or(namespace) == namespace
    }
}

/// Formats a middleware reference as used in the
/// `traefik.ingress.kubernetes.io/router.middlewares` annotation.
pub fn annotation_ref(namespace: &str, name: &str) -> String {
    format!("{namespace}-{name}@{KUBERNETES_CRD_PROVIDER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_keep_unknown_fields() {
        let raw = serde_json::json!({
            "match": "Host(`example.com`)",
            "kind": "Rule",
            "priority": 2,
            "services": [{"name": "web", "port": 80}],
        });
        let route: Route = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(route.middlewares, None);
        assert_eq!(serde_json::to_value(&route).unwrap(), raw);
    }

    #[test]
    fn refs_default_to_local_namespace() {
        let local = MiddlewareRef {
            name: "zz-acp-ns".to_string(),
            namespace: None,
        };
        assert!(local.targets("zz-acp-ns", "ns"));

        let remote = MiddlewareRef {
            name: "zz-acp-ns".to_string(),
            namespace: Some("other".to_string()),
        };
        assert!(!remote.targets("zz-acp-ns", "ns"));
        assert!(remote.targets("zz-acp-ns", "other"));
    }
}
