//! Access control for Traefik routers.
//!
//! Traefik authenticates requests through a `forwardAuth` middleware. The
//! controller manages one such middleware per policy and namespace, and
//! references it from the routers of the reviewed resource: from the routes
//! of an `IngressRoute`, or from the router middlewares annotation of an
//! `Ingress`.

use crate::{
    ingress_class, patch, policy_annotation, resolve_policy, Error, MiddlewareStore, Patch,
    ReviewRequest, Reviewer,
};
use acp_controller_core::{
    canonical_name, Controller, IngressClasses, PolicyConfig, PolicyGetter, CONTROLLER_NAME,
};
use acp_controller_k8s_api::{
    traefik::{self, ForwardAuth, IngressRouteSpec, Middleware, MiddlewareRef, MiddlewareSpec},
    ObjectMeta,
};
use sha3::{
    digest::{ExtendableOutput, Update, XofReader},
    Shake256,
};
use std::{collections::BTreeMap, sync::Arc};

pub const ANNOTATION_ROUTER_MIDDLEWARES: &str = "traefik.ingress.kubernetes.io/router.middlewares";

/// Maximum length of a Kubernetes object name that must be a DNS label.
const MAX_NAME_LEN: usize = 63;

/// Length, in bytes, of the hash suffix of shortened middleware names.
const HASH_SUFFIX_LEN: usize = 5;

/// Manages the forward-auth middlewares policies compile to.
pub struct ForwardAuthMiddlewares {
    auth_server_url: String,
    policies: Arc<dyn PolicyGetter + Send + Sync>,
    store: Arc<dyn MiddlewareStore>,
}

/// The managed middleware references of a resource under review.
#[derive(Debug, Default)]
struct Refs {
    namespace: String,
    /// The middleware referenced for the previous policy, on updates.
    previous: Option<String>,
    /// The middleware to reference for the current policy.
    desired: Option<String>,
}

/// Reviews Traefik `IngressRoute` resources.
pub struct TraefikIngressRoute {
    middlewares: Arc<ForwardAuthMiddlewares>,
}

/// Reviews `Ingress` resources served by Traefik.
pub struct TraefikIngress {
    classes: Arc<dyn IngressClasses + Send + Sync>,
    middlewares: Arc<ForwardAuthMiddlewares>,
}

/// Returns the name of the middleware managed for a policy.
///
/// The name is `zz-<name>-<namespace>` when that form maps back to a single
/// policy: the identity is a valid lowercase object name, the namespace holds
/// no hyphen and cannot be mistaken for a hash suffix, and the result fits in
/// 63 characters. Any other identity is sanitized, truncated and suffixed
/// with a hash of the identity, so distinct policies never share a
/// middleware.
pub fn middleware_name(canonical: &str) -> String {
    let (name, ns) = canonical.split_once('@').unwrap_or((canonical, ""));
    let raw = format!("zz-{name}-{ns}");
    let is_valid = raw
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-'));
    if is_valid && !ns.contains('-') && !is_hash_suffix(ns) && raw.len() <= MAX_NAME_LEN {
        return raw;
    }

    let sanitized = raw
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => c,
            _ => '-',
        })
        .collect::<String>();

    let mut hasher = Shake256::default();
    hasher.update(canonical.as_bytes());
    let mut hash = [0u8; HASH_SUFFIX_LEN];
    hasher.finalize_xof().read(&mut hash);

    // Sanitized names are ASCII, so any byte offset is a char boundary.
    let keep = MAX_NAME_LEN - 1 - 2 * HASH_SUFFIX_LEN;
    let prefix = &sanitized[..sanitized.len().min(keep)];
    format!("{prefix}-{}", hex::encode(hash))
}

fn is_hash_suffix(s: &str) -> bool {
    s.len() == 2 * HASH_SUFFIX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

// === impl ForwardAuthMiddlewares ===

impl ForwardAuthMiddlewares {
    pub fn new(
        auth_server_url: &str,
        policies: Arc<dyn PolicyGetter + Send + Sync>,
        store: Arc<dyn MiddlewareStore>,
    ) -> Self {
        Self {
            auth_server_url: auth_server_url.trim_end_matches('/').to_string(),
            policies,
            store,
        }
    }

    /// Builds the middleware enforcing a policy in a namespace.
    pub fn build(&self, canonical: &str, namespace: &str, config: &PolicyConfig) -> Middleware {
        let mut middleware = Middleware::new(
            &middleware_name(canonical),
            MiddlewareSpec {
                forward_auth: Some(ForwardAuth {
                    address: format!("{}/{canonical}", self.auth_server_url),
                    auth_response_headers: config.auth_response_headers(),
                    trust_forward_header: None,
                }),
            },
        );
        middleware.metadata.namespace = Some(namespace.to_string());
        middleware.metadata.labels = Some(BTreeMap::from([(
            "app.kubernetes.io/managed-by".to_string(),
            CONTROLLER_NAME.to_string(),
        )]));
        middleware
    }

    /// Resolves the middlewares to reference from a resource, creating or
    /// updating the one enforcing its current policy.
    async fn refs(&self, req: &ReviewRequest, meta: &ObjectMeta) -> Result<Refs, Error> {
        let namespace = req.object_namespace(meta);
        let previous = req.previous_policy().map(|p| middleware_name(&p));

        let Some(reference) = policy_annotation(meta) else {
            tracing::debug!("No access control policy annotation");
            return Ok(Refs {
                namespace,
                previous,
                desired: None,
            });
        };

        let canonical = canonical_name(reference, &namespace)?;
        let desired = match resolve_policy(&*self.policies, &canonical)? {
            Some(config) => {
                let middleware = self.build(&canonical, &namespace, &config);
                let name = middleware_name(&canonical);
                tracing::debug!(policy = %canonical, middleware = %name, "Applying middleware");
                self.store
                    .apply(middleware)
                    .await
                    .map_err(|source| Error::Store {
                        name: format!("{namespace}/{name}"),
                        source,
                    })?;
                Some(name)
            }
            None => None,
        };

        Ok(Refs {
            namespace,
            previous,
            desired,
        })
    }
}

// === impl TraefikIngressRoute ===

impl TraefikIngressRoute {
    pub fn new(middlewares: Arc<ForwardAuthMiddlewares>) -> Self {
        Self { middlewares }
    }
}

#[async_trait::async_trait]
impl Reviewer for TraefikIngressRoute {
    fn name(&self) -> &'static str {
        "TraefikIngressRoute"
    }

    fn can_review(&self, req: &ReviewRequest) -> Result<bool, Error> {
        Ok(req.is_kind(traefik::GROUP, traefik::VERSION, "IngressRoute"))
    }

    async fn review(&self, req: &ReviewRequest) -> Result<Option<Patch>, Error> {
        let route = req.parse::<IngressRouteSpec>()?;
        let refs = self.middlewares.refs(req, &route.metadata).await?;
        tracing::debug!(
            ns = %refs.namespace,
            name = %req.name,
            ?refs.previous,
            ?refs.desired,
            "Reviewing IngressRoute"
        );

        let observed = route.spec.map(|spec| spec.routes).unwrap_or_default();
        let mut routes = observed.clone();
        for route in &mut routes {
            let mut middlewares = route.middlewares.clone().unwrap_or_default();
            let changed = patch::rewrite_refs(
                &mut middlewares,
                |m| {
                    let ns = &refs.namespace;
                    refs.previous.as_deref().is_some_and(|p| m.targets(p, ns))
                },
                |m| {
                    let ns = &refs.namespace;
                    refs.desired.as_deref().is_some_and(|d| m.targets(d, ns))
                },
                refs.desired.as_ref().map(|name| MiddlewareRef {
                    name: name.clone(),
                    namespace: Some(refs.namespace.clone()),
                }),
            );
            if changed {
                route.middlewares = (!middlewares.is_empty()).then_some(middlewares);
            }
        }

        let exists = req.object()?.pointer("/spec/routes").is_some();
        let patch = patch::diff_list(
            &["spec", "routes"],
            &routes,
            exists.then_some(observed.as_slice()),
        )?;
        if patch.is_some() {
            tracing::info!(ns = %refs.namespace, name = %req.name, "Patching IngressRoute routes");
        }
        Ok(patch)
    }
}

// === impl TraefikIngress ===

impl TraefikIngress {
    pub fn new(
        classes: Arc<dyn IngressClasses + Send + Sync>,
        middlewares: Arc<ForwardAuthMiddlewares>,
    ) -> Self {
        Self {
            classes,
            middlewares,
        }
    }
}

#[async_trait::async_trait]
impl Reviewer for TraefikIngress {
    fn name(&self) -> &'static str {
        "TraefikIngress"
    }

    fn can_review(&self, req: &ReviewRequest) -> Result<bool, Error> {
        if !req.is_ingress() {
            return Ok(false);
        }
        let controller = ingress_class::resolve(&*self.classes, req)?;
        Ok(controller == Some(Controller::Traefik))
    }

    async fn review(&self, req: &ReviewRequest) -> Result<Option<Patch>, Error> {
        let ingress = req.parse::<serde::de::IgnoredAny>()?;
        let refs = self.middlewares.refs(req, &ingress.metadata).await?;
        tracing::debug!(
            ns = %refs.namespace,
            name = %req.name,
            ?refs.previous,
            ?refs.desired,
            "Reviewing Ingress"
        );

        let observed = ingress.metadata.annotations.as_ref();
        let mut annotations = observed.cloned().unwrap_or_default();

        let mut entries = annotations
            .get(ANNOTATION_ROUTER_MIDDLEWARES)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let previous = refs
            .previous
            .as_ref()
            .map(|name| traefik::annotation_ref(&refs.namespace, name));
        let desired = refs
            .desired
            .as_ref()
            .map(|name| traefik::annotation_ref(&refs.namespace, name));
        let changed = patch::rewrite_refs(
            &mut entries,
            |e| Some(e) == previous.as_ref(),
            |e| Some(e) == desired.as_ref(),
            desired.clone(),
        );
        if changed {
            if entries.is_empty() {
                annotations.remove(ANNOTATION_ROUTER_MIDDLEWARES);
            } else {
                annotations.insert(ANNOTATION_ROUTER_MIDDLEWARES.to_string(), entries.join(","));
            }
        }

        let patch = patch::diff_annotations(&annotations, observed)?;
        if patch.is_some() {
            tracing::info!(ns = %refs.namespace, name = %req.name, "Patching Ingress annotations");
        }
        Ok(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middleware_names() {
        assert_eq!(middleware_name("my-policy@test"), "zz-my-policy-test");
        assert_eq!(
            middleware_name("My-Policy@Test"),
            "zz-my-policy-test-514de567d7"
        );
        assert_eq!(
            middleware_name("My.Policy@test"),
            "zz-my-policy-test-ea54e48d5c"
        );
        assert_eq!(
            middleware_name("my_policy@test"),
            "zz-my-policy-test-eaf9d30156"
        );
    }

    #[test]
    fn ambiguous_identities_get_distinct_names() {
        assert_eq!(middleware_name("a-b@c"), "zz-a-b-c");
        assert_eq!(middleware_name("a@b-c"), "zz-a-b-c-7efac91ec3");
        assert_eq!(
            middleware_name("my-policy@ns-0"),
            "zz-my-policy-ns-0-9f7a5360a1"
        );

        // A namespace shaped like a hash suffix cannot alias a hashed name.
        let hashed = middleware_name("a@b-c");
        assert_ne!(middleware_name("a-b-c@7efac91ec3"), hashed);
    }

    #[test]
    fn long_middleware_names_are_shortened() {
        let canonical = format!("{}@test", "a".repeat(70));
        let name = middleware_name(&canonical);
        assert_eq!(name.len(), MAX_NAME_LEN);
        assert!(name.starts_with("zz-aaaa"));

        let other = middleware_name(&format!("{}@test2", "a".repeat(70)));
        assert_eq!(other.len(), MAX_NAME_LEN);
        assert_ne!(name, other);
    }
}
