//! Admission review of ingress resources.
//!
//! Ingress resources opt into access control with the
//! `hub.traefik.io/access-control-policy` annotation. On each admission
//! review, the [`Dispatcher`] finds the reviewer for the resource's kind and
//! ingress controller, which compiles the referenced policy into the
//! controller's native configuration and returns the patch, if any, that
//! brings the resource in line with it.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod ingress_class;
pub mod nginx;
pub mod patch;
mod store;
pub mod traefik;

#[cfg(test)]
mod tests;

pub use self::store::MiddlewareStore;
pub use json_patch::Patch;
pub use kube::core::GroupVersionKind;

use acp_controller_core::{
    canonical_name, IngressClassError, IngressClasses, PolicyConfig, PolicyError, PolicyGetter,
    ANNOTATION_ACP,
};
use acp_controller_k8s_api::ObjectMeta;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// The subset of an admission request reviewers act on.
#[derive(Clone, Debug, PartialEq)]
pub struct ReviewRequest {
    pub kind: GroupVersionKind,
    pub operation: Operation,
    pub namespace: Option<String>,
    pub name: String,
    pub object: Option<Value>,
    pub old_object: Option<Value>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

/// Reviews one family of resources.
#[async_trait::async_trait]
pub trait Reviewer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Indicates whether this reviewer is responsible for the request.
    fn can_review(&self, req: &ReviewRequest) -> Result<bool, Error>;

    /// Returns the patch to apply to the reviewed object, if any.
    async fn review(&self, req: &ReviewRequest) -> Result<Option<Patch>, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("admission request has no object")]
    MissingObject,

    #[error("failed to parse object: {0}")]
    InvalidObject(#[source] serde_json::Error),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    IngressClass(#[from] IngressClassError),

    #[error("failed to apply middleware {name}: {source}")]
    Store {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to encode patch: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct Config {
    /// The URL ingress controllers use to reach the ACP auth server.
    pub auth_server_url: String,
}

/// Routes admission requests to the first reviewer claiming them.
pub struct Dispatcher {
    reviewers: Vec<Box<dyn Reviewer>>,
}

/// The result of a dispatched review.
#[derive(Debug)]
pub struct Reviewed {
    pub reviewer: &'static str,
    pub patch: Option<Patch>,
}

/// An object as seen by reviewers. Only metadata and spec are read.
#[derive(Debug, serde::Deserialize)]
struct Object<S> {
    #[serde(default)]
    metadata: ObjectMeta,

    spec: Option<S>,
}

// === impl Dispatcher ===

impl Dispatcher {
    pub fn new(
        config: Config,
        classes: Arc<dyn IngressClasses + Send + Sync>,
        policies: Arc<dyn PolicyGetter + Send + Sync>,
        store: Arc<dyn MiddlewareStore>,
    ) -> Self {
        let middlewares = Arc::new(traefik::ForwardAuthMiddlewares::new(
            &config.auth_server_url,
            policies.clone(),
            store,
        ));
        Self::with_reviewers(vec![
            Box::new(nginx::NginxIngress::new(
                &config.auth_server_url,
                classes.clone(),
                policies,
            )),
            Box::new(traefik::TraefikIngress::new(classes, middlewares.clone())),
            Box::new(traefik::TraefikIngressRoute::new(middlewares)),
        ])
    }

    pub fn with_reviewers(reviewers: Vec<Box<dyn Reviewer>>) -> Self {
        Self { reviewers }
    }

    /// Returns the reviewer responsible for the request, if any.
    pub fn reviewer(&self, req: &ReviewRequest) -> Result<Option<&dyn Reviewer>, Error> {
        for reviewer in &self.reviewers {
            if reviewer.can_review(req)? {
                return Ok(Some(reviewer.as_ref()));
            }
        }
        Ok(None)
    }

    /// Reviews the request with the first reviewer claiming it. Returns `None`
    /// when no reviewer is responsible for the request.
    pub async fn review(&self, req: &ReviewRequest) -> Result<Option<Reviewed>, Error> {
        let Some(reviewer) = self.reviewer(req)? else {
            tracing::debug!(kind = %req.kind.kind, "No reviewer found");
            return Ok(None);
        };
        let patch = reviewer.review(req).await?;
        Ok(Some(Reviewed {
            reviewer: reviewer.name(),
            patch,
        }))
    }
}

// === impl ReviewRequest ===

impl ReviewRequest {
    fn is_kind(&self, group: &str, version: &str, kind: &str) -> bool {
        self.kind.group == group && self.kind.version == version && self.kind.kind == kind
    }

    /// Indicates whether the request targets an `Ingress` in any of the API
    /// versions it has been served from.
    pub fn is_ingress(&self) -> bool {
        self.is_kind("networking.k8s.io", "v1", "Ingress")
            || self.is_kind("networking.k8s.io", "v1beta1", "Ingress")
            || self.is_kind("extensions", "v1beta1", "Ingress")
    }

    fn object(&self) -> Result<&Value, Error> {
        self.object.as_ref().ok_or(Error::MissingObject)
    }

    fn parse<S: DeserializeOwned>(&self) -> Result<Object<S>, Error> {
        Object::parse(self.object()?)
    }

    /// The namespace of the reviewed object.
    fn object_namespace(&self, meta: &ObjectMeta) -> String {
        meta.namespace
            .clone()
            .or_else(|| self.namespace.clone())
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| "default".to_string())
    }

    /// Returns the canonical name of the policy the previous version of the
    /// object referenced, on updates.
    fn previous_policy(&self) -> Option<String> {
        if self.operation != Operation::Update {
            return None;
        }
        let old = Object::<serde::de::IgnoredAny>::parse(self.old_object.as_ref()?).ok()?;
        let ns = self.object_namespace(&old.metadata);
        let name = policy_annotation(&old.metadata)?;
        match canonical_name(name, &ns) {
            Ok(name) => Some(name),
            Err(error) => {
                tracing::debug!(%error, "Ignoring previous policy");
                None
            }
        }
    }
}

// === impl Object ===

impl<S: DeserializeOwned> Object<S> {
    fn parse(value: &Value) -> Result<Self, Error> {
        serde::Deserialize::deserialize(value).map_err(Error::InvalidObject)
    }
}

/// Returns the non-empty ACP annotation of an object.
fn policy_annotation(meta: &ObjectMeta) -> Option<&str> {
    meta.annotations
        .as_ref()?
        .get(ANNOTATION_ACP)
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}

/// Looks up the configuration of the named policy. Unknown policies are not
/// enforced.
fn resolve_policy(
    policies: &dyn PolicyGetter,
    canonical: &str,
) -> Result<Option<Arc<PolicyConfig>>, Error> {
    match policies.get_config(canonical) {
        Ok(config) => Ok(Some(config)),
        Err(PolicyError::NotFound(_)) => {
            tracing::warn!(policy = %canonical, "Access control policy not found");
            Ok(None)
        }
        Err(error) => Err(error.into()),
    }
}
