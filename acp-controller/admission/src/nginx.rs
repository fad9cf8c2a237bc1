//! Access control for Nginx ingresses.
//!
//! Both Nginx controllers authenticate requests with an `auth_request`
//! subrequest to the ACP auth server, configured through annotations on the
//! `Ingress`. Snippet annotations may also hold user configuration: the
//! controller only ever touches the block between its markers.

use crate::{
    ingress_class, patch, policy_annotation, resolve_policy, Error, Patch, ReviewRequest, Reviewer,
};
use acp_controller_core::{canonical_name, Controller, IngressClasses, PolicyConfig, PolicyGetter};
use std::{collections::BTreeMap, fmt::Write, sync::Arc};

pub const ANNOTATION_AUTH_URL: &str = "nginx.ingress.kubernetes.io/auth-url";
pub const ANNOTATION_CONFIGURATION_SNIPPET: &str =
    "nginx.ingress.kubernetes.io/configuration-snippet";
pub const ANNOTATION_SERVER_SNIPPETS: &str = "nginx.org/server-snippets";
pub const ANNOTATION_LOCATION_SNIPPETS: &str = "nginx.org/location-snippets";

pub const SNIPPET_START: &str = "# acp-controller-start";
pub const SNIPPET_END: &str = "# acp-controller-end";

/// The Nginx controller implementations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Flavor {
    /// kubernetes/ingress-nginx, configured through `auth-url` and a
    /// configuration snippet.
    Community,
    /// nginxinc/kubernetes-ingress, configured through server and location
    /// snippets.
    Official,
}

/// The managed annotation values for a policy. `None` clears the agent's
/// configuration from an annotation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snippets {
    pub auth_url: Option<String>,
    pub configuration_snippet: Option<String>,
    pub server_snippets: Option<String>,
    pub location_snippets: Option<String>,
}

pub struct NginxIngress {
    auth_server_url: String,
    classes: Arc<dyn IngressClasses + Send + Sync>,
    policies: Arc<dyn PolicyGetter + Send + Sync>,
}

// === impl NginxIngress ===

impl NginxIngress {
    pub fn new(
        auth_server_url: &str,
        classes: Arc<dyn IngressClasses + Send + Sync>,
        policies: Arc<dyn PolicyGetter + Send + Sync>,
    ) -> Self {
        Self {
            auth_server_url: auth_server_url.trim_end_matches('/').to_string(),
            classes,
            policies,
        }
    }

    fn flavor(&self, req: &ReviewRequest) -> Result<Option<Flavor>, Error> {
        let controller = ingress_class::resolve(&*self.classes, req)?;
        Ok(controller.and_then(Flavor::from_controller))
    }
}

#[async_trait::async_trait]
impl Reviewer for NginxIngress {
    fn name(&self) -> &'static str {
        "NginxIngress"
    }

    fn can_review(&self, req: &ReviewRequest) -> Result<bool, Error> {
        if !req.is_ingress() {
            return Ok(false);
        }
        Ok(self.flavor(req)?.is_some())
    }

    async fn review(&self, req: &ReviewRequest) -> Result<Option<Patch>, Error> {
        let flavor = self.flavor(req)?.unwrap_or(Flavor::Community);
        let ingress = req.parse::<serde::de::IgnoredAny>()?;
        let ns = req.object_namespace(&ingress.metadata);
        let _span = tracing::info_span!("review", reviewer = self.name(), %ns, name = %req.name)
            .entered();

        let mut snippets = Snippets::default();
        if let Some(reference) = policy_annotation(&ingress.metadata) {
            let canonical = canonical_name(reference, &ns)?;
            tracing::debug!(policy = %canonical, "Access control policy annotation found");
            if let Some(config) = resolve_policy(&*self.policies, &canonical)? {
                snippets = compile(flavor, &self.auth_server_url, &canonical, &config);
            }
        }

        let observed = ingress.metadata.annotations.as_ref();
        let desired = merge(
            &self.auth_server_url,
            observed.cloned().unwrap_or_default(),
            &snippets,
        );
        let patch = patch::diff_annotations(&desired, observed)?;
        if patch.is_some() {
            tracing::info!(%flavor, "Patching Ingress annotations");
        } else {
            tracing::debug!("No patch required");
        }
        Ok(patch)
    }
}

// === impl Flavor ===

impl Flavor {
    pub fn from_controller(controller: Controller) -> Option<Self> {
        match controller {
            Controller::NginxCommunity => Some(Self::Community),
            Controller::NginxOfficial => Some(Self::Official),
            Controller::Traefik => None,
        }
    }
}

impl std::fmt::Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let controller = match self {
            Self::Community => Controller::NginxCommunity,
            Self::Official => Controller::NginxOfficial,
        };
        f.write_str(controller.as_str())
    }
}

/// Compiles a policy into the agent-managed annotation values for a flavor.
///
/// Snippet values hold the agent's block only, without markers.
pub fn compile(
    flavor: Flavor,
    auth_server_url: &str,
    canonical: &str,
    config: &PolicyConfig,
) -> Snippets {
    let auth_url = format!("{auth_server_url}/{canonical}");
    let headers = config.auth_response_headers();
    let forward = forward_headers(&headers);

    match flavor {
        Flavor::Community => Snippets {
            auth_url: Some(auth_url),
            configuration_snippet: (!headers.is_empty()).then_some(forward),
            server_snippets: None,
            location_snippets: None,
        },
        Flavor::Official => {
            let location = format!("/acp-controller/{canonical}");
            let server = format!(
                "location = {location} {{\n\
                 \x20 internal;\n\
                 \x20 proxy_pass {auth_url};\n\
                 \x20 proxy_pass_request_body off;\n\
                 \x20 proxy_set_header Content-Length \"\";\n\
                 \x20 proxy_set_header X-Original-Url $scheme://$http_host$request_uri;\n\
                 \x20 proxy_set_header X-Original-Method $request_method;\n\
                 }}\n"
            );
            Snippets {
                auth_url: Some(auth_url),
                configuration_snippet: None,
                server_snippets: Some(server),
                location_snippets: Some(format!("auth_request {location};\n{forward}")),
            }
        }
    }
}

/// Copies auth response headers onto the upstream request.
fn forward_headers(headers: &[String]) -> String {
    let mut snippet = String::new();
    for (i, header) in headers.iter().enumerate() {
        let var = header.to_ascii_lowercase().replace('-', "_");
        // Writing to a String cannot fail.
        let _ = writeln!(snippet, "auth_request_set $acp_value_{i} $upstream_http_{var};");
        let _ = writeln!(snippet, "proxy_set_header {header} $acp_value_{i};");
    }
    snippet
}

/// Applies compiled snippets over an object's annotations.
///
/// Without a policy, `auth-url` is only removed when it targets the agent's
/// auth server.
pub fn merge(
    auth_server_url: &str,
    mut annotations: BTreeMap<String, String>,
    snippets: &Snippets,
) -> BTreeMap<String, String> {
    match snippets.auth_url.as_ref() {
        Some(url) => {
            annotations.insert(ANNOTATION_AUTH_URL.to_string(), url.clone());
        }
        None => {
            let prefix = format!("{auth_server_url}/");
            if annotations
                .get(ANNOTATION_AUTH_URL)
                .is_some_and(|url| url.starts_with(&prefix) || url.is_empty())
            {
                annotations.remove(ANNOTATION_AUTH_URL);
            }
        }
    }

    for (key, block) in [
        (
            ANNOTATION_CONFIGURATION_SNIPPET,
            &snippets.configuration_snippet,
        ),
        (ANNOTATION_SERVER_SNIPPETS, &snippets.server_snippets),
        (ANNOTATION_LOCATION_SNIPPETS, &snippets.location_snippets),
    ] {
        let merged = merge_block(annotations.get(key).map(String::as_str), block.as_deref());
        match merged {
            Some(value) => annotations.insert(key.to_string(), value),
            None => annotations.remove(key),
        };
    }

    annotations
}

/// Replaces the agent's block within a snippet, preserving user content.
///
/// A new block is placed before any user content. A snippet without an agent
/// block is returned as is when there is no block to add. Otherwise returns
/// `None` when the resulting snippet is blank.
pub fn merge_block(existing: Option<&str>, block: Option<&str>) -> Option<String> {
    if block.is_none() && !existing.is_some_and(|s| find_block(s).is_some()) {
        return existing.map(str::to_string);
    }
    let existing = existing.unwrap_or_default();
    let wrapped = block.map(|block| format!("{SNIPPET_START}\n{block}{SNIPPET_END}"));

    let merged = match find_block(existing) {
        Some((start, end)) => {
            let mut merged = existing[..start].to_string();
            match wrapped {
                Some(wrapped) => {
                    merged.push_str(&wrapped);
                    merged.push_str(&existing[end..]);
                }
                None => {
                    let rest = &existing[end..];
                    merged.push_str(rest.strip_prefix('\n').unwrap_or(rest));
                }
            }
            merged
        }
        None => match wrapped {
            Some(wrapped) if existing.is_empty() => wrapped,
            Some(wrapped) => format!("{wrapped}\n{existing}"),
            None => existing.to_string(),
        },
    };

    if merged.trim().is_empty() {
        return None;
    }
    Some(merged)
}

/// Returns the byte range of the agent's block, markers included.
fn find_block(snippet: &str) -> Option<(usize, usize)> {
    let start = snippet.find(SNIPPET_START)?;
    let end = snippet[start..].find(SNIPPET_END)? + start + SNIPPET_END.len();
    Some((start, end))
}
