use acp_controller_core::{
    apikey,
    policy::{BasicAuthConfig, DigestAuthConfig, JwtConfig},
    PolicyConfig, PolicyError, PolicyGetter,
};
use acp_controller_k8s_api::{policy as k8s, AccessControlPolicy, ResourceExt};
use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info_span;

pub type SharedIndex = Arc<RwLock<Index>>;

/// Holds every valid `AccessControlPolicy` in the cluster, keyed by its
/// canonical `name@namespace`.
#[derive(Debug, Default)]
pub struct Index {
    by_name: HashMap<String, Policy>,
}

/// An indexed policy.
#[derive(Clone, Debug)]
pub struct Policy {
    pub config: Arc<PolicyConfig>,

    /// Request handler for policies the auth server can evaluate.
    pub handler: Option<Arc<apikey::Handler>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidPolicy {
    #[error("no authentication scheme configured")]
    Empty,

    #[error("exactly one authentication scheme must be configured, got {0}")]
    Ambiguous(usize),

    #[error("invalid forwarded header name {0:?}")]
    HeaderName(String),

    #[error(transparent)]
    ApiKey(#[from] apikey::Error),
}

// === impl Index ===

impl Index {
    pub fn shared() -> SharedIndex {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn get(&self, canonical_name: &str) -> Option<&Policy> {
        self.by_name.get(canonical_name)
    }

    /// Counts indexed policies by scheme.
    pub fn kinds(&self) -> HashMap<&'static str, usize> {
        let mut kinds = HashMap::default();
        for policy in self.by_name.values() {
            *kinds.entry(policy.config.kind()).or_default() += 1;
        }
        kinds
    }
}

impl PolicyGetter for Index {
    fn get_config(&self, canonical_name: &str) -> Result<Arc<PolicyConfig>, PolicyError> {
        self.by_name
            .get(canonical_name)
            .map(|p| p.config.clone())
            .ok_or_else(|| PolicyError::NotFound(canonical_name.to_string()))
    }
}

impl kubert::index::IndexNamespacedResource<AccessControlPolicy> for Index {
    fn apply(&mut self, acp: AccessControlPolicy) {
        let ns = acp.namespace().unwrap_or_else(|| "default".to_string());
        let name = format!("{}@{ns}", acp.name_unchecked());
        let _span = info_span!("apply", %name).entered();

        let policy = match Policy::build(&name, acp.spec) {
            Ok(policy) => policy,
            Err(error) => {
                tracing::warn!(%error, "Invalid AccessControlPolicy");
                // A policy that became invalid must stop being served.
                self.by_name.remove(&name);
                return;
            }
        };

        tracing::debug!(kind = policy.config.kind(), "Indexing AccessControlPolicy");
        self.by_name.insert(name, policy);
    }

    fn delete(&mut self, ns: String, name: String) {
        let name = format!("{name}@{ns}");
        let _span = info_span!("delete", %name).entered();
        if self.by_name.remove(&name).is_some() {
            tracing::debug!("Deleted AccessControlPolicy");
        }
    }
}

// === impl Policy ===

impl Policy {
    pub fn build(
        canonical_name: &str,
        spec: k8s::AccessControlPolicySpec,
    ) -> Result<Self, InvalidPolicy> {
        let config = config(spec)?;
        for name in config.forwarded_headers().into_vec() {
            if !is_forwardable(&name) {
                return Err(InvalidPolicy::HeaderName(name));
            }
        }

        let handler = match &config {
            PolicyConfig::ApiKey(cfg) => {
                Some(Arc::new(apikey::Handler::new(canonical_name, cfg)?))
            }
            _ => None,
        };
        Ok(Self {
            config: Arc::new(config),
            handler,
        })
    }
}

/// Forwarded header names end up verbatim in ingress controller
/// configuration, so only plain tokens are accepted.
fn is_forwardable(name: &str) -> bool {
    http::HeaderName::from_bytes(name.as_bytes()).is_ok()
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn config(spec: k8s::AccessControlPolicySpec) -> Result<PolicyConfig, InvalidPolicy> {
    let k8s::AccessControlPolicySpec {
        jwt,
        basic_auth,
        digest_auth,
        api_key,
    } = spec;

    let configured = [
        jwt.is_some(),
        basic_auth.is_some(),
        digest_auth.is_some(),
        api_key.is_some(),
    ]
    .into_iter()
    .filter(|set| *set)
    .count();
    if configured > 1 {
        return Err(InvalidPolicy::Ambiguous(configured));
    }

    if let Some(jwt) = jwt {
        return Ok(PolicyConfig::Jwt(JwtConfig {
            signing_secret: jwt.signing_secret,
            signing_secret_base64_encoded: jwt.signing_secret_base64_encoded,
            public_key: jwt.public_key,
            jwks_file: jwt.jwks_file,
            jwks_url: jwt.jwks_url,
            strip_authorization_header: jwt.strip_authorization_header,
            forward_headers: jwt.forward_headers,
            token_query_key: jwt.token_query_key,
            claims: jwt.claims,
        }));
    }

    if let Some(basic) = basic_auth {
        return Ok(PolicyConfig::BasicAuth(BasicAuthConfig {
            users: basic.users,
            realm: basic.realm,
            strip_authorization_header: basic.strip_authorization_header,
            forward_username_header: basic.forward_username_header,
        }));
    }

    if let Some(digest) = digest_auth {
        return Ok(PolicyConfig::DigestAuth(DigestAuthConfig {
            users: digest.users,
            realm: digest.realm,
            strip_authorization_header: digest.strip_authorization_header,
            forward_username_header: digest.forward_username_header,
        }));
    }

    if let Some(api_key) = api_key {
        return Ok(PolicyConfig::ApiKey(apikey::Config {
            header: api_key.header,
            query: api_key.query,
            cookie: api_key.cookie,
            keys: api_key
                .keys
                .into_iter()
                .map(|k| apikey::Key {
                    id: k.id,
                    metadata: k.metadata,
                    value: k.value,
                })
                .collect(),
            forward_headers: api_key.forward_headers,
        }));
    }

    Err(InvalidPolicy::Empty)
}
