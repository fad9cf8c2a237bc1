use crate::headers::HeaderNames;
use std::{collections::BTreeMap, sync::Arc};

/// A resolved access control policy.
///
/// Exactly one authentication scheme is configured per policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyConfig {
    ApiKey(crate::apikey::Config),
    Jwt(JwtConfig),
    BasicAuth(BasicAuthConfig),
    DigestAuth(DigestAuthConfig),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JwtConfig {
    pub signing_secret: Option<String>,
    pub signing_secret_base64_encoded: bool,
    pub public_key: Option<String>,
    pub jwks_file: Option<String>,
    pub jwks_url: Option<String>,
    pub strip_authorization_header: bool,
    pub forward_headers: BTreeMap<String, String>,
    pub token_query_key: Option<String>,
    pub claims: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasicAuthConfig {
    pub users: Vec<String>,
    pub realm: Option<String>,
    pub strip_authorization_header: bool,
    pub forward_username_header: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DigestAuthConfig {
    pub users: Vec<String>,
    pub realm: Option<String>,
    pub strip_authorization_header: bool,
    pub forward_username_header: Option<String>,
}

/// Looks up policy configurations by canonical name.
///
/// Implementations must serve from already-cached state.
pub trait PolicyGetter {
    fn get_config(&self, canonical_name: &str) -> Result<Arc<PolicyConfig>, PolicyError>;
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("access control policy {0:?} not found")]
    NotFound(String),

    #[error("malformed access control policy reference {0:?}: expected <name> or <name>@<namespace>")]
    MalformedReference(String),
}

// === impl PolicyConfig ===

impl PolicyConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApiKey(_) => "APIKey",
            Self::Jwt(_) => "JWT",
            Self::BasicAuth(_) => "BasicAuth",
            Self::DigestAuth(_) => "DigestAuth",
        }
    }

    /// Names of the headers the auth server sets for the upstream.
    pub fn forwarded_headers(&self) -> HeaderNames {
        match self {
            Self::ApiKey(cfg) => cfg.forward_headers.keys().collect(),
            Self::Jwt(cfg) => cfg.forward_headers.keys().collect(),
            Self::BasicAuth(BasicAuthConfig {
                forward_username_header,
                ..
            })
            | Self::DigestAuth(DigestAuthConfig {
                forward_username_header,
                ..
            }) => forward_username_header.iter().collect(),
        }
    }

    pub fn strips_authorization(&self) -> bool {
        match self {
            Self::ApiKey(_) => false,
            Self::Jwt(cfg) => cfg.strip_authorization_header,
            Self::BasicAuth(cfg) => cfg.strip_authorization_header,
            Self::DigestAuth(cfg) => cfg.strip_authorization_header,
        }
    }

    /// All headers the ingress controller must copy from the auth response
    /// onto the upstream request.
    ///
    /// Forwarded headers come first in canonical order. `Authorization` is
    /// appended when the policy strips it so the empty value set by the auth
    /// server replaces the client's credentials.
    pub fn auth_response_headers(&self) -> Vec<String> {
        let forwarded = self.forwarded_headers();
        let strip = self.strips_authorization() && !forwarded.contains("Authorization");
        let mut headers = forwarded.into_vec();
        if strip {
            headers.push("Authorization".to_string());
        }
        headers
    }
}

/// Returns the canonical `name@namespace` form of a policy reference found on
/// an object in `namespace`.
pub fn canonical_name(reference: &str, namespace: &str) -> Result<String, PolicyError> {
    let malformed = || PolicyError::MalformedReference(reference.to_string());

    let mut parts = reference.split('@');
    let name = parts.next().filter(|n| !n.is_empty()).ok_or_else(malformed)?;
    let ns = match parts.next() {
        Some(ns) if ns.is_empty() => return Err(malformed()),
        Some(ns) => ns,
        None if namespace.is_empty() => "default",
        None => namespace,
    };
    if parts.next().is_some() {
        return Err(malformed());
    }

    Ok(format!("{name}@{ns}"))
}
