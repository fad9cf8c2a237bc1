use std::collections::BTreeMap;

/// Describes how requests to an ingress resource are authenticated.
///
/// Exactly one of the authentication schemes must be set.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    kube::CustomResource,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "hub.traefik.io",
    version = "v1alpha1",
    kind = "AccessControlPolicy",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlPolicySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<Jwt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_auth: Option<DigestAuth>,
    #[serde(rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ApiKey>,
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct Jwt {
    pub signing_secret: Option<String>,
    #[serde(default)]
    pub signing_secret_base64_encoded: bool,
    pub public_key: Option<String>,
    pub jwks_file: Option<String>,
    #[serde(rename = "jwksUrl")]
    pub jwks_url: Option<String>,
    #[serde(default)]
    pub strip_authorization_header: bool,
    #[serde(default)]
    pub forward_headers: BTreeMap<String, String>,
    pub token_query_key: Option<String>,
    pub claims: Option<String>,
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuth {
    #[serde(default)]
    pub users: Vec<String>,
    pub realm: Option<String>,
    #[serde(default)]
    pub strip_authorization_header: bool,
    pub forward_username_header: Option<String>,
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct DigestAuth {
    #[serde(default)]
    pub users: Vec<String>,
    pub realm: Option<String>,
    #[serde(default)]
    pub strip_authorization_header: bool,
    pub forward_username_header: Option<String>,
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub header: Option<String>,
    pub query: Option<String>,
    pub cookie: Option<String>,
    #[serde(default)]
    pub keys: Vec<ApiKeyKey>,
    #[serde(default)]
    pub forward_headers: BTreeMap<String, String>,
}

#[derive(
    Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyKey {
    pub id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Hex-encoded SHAKE256 hash of the key.
    pub value: String,
}
