//! API key authentication.
//!
//! Keys are configured by the hex-encoded 64-byte SHAKE256 hash of their
//! secret value; clear-text secrets are never stored.

use crate::headers;
use http::{header, HeaderMap, HeaderName};
use sha3::{
    digest::{ExtendableOutput, Update, XofReader},
    Shake256,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Metadata field under which a key's id is always available.
pub const ID_METADATA_FIELD: &str = "_id";

/// Headers carrying the URI of the request being authenticated, in order of
/// preference.
const ORIGINAL_URI_HEADERS: [&str; 2] = ["x-forwarded-uri", "x-original-url"];

const HASH_LEN: usize = 64;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    pub header: Option<String>,
    pub query: Option<String>,
    pub cookie: Option<String>,
    pub keys: Vec<Key>,
    pub forward_headers: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Key {
    pub id: String,
    pub metadata: BTreeMap<String, String>,
    /// Hex-encoded SHAKE256 hash of the secret.
    pub value: String,
}

/// Authenticates requests against a fixed set of API keys.
#[derive(Debug)]
pub struct Handler {
    name: String,
    header: Option<HeaderName>,
    query: Option<String>,
    cookie: Option<String>,
    keys: HashMap<String, Principal>,
    forward_headers: BTreeMap<String, String>,
}

#[derive(Debug)]
struct Principal {
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// The request carried a known key. Holds the headers to forward upstream.
    Accepted(HeaderMap),
    Rejected,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("at least one of header, query or cookie is required")]
    NoLocation,

    #[error("invalid header name {0:?}")]
    InvalidHeader(String),

    #[error("empty ID or value")]
    EmptyKey,

    #[error("duplicated ID {0:?}")]
    DuplicatedId(String),
}

#[derive(Debug, thiserror::Error)]
enum Missing {
    #[error("missing API key")]
    Key,

    #[error("original URI is not UTF-8: {0}")]
    OriginalUriEncoding(#[from] std::str::Utf8Error),

    #[error("invalid original URI: {0}")]
    OriginalUri(#[from] url::ParseError),
}

// === impl Handler ===

impl Handler {
    pub fn new(name: impl Into<String>, config: &Config) -> Result<Self, Error> {
        let non_empty = |s: &Option<String>| s.clone().filter(|s| !s.is_empty());
        let header = non_empty(&config.header);
        let query = non_empty(&config.query);
        let cookie = non_empty(&config.cookie);
        if header.is_none() && query.is_none() && cookie.is_none() {
            return Err(Error::NoLocation);
        }

        let header = header
            .map(|h| HeaderName::from_bytes(h.as_bytes()).map_err(|_| Error::InvalidHeader(h)))
            .transpose()?;

        let mut ids = HashSet::with_capacity(config.keys.len());
        let mut keys = HashMap::with_capacity(config.keys.len());
        for Key {
            id,
            metadata,
            value,
        } in &config.keys
        {
            if id.is_empty() || value.is_empty() {
                return Err(Error::EmptyKey);
            }
            if !ids.insert(id.as_str()) {
                return Err(Error::DuplicatedId(id.clone()));
            }

            let mut metadata = metadata.clone();
            metadata.insert(ID_METADATA_FIELD.to_string(), id.clone());
            keys.insert(value.to_ascii_lowercase(), Principal { metadata });
        }

        Ok(Self {
            name: name.into(),
            header,
            query,
            cookie,
            keys,
            forward_headers: config.forward_headers.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Authenticates a request given its headers.
    ///
    /// Fails only when the forwarded headers cannot be derived for an
    /// accepted key.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Outcome, headers::Error> {
        let candidate = match self.candidate(headers) {
            Ok(candidate) => candidate,
            Err(error) => {
                debug!(handler_type = "APIKey", handler_name = %self.name, %error, "Getting API key");
                return Ok(Outcome::Rejected);
            }
        };

        let Some(principal) = self.keys.get(&hash(&candidate)) else {
            debug!(handler_type = "APIKey", handler_name = %self.name, "Unknown API key");
            return Ok(Outcome::Rejected);
        };

        let forwarded = headers::pluck(&self.forward_headers, &principal.metadata)?;
        Ok(Outcome::Accepted(forwarded))
    }

    /// Finds the API key in a request. The first configured location holding
    /// a non-empty value wins, even if that value turns out to be invalid.
    fn candidate(&self, headers: &HeaderMap) -> Result<Vec<u8>, Missing> {
        if let Some(name) = self.header.as_ref() {
            if let Some(value) = headers.get(name).filter(|v| !v.is_empty()) {
                return Ok(value.as_bytes().to_vec());
            }
        }

        if let Some(param) = self.query.as_deref() {
            if let Some(uri) = original_uri(headers) {
                // Forwarded URIs are usually origin-form, so they are resolved
                // against a placeholder base.
                let uri = url::Url::parse("http://localhost")?.join(std::str::from_utf8(uri)?)?;
                let value = uri
                    .query_pairs()
                    .find(|(k, _)| k == param)
                    .map(|(_, v)| v.into_owned());
                if let Some(value) = value.filter(|v| !v.is_empty()) {
                    return Ok(value.into_bytes());
                }
            }
        }

        if let Some(name) = self.cookie.as_deref() {
            if let Some(value) = cookie(headers, name).filter(|v| !v.is_empty()) {
                return Ok(value.as_bytes().to_vec());
            }
        }

        Err(Missing::Key)
    }
}

/// Returns the hex-encoded SHAKE256 hash of a key secret, as configured in
/// policies.
pub fn hash(secret: &[u8]) -> String {
    let mut hasher = Shake256::default();
    hasher.update(secret);
    let mut out = [0u8; HASH_LEN];
    hasher.finalize_xof().read(&mut out);
    hex::encode(out)
}

fn original_uri(headers: &HeaderMap) -> Option<&[u8]> {
    ORIGINAL_URI_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .map(|v| v.as_bytes())
        .find(|v| !v.is_empty())
}

/// Returns the value of the first cookie named `name`.
fn cookie<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| {
            v.strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(v)
        })
}
