use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;

/// A set of HTTP header names, compared case-insensitively.
///
/// Names are kept in their canonical spelling (`x-user-id` becomes
/// `X-User-Id`) and ordered by their lowercase form, so the set never depends
/// on which casings were inserted or in what order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderNames(BTreeMap<String, String>);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid forwarded header name {0:?}")]
    InvalidName(String),

    #[error("invalid value for forwarded header {name:?}")]
    InvalidValue { name: String },
}

// === impl HeaderNames ===

impl HeaderNames {
    pub fn insert(&mut self, name: impl AsRef<str>) {
        let name = name.as_ref();
        self.0
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| canonical_spelling(name));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0.into_values().collect()
    }
}

impl<T: AsRef<str>> FromIterator<T> for HeaderNames {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut names = Self::default();
        for name in iter {
            names.insert(name);
        }
        names
    }
}

/// Returns the canonical spelling of a header name: the first letter and each
/// letter following a hyphen are uppercased, all others lowercased.
pub fn canonical_spelling(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let c = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            c
        })
        .collect()
}

/// Derives the headers to forward upstream from an authenticated principal's
/// metadata.
///
/// `rules` maps header names to metadata fields. Rules whose field is absent
/// from the metadata are skipped.
pub fn pluck(
    rules: &BTreeMap<String, String>,
    metadata: &BTreeMap<String, String>,
) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::with_capacity(rules.len());
    for (name, field) in rules {
        let Some(value) = metadata.get(field) else {
            continue;
        };
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidName(name.clone()))?;
        let value = HeaderValue::from_str(value).map_err(|_| Error::InvalidValue {
            name: name.to_string(),
        })?;
        headers.append(name, value);
    }
    Ok(headers)
}
