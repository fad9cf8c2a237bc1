//! Desired versus observed state comparison.
//!
//! Patches replace whole fields. A field missing from the observed object is
//! added instead, since a JSON Patch `replace` requires the target to exist.

use crate::Error;
use json_patch::{AddOperation, Patch, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use serde::Serialize;
use std::collections::BTreeMap;

/// Returns a patch setting `metadata.annotations` to `desired`, unless the
/// observed annotations already match.
pub fn diff_annotations(
    desired: &BTreeMap<String, String>,
    observed: Option<&BTreeMap<String, String>>,
) -> Result<Option<Patch>, Error> {
    if observed.map_or(desired.is_empty(), |observed| observed == desired) {
        return Ok(None);
    }
    set(&["metadata", "annotations"], desired, observed.is_some()).map(Some)
}

/// Returns a patch setting the list at `path` to `desired`, unless the
/// observed list is already equal, element by element.
pub fn diff_list<T>(
    path: &[&str],
    desired: &[T],
    observed: Option<&[T]>,
) -> Result<Option<Patch>, Error>
where
    T: PartialEq + Serialize,
{
    if observed.map_or(desired.is_empty(), |observed| observed == desired) {
        return Ok(None);
    }
    set(path, desired, observed.is_some()).map(Some)
}

fn set<T: Serialize + ?Sized>(path: &[&str], value: &T, exists: bool) -> Result<Patch, Error> {
    let path = PointerBuf::from_tokens(path.iter().copied());
    let value = serde_json::to_value(value).map_err(Error::Encode)?;
    let op = if exists {
        PatchOperation::Replace(ReplaceOperation { path, value })
    } else {
        PatchOperation::Add(AddOperation { path, value })
    };
    Ok(Patch(vec![op]))
}

/// Swaps an agent-managed reference in a list of references.
///
/// References matching `is_previous` are replaced in place by `desired`, or
/// removed when there is nothing to replace them with. `desired` is appended
/// when no previous reference is present, and never duplicated. Other
/// references are left untouched.
///
/// Returns whether the list changed.
pub fn rewrite_refs<T>(
    refs: &mut Vec<T>,
    is_previous: impl Fn(&T) -> bool,
    is_desired: impl Fn(&T) -> bool,
    desired: Option<T>,
) -> bool {
    let before = refs.len();
    let Some(desired) = desired else {
        refs.retain(|r| !is_previous(r));
        return refs.len() != before;
    };

    if refs.iter().any(&is_desired) {
        refs.retain(|r| is_desired(r) || !is_previous(r));
        return refs.len() != before;
    }

    match refs.iter().position(&is_previous) {
        Some(idx) => {
            refs[idx] = desired;
            let mut i = 0;
            refs.retain(|r| {
                let keep = i == idx || !is_previous(r);
                i += 1;
                keep
            });
        }
        None => refs.push(desired),
    }
    true
}
