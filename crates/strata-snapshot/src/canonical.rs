//! Canonical state trees and reproducibility signatures.
//!
//! Every state reachable from the world root is rendered through
//! [`serialize_state`] before it is diffed, hashed, or stored. The rendered
//! tree is independent of map insertion order and hash-set iteration order:
//!
//! - structs and maps become mappings with keys sorted at every depth
//! - sequences keep their order
//! - unordered sets become sorted lists when held as a [`CanonicalSet`] or
//!   serialized through [`sorted_set`]
//!
//! Set elements sort by value: numbers numerically, strings lexically, and
//! compound or mixed elements by their canonical JSON.
//!
//! `BTreeMap` and `BTreeSet` are already ordered and need no helper. Any
//! other `HashSet` in world state must be a `BTreeSet`, a [`CanonicalSet`],
//! or a field tagged with [`sorted_set`]. A bare `HashSet` still serializes,
//! but its order follows the hasher.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};

use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

use crate::error::SnapshotError;

/// Render `value` into its canonical tree.
pub fn serialize_state<T: Serialize + ?Sized>(value: &T) -> Result<Value, SnapshotError> {
    Ok(canonicalize(serde_json::to_value(value)?))
}

/// Render `value` as compact canonical JSON.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, SnapshotError> {
    let tree = serialize_state(value)?;
    Ok(serde_json::to_string(&tree)?)
}

/// Lowercase hex SHA-256 of the canonical JSON of `value`.
///
/// Two states with equal signatures rendered to identical canonical trees.
pub fn state_signature<T: Serialize + ?Sized>(value: &T) -> Result<String, SnapshotError> {
    let json = canonical_json(value)?;
    Ok(sha256_hex(json.as_bytes()))
}

/// Serialize an unordered collection as a sorted list.
///
/// Use with `#[serde(serialize_with = "strata_snapshot::sorted_set")]` on
/// `HashSet` fields so their rendering does not depend on iteration order.
/// Sets nested inside maps, options, or sequences should be held as a
/// [`CanonicalSet`] instead.
pub fn sorted_set<'a, I, T, S>(set: &'a I, serializer: S) -> Result<S::Ok, S::Error>
where
    I: ?Sized,
    &'a I: IntoIterator<Item = &'a T>,
    T: Serialize + 'a,
    S: Serializer,
{
    let mut items = set
        .into_iter()
        .map(|item| {
            let tree = serialize_state(item).map_err(S::Error::custom)?;
            let key = serde_json::to_string(&tree).map_err(S::Error::custom)?;
            Ok((key, tree))
        })
        .collect::<Result<Vec<(String, Value)>, S::Error>>()?;
    items.sort_by(|a, b| compare_elements(&a.1, &b.1).then_with(|| a.0.cmp(&b.0)));
    serializer.collect_seq(items.into_iter().map(|(_, tree)| tree))
}

/// A `HashSet` that always serializes as a sorted list.
///
/// Works at any depth, e.g. `HashMap<String, CanonicalSet<String>>` or
/// `Vec<CanonicalSet<u32>>`, where a field attribute cannot reach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSet<T: Eq + Hash>(pub HashSet<T>);

impl<T: Eq + Hash> CanonicalSet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self(HashSet::new())
    }

    /// Unwrap the inner set.
    pub fn into_inner(self) -> HashSet<T> {
        self.0
    }
}

impl<T: Eq + Hash> Default for CanonicalSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash> Deref for CanonicalSet<T> {
    type Target = HashSet<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Eq + Hash> DerefMut for CanonicalSet<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[allow(clippy::implicit_hasher)]
impl<T: Eq + Hash> From<HashSet<T>> for CanonicalSet<T> {
    fn from(set: HashSet<T>) -> Self {
        Self(set)
    }
}

impl<T: Eq + Hash> FromIterator<T> for CanonicalSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: Eq + Hash + Serialize> Serialize for CanonicalSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        sorted_set(&self.0, serializer)
    }
}

/// Total order over canonical set elements.
///
/// Elements of different JSON kinds order by kind (null, bool, number,
/// string, array, object). Arrays and objects tie here and are broken by
/// their canonical JSON in [`sorted_set`].
fn compare_elements(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    x.total_cmp(&y)
}

const fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Rebuild every mapping in `value` with sorted keys.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, child) in entries {
                sorted.insert(key, canonicalize(child));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
