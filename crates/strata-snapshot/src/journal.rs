//! Structural diffs between canonical state trees.
//!
//! [`diff_states`] walks two trees in lockstep. Mappings are compared by the
//! sorted union of their keys and recursed into; any other unequal pair,
//! including lists, is recorded as a whole-value replacement at its path.
//! [`apply_journal`] replays the recorded entries onto an earlier tree.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SnapshotError;

/// One changed leaf or replaced sub-tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickJournalEntry {
    /// Mapping keys from the root to the changed value. Empty for the root.
    pub path: Vec<String>,
    /// Value before the change, `None` if the key was added.
    pub before: Option<Value>,
    /// Value after the change, `None` if the key was removed.
    pub after: Option<Value>,
}

impl TickJournalEntry {
    /// Dotted rendering of the path, `$` for the root.
    pub fn dotted_path(&self) -> String {
        if self.path.is_empty() {
            String::from("$")
        } else {
            self.path.join(".")
        }
    }
}

/// Ordered changes recorded for one captured tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickJournal {
    /// Tick the journal was captured on.
    pub tick: u64,
    /// Changes since the previous capture, in path order.
    pub entries: Vec<TickJournalEntry>,
}

impl TickJournal {
    /// Create a journal from computed entries.
    pub const fn new(tick: u64, entries: Vec<TickJournalEntry>) -> Self {
        Self { tick, entries }
    }

    /// Create a journal with no changes.
    pub const fn empty(tick: u64) -> Self {
        Self::new(tick, Vec::new())
    }

    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of recorded changes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Compute the changes that turn `before` into `after`.
pub fn diff_states(before: &Value, after: &Value) -> Vec<TickJournalEntry> {
    let mut entries = Vec::new();
    diff_into(before, after, &mut Vec::new(), &mut entries);
    entries
}

fn diff_into(
    before: &Value,
    after: &Value,
    path: &mut Vec<String>,
    entries: &mut Vec<TickJournalEntry>,
) {
    if before == after {
        return;
    }

    if let (Value::Object(before_map), Value::Object(after_map)) = (before, after) {
        let keys: BTreeSet<&String> = before_map.keys().chain(after_map.keys()).collect();
        for key in keys {
            path.push(key.clone());
            match (before_map.get(key), after_map.get(key)) {
                (Some(old), Some(new)) => diff_into(old, new, path, entries),
                (old, new) => entries.push(TickJournalEntry {
                    path: path.clone(),
                    before: old.cloned(),
                    after: new.cloned(),
                }),
            }
            path.pop();
        }
        return;
    }

    entries.push(TickJournalEntry {
        path: path.clone(),
        before: Some(before.clone()),
        after: Some(after.clone()),
    });
}

/// Replay `journal` onto `state` in entry order.
pub fn apply_journal(state: &mut Value, journal: &TickJournal) -> Result<(), SnapshotError> {
    for entry in &journal.entries {
        match &entry.after {
            Some(value) => set_path(state, &entry.path, value.clone())?,
            None => remove_path(state, &entry.path)?,
        }
    }
    Ok(())
}

fn set_path(root: &mut Value, path: &[String], value: Value) -> Result<(), SnapshotError> {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        let map = as_map(current, path, depth)?;
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let map = as_map(current, path, parents.len())?;
    map.insert(last.clone(), value);
    Ok(())
}

fn remove_path(root: &mut Value, path: &[String]) -> Result<(), SnapshotError> {
    let Some((last, parents)) = path.split_last() else {
        return Err(SnapshotError::MissingPath {
            path: String::from("$"),
        });
    };

    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        let map = as_map(current, path, depth)?;
        current = map.get_mut(segment).ok_or_else(|| SnapshotError::MissingPath {
            path: path.iter().take(depth.saturating_add(1)).cloned().collect::<Vec<_>>().join("."),
        })?;
    }
    let map = as_map(current, path, parents.len())?;
    if map.remove(last).is_none() {
        return Err(SnapshotError::MissingPath {
            path: path.join("."),
        });
    }
    Ok(())
}

fn as_map<'v>(
    value: &'v mut Value,
    path: &[String],
    depth: usize,
) -> Result<&'v mut Map<String, Value>, SnapshotError> {
    value.as_object_mut().ok_or_else(|| SnapshotError::PathNotObject {
        path: path.iter().take(depth).cloned().collect::<Vec<_>>().join("."),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn identical_trees_have_no_entries() {
        let state = json!({ "a": 1, "b": { "c": [1, 2] } });
        assert!(diff_states(&state, &state).is_empty());
    }

    #[test]
    fn nested_leaf_change_is_recorded_at_its_path() {
        let before = json!({ "town": { "grain": 5, "wood": 2 } });
        let after = json!({ "town": { "grain": 4, "wood": 2 } });
        let entries = diff_states(&before, &after);
        assert_eq!(
            entries,
            vec![TickJournalEntry {
                path: path(&["town", "grain"]),
                before: Some(json!(5)),
                after: Some(json!(4)),
            }]
        );
    }

    #[test]
    fn added_and_removed_keys_have_absent_sides() {
        let before = json!({ "a": 1, "b": 2 });
        let after = json!({ "b": 2, "c": 3 });
        let entries = diff_states(&before, &after);
        assert_eq!(entries.len(), 2);

        let removed = entries.first().unwrap();
        assert_eq!(removed.path, path(&["a"]));
        assert_eq!(removed.after, None);

        let added = entries.get(1).unwrap();
        assert_eq!(added.path, path(&["c"]));
        assert_eq!(added.before, None);
    }

    #[test]
    fn lists_are_replaced_whole() {
        let before = json!({ "queue": [1, 2, 3] });
        let after = json!({ "queue": [1, 2, 4] });
        let entries = diff_states(&before, &after);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.first().unwrap().after, Some(json!([1, 2, 4])));
    }

    #[test]
    fn root_type_change_uses_empty_path() {
        let entries = diff_states(&json!({ "a": 1 }), &json!([1]));
        let entry = entries.first().unwrap();
        assert!(entry.path.is_empty());
        assert_eq!(entry.dotted_path(), "$");
    }

    #[test]
    fn replay_reproduces_the_target() {
        let before = json!({ "a": { "x": 1, "y": 2 }, "b": [1], "gone": true });
        let after = json!({ "a": { "x": 3, "z": { "deep": 1 } }, "b": [1, 2], "new": null });
        let journal = TickJournal::new(1, diff_states(&before, &after));

        let mut state = before;
        apply_journal(&mut state, &journal).unwrap();
        assert_eq!(state, after);
    }

    #[test]
    fn removing_a_missing_key_is_an_error() {
        let journal = TickJournal::new(
            1,
            vec![TickJournalEntry {
                path: path(&["missing", "leaf"]),
                before: Some(json!(1)),
                after: None,
            }],
        );
        let mut state = json!({});
        let err = apply_journal(&mut state, &journal).unwrap_err();
        assert!(matches!(err, SnapshotError::MissingPath { .. }));
    }

    #[test]
    fn walking_through_a_scalar_is_an_error() {
        let journal = TickJournal::new(
            1,
            vec![TickJournalEntry {
                path: path(&["a", "b"]),
                before: None,
                after: Some(json!(1)),
            }],
        );
        let mut state = json!({ "a": 5 });
        let err = apply_journal(&mut state, &journal).unwrap_err();
        assert!(matches!(err, SnapshotError::PathNotObject { .. }));
    }
}
