//! Structural and per-field differencing between consecutive snapshots.

use serde::Serialize;

use crate::snapshot::Snapshot;
use crate::value::Value;

/// One field whose value changed between two snapshots.
///
/// `old` is absent for changes recovered from the binary stream (the wire
/// carries only the delta) and for fields that appeared without a prior
/// value.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldChange {
    #[serde(rename = "obj")]
    pub object: String,
    pub field: String,
    pub old: Option<Value>,
    pub new: Value,
}

/// The difference between two consecutive snapshots.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SnapshotDiff {
    pub timestamp_ns: u64,
    pub old_sequence: u64,
    pub new_sequence: u64,
    /// Labels present now but not before.
    pub added: Vec<String>,
    /// Labels present before but not now.
    pub removed: Vec<String>,
    pub changes: Vec<FieldChange>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changes.is_empty()
    }
}

/// Compute the diff from `old` to `new`.
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> SnapshotDiff {
    let mut diff = SnapshotDiff {
        timestamp_ns: new.timestamp_ns,
        old_sequence: old.sequence,
        new_sequence: new.sequence,
        ..SnapshotDiff::default()
    };

    for label in new.objects.keys() {
        if !old.objects.contains_key(label) {
            diff.added.push(label.clone());
        }
    }
    for label in old.objects.keys() {
        if !new.objects.contains_key(label) {
            diff.removed.push(label.clone());
        }
    }

    for (label, new_obj) in &new.objects {
        let Some(old_obj) = old.objects.get(label) else {
            continue; // freshly added; reported above, not field by field
        };

        for (field, new_value) in &new_obj.fields {
            match old_obj.fields.get(field) {
                Some(old_value) if old_value == new_value => {}
                old_value => diff.changes.push(FieldChange {
                    object: label.clone(),
                    field: field.clone(),
                    old: old_value.copied(),
                    new: *new_value,
                }),
            }
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ObjectSnapshot;
    use std::collections::BTreeMap;

    fn snap(sequence: u64, objects: &[(&str, &[(&str, Value)])]) -> Snapshot {
        Snapshot {
            timestamp_ns: sequence * 1_000,
            sequence,
            pid: 1,
            objects: objects
                .iter()
                .map(|(label, fields)| {
                    (
                        label.to_string(),
                        ObjectSnapshot {
                            type_name: "T".to_string(),
                            fields: fields
                                .iter()
                                .map(|(name, value)| (name.to_string(), *value))
                                .collect::<BTreeMap<_, _>>(),
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn identical_snapshots_diff_empty() {
        let a = snap(3, &[("main", &[("value", Value::U64(5))])]);
        let diff = diff_snapshots(&a, &a.clone());
        assert!(diff.is_empty());
        assert_eq!(diff.old_sequence, 3);
        assert_eq!(diff.new_sequence, 3);
    }

    #[test]
    fn added_and_removed_labels_are_reported() {
        let old = snap(1, &[("gone", &[("x", Value::I32(1))])]);
        let new = snap(2, &[("fresh", &[("x", Value::I32(1))])]);

        let diff = diff_snapshots(&old, &new);
        assert_eq!(diff.added, vec!["fresh"]);
        assert_eq!(diff.removed, vec!["gone"]);
        assert!(diff.changes.is_empty(), "added objects are not field diffs");
    }

    #[test]
    fn changed_fields_carry_old_and_new() {
        let old = snap(1, &[("main", &[("value", Value::U64(100)), ("flag", Value::Bool(false))])]);
        let new = snap(2, &[("main", &[("value", Value::U64(105)), ("flag", Value::Bool(false))])]);

        let diff = diff_snapshots(&old, &new);
        assert_eq!(
            diff.changes,
            vec![FieldChange {
                object: "main".to_string(),
                field: "value".to_string(),
                old: Some(Value::U64(100)),
                new: Value::U64(105),
            }]
        );
    }

    #[test]
    fn tag_change_counts_as_change() {
        let old = snap(1, &[("main", &[("v", Value::I32(1))])]);
        let new = snap(2, &[("main", &[("v", Value::I64(1))])]);
        assert_eq!(diff_snapshots(&old, &new).changes.len(), 1);
    }
}
