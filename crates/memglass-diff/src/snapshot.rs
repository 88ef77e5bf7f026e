//! Snapshot capture: all live objects' primitive field values at an instant.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use memglass::Observer;
use tracing::debug;

use crate::value::Value;

/// One object's captured fields, keyed by (possibly dotted) field name.
#[derive(Debug, Clone, Default)]
pub struct ObjectSnapshot {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

/// All live objects at an instant, keyed by label.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub timestamp_ns: u64,
    pub sequence: u64,
    pub pid: u64,
    pub objects: BTreeMap<String, ObjectSnapshot>,
}

/// Refresh the observer and capture every primitive field of every live
/// object. Nested struct fields contribute through their flattened dotted
/// leaves; unmapped regions contribute nothing ("take what we have").
pub fn take_snapshot(observer: &mut Observer) -> Snapshot {
    observer.refresh();

    let mut snapshot = Snapshot {
        timestamp_ns: now_ns(),
        sequence: observer.sequence(),
        pid: observer.producer_pid(),
        objects: BTreeMap::new(),
    };

    for obj in observer.objects() {
        let Some(view) = observer.view(&obj) else {
            debug!(label = %obj.label, "object region not mapped, skipping");
            continue;
        };
        let Some(ty) = view.type_info() else {
            continue;
        };

        let mut fields = BTreeMap::new();
        for field in &ty.fields {
            if field.primitive().is_none() {
                continue;
            }
            let proxy = view.field(field.name());
            if let Some(value) = Value::read(&proxy) {
                fields.insert(field.name().to_string(), value);
            }
        }

        snapshot.objects.insert(
            obj.label.clone(),
            ObjectSnapshot {
                type_name: obj.type_name.clone(),
                fields,
            },
        );
    }

    snapshot
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
