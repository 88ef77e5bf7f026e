//! Binary round-trip and live-session differ scenarios.

use std::mem::{align_of, offset_of, size_of};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use memglass::{
    Atomicity, Config, FieldDescriptor, Observed, Observer, PrimitiveType, Producer, Schema,
    TypeDescriptor,
};
use memglass_diff::codec::{DiffReader, DiffWriter};
use memglass_diff::diff::{FieldChange, SnapshotDiff, diff_snapshots};
use memglass_diff::snapshot::take_snapshot;
use memglass_diff::value::Value;

/// Binary round-trip of two synthetic diffs: one integer delta, one added
/// label. The decoder recovers timestamps (accumulated from 0), sequence
/// numbers, label sets, and the integer *delta* as the change value.
#[test]
fn binary_roundtrip_preserves_structure_and_deltas() {
    let first = SnapshotDiff {
        timestamp_ns: 1_000_000_000,
        old_sequence: 3,
        new_sequence: 4,
        added: vec![],
        removed: vec![],
        changes: vec![FieldChange {
            object: "main".to_string(),
            field: "value".to_string(),
            old: Some(Value::U64(100)),
            new: Value::U64(105),
        }],
    };
    let second = SnapshotDiff {
        timestamp_ns: 1_000_500_000,
        old_sequence: 4,
        new_sequence: 5,
        added: vec!["extra".to_string()],
        removed: vec![],
        changes: vec![],
    };

    let mut bytes = Vec::new();
    let mut writer = DiffWriter::new(&mut bytes);
    writer.write_header().unwrap();
    writer.write_diff(&first, 0).unwrap();
    writer.write_diff(&second, first.timestamp_ns).unwrap();
    writer.write_end().unwrap();

    let mut reader = DiffReader::new(bytes.as_slice());
    reader.read_header().unwrap();
    let mut last_timestamp = 0u64;

    let decoded = reader.read_diff(&mut last_timestamp).unwrap().unwrap();
    assert_eq!(decoded.timestamp_ns, 1_000_000_000);
    assert_eq!(decoded.new_sequence, 4);
    assert!(decoded.added.is_empty());
    assert_eq!(decoded.changes.len(), 1);
    assert_eq!(decoded.changes[0].object, "main");
    assert_eq!(decoded.changes[0].field, "value");
    assert_eq!(decoded.changes[0].new.type_tag(), PrimitiveType::UInt64);
    // The wire carries the delta, not the absolute.
    assert_eq!(decoded.changes[0].new.as_i64(), 5);
    assert_eq!(decoded.changes[0].old, None);

    let decoded = reader.read_diff(&mut last_timestamp).unwrap().unwrap();
    assert_eq!(decoded.timestamp_ns, 1_000_500_000);
    assert_eq!(decoded.new_sequence, 5);
    assert_eq!(decoded.added, vec!["extra".to_string()]);
    assert!(decoded.changes.is_empty());

    assert!(reader.read_diff(&mut last_timestamp).unwrap().is_none());
}

#[test]
fn binary_roundtrip_carries_float_bits_verbatim() {
    let diff = SnapshotDiff {
        timestamp_ns: 10,
        old_sequence: 0,
        new_sequence: 1,
        added: vec![],
        removed: vec![],
        changes: vec![
            FieldChange {
                object: "a".to_string(),
                field: "f32".to_string(),
                old: Some(Value::F32(1.0)),
                new: Value::F32(3.25),
            },
            FieldChange {
                object: "a".to_string(),
                field: "f64".to_string(),
                old: Some(Value::F64(0.0)),
                new: Value::F64(-2.5e300),
            },
            FieldChange {
                object: "a".to_string(),
                field: "neg".to_string(),
                old: Some(Value::I32(5)),
                new: Value::I32(-5),
            },
        ],
    };

    let mut bytes = Vec::new();
    let mut writer = DiffWriter::new(&mut bytes);
    writer.write_header().unwrap();
    writer.write_diff(&diff, 0).unwrap();
    writer.write_end().unwrap();

    let mut reader = DiffReader::new(bytes.as_slice());
    reader.read_header().unwrap();
    let mut ts = 0u64;
    let decoded = reader.read_diff(&mut ts).unwrap().unwrap();

    assert_eq!(decoded.changes[0].new, Value::F32(3.25));
    assert_eq!(decoded.changes[1].new, Value::F64(-2.5e300));
    // Integer delta: -5 - 5 = -10.
    assert_eq!(decoded.changes[2].new, Value::I32(-10));
}

// ── live session ───────────────────────────────────────────────────────────

#[repr(C)]
struct Counter {
    value: AtomicU64,
    temperature: f64,
}

unsafe impl Observed for Counter {
    const TYPE_NAME: &'static str = "Counter";
}

fn counter_schema() -> Schema {
    let mut schema = Schema::new();
    schema.register(
        TypeDescriptor::new("Counter", size_of::<Counter>(), align_of::<Counter>())
            .field(FieldDescriptor::primitive(
                "value",
                offset_of!(Counter, value),
                8,
                PrimitiveType::UInt64,
                Atomicity::Atomic,
            ))
            .field(FieldDescriptor::primitive(
                "temperature",
                offset_of!(Counter, temperature),
                8,
                PrimitiveType::Float64,
                Atomicity::None,
            )),
    );
    schema
}

fn config(dir: &Path) -> Config {
    Config {
        shm_dir: dir.to_path_buf(),
        ..Config::default()
    }
}

#[test]
fn live_snapshots_diff_field_changes_and_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let producer = Producer::init("differ", config(dir.path()), counter_schema()).unwrap();
    let counter = producer
        .create_with::<Counter>(
            "main",
            Counter {
                value: AtomicU64::new(100),
                temperature: 20.0,
            },
        )
        .unwrap();

    let mut observer = Observer::connect_in(dir.path(), "differ").unwrap();

    let base = take_snapshot(&mut observer);
    assert_eq!(base.pid, std::process::id() as u64);
    assert_eq!(
        base.objects["main"].fields["value"],
        Value::U64(100)
    );

    // Quiet interval: empty diff.
    let quiet = take_snapshot(&mut observer);
    assert!(diff_snapshots(&base, &quiet).is_empty());

    // A field change and a new object.
    counter.value.store(105, Ordering::Release);
    producer.create::<Counter>("extra").unwrap();

    let changed = take_snapshot(&mut observer);
    let diff = diff_snapshots(&base, &changed);
    assert_eq!(diff.added, vec!["extra".to_string()]);
    assert!(diff.removed.is_empty());
    assert!(diff.changes.contains(&FieldChange {
        object: "main".to_string(),
        field: "value".to_string(),
        old: Some(Value::U64(100)),
        new: Value::U64(105),
    }));
    assert!(diff.new_sequence > diff.old_sequence);

    // Destruction shows up as a removed label.
    producer.destroy(counter);
    let destroyed = take_snapshot(&mut observer);
    let diff = diff_snapshots(&changed, &destroyed);
    assert_eq!(diff.removed, vec!["main".to_string()]);
}

#[test]
fn live_diff_survives_a_binary_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let producer = Producer::init("differ2", config(dir.path()), counter_schema()).unwrap();
    let mut counter = producer
        .create_with::<Counter>(
            "main",
            Counter {
                value: AtomicU64::new(0),
                temperature: 1.5,
            },
        )
        .unwrap();

    let mut observer = Observer::connect_in(dir.path(), "differ2").unwrap();
    let before = take_snapshot(&mut observer);

    counter.value.store(7, Ordering::Release);
    counter.temperature = 2.5;

    let after = take_snapshot(&mut observer);
    let diff = diff_snapshots(&before, &after);

    let mut bytes = Vec::new();
    let mut writer = DiffWriter::new(&mut bytes);
    writer.write_header().unwrap();
    writer.write_diff(&diff, 0).unwrap();
    writer.write_end().unwrap();

    let mut reader = DiffReader::new(bytes.as_slice());
    reader.read_header().unwrap();
    let mut ts = 0u64;
    let decoded = reader.read_diff(&mut ts).unwrap().unwrap();

    assert_eq!(decoded.timestamp_ns, diff.timestamp_ns);
    assert_eq!(decoded.new_sequence, diff.new_sequence);
    assert_eq!(decoded.changes.len(), diff.changes.len());

    for (wire, original) in decoded.changes.iter().zip(&diff.changes) {
        assert_eq!(wire.object, original.object);
        assert_eq!(wire.field, original.field);
        assert_eq!(wire.new.type_tag(), original.new.type_tag());
        match original.new {
            // Floats come back absolute.
            Value::F64(v) => assert_eq!(wire.new, Value::F64(v)),
            // Integers come back as deltas.
            _ => assert_eq!(
                wire.new.as_i64(),
                original.new.as_i64() - original.old.unwrap().as_i64()
            ),
        }
    }
}
