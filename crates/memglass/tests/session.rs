//! End-to-end producer/observer scenarios over real shared-memory segments.
//!
//! Each test runs in its own tempdir-backed session, so tests are isolated
//! from each other and from any real `/dev/shm` state.

use std::mem::{align_of, offset_of, size_of};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use memglass::{
    Atomicity, Config, Error, FieldDescriptor, Observed, Observer, PrimitiveType, Producer,
    Schema, Seqlock, TypeDescriptor,
};

fn config(dir: &Path) -> Config {
    Config {
        shm_dir: dir.to_path_buf(),
        ..Config::default()
    }
}

// ── schema fixtures ────────────────────────────────────────────────────────

#[repr(C)]
struct Counter {
    value: AtomicU64,
    timestamp: u64,
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
                "timestamp",
                offset_of!(Counter, timestamp),
                8,
                PrimitiveType::UInt64,
                Atomicity::None,
            )),
    );
    schema
}

#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq)]
struct Quote {
    bid_price: i64,
    ask_price: i64,
}

#[repr(C)]
struct Security {
    quote: Quote,
    qty: i64,
}

unsafe impl Observed for Security {
    const TYPE_NAME: &'static str = "Security";
}

fn security_schema() -> Schema {
    let mut schema = Schema::new();
    let quote_id = schema.register(
        TypeDescriptor::new("Quote", size_of::<Quote>(), align_of::<Quote>())
            .field(FieldDescriptor::primitive(
                "bid_price",
                offset_of!(Quote, bid_price),
                8,
                PrimitiveType::Int64,
                Atomicity::None,
            ))
            .field(FieldDescriptor::primitive(
                "ask_price",
                offset_of!(Quote, ask_price),
                8,
                PrimitiveType::Int64,
                Atomicity::None,
            )),
    );
    schema.register(
        TypeDescriptor::new("Security", size_of::<Security>(), align_of::<Security>())
            .field(FieldDescriptor::nested(
                "quote",
                offset_of!(Security, quote),
                size_of::<Quote>(),
                quote_id,
            ))
            .field(FieldDescriptor::primitive(
                "qty",
                offset_of!(Security, qty),
                8,
                PrimitiveType::Int64,
                Atomicity::None,
            )),
    );
    schema
}

// ── scenarios ──────────────────────────────────────────────────────────────

#[test]
fn scalar_atomic_read() {
    let dir = tempfile::tempdir().unwrap();
    let producer = Producer::init("s1", config(dir.path()), counter_schema()).unwrap();

    let counter = producer
        .create_with::<Counter>(
            "main",
            Counter {
                value: AtomicU64::new(0),
                timestamp: 0,
            },
        )
        .unwrap();

    let observer = Observer::connect_in(dir.path(), "s1").unwrap();
    let view = observer.find("main").expect("object is advertised");
    assert_eq!(view.field("value").get::<u64>(), 0);

    counter.value.store(42, Ordering::Release);
    assert_eq!(view.field("value").get::<u64>(), 42);
}

#[test]
fn nested_field_access() {
    let dir = tempfile::tempdir().unwrap();
    let producer = Producer::init("s2", config(dir.path()), security_schema()).unwrap();

    producer
        .create_with::<Security>(
            "AAPL",
            Security {
                quote: Quote {
                    bid_price: 15023,
                    ask_price: 15028,
                },
                qty: 500,
            },
        )
        .unwrap();

    let observer = Observer::connect_in(dir.path(), "s2").unwrap();
    let view = observer.find("AAPL").unwrap();

    // Flattened dotted entry.
    assert_eq!(view.field("quote.bid_price").get::<i64>(), 15023);
    // Hierarchical descent through the nested type.
    assert_eq!(view.field("quote").field("ask_price").get::<i64>(), 15028);
    assert_eq!(view.field("qty").get::<i64>(), 500);

    // The whole nested struct reads through the parent field.
    assert_eq!(
        view.field("quote").get::<Quote>(),
        Quote {
            bid_price: 15023,
            ask_price: 15028
        }
    );

    assert!(!view.field("no_such_field").is_valid());
    assert_eq!(view.field("no_such_field").get::<i64>(), 0);
}

#[repr(C)]
struct Tick {
    a: u64,
    b: u64,
}

unsafe impl Observed for Tick {
    const TYPE_NAME: &'static str = "Tick";
}

fn tick_schema() -> Schema {
    let mut schema = Schema::new();
    schema.register(
        TypeDescriptor::new("Tick", size_of::<Tick>(), align_of::<Tick>())
            .field(FieldDescriptor::primitive(
                "a",
                offset_of!(Tick, a),
                8,
                PrimitiveType::UInt64,
                Atomicity::None,
            ))
            .field(FieldDescriptor::primitive(
                "b",
                offset_of!(Tick, b),
                8,
                PrimitiveType::UInt64,
                Atomicity::None,
            )),
    );
    schema
}

#[test]
fn region_growth_is_discovered() {
    let dir = tempfile::tempdir().unwrap();
    let producer = Producer::init(
        "s3",
        Config {
            initial_region_size: 4096,
            max_region_size: 65536,
            ..config(dir.path())
        },
        tick_schema(),
    )
    .unwrap();

    for i in 0..1000 {
        producer
            .create::<Tick>(&format!("tick_{i}"))
            .expect("allocation within configured caps");
    }

    let mut observer = Observer::connect_in(dir.path(), "s3").unwrap();
    observer.refresh();

    let objects = observer.objects();
    assert_eq!(objects.len(), 1000);

    let region_ids: std::collections::BTreeSet<u64> =
        objects.iter().map(|o| o.region_id).collect();
    assert!(region_ids.len() >= 2, "1000 ticks must span regions");

    // Every advertised object resolves to mapped bytes, at an aligned offset.
    for obj in &objects {
        let view = observer.view(obj).expect("region is mapped");
        assert!(!view.data().is_null());
        assert!(obj.offset.is_multiple_of(8));
    }
}

#[test]
fn destruction_is_advertised() {
    let dir = tempfile::tempdir().unwrap();
    let producer = Producer::init("s4", config(dir.path()), counter_schema()).unwrap();
    let temp = producer.create::<Counter>("temp").unwrap();

    let mut observer = Observer::connect_in(dir.path(), "s4").unwrap();
    assert!(observer.find("temp").is_some());

    let seq_before = observer.sequence();
    producer.destroy(temp);
    observer.refresh();

    assert!(observer.find("temp").is_none());
    assert!(observer.sequence() > seq_before);
}

#[repr(C)]
struct MarketData {
    last: Seqlock<Quote>,
}

unsafe impl Observed for MarketData {
    const TYPE_NAME: &'static str = "MarketData";
}

fn market_data_schema() -> Schema {
    let mut schema = Schema::new();
    let quote_id = schema.register(
        TypeDescriptor::new("Quote", size_of::<Quote>(), align_of::<Quote>())
            .field(FieldDescriptor::primitive(
                "bid_price",
                offset_of!(Quote, bid_price),
                8,
                PrimitiveType::Int64,
                Atomicity::None,
            ))
            .field(FieldDescriptor::primitive(
                "ask_price",
                offset_of!(Quote, ask_price),
                8,
                PrimitiveType::Int64,
                Atomicity::None,
            )),
    );
    schema.register(
        TypeDescriptor::new("MarketData", size_of::<MarketData>(), align_of::<MarketData>())
            .field(
                FieldDescriptor::nested(
                    "last",
                    offset_of!(MarketData, last),
                    size_of::<Seqlock<Quote>>(),
                    quote_id,
                )
                .with_atomicity(Atomicity::Seqlock),
            ),
    );
    schema
}

#[test]
fn seqlock_field_reads_are_never_torn() {
    let dir = tempfile::tempdir().unwrap();
    let producer = Producer::init("s5", config(dir.path()), market_data_schema()).unwrap();
    let md = producer.create::<MarketData>("spot").unwrap();

    let writer = thread::spawn(move || {
        for k in 0..50_000i64 {
            md.last.write(Quote {
                bid_price: k,
                ask_price: k,
            });
        }
        md
    });

    let observer = Observer::connect_in(dir.path(), "s5").unwrap();
    let view = observer.find("spot").unwrap();
    let proxy = view.field("last");
    assert!(proxy.is_valid());

    while !writer.is_finished() {
        let q: Quote = proxy.get();
        assert_eq!(q.bid_price, q.ask_price, "torn read: {q:?}");

        if let Some(q) = proxy.try_get::<Quote>() {
            assert_eq!(q.bid_price, q.ask_price, "torn try_get: {q:?}");
        }
    }
    writer.join().unwrap();

    assert_eq!(
        proxy.get::<Quote>(),
        Quote {
            bid_price: 49_999,
            ask_price: 49_999
        }
    );
}

// ── structural invariants ──────────────────────────────────────────────────

#[test]
fn sequence_is_monotonic_across_structural_changes() {
    let dir = tempfile::tempdir().unwrap();
    let producer = Producer::init("seq", config(dir.path()), counter_schema()).unwrap();
    let observer = Observer::connect_in(dir.path(), "seq").unwrap();

    let mut last = observer.sequence();
    for i in 0..8 {
        let obj = producer.create::<Counter>(&format!("c{i}")).unwrap();
        let seq = observer.sequence();
        assert!(seq > last, "create must advance the sequence");
        last = seq;

        producer.destroy(obj);
        let seq = observer.sequence();
        assert!(seq > last, "destroy must advance the sequence");
        last = seq;
    }
}

#[test]
fn addresses_are_stable_for_alive_objects() {
    let dir = tempfile::tempdir().unwrap();
    let producer = Producer::init("stable", config(dir.path()), counter_schema()).unwrap();
    producer.create::<Counter>("fixed").unwrap();

    let mut observer = Observer::connect_in(dir.path(), "stable").unwrap();
    let first = observer.find("fixed").unwrap();
    let (region, offset, ptr) = (first.info().region_id, first.info().offset, first.data());

    // More structural churn, then re-resolve.
    for i in 0..64 {
        producer.create::<Counter>(&format!("churn{i}")).unwrap();
    }
    observer.refresh();

    let again = observer.find("fixed").unwrap();
    assert_eq!(again.info().region_id, region);
    assert_eq!(again.info().offset, offset);
    assert_eq!(again.data(), ptr, "mapped regions must never move");
}

#[test]
fn observer_writes_reach_the_producer() {
    let dir = tempfile::tempdir().unwrap();
    let producer = Producer::init("wr", config(dir.path()), counter_schema()).unwrap();
    let counter = producer.create::<Counter>("main").unwrap();

    let observer = Observer::connect_in(dir.path(), "wr").unwrap();
    observer.find("main").unwrap().field("timestamp").set(777u64);

    assert_eq!(counter.timestamp, 777);
}

#[test]
fn unregistered_type_is_refused() {
    #[repr(C)]
    struct Stranger {
        x: u64,
    }
    unsafe impl Observed for Stranger {
        const TYPE_NAME: &'static str = "Stranger";
    }

    let dir = tempfile::tempdir().unwrap();
    let producer = Producer::init("misc", config(dir.path()), counter_schema()).unwrap();
    assert!(producer.create::<Stranger>("nope").is_none());
}

// ── connection failures ────────────────────────────────────────────────────

#[test]
fn connect_to_missing_session_fails() {
    let dir = tempfile::tempdir().unwrap();
    match Observer::connect_in(dir.path(), "ghost") {
        Err(Error::HeaderNotFound) => {}
        other => panic!("expected HeaderNotFound, got {other:?}"),
    }
}

#[test]
fn connect_rejects_foreign_segments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memglass_junk_header");
    std::fs::write(&path, vec![0xA5u8; 4096]).unwrap();

    match Observer::connect_in(dir.path(), "junk") {
        Err(Error::BadMagic) => {}
        other => panic!("expected BadMagic, got {other:?}"),
    }
}

#[test]
fn connect_rejects_future_protocol_versions() {
    let dir = tempfile::tempdir().unwrap();
    let _producer = Producer::init("ver", config(dir.path()), counter_schema()).unwrap();

    // Corrupt the version field (offset 8) through a raw attach.
    let seg = memglass_shm::MmapSegment::open(&memglass_shm::names::header_path(
        dir.path(),
        "ver",
    ))
    .unwrap();
    unsafe { *seg.region().get_mut::<u32>(8) = 99 };

    match Observer::connect_in(dir.path(), "ver") {
        Err(Error::VersionMismatch { expected: 1, actual: 99 }) => {}
        other => panic!("expected VersionMismatch, got {other:?}"),
    }
}

// ── arrays ─────────────────────────────────────────────────────────────────

#[repr(C)]
struct Samples {
    values: [i32; 4],
}

unsafe impl Observed for Samples {
    const TYPE_NAME: &'static str = "Samples";
}

#[test]
fn array_fields_index_by_stride() {
    let mut schema = Schema::new();
    schema.register(
        TypeDescriptor::new("Samples", size_of::<Samples>(), align_of::<Samples>()).field(
            FieldDescriptor::array(
                "values",
                offset_of!(Samples, values),
                size_of::<[i32; 4]>(),
                PrimitiveType::Int32,
                4,
            ),
        ),
    );

    let dir = tempfile::tempdir().unwrap();
    let producer = Producer::init("arr", config(dir.path()), schema).unwrap();
    let mut samples = producer.create::<Samples>("samples").unwrap();
    samples.values = [10, 20, 30, 40];

    let observer = Observer::connect_in(dir.path(), "arr").unwrap();
    let view = observer.find("samples").unwrap();
    let field = view.field("values");

    for (i, expected) in [10, 20, 30, 40].into_iter().enumerate() {
        assert_eq!(field.at(i).get::<i32>(), expected);
    }
    assert!(!field.at(4).is_valid());
    // Descending into a primitive field is invalid.
    assert!(!view.field("values").field("x").is_valid());
}

// ── process-wide session ───────────────────────────────────────────────────

#[test]
fn global_context_is_exclusive_and_idempotent() {
    let dir = tempfile::tempdir().unwrap();

    memglass::init("global", config(dir.path()), counter_schema()).unwrap();
    match memglass::init("global2", config(dir.path()), counter_schema()) {
        Err(Error::AlreadyInitialized) => {}
        other => panic!("expected AlreadyInitialized, got {other:?}"),
    }

    let counter = memglass::create::<Counter>("main").expect("create through the global context");
    counter.value.store(5, Ordering::Release);

    let observer = Observer::connect_in(dir.path(), "global").unwrap();
    assert_eq!(observer.find("main").unwrap().field("value").get::<u64>(), 5);

    memglass::shutdown();
    memglass::shutdown(); // idempotent

    // A fresh session can be initialized afterwards.
    memglass::init("global", config(dir.path()), counter_schema()).unwrap();
    memglass::shutdown();
}
