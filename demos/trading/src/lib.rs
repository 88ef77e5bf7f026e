//! Shared market-data types for the trading demo.
//!
//! A real integration would generate the descriptors with the reflection
//! extractor; the demo writes them out by hand, which doubles as an example
//! of the schema surface.

use std::mem::{align_of, offset_of, size_of};
use std::sync::atomic::AtomicI64;

use memglass::{
    Atomicity, FieldDescriptor, Observed, PrimitiveType, Schema, Seqlock, TypeDescriptor,
};

pub const SESSION: &str = "trading_engine";
pub const SYMBOLS: [&str; 5] = ["AAPL", "MSFT", "GOOG", "AMZN", "META"];

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Quote {
    pub bid_price: i64,
    pub ask_price: i64,
    pub bid_size: u32,
    pub ask_size: u32,
    pub timestamp_ns: u64,
}

#[repr(C)]
pub struct Position {
    pub symbol_id: u32,
    pub _pad: u32,
    pub quantity: AtomicI64,
    pub avg_price: i64,
    pub realized_pnl: i64,
    pub unrealized_pnl: i64,
}

/// One tracked symbol: a seqlocked quote plus the running position.
#[repr(C)]
pub struct Security {
    pub quote: Seqlock<Quote>,
    pub position: Position,
}

unsafe impl Observed for Security {
    const TYPE_NAME: &'static str = "Security";
}

/// Build the demo schema: `Quote`, `Position`, and the nested `Security`.
pub fn trading_schema() -> Schema {
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
            ))
            .field(FieldDescriptor::primitive(
                "bid_size",
                offset_of!(Quote, bid_size),
                4,
                PrimitiveType::UInt32,
                Atomicity::None,
            ))
            .field(FieldDescriptor::primitive(
                "ask_size",
                offset_of!(Quote, ask_size),
                4,
                PrimitiveType::UInt32,
                Atomicity::None,
            ))
            .field(FieldDescriptor::primitive(
                "timestamp_ns",
                offset_of!(Quote, timestamp_ns),
                8,
                PrimitiveType::UInt64,
                Atomicity::None,
            )),
    );

    let position_id = schema.register(
        TypeDescriptor::new("Position", size_of::<Position>(), align_of::<Position>())
            .field(
                FieldDescriptor::primitive(
                    "symbol_id",
                    offset_of!(Position, symbol_id),
                    4,
                    PrimitiveType::UInt32,
                    Atomicity::None,
                )
                .readonly(),
            )
            .field(FieldDescriptor::primitive(
                "quantity",
                offset_of!(Position, quantity),
                8,
                PrimitiveType::Int64,
                Atomicity::Atomic,
            ))
            .field(FieldDescriptor::primitive(
                "avg_price",
                offset_of!(Position, avg_price),
                8,
                PrimitiveType::Int64,
                Atomicity::None,
            ))
            .field(FieldDescriptor::primitive(
                "realized_pnl",
                offset_of!(Position, realized_pnl),
                8,
                PrimitiveType::Int64,
                Atomicity::None,
            ))
            .field(FieldDescriptor::primitive(
                "unrealized_pnl",
                offset_of!(Position, unrealized_pnl),
                8,
                PrimitiveType::Int64,
                Atomicity::None,
            )),
    );

    schema.register(
        TypeDescriptor::new("Security", size_of::<Security>(), align_of::<Security>())
            .field(
                FieldDescriptor::nested(
                    "quote",
                    offset_of!(Security, quote),
                    size_of::<Seqlock<Quote>>(),
                    quote_id,
                )
                .with_atomicity(Atomicity::Seqlock),
            )
            .field(FieldDescriptor::nested(
                "position",
                offset_of!(Security, position),
                size_of::<Position>(),
                position_id,
            )),
    );

    schema
}
