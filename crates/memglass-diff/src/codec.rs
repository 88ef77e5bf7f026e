//! The `.mgd` binary diff format.
//!
//! File header: ASCII `MGDF`, a version byte (1), a flags byte (0) and two
//! reserved bytes. Then a stream of records, each introduced by a tag byte:
//! `1` for a diff record, `0` for end-of-stream.
//!
//! A diff record carries a signed-varint timestamp delta, the new sequence
//! as an unsigned varint, the added/removed/changed counts, the label
//! strings, and one entry per change: label, field name, a primitive type
//! tag, then either a signed-varint integer *delta* (`new − old`) or the raw
//! little-endian bits of the new float. Integer deltas pack counter-style
//! changes into a byte or two; float bit patterns gain nothing from
//! delta-coding and are stored verbatim.

use std::io::{self, Read, Write};

use memglass::PrimitiveType;

use crate::diff::{FieldChange, SnapshotDiff};
use crate::value::Value;
use crate::wire::{read_svarint, read_uvarint, write_svarint, write_uvarint};

/// File magic.
pub const MAGIC: [u8; 4] = *b"MGDF";

/// Format version this crate reads and writes.
pub const VERSION: u8 = 1;

/// Record tags.
pub mod record {
    pub const END: u8 = 0;
    pub const DIFF: u8 = 1;
}

// ── writer ─────────────────────────────────────────────────────────────────

/// Streaming `.mgd` writer.
pub struct DiffWriter<W: Write> {
    out: W,
}

impl<W: Write> DiffWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Write the file header. Call once, before any record.
    pub fn write_header(&mut self) -> io::Result<()> {
        self.out.write_all(&MAGIC)?;
        self.out.write_all(&[VERSION, 0, 0, 0])
    }

    /// Append one diff record.
    ///
    /// `last_timestamp` is the previous record's absolute timestamp (0 for
    /// the first record, so its delta is the absolute stamp).
    pub fn write_diff(&mut self, diff: &SnapshotDiff, last_timestamp: u64) -> io::Result<()> {
        self.out.write_all(&[record::DIFF])?;

        let ts_delta = diff.timestamp_ns.wrapping_sub(last_timestamp) as i64;
        write_svarint(&mut self.out, ts_delta)?;
        write_uvarint(&mut self.out, diff.new_sequence)?;
        write_uvarint(&mut self.out, diff.added.len() as u64)?;
        write_uvarint(&mut self.out, diff.removed.len() as u64)?;
        write_uvarint(&mut self.out, diff.changes.len() as u64)?;

        for label in &diff.added {
            write_string(&mut self.out, label)?;
        }
        for label in &diff.removed {
            write_string(&mut self.out, label)?;
        }

        for change in &diff.changes {
            write_string(&mut self.out, &change.object)?;
            write_string(&mut self.out, &change.field)?;
            self.out.write_all(&[change.new.type_tag() as u32 as u8])?;

            match change.new {
                Value::F32(v) => self.out.write_all(&v.to_le_bytes())?,
                Value::F64(v) => self.out.write_all(&v.to_le_bytes())?,
                new => {
                    let old = change.old.map_or(0, |v| v.as_i64());
                    write_svarint(&mut self.out, new.as_i64().wrapping_sub(old))?;
                }
            }
        }

        Ok(())
    }

    /// Append the end-of-stream marker.
    pub fn write_end(&mut self) -> io::Result<()> {
        self.out.write_all(&[record::END])
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    write_uvarint(w, s.len() as u64)?;
    w.write_all(s.as_bytes())
}

// ── reader ─────────────────────────────────────────────────────────────────

/// Decoder failure modes.
#[derive(Debug)]
pub enum DecodeError {
    /// The file does not start with `MGDF`.
    BadMagic,
    /// A version this crate does not understand.
    UnsupportedVersion(u8),
    /// The stream ended inside a record.
    Truncated,
    /// A record tag other than diff or end-of-stream.
    UnknownRecord(u8),
    /// A change entry names a primitive tag outside the known range.
    UnknownTypeTag(u8),
    /// A label or field name is not UTF-8.
    BadString,
    Io(io::Error),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::BadMagic => write!(f, "not a memglass diff file"),
            DecodeError::UnsupportedVersion(v) => write!(f, "unsupported format version {v}"),
            DecodeError::Truncated => write!(f, "truncated record"),
            DecodeError::UnknownRecord(t) => write!(f, "unknown record tag {t}"),
            DecodeError::UnknownTypeTag(t) => write!(f, "unknown primitive type tag {t}"),
            DecodeError::BadString => write!(f, "string is not valid UTF-8"),
            DecodeError::Io(e) => write!(f, "read failed: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::Truncated
        } else {
            DecodeError::Io(e)
        }
    }
}

/// Streaming `.mgd` reader.
pub struct DiffReader<R: Read> {
    input: R,
}

impl<R: Read> DiffReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Validate the file header. Call once, before any record.
    pub fn read_header(&mut self) -> Result<(), DecodeError> {
        let mut header = [0u8; 8];
        self.input.read_exact(&mut header)?;
        if header[..4] != MAGIC {
            return Err(DecodeError::BadMagic);
        }
        if header[4] != VERSION {
            return Err(DecodeError::UnsupportedVersion(header[4]));
        }
        Ok(())
    }

    /// Read the next diff record, accumulating the timestamp delta into
    /// `last_timestamp`. `Ok(None)` on the end marker or a clean EOF.
    ///
    /// Integer changes come back with `old: None` and the *delta* as the new
    /// value — the wire does not carry absolutes; callers that need them
    /// must fold deltas into their own running state.
    pub fn read_diff(
        &mut self,
        last_timestamp: &mut u64,
    ) -> Result<Option<SnapshotDiff>, DecodeError> {
        let tag = match read_byte_or_eof(&mut self.input)? {
            None | Some(record::END) => return Ok(None),
            Some(record::DIFF) => record::DIFF,
            Some(other) => return Err(DecodeError::UnknownRecord(other)),
        };
        debug_assert_eq!(tag, record::DIFF);

        let ts_delta = read_svarint(&mut self.input)?;
        *last_timestamp = (*last_timestamp as i64).wrapping_add(ts_delta) as u64;

        let mut diff = SnapshotDiff {
            timestamp_ns: *last_timestamp,
            old_sequence: 0,
            new_sequence: read_uvarint(&mut self.input)?,
            ..SnapshotDiff::default()
        };

        let num_added = read_uvarint(&mut self.input)?;
        let num_removed = read_uvarint(&mut self.input)?;
        let num_changes = read_uvarint(&mut self.input)?;

        for _ in 0..num_added {
            diff.added.push(read_string(&mut self.input)?);
        }
        for _ in 0..num_removed {
            diff.removed.push(read_string(&mut self.input)?);
        }

        for _ in 0..num_changes {
            let object = read_string(&mut self.input)?;
            let field = read_string(&mut self.input)?;

            let mut tag_byte = [0u8; 1];
            self.input.read_exact(&mut tag_byte)?;
            let tag = PrimitiveType::from_u32(tag_byte[0] as u32)
                .ok_or(DecodeError::UnknownTypeTag(tag_byte[0]))?;

            let new = match tag {
                PrimitiveType::Float32 => {
                    let mut bits = [0u8; 4];
                    self.input.read_exact(&mut bits)?;
                    Value::F32(f32::from_le_bytes(bits))
                }
                PrimitiveType::Float64 => {
                    let mut bits = [0u8; 8];
                    self.input.read_exact(&mut bits)?;
                    Value::F64(f64::from_le_bytes(bits))
                }
                _ => Value::from_integer(tag, read_svarint(&mut self.input)?),
            };

            diff.changes.push(FieldChange {
                object,
                field,
                old: None,
                new,
            });
        }

        Ok(Some(diff))
    }
}

fn read_byte_or_eof<R: Read>(r: &mut R) -> Result<Option<u8>, DecodeError> {
    let mut byte = [0u8; 1];
    loop {
        match r.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DecodeError::Io(e)),
        }
    }
}

fn read_string<R: Read>(r: &mut R) -> Result<String, DecodeError> {
    let len = read_uvarint(r)? as usize;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| DecodeError::BadString)
}
