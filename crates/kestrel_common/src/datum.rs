use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::SortOrder;
use crate::types::{DataType, RowId};

/// A single scalar value. The fundamental unit of data in the table core.
/// Small enum, no heap allocation for fixed-size types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Text(String),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    /// Days since the Unix epoch (1970-01-01).
    Date(i32),
    Bytea(Vec<u8>),
}

impl Datum {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Datum::Null => None,
            Datum::Boolean(_) => Some(DataType::Boolean),
            Datum::Int16(_) => Some(DataType::Int16),
            Datum::Int32(_) => Some(DataType::Int32),
            Datum::Int64(_) => Some(DataType::Int64),
            Datum::Float64(_) => Some(DataType::Float64),
            Datum::Text(_) => Some(DataType::Text),
            Datum::Timestamp(_) => Some(DataType::Timestamp),
            Datum::Date(_) => Some(DataType::Date),
            Datum::Bytea(_) => Some(DataType::Bytea),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int16(v) => Some(*v as i64),
            Datum::Int32(v) => Some(*v as i64),
            Datum::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int16(v) => Some(*v as f64),
            Datum::Int32(v) => Some(*v as f64),
            Datum::Int64(v) => Some(*v as f64),
            Datum::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Total order over datums, used by index comparators.
    ///
    /// `Null` sorts before every value. Integral variants compare
    /// cross-width; everything else compares within its own variant, with
    /// a stable variant rank as the tie-breaker across types.
    pub fn cmp_total(&self, other: &Datum) -> Ordering {
        use Datum::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Float64(a), Float64(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Bytea(a), Bytea(b)) => a.cmp(b),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => variant_rank(a).cmp(&variant_rank(b)),
            },
        }
    }
}

fn variant_rank(d: &Datum) -> u8 {
    match d {
        Datum::Null => 0,
        Datum::Boolean(_) => 1,
        Datum::Int16(_) | Datum::Int32(_) | Datum::Int64(_) => 2,
        Datum::Float64(_) => 3,
        Datum::Text(_) => 4,
        Datum::Timestamp(_) => 5,
        Datum::Date(_) => 6,
        Datum::Bytea(_) => 7,
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Int16(v) => write!(f, "{}", v),
            Datum::Int32(v) => write!(f, "{}", v),
            Datum::Int64(v) => write!(f, "{}", v),
            Datum::Float64(v) => write!(f, "{}", v),
            Datum::Text(s) => write!(f, "'{}'", s),
            Datum::Timestamp(us) => write!(f, "ts:{}", us),
            Datum::Date(d) => write!(f, "date:{}", d),
            Datum::Bytea(b) => write!(f, "bytea[{}]", b.len()),
        }
    }
}

/// A table row: the internal row id plus one value per table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub key: RowId,
    pub values: Vec<Datum>,
}

impl Row {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { key: RowId(0), values }
    }

    pub fn with_key(key: RowId, values: Vec<Datum>) -> Self {
        Self { key, values }
    }

    pub fn get(&self, idx: usize) -> &Datum {
        self.values.get(idx).unwrap_or(&Datum::Null)
    }
}

// ── Order-preserving key encoding ────────────────────────────────────────
//
// Index keys are byte strings whose lexicographic order equals the datum
// order: integers are sign-flipped big-endian, floats use the IEEE total
// order trick, text is NUL-terminated. A leading tag byte keeps NULL
// (0x00) before every value.

/// Append the order-preserving encoding of `datum` to `buf`.
pub fn encode_datum(datum: &Datum, buf: &mut Vec<u8>) {
    match datum {
        Datum::Null => {
            buf.push(0x00);
        }
        Datum::Boolean(b) => {
            buf.push(0x01);
            buf.push(u8::from(*b));
        }
        Datum::Int16(v) => {
            buf.push(0x02);
            let encoded = ((*v as i64) as u64) ^ (1u64 << 63);
            buf.extend_from_slice(&encoded.to_be_bytes());
        }
        Datum::Int32(v) => {
            buf.push(0x02);
            let encoded = ((*v as i64) as u64) ^ (1u64 << 63);
            buf.extend_from_slice(&encoded.to_be_bytes());
        }
        Datum::Int64(v) => {
            buf.push(0x02);
            let encoded = (*v as u64) ^ (1u64 << 63);
            buf.extend_from_slice(&encoded.to_be_bytes());
        }
        Datum::Float64(v) => {
            buf.push(0x03);
            let bits = v.to_bits();
            let encoded = if bits & (1u64 << 63) != 0 { !bits } else { bits ^ (1u64 << 63) };
            buf.extend_from_slice(&encoded.to_be_bytes());
        }
        Datum::Text(s) => {
            buf.push(0x04);
            buf.extend_from_slice(s.as_bytes());
            buf.push(0x00);
        }
        Datum::Timestamp(v) => {
            buf.push(0x05);
            let encoded = (*v as u64) ^ (1u64 << 63);
            buf.extend_from_slice(&encoded.to_be_bytes());
        }
        Datum::Date(v) => {
            buf.push(0x06);
            let encoded = (*v as u32) ^ (1u32 << 31);
            buf.extend_from_slice(&encoded.to_be_bytes());
        }
        Datum::Bytea(b) => {
            buf.push(0x07);
            buf.extend_from_slice(b);
            buf.push(0x00);
        }
    }
}

/// Append the encoding of `datum` honoring the column's sort order.
/// Descending columns complement the encoded bytes, reversing their
/// lexicographic order inside the composite key.
pub fn encode_datum_ordered(datum: &Datum, order: SortOrder, buf: &mut Vec<u8>) {
    match order {
        SortOrder::Ascending => encode_datum(datum, buf),
        SortOrder::Descending => {
            let start = buf.len();
            encode_datum(datum, buf);
            for byte in &mut buf[start..] {
                *byte = !*byte;
            }
        }
    }
}

/// Encode a row id as a 9-byte suffix (tag + sign-flipped big-endian).
pub fn encode_row_id(id: RowId, buf: &mut Vec<u8>) {
    encode_datum(&Datum::Int64(id.0), buf);
}

/// Decode a row id from the fixed-width encoding of `encode_row_id`.
pub fn decode_row_id(bytes: &[u8]) -> Option<RowId> {
    if bytes.len() != 9 || bytes[0] != 0x02 {
        return None;
    }
    let mut be = [0u8; 8];
    be.copy_from_slice(&bytes[1..]);
    let raw = u64::from_be_bytes(be) ^ (1u64 << 63);
    Some(RowId(raw as i64))
}
