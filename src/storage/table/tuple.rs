// Tuple Representation
//
// A tuple is a row of typed values, serialized with bincode for heap
// storage. TupleMeta travels with every stored tuple as a fixed-width
// prefix so it can be rewritten without moving the record.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::common::types::{Timestamp, TXN_START_ID};

/// Possible data types for values in a tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

impl Eq for DataValue {}

impl Hash for DataValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Type discriminant first to avoid collisions between types
        match self {
            DataValue::Null => 0.hash(state),
            DataValue::Integer(i) => {
                1.hash(state);
                i.hash(state);
            }
            DataValue::Float(f) => {
                2.hash(state);
                f.to_bits().hash(state);
            }
            DataValue::Text(s) => {
                3.hash(state);
                s.hash(state);
            }
            DataValue::Boolean(b) => {
                4.hash(state);
                b.hash(state);
            }
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "NULL"),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::Text(s) => write!(f, "\"{}\"", s),
            DataValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl PartialOrd for DataValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (DataValue::Null, _) | (_, DataValue::Null) => None,
            (DataValue::Integer(a), DataValue::Integer(b)) => a.partial_cmp(b),
            (DataValue::Float(a), DataValue::Float(b)) => a.partial_cmp(b),
            (DataValue::Integer(a), DataValue::Float(b)) => (*a as f64).partial_cmp(b),
            (DataValue::Float(a), DataValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (DataValue::Text(a), DataValue::Text(b)) => a.partial_cmp(b),
            (DataValue::Boolean(a), DataValue::Boolean(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl DataValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// Total ordering for sorting: NULL sorts before everything, values of
    /// different types order by type discriminant.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        if let Some(ord) = self.partial_cmp(other) {
            return ord;
        }
        match (self, other) {
            (DataValue::Null, DataValue::Null) => Ordering::Equal,
            (DataValue::Null, _) => Ordering::Less,
            (_, DataValue::Null) => Ordering::Greater,
            // NaN against a number lands here; pin it after the numbers.
            (DataValue::Float(_), DataValue::Float(_))
            | (DataValue::Float(_), DataValue::Integer(_))
            | (DataValue::Integer(_), DataValue::Float(_)) => Ordering::Greater,
            _ => self.discriminant().cmp(&other.discriminant()),
        }
    }

    fn discriminant(&self) -> u8 {
        match self {
            DataValue::Null => 0,
            DataValue::Integer(_) => 1,
            DataValue::Float(_) => 2,
            DataValue::Text(_) => 3,
            DataValue::Boolean(_) => 4,
        }
    }
}

/// A tuple: an ordered list of values matching some schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Tuple {
    values: Vec<DataValue>,
}

impl Tuple {
    pub fn new(values: Vec<DataValue>) -> Self {
        Self { values }
    }

    pub fn value(&self, idx: usize) -> &DataValue {
        &self.values[idx]
    }

    pub fn values(&self) -> &[DataValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&self.values)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        Ok(Self {
            values: bincode::deserialize(bytes)?,
        })
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

pub const TUPLE_META_SIZE: usize = 9;

/// Per-tuple MVCC metadata. `ts` is either a commit timestamp or, when at
/// or above TXN_START_ID, the id of the live transaction that last wrote
/// the tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleMeta {
    pub ts: Timestamp,
    pub is_deleted: bool,
}

impl TupleMeta {
    pub fn new(ts: Timestamp, is_deleted: bool) -> Self {
        Self { ts, is_deleted }
    }

    /// Whether `ts` names a live transaction rather than a commit.
    pub fn is_temporary(&self) -> bool {
        self.ts >= TXN_START_ID
    }

    pub fn to_bytes(&self) -> [u8; TUPLE_META_SIZE] {
        let mut bytes = [0u8; TUPLE_META_SIZE];
        LittleEndian::write_u64(&mut bytes[0..8], self.ts);
        bytes[8] = self.is_deleted as u8;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            ts: LittleEndian::read_u64(&bytes[0..8]),
            is_deleted: bytes[8] != 0,
        }
    }
}
