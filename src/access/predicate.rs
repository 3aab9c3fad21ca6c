//! Single-attribute scan predicates evaluated over raw record bytes.
//!
//! A predicate names a fixed byte range of every record, how to decode it and
//! how the decoded value must compare to a filter value. Integers are `i32`
//! and floats `f32`, both little-endian.

use crate::access::error::{HeapError, HeapResult};
use byteorder::{ByteOrder, LittleEndian};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    String,
    Integer,
    Float,
}

impl Datatype {
    /// Width in bytes for fixed-width types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Datatype::String => None,
            Datatype::Integer => Some(std::mem::size_of::<i32>()),
            Datatype::Float => Some(std::mem::size_of::<f32>()),
        }
    }
}

impl FromStr for Datatype {
    type Err = HeapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(Datatype::String),
            "integer" | "int" => Ok(Datatype::Integer),
            "float" => Ok(Datatype::Float),
            other => Err(HeapError::BadScanParameter(format!(
                "unknown datatype {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Lte,
    Eq,
    Gte,
    Gt,
    Ne,
}

impl Operator {
    /// Test the outcome of `attribute <=> filter`. `None` means the values
    /// are unordered (a NaN was involved), which only `Ne` accepts.
    pub fn accepts(self, ordering: Option<Ordering>) -> bool {
        let Some(ordering) = ordering else {
            return self == Operator::Ne;
        };
        match self {
            Operator::Lt => ordering == Ordering::Less,
            Operator::Lte => ordering != Ordering::Greater,
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Gte => ordering != Ordering::Less,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ne => ordering != Ordering::Equal,
        }
    }
}

impl FromStr for Operator {
    type Err = HeapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lt" | "<" => Ok(Operator::Lt),
            "lte" | "<=" => Ok(Operator::Lte),
            "eq" | "=" | "==" => Ok(Operator::Eq),
            "gte" | ">=" => Ok(Operator::Gte),
            "gt" | ">" => Ok(Operator::Gt),
            "ne" | "!=" | "<>" => Ok(Operator::Ne),
            other => Err(HeapError::BadScanParameter(format!(
                "unknown operator {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Eq => "=",
            Operator::Gte => ">=",
            Operator::Gt => ">",
            Operator::Ne => "!=",
        };
        f.write_str(symbol)
    }
}

/// A decoded attribute value.
#[derive(Debug, Clone, Copy, PartialEq)]
enum AttrValue<'a> {
    Integer(i32),
    Float(f32),
    String(&'a [u8]),
}

impl<'a> AttrValue<'a> {
    /// `bytes` is exactly the attribute's width.
    fn decode(bytes: &'a [u8], datatype: Datatype) -> Self {
        match datatype {
            Datatype::Integer => AttrValue::Integer(LittleEndian::read_i32(bytes)),
            Datatype::Float => AttrValue::Float(LittleEndian::read_f32(bytes)),
            Datatype::String => AttrValue::String(bytes),
        }
    }

    fn compare(&self, other: &AttrValue<'_>) -> Option<Ordering> {
        match (self, other) {
            (AttrValue::Integer(a), AttrValue::Integer(b)) => Some(a.cmp(b)),
            (AttrValue::Float(a), AttrValue::Float(b)) => a.partial_cmp(b),
            (AttrValue::String(a), AttrValue::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// `record[offset..offset + length] <operator> filter`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPredicate {
    offset: usize,
    length: usize,
    datatype: Datatype,
    filter: Vec<u8>,
    operator: Operator,
}

impl ScanPredicate {
    /// Validate and build a predicate. Only the first `length` bytes of
    /// `filter` take part in comparisons.
    pub fn new(
        offset: usize,
        length: usize,
        datatype: Datatype,
        filter: &[u8],
        operator: Operator,
    ) -> HeapResult<Self> {
        if length < 1 {
            return Err(HeapError::BadScanParameter(
                "length must be at least 1".to_string(),
            ));
        }
        if let Some(width) = datatype.fixed_width() {
            if length != width {
                return Err(HeapError::BadScanParameter(format!(
                    "{:?} attributes are {} bytes wide, got length {}",
                    datatype, width, length
                )));
            }
        }
        if offset.checked_add(length).is_none() {
            return Err(HeapError::BadScanParameter(format!(
                "offset {} plus length {} overflows",
                offset, length
            )));
        }
        if filter.len() < length {
            return Err(HeapError::BadScanParameter(format!(
                "filter has {} bytes, need {}",
                filter.len(),
                length
            )));
        }

        Ok(Self {
            offset,
            length,
            datatype,
            filter: filter[..length].to_vec(),
            operator,
        })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Records too short to contain the attribute never match.
    pub fn matches(&self, record: &[u8]) -> bool {
        let end = self.offset + self.length;
        if end > record.len() {
            return false;
        }

        let attribute = AttrValue::decode(&record[self.offset..end], self.datatype);
        let filter = AttrValue::decode(&self.filter, self.datatype);
        self.operator.accepts(attribute.compare(&filter))
    }
}
