use crate::models::TimeUuid;
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::fmt;

use super::StoreError;

/// A single cell value as exchanged with the store.
#[derive(Debug, Clone)]
pub enum CqlValue {
    Null,
    Int(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
    Date(NaiveDate),
    Timeuuid(TimeUuid),
}

impl CqlValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            CqlValue::Null => "null",
            CqlValue::Int(_) => "int",
            CqlValue::BigInt(_) => "bigint",
            CqlValue::Double(_) => "double",
            CqlValue::Text(_) => "text",
            CqlValue::Date(_) => "date",
            CqlValue::Timeuuid(_) => "timeuuid",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            CqlValue::Null => 0,
            CqlValue::Int(_) | CqlValue::BigInt(_) => 1,
            CqlValue::Double(_) => 2,
            CqlValue::Text(_) => 3,
            CqlValue::Date(_) => 4,
            CqlValue::Timeuuid(_) => 5,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CqlValue::Null)
    }

    /// Compare two values of the same type; `None` when the types differ
    /// or either side is null.
    pub fn partial_compare(&self, other: &CqlValue) -> Option<Ordering> {
        match (self, other) {
            (CqlValue::Int(a), CqlValue::Int(b)) => Some(a.cmp(b)),
            (CqlValue::BigInt(a), CqlValue::BigInt(b)) => Some(a.cmp(b)),
            (CqlValue::Int(a), CqlValue::BigInt(b)) => Some(i64::from(*a).cmp(b)),
            (CqlValue::BigInt(a), CqlValue::Int(b)) => Some(a.cmp(&i64::from(*b))),
            (CqlValue::Double(a), CqlValue::Double(b)) => Some(a.total_cmp(b)),
            (CqlValue::Text(a), CqlValue::Text(b)) => Some(a.cmp(b)),
            (CqlValue::Date(a), CqlValue::Date(b)) => Some(a.cmp(b)),
            (CqlValue::Timeuuid(a), CqlValue::Timeuuid(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

// Total order so values can key ordered maps: by type first, then by value.
// Int and BigInt share a rank and compare numerically, matching filters.
impl Ord for CqlValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.rank().cmp(&other.rank()) {
            // Equal ranks always compare, except Null against Null.
            Ordering::Equal => self.partial_compare(other).unwrap_or(Ordering::Equal),
            unequal => unequal,
        }
    }
}

impl PartialOrd for CqlValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CqlValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CqlValue {}

impl fmt::Display for CqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlValue::Null => write!(f, "null"),
            CqlValue::Int(v) => write!(f, "{}", v),
            CqlValue::BigInt(v) => write!(f, "{}", v),
            CqlValue::Double(v) => write!(f, "{}", v),
            CqlValue::Text(v) => write!(f, "'{}'", v),
            CqlValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            CqlValue::Timeuuid(v) => write!(f, "{}", v),
        }
    }
}

impl From<i32> for CqlValue {
    fn from(value: i32) -> Self {
        CqlValue::Int(value)
    }
}

impl From<i64> for CqlValue {
    fn from(value: i64) -> Self {
        CqlValue::BigInt(value)
    }
}

impl From<f64> for CqlValue {
    fn from(value: f64) -> Self {
        CqlValue::Double(value)
    }
}

impl From<String> for CqlValue {
    fn from(value: String) -> Self {
        CqlValue::Text(value)
    }
}

impl From<&str> for CqlValue {
    fn from(value: &str) -> Self {
        CqlValue::Text(value.to_string())
    }
}

impl From<NaiveDate> for CqlValue {
    fn from(value: NaiveDate) -> Self {
        CqlValue::Date(value)
    }
}

impl From<TimeUuid> for CqlValue {
    fn from(value: TimeUuid) -> Self {
        CqlValue::Timeuuid(value)
    }
}

/// One result row; values are positional in SELECT column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<CqlValue>,
}

impl Row {
    pub fn new(values: Vec<CqlValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[CqlValue] {
        &self.values
    }

    fn column(&self, index: usize) -> Result<&CqlValue, StoreError> {
        self.values.get(index).ok_or(StoreError::ColumnIndex {
            index,
            width: self.values.len(),
        })
    }

    fn mismatch(index: usize, expected: &'static str, found: &CqlValue) -> StoreError {
        StoreError::TypeMismatch {
            column: index.to_string(),
            expected,
            found: found.type_name(),
        }
    }

    pub fn get_i32(&self, index: usize) -> Result<i32, StoreError> {
        match self.column(index)? {
            CqlValue::Int(v) => Ok(*v),
            other => Err(Self::mismatch(index, "int", other)),
        }
    }

    pub fn get_i64(&self, index: usize) -> Result<i64, StoreError> {
        match self.column(index)? {
            CqlValue::BigInt(v) => Ok(*v),
            CqlValue::Int(v) => Ok(i64::from(*v)),
            other => Err(Self::mismatch(index, "bigint", other)),
        }
    }

    pub fn get_f64(&self, index: usize) -> Result<f64, StoreError> {
        match self.column(index)? {
            CqlValue::Double(v) => Ok(*v),
            other => Err(Self::mismatch(index, "double", other)),
        }
    }

    pub fn get_text(&self, index: usize) -> Result<&str, StoreError> {
        match self.column(index)? {
            CqlValue::Text(v) => Ok(v),
            other => Err(Self::mismatch(index, "text", other)),
        }
    }

    pub fn get_date(&self, index: usize) -> Result<NaiveDate, StoreError> {
        match self.column(index)? {
            CqlValue::Date(v) => Ok(*v),
            other => Err(Self::mismatch(index, "date", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_within_type() {
        assert!(CqlValue::Int(1) < CqlValue::Int(2));
        assert!(CqlValue::Double(-0.5) < CqlValue::Double(0.25));
        assert!(
            CqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
                < CqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
        assert_eq!(
            CqlValue::Int(3).partial_compare(&CqlValue::BigInt(3)),
            Some(Ordering::Equal)
        );
        assert_eq!(CqlValue::Int(3).partial_compare(&CqlValue::from("3")), None);
    }

    #[test]
    fn test_integer_widths_compare_by_value() {
        assert_eq!(CqlValue::Int(3), CqlValue::BigInt(3));
        assert!(CqlValue::Int(3) < CqlValue::BigInt(4));
        assert!(CqlValue::BigInt(-1) < CqlValue::Int(0));
        assert!(CqlValue::BigInt(i64::MAX) > CqlValue::Int(i32::MAX));

        let mut keys = std::collections::BTreeMap::new();
        keys.insert(vec![CqlValue::Int(101)], "first");
        keys.insert(vec![CqlValue::BigInt(101)], "second");
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[&vec![CqlValue::Int(101)]], "second");
    }

    #[test]
    fn test_row_accessors() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let row = Row::new(vec![
            CqlValue::Double(0.03),
            CqlValue::from("SO2"),
            CqlValue::Date(date),
        ]);

        assert_eq!(row.get_f64(0).unwrap(), 0.03);
        assert_eq!(row.get_text(1).unwrap(), "SO2");
        assert_eq!(row.get_date(2).unwrap(), date);
        assert!(matches!(
            row.get_i32(1),
            Err(StoreError::TypeMismatch { .. })
        ));
        assert!(matches!(row.get_f64(7), Err(StoreError::ColumnIndex { .. })));
    }
}
