use std::cmp::Ordering;
use std::fmt;

use bincode::{Decode, Encode};
use serde_json::Value;

pub const MIN_KEY_FIELD: &str = "$minKey";
pub const MAX_KEY_FIELD: &str = "$maxKey";

/// Ordered key stored in an index node.
///
/// Ordering across types: `MinValue < Null < numbers < String < Bool < MaxValue`.
/// Integers and floats compare numerically with each other, so `Int(1)` and
/// `Float(1.0)` are the same key.
#[derive(Debug, Clone, Encode, Decode)]
pub enum IndexKey {
    MinValue,
    Null,
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    MaxValue,
}

impl IndexKey {
    fn type_rank(&self) -> u8 {
        match self {
            IndexKey::MinValue => 0,
            IndexKey::Null => 1,
            IndexKey::Int(_) | IndexKey::Float(_) => 2,
            IndexKey::String(_) => 3,
            IndexKey::Bool(_) => 4,
            IndexKey::MaxValue => 5,
        }
    }

    /// True for the reserved lowest/highest keys used by index sentinels.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, IndexKey::MinValue | IndexKey::MaxValue)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, IndexKey::Null)
    }

    /// Converts a scalar JSON value. Arrays and objects have no single key,
    /// except `{"$minKey": 1}` and `{"$maxKey": 1}`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(IndexKey::Null),
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(IndexKey::Int(i)),
                None => n.as_f64().map(IndexKey::Float),
            },
            Value::String(s) => Some(IndexKey::String(s.clone())),
            Value::Object(map) if map.len() == 1 => {
                if map.contains_key(MIN_KEY_FIELD) {
                    Some(IndexKey::MinValue)
                } else if map.contains_key(MAX_KEY_FIELD) {
                    Some(IndexKey::MaxValue)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            IndexKey::MinValue => sentinel_json(MIN_KEY_FIELD),
            IndexKey::Null => Value::Null,
            IndexKey::Int(i) => Value::from(*i),
            IndexKey::Float(f) => Value::from(*f),
            IndexKey::String(s) => Value::from(s.as_str()),
            IndexKey::Bool(b) => Value::from(*b),
            IndexKey::MaxValue => sentinel_json(MAX_KEY_FIELD),
        }
    }
}

fn sentinel_json(field: &str) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(field.to_owned(), Value::from(1));
    Value::Object(map)
}

/// Exact comparison of an integer with a float. Casting the integer to `f64`
/// rounds above 2^53, which would make `Int`/`Float` ordering non-transitive.
/// NaN sorts past the infinity of its sign, as `f64::total_cmp` places it.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    //2^63, exactly representable
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if f.is_nan() {
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if f >= LIMIT {
        return Ordering::Less;
    }
    if f < -LIMIT {
        return Ordering::Greater;
    }

    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal if f > whole => Ordering::Less,
        Ordering::Equal if f < whole => Ordering::Greater,
        ord => ord,
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexKey::Int(a), IndexKey::Int(b)) => a.cmp(b),
            (IndexKey::Float(a), IndexKey::Float(b)) => {
                //-0.0 and 0.0 are one key
                if a == b { Ordering::Equal } else { a.total_cmp(b) }
            }
            (IndexKey::Int(a), IndexKey::Float(b)) => cmp_int_float(*a, *b),
            (IndexKey::Float(a), IndexKey::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (IndexKey::String(a), IndexKey::String(b)) => a.cmp(b),
            (IndexKey::Bool(a), IndexKey::Bool(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        IndexKey::String(value.to_owned())
    }
}

impl From<i64> for IndexKey {
    fn from(value: i64) -> Self {
        IndexKey::Int(value)
    }
}
