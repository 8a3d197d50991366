//! Identifier normalization
//!
//! Every id representation accepted by the relation layer (record handles,
//! object ids, raw JSON scalars) reduces to one [`Identifier`]. Two
//! identifiers are equal iff their canonical string renderings are equal, which
//! is what dictionary keys and array set-semantics rely on.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::{RelationError, RelationResult};
use crate::model::Record;

/// Extended-JSON marker used to store object ids inside field values
pub const OID_FIELD: &str = "$oid";

/// Store-native 12-byte binary id
///
/// Layout: 4-byte big-endian creation time in seconds, 5 bytes unique to the
/// process, 3-byte big-endian counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generate a fresh object id
    pub fn new() -> Self {
        static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
        static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

        let unique = PROCESS_UNIQUE.get_or_init(rand::random::<[u8; 5]>);
        let counter = COUNTER
            .get_or_init(|| AtomicU32::new(rand::random::<u32>()))
            .fetch_add(1, AtomicOrdering::SeqCst);
        let seconds = Utc::now().timestamp() as u32;

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(unique);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Parse the 24-character hex rendering
    pub fn parse_str(s: &str) -> RelationResult<Self> {
        let decoded = hex::decode(s).map_err(|e| {
            RelationError::InvalidIdentifier(format!("'{}' is not a valid object id: {}", s, e))
        })?;
        let bytes: [u8; 12] = decoded.try_into().map_err(|_| {
            RelationError::InvalidIdentifier(format!(
                "'{}' is not a valid object id: expected 12 bytes",
                s
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Creation time encoded in the id
    pub fn timestamp(&self) -> DateTime<Utc> {
        let seconds = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        Utc.timestamp_opt(i64::from(seconds), 0)
            .single()
            .unwrap_or_default()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = RelationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

/// Canonical identifier value
#[derive(Debug, Clone)]
pub enum Identifier {
    /// Store-native binary id
    ObjectId(ObjectId),
    /// Opaque integer id
    Int(i64),
    /// Opaque string id
    Str(String),
}

impl Identifier {
    /// Canonical string rendering used for equality and dictionary keys
    pub fn canonical(&self) -> Cow<'_, str> {
        match self {
            Identifier::ObjectId(oid) => Cow::Owned(oid.to_hex()),
            Identifier::Int(i) => Cow::Owned(i.to_string()),
            Identifier::Str(s) => Cow::Borrowed(s),
        }
    }

    /// Rebuild an opaque identifier from a canonical rendering: numeric-looking
    /// renderings become integers, everything else stays a string.
    pub fn from_canonical(rendering: &str) -> Self {
        match rendering.parse::<i64>() {
            Ok(i) => Identifier::Int(i),
            Err(_) => Identifier::Str(rendering.to_string()),
        }
    }

    /// Field-value form written into records
    pub fn to_value(&self) -> Value {
        match self {
            Identifier::ObjectId(oid) => json!({ "$oid": oid.to_hex() }),
            Identifier::Int(i) => Value::from(*i),
            Identifier::Str(s) => Value::String(s.clone()),
        }
    }

    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Identifier::ObjectId(oid) => Some(*oid),
            _ => None,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical().cmp(&other.canonical())
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Identifier::ObjectId(oid) => serializer.serialize_str(&oid.to_hex()),
            Identifier::Int(i) => serializer.serialize_i64(*i),
            Identifier::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl From<ObjectId> for Identifier {
    fn from(oid: ObjectId) -> Self {
        Identifier::ObjectId(oid)
    }
}

impl From<i64> for Identifier {
    fn from(i: i64) -> Self {
        Identifier::Int(i)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier::Str(s.to_string())
    }
}

/// Any accepted identifier representation, before normalization
#[derive(Clone)]
pub enum IdInput<'a> {
    /// A record handle; reduces to its key
    Record(&'a dyn Record),
    /// An already canonical identifier
    Id(Identifier),
    /// A raw field value
    Raw(Value),
}

impl fmt::Debug for IdInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdInput::Record(record) => write!(f, "Record({}:{:?})", record.model_name(), record.key()),
            IdInput::Id(id) => write!(f, "Id({})", id),
            IdInput::Raw(value) => write!(f, "Raw({})", value),
        }
    }
}

impl From<Identifier> for IdInput<'_> {
    fn from(id: Identifier) -> Self {
        IdInput::Id(id)
    }
}

impl From<&Identifier> for IdInput<'_> {
    fn from(id: &Identifier) -> Self {
        IdInput::Id(id.clone())
    }
}

impl From<ObjectId> for IdInput<'_> {
    fn from(oid: ObjectId) -> Self {
        IdInput::Id(Identifier::ObjectId(oid))
    }
}

impl From<Value> for IdInput<'_> {
    fn from(value: Value) -> Self {
        IdInput::Raw(value)
    }
}

impl From<i64> for IdInput<'_> {
    fn from(i: i64) -> Self {
        IdInput::Raw(Value::from(i))
    }
}

impl From<&str> for IdInput<'_> {
    fn from(s: &str) -> Self {
        IdInput::Raw(Value::String(s.to_string()))
    }
}

impl From<String> for IdInput<'_> {
    fn from(s: String) -> Self {
        IdInput::Raw(Value::String(s))
    }
}

impl<'a> From<&'a dyn Record> for IdInput<'a> {
    fn from(record: &'a dyn Record) -> Self {
        IdInput::Record(record)
    }
}

/// Normalize one id representation.
///
/// With `convert`, raw strings are parsed into object ids; without it they
/// pass through as opaque identifiers. Record handles and identifiers are
/// never converted.
pub fn normalize(value: IdInput<'_>, convert: bool) -> RelationResult<Identifier> {
    match value {
        IdInput::Record(record) => record
            .key()
            .ok_or_else(|| RelationError::missing_key(record.model_name())),
        IdInput::Id(id) => Ok(id),
        IdInput::Raw(value) => from_value(&value, convert),
    }
}

/// Normalize a sequence, keeping order and duplicates. A raw JSON array is
/// flattened one level.
pub fn normalize_many<'a, I>(values: I, convert: bool) -> RelationResult<Vec<Identifier>>
where
    I: IntoIterator<Item = IdInput<'a>>,
{
    let mut ids = Vec::new();
    for value in values {
        match value {
            IdInput::Raw(Value::Array(items)) => {
                for item in &items {
                    ids.push(from_value(item, convert)?);
                }
            }
            other => ids.push(normalize(other, convert)?),
        }
    }
    Ok(ids)
}

/// Reduce a raw field value to an identifier
pub fn from_value(value: &Value, convert: bool) -> RelationResult<Identifier> {
    match value {
        Value::String(s) if convert => Ok(Identifier::ObjectId(ObjectId::parse_str(s)?)),
        Value::String(s) => Ok(Identifier::Str(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) if convert => Err(RelationError::InvalidIdentifier(format!(
                "integer {} cannot be converted to an object id",
                i
            ))),
            Some(i) => Ok(Identifier::Int(i)),
            None => Err(RelationError::InvalidIdentifier(format!(
                "non-integer number {} is not an identifier",
                n
            ))),
        },
        Value::Object(map) => match (map.len(), map.get(OID_FIELD)) {
            (1, Some(Value::String(hex))) => Ok(Identifier::ObjectId(ObjectId::parse_str(hex)?)),
            _ => Err(RelationError::InvalidIdentifier(format!(
                "compound value {} is not an identifier",
                value
            ))),
        },
        Value::Null | Value::Bool(_) | Value::Array(_) => Err(RelationError::InvalidIdentifier(
            format!("{} is not an identifier", value),
        )),
    }
}

/// Canonical rendering of a stored value, if it is one
pub fn canonical_of(value: &Value) -> Option<String> {
    from_value(value, false).ok().map(|id| id.to_string())
}

/// Reduce an embedded document carrying `key_name` to that key; other values
/// are returned as-is.
pub fn reduce_to_key<'v>(value: &'v Value, key_name: &str) -> &'v Value {
    match value {
        Value::Object(map) if !map.contains_key(OID_FIELD) => map.get(key_name).unwrap_or(value),
        _ => value,
    }
}
