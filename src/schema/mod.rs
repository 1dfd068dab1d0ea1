//! Schema-level types shared by every entity: the custom 16-byte identifier,
//! its default generator and its validator.

use crate::core::Value;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const ID_LEN: usize = 16;

/// Caller-defined entity identifier. Stored as raw bytes, shown as a UUID.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Id([u8; ID_LEN]);

#[derive(Error, Debug)]
pub enum IdError {
    #[error("id must be {expected} bytes long, got {0}", expected = ID_LEN)]
    Length(usize),

    #[error("id must not be the nil id")]
    Nil,

    #[error("cannot scan {0} into an id")]
    NotBytes(&'static str),

    #[error(transparent)]
    Parse(#[from] uuid::Error),
}

impl Id {
    pub const NIL: Id = Id([0; ID_LEN]);

    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0; ID_LEN]
    }
}

/// Default value generator for `id` fields.
pub fn new_id() -> Id {
    Id(*Uuid::new_v4().as_bytes())
}

/// Validator for `id` fields; runs on the raw bytes.
pub fn validate_id(bytes: &[u8]) -> Result<(), IdError> {
    if bytes.len() != ID_LEN {
        return Err(IdError::Length(bytes.len()));
    }
    if bytes.iter().all(|b| *b == 0) {
        return Err(IdError::Nil);
    }
    Ok(())
}

impl TryFrom<&[u8]> for Id {
    type Error = IdError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; ID_LEN] = bytes
            .try_into()
            .map_err(|_| IdError::Length(bytes.len()))?;
        Ok(Self(raw))
    }
}

impl TryFrom<&Value> for Id {
    type Error = IdError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bytes(b) => Id::try_from(b.as_slice()),
            other => Err(IdError::NotBytes(other.type_name())),
        }
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        Value::Bytes(id.0.to_vec())
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Self(*uuid.as_bytes())
    }
}

impl FromStr for Id {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Uuid::parse_str(s)?.into())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).hyphenated())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Uuid::from_bytes(self.0).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Uuid::deserialize(deserializer).map(Id::from)
    }
}
