//! Entity identifiers
//!
//! An [`Id`] is an opaque uuid plus a type label. Time-ordered (v7) uuids
//! carry their creation time in the first 48 bits, which the shard allocator
//! uses to recognise brand-new nodes without touching the store.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::{Builder, Uuid};

use crate::error::{GraphError, Result};
use crate::time::system_millis;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id {
    uuid: Uuid,
    id_type: String,
}

impl Id {
    pub fn new(uuid: Uuid, id_type: impl Into<String>) -> Result<Self> {
        let id = Self { uuid, id_type: id_type.into() };
        id.validate()?;
        Ok(id)
    }

    /// Fresh identifier created now.
    pub fn generate(id_type: impl Into<String>) -> Result<Self> {
        Self::new(time_uuid(system_millis()), id_type)
    }

    /// Identifier whose embedded creation time is `millis`.
    pub fn generate_at(id_type: impl Into<String>, millis: u64) -> Result<Self> {
        Self::new(time_uuid(millis), id_type)
    }

    pub fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    pub fn id_type(&self) -> &str {
        &self.id_type
    }

    /// Creation time embedded in the uuid, if it is time ordered.
    pub fn created_millis(&self) -> Option<u64> {
        uuid_millis(&self.uuid)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id_type.is_empty() {
            return Err(GraphError::Validation(format!("id {} has an empty type", self.uuid)));
        }
        if self.uuid.is_nil() {
            return Err(GraphError::Validation("id uuid must not be nil".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id_type, self.uuid)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id_type, self.uuid)
    }
}

pub fn time_uuid(millis: u64) -> Uuid {
    let entropy: [u8; 10] = rand::random();
    Builder::from_unix_timestamp_millis(millis, &entropy).into_uuid()
}

pub fn uuid_millis(uuid: &Uuid) -> Option<u64> {
    if uuid.get_version_num() != 7 {
        return None;
    }
    let bytes = uuid.as_bytes();
    Some(bytes[..6].iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
}
