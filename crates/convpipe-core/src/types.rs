//! Strong type definitions for pipeline records.
//!
//! Identifiers are newtypes so a record id can never be confused with a
//! currency code or any other string field.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque record identifier assigned by a store at creation.
///
/// Generated ids are 128 random bits rendered as 32 lowercase hex chars.
/// An empty id means "not yet stored".
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Byte length of the random part of a generated id.
    pub const RANDOM_BYTES: usize = 16;

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::RANDOM_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// The unassigned id.
    pub const fn empty() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "RecordId(<unassigned>)")
        } else {
            write!(f, "RecordId({})", self.0)
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Discriminator for the three record types flowing through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Request,
    Response,
    Log,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::Request, RecordKind::Response, RecordKind::Log];

    /// Stable machine name, used for table and collection names.
    pub const fn as_str(self) -> &'static str {
        match self {
            RecordKind::Request => "requests",
            RecordKind::Response => "responses",
            RecordKind::Log => "conversion_logs",
        }
    }

    /// Heading printed by the reporter above a batch of new records.
    pub const fn heading(self) -> &'static str {
        match self {
            RecordKind::Request => "--- New Conversion Requests ---",
            RecordKind::Response => "--- New Conversion Responses ---",
            RecordKind::Log => "--- New Conversion Logs ---",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
