use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A globally unique identifier for one indexed chunk.
///
/// Ids are 128 random bits minted at insertion time. Random ids stay unique
/// across `clear`-and-rebuild cycles, so a query running concurrently with a
/// rebuild can never observe an id that aliases a different chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(u128);

impl ChunkId {
    /// Mint a fresh random id.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().as_u128())
    }

    /// The numeric value used as the key in redb tables.
    pub fn value(self) -> u128 {
        self.0
    }

    /// Rebuild an id from its stored numeric value.
    pub fn from_value(value: u128) -> Self {
        Self(value)
    }

    /// The short hex form for human display (e.g. "a1b2c3").
    pub fn short(self) -> String {
        format!("{:032x}", self.0)[..6].to_string()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for ChunkId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u128::from_str_radix(s, 16).map(Self)
    }
}

// Serialized as the 32-char hex string: the journal is JSON, and JSON
// numbers cannot carry 128 bits.
impl Serialize for ChunkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChunkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
