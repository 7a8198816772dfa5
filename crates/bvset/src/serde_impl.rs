//! Serde support: a vector is carried as its compressed wire image.

use crate::config::CompressionLevel;
use crate::serial::{deserialize, serialize};
use crate::vector::BitVector;

impl serde::Serialize for BitVector {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let bytes = serialize(self, CompressionLevel::default());
        serializer.serialize_bytes(&bytes)
    }
}

impl<'de> serde::Deserialize<'de> for BitVector {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = <Vec<u8> as serde::Deserialize>::deserialize(deserializer)?;
        deserialize(&bytes).map_err(serde::de::Error::custom)
    }
}
