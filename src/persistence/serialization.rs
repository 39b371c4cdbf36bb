//! Serialization utilities: bincode for index payloads.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{NnError, Result};

/// Encode data to bincode bytes.
pub fn to_bincode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| NnError::SerializationError(e.to_string()))
}

/// Decode data from bincode bytes.
pub fn from_bincode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| NnError::SerializationError(e.to_string()))
}

/// Stream a value into `writer`.
pub fn write_bincode<T: Serialize + ?Sized>(writer: &mut dyn Write, value: &T) -> Result<()> {
    bincode::serialize_into(writer, value).map_err(|e| NnError::SerializationError(e.to_string()))
}

/// Read one value from `reader`, consuming exactly its encoded bytes.
pub fn read_bincode<T: DeserializeOwned>(reader: &mut dyn Read) -> Result<T> {
    bincode::deserialize_from(reader).map_err(|e| NnError::SerializationError(e.to_string()))
}
