//! Fixed-size header at the start of every saved index.
//!
//! Layout, little-endian:
//! [magic: 8][version: u32][data type: u32][algorithm: u32][rows: u64][cols: u64]

use std::io::{Read, Write};

use crate::datatype::DataType;
use crate::error::{NnError, Result};
use crate::params::Algorithm;

pub const MAGIC: [u8; 8] = *b"NNINDEX\0";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 36;

/// Metadata describing a saved index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub version: u32,
    pub data_type: DataType,
    pub algorithm: Algorithm,
    /// Live points at save time
    pub rows: u64,
    pub cols: u64,
}

impl IndexHeader {
    pub fn new(data_type: DataType, algorithm: Algorithm, rows: usize, cols: usize) -> Self {
        Self {
            version: FORMAT_VERSION,
            data_type,
            algorithm,
            rows: rows as u64,
            cols: cols as u64,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.data_type.code().to_le_bytes());
        buf[16..20].copy_from_slice(&self.algorithm.code().to_le_bytes());
        buf[20..28].copy_from_slice(&self.rows.to_le_bytes());
        buf[28..36].copy_from_slice(&self.cols.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if buf[0..8] != MAGIC {
            return Err(NnError::InvalidFormat("bad magic bytes".to_string()));
        }

        let version = u32_at(buf, 8);
        if version != FORMAT_VERSION {
            return Err(NnError::InvalidFormat(format!(
                "unsupported format version {}",
                version
            )));
        }

        let code = u32_at(buf, 12);
        let data_type = DataType::from_code(code)
            .ok_or_else(|| NnError::InvalidFormat(format!("unknown data type code {}", code)))?;
        let algorithm = Algorithm::from_code(u32_at(buf, 16))?;

        Ok(Self {
            version,
            data_type,
            algorithm,
            rows: u64_at(buf, 20),
            cols: u64_at(buf, 28),
        })
    }

    pub fn write_to(&self, writer: &mut dyn Write) -> Result<()> {
        writer.write_all(&self.encode())?;
        Ok(())
    }

    /// Read exactly one header; a short stream is an invalid file.
    pub fn read_from(reader: &mut dyn Read) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                NnError::InvalidFormat("file too small for header".to_string())
            } else {
                NnError::IoError(e)
            }
        })?;
        Self::decode(&buf)
    }
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn u64_at(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexHeader {
        IndexHeader::new(DataType::Float32, Algorithm::KdTree, 1000, 128)
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample();
        let decoded = IndexHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_byte_layout() {
        let buf = sample().encode();
        assert_eq!(&buf[0..8], b"NNINDEX\0");
        assert_eq!(buf[12], 8); // float32
        assert_eq!(buf[16], 1); // kdtree
        assert_eq!(u64_at(&buf, 28), 128);
    }

    #[test]
    fn test_bad_magic() {
        let mut buf = sample().encode();
        buf[0] = b'X';
        assert!(matches!(IndexHeader::decode(&buf), Err(NnError::InvalidFormat(_))));
    }

    #[test]
    fn test_unknown_version() {
        let mut buf = sample().encode();
        buf[8..12].copy_from_slice(&7u32.to_le_bytes());
        assert!(matches!(IndexHeader::decode(&buf), Err(NnError::InvalidFormat(_))));
    }

    #[test]
    fn test_unknown_algorithm() {
        let mut buf = sample().encode();
        buf[16..20].copy_from_slice(&42u32.to_le_bytes());
        assert!(matches!(
            IndexHeader::decode(&buf),
            Err(NnError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_short_stream() {
        let mut short: &[u8] = &[0u8; 10];
        assert!(matches!(
            IndexHeader::read_from(&mut short),
            Err(NnError::InvalidFormat(_))
        ));
    }
}
