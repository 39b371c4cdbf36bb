//! Persistence layer: versioned index files.
//!
//! A saved index is a fixed header (see [`header`]) followed by the bincode
//! encoded point store and algorithm structure.

pub mod header;
pub mod serialization;

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::info;

use crate::datatype::Element;
use crate::distance::Distance;
use crate::error::{NnError, Result};
use crate::index::NnIndex;
use crate::params::IndexParams;
use crate::registry::create_index_by_type;

use self::header::IndexHeader;

/// Write `index` to `path`, replacing any existing file.
pub fn save_index<D: Distance>(index: &dyn NnIndex<D>, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|source| NnError::CannotOpenFile {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    index.save_index(&mut writer)?;
    writer.flush()?;

    info!(
        path = %path.display(),
        algorithm = %index.algorithm(),
        points = index.size(),
        "saved index"
    );
    Ok(())
}

/// Read only the header of a saved index.
pub fn read_header(path: &Path) -> Result<IndexHeader> {
    let file = File::open(path).map_err(|source| NnError::CannotOpenFile {
        path: path.to_path_buf(),
        source,
    })?;
    IndexHeader::read_from(&mut BufReader::new(file))
}

/// Restore an index saved with [`save_index`].
///
/// The element type recorded in the file must match `D::Element`; the
/// algorithm is whatever the file claims.
pub fn load_saved_index<D: Distance>(path: &Path, distance: D) -> Result<Box<dyn NnIndex<D>>> {
    let file = File::open(path).map_err(|source| NnError::CannotOpenFile {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let header = IndexHeader::read_from(&mut reader)?;
    let expected = <D::Element as Element>::DATA_TYPE;
    if header.data_type != expected {
        return Err(NnError::IncompatibleIndex {
            expected,
            found: header.data_type,
        });
    }

    let mut index = create_index_by_type(
        header.algorithm,
        None,
        &IndexParams::new(header.algorithm),
        distance,
    )?;
    reader.seek(SeekFrom::Start(0))?;
    index.load_index(&mut reader)?;

    info!(
        path = %path.display(),
        algorithm = %header.algorithm,
        points = index.size(),
        "loaded index"
    );
    Ok(index)
}
