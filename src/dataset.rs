//! Plain-text point sets: one point per line, comma-separated coordinates.

use std::fs;
use std::path::Path;

use ndarray::Array2;

use crate::error::{NnError, Result};

/// Parse a point from a comma-separated string
pub fn parse_point(s: &str) -> Result<Vec<f32>> {
    s.split(',')
        .map(|x| {
            x.trim()
                .parse::<f32>()
                .map_err(|_| NnError::invalid_param("point", format!("invalid number `{}`", x.trim())))
        })
        .collect()
}

/// Stack equally sized rows into a matrix.
pub fn points_from_rows(rows: Vec<Vec<f32>>) -> Result<Array2<f32>> {
    let cols = rows.first().map_or(0, Vec::len);
    let mut data = Vec::with_capacity(rows.len() * cols);
    for row in &rows {
        if row.len() != cols {
            return Err(NnError::DimensionMismatch {
                expected: cols,
                actual: row.len(),
            });
        }
        data.extend_from_slice(row);
    }
    Array2::from_shape_vec((rows.len(), cols), data)
        .map_err(|e| NnError::InvalidFormat(e.to_string()))
}

/// Parse a whole point set. Blank lines and lines starting with `#` are skipped.
pub fn parse_points(text: &str) -> Result<Array2<f32>> {
    let rows = text
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            parse_point(line).map_err(|e| match e {
                NnError::InvalidParameter { reason, .. } => {
                    NnError::invalid_param("points", format!("line {}: {}", n + 1, reason))
                }
                other => other,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    points_from_rows(rows)
}

pub fn read_points(path: &Path) -> Result<Array2<f32>> {
    let text = fs::read_to_string(path).map_err(|source| NnError::CannotOpenFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_points(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_point() {
        let p = parse_point("1.0, 2.0, 3.0").unwrap();
        assert_eq!(p, vec![1.0, 2.0, 3.0]);
        assert!(parse_point("1.0, x").is_err());
    }

    #[test]
    fn test_parse_points_skips_comments() {
        let points = parse_points("# header\n0,0\n\n1,0\n0,1\n").unwrap();
        assert_eq!(points.dim(), (3, 2));
        assert_eq!(points[[1, 0]], 1.0);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = parse_points("0,0\n1,2,3\n");
        assert!(matches!(result, Err(NnError::DimensionMismatch { expected: 2, actual: 3 })));
    }

    #[test]
    fn test_read_points_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "0.5,1.5").unwrap();
        writeln!(file, "2.5,3.5").unwrap();
        let points = read_points(file.path()).unwrap();
        assert_eq!(points.nrows(), 2);
        assert_eq!(points[[1, 1]], 3.5);
    }
}
