//! Reader and writer for NumPy `.npy` arrays.
//!
//! Point samples are persisted as `.npy` files: a magic string, a version,
//! a Python-literal header dictionary, then the raw element data. This
//! module decodes versions 1.0, 2.0 and 3.0 with the numeric dtypes numpy
//! emits for point data (`f4`, `f8`, signed and unsigned integers of 1 to
//! 8 bytes, `b1`) in either byte order and either memory order, and always
//! hands back `f64` values in C (row-major) order.
//!
//! Arrays are written as version 1.0 little-endian `<f8`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{MeshError, MeshResult};

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// A dense numeric array decoded from an `.npy` file.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    /// Extent along each dimension.
    pub shape: Vec<usize>,
    /// Elements in row-major order.
    pub data: Vec<f64>,
}

impl NpyArray {
    /// Create a 2-D array from row-major data.
    ///
    /// Returns `None` if `data.len() != rows * cols`.
    pub fn from_rows(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        if rows.checked_mul(cols)? != data.len() {
            return None;
        }
        Some(Self {
            shape: vec![rows, cols],
            data,
        })
    }

    /// Number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Extent of the first dimension (0 for a scalar).
    #[inline]
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Extent of the second dimension (0 when the array has fewer than two).
    #[inline]
    pub fn cols(&self) -> usize {
        self.shape.get(1).copied().unwrap_or(0)
    }

    /// Borrow row `i` of a 2-D array.
    pub fn row(&self, i: usize) -> Option<&[f64]> {
        if self.ndim() != 2 {
            return None;
        }
        let cols = self.cols();
        let start = i.checked_mul(cols)?;
        self.data.get(start..start + cols)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Float,
    Int,
    Uint,
    Bool,
}

#[derive(Debug, Clone, Copy)]
struct Dtype {
    order: ByteOrder,
    kind: Kind,
    size: usize,
}

impl Dtype {
    fn parse(descr: &str) -> Option<Self> {
        let mut chars = descr.chars();
        let first = chars.next()?;
        let (order, rest) = match first {
            '<' => (ByteOrder::Little, &descr[1..]),
            '>' => (ByteOrder::Big, &descr[1..]),
            '|' | '=' => (native_order(), &descr[1..]),
            _ => (native_order(), descr),
        };
        let kind = match rest.chars().next()? {
            'f' => Kind::Float,
            'i' => Kind::Int,
            'u' => Kind::Uint,
            'b' => Kind::Bool,
            _ => return None,
        };
        let size: usize = rest[1..].parse().ok()?;
        let valid = match kind {
            Kind::Float => matches!(size, 4 | 8),
            Kind::Int | Kind::Uint => matches!(size, 1 | 2 | 4 | 8),
            Kind::Bool => size == 1,
        };
        valid.then_some(Self { order, kind, size })
    }

    fn decode(&self, bytes: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        buf[..self.size].copy_from_slice(bytes);
        if self.order == ByteOrder::Big {
            buf[..self.size].reverse();
        }
        match (self.kind, self.size) {
            (Kind::Float, 4) => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            (Kind::Float, _) => f64::from_le_bytes(buf),
            (Kind::Int, 1) => buf[0] as i8 as f64,
            (Kind::Int, 2) => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            (Kind::Int, 4) => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            (Kind::Int, _) => i64::from_le_bytes(buf) as f64,
            // Zero-extended into the little-endian buffer.
            (Kind::Uint, _) | (Kind::Bool, _) => u64::from_le_bytes(buf) as f64,
        }
    }
}

fn native_order() -> ByteOrder {
    if cfg!(target_endian = "big") {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    }
}

/// Read an `.npy` file from disk.
pub fn read_npy(path: &Path) -> MeshResult<NpyArray> {
    let file = File::open(path).map_err(|e| MeshError::io_read(path, e))?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| MeshError::io_read(path, e))?;
    parse_npy(&bytes, path)
}

/// Decode an in-memory `.npy` buffer. `path` is used for error context only.
pub fn parse_npy(bytes: &[u8], path: &Path) -> MeshResult<NpyArray> {
    let fail = |details: String| MeshError::parse_error(path, details);

    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(fail("missing NPY magic string".into()));
    }
    let major = bytes[6];
    let minor = bytes[7];
    let (header_len, header_start): (usize, usize) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(fail("truncated header length".into()));
            }
            (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            )
        }
        _ => return Err(fail(format!("unsupported NPY version {}.{}", major, minor))),
    };

    let header_end = header_start
        .checked_add(header_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| fail("header extends past end of file".into()))?;
    let header = std::str::from_utf8(&bytes[header_start..header_end])
        .map_err(|_| fail("header is not valid text".into()))?;

    let descr = header_value(header, "descr")
        .and_then(parse_quoted)
        .ok_or_else(|| fail("header has no 'descr' entry".into()))?;
    let dtype = Dtype::parse(descr).ok_or_else(|| fail(format!("unsupported dtype '{}'", descr)))?;
    let fortran_order = match header_value(header, "fortran_order") {
        Some(v) if v.starts_with("True") => true,
        Some(v) if v.starts_with("False") => false,
        _ => return Err(fail("header has no valid 'fortran_order' entry".into())),
    };
    let shape = header_value(header, "shape")
        .and_then(parse_shape)
        .ok_or_else(|| fail("header has no valid 'shape' entry".into()))?;

    let count = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| fail("shape overflows".into()))?;
    let payload = &bytes[header_end..];
    let needed = count
        .checked_mul(dtype.size)
        .ok_or_else(|| fail("shape overflows".into()))?;
    if payload.len() < needed {
        return Err(fail(format!(
            "payload holds {} bytes, shape {:?} needs {}",
            payload.len(),
            shape,
            needed
        )));
    }

    let mut data: Vec<f64> = payload[..needed]
        .chunks_exact(dtype.size)
        .map(|chunk| dtype.decode(chunk))
        .collect();

    if fortran_order && shape.len() > 1 {
        data = fortran_to_c_order(&data, &shape);
    }

    debug!(
        version = format!("{}.{}", major, minor),
        descr,
        ?shape,
        fortran_order,
        "Decoded NPY array"
    );

    Ok(NpyArray { shape, data })
}

/// Write a 2-D array as NPY 1.0 `<f8`.
pub fn write_npy(array: &NpyArray, path: &Path) -> MeshResult<()> {
    let file = File::create(path).map_err(|e| MeshError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(&encode_npy(array))
        .and_then(|_| writer.flush())
        .map_err(|e| MeshError::io_write(path, e))
}

/// Encode an array as NPY 1.0 `<f8` bytes.
pub fn encode_npy(array: &NpyArray) -> Vec<u8> {
    let shape = match array.shape.as_slice() {
        [] => "()".to_string(),
        [n] => format!("({},)", n),
        dims => format!(
            "({})",
            dims.iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': {}, }}",
        shape
    );
    // Magic + version + length + header + newline is padded to 64 bytes.
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let mut out = Vec::with_capacity(10 + header.len() + array.data.len() * 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for v in &array.data {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Return the raw text following `'key':` in a header dictionary.
fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let single = format!("'{}'", key);
    let double = format!("\"{}\"", key);
    let pos = header
        .find(&single)
        .map(|p| p + single.len())
        .or_else(|| header.find(&double).map(|p| p + double.len()))?;
    let rest = header[pos..].trim_start();
    let rest = rest.strip_prefix(':')?;
    Some(rest.trim_start())
}

fn parse_quoted(value: &str) -> Option<&str> {
    let quote = value.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let inner = &value[1..];
    let end = inner.find(quote)?;
    Some(&inner[..end])
}

fn parse_shape(value: &str) -> Option<Vec<usize>> {
    let inner = value.strip_prefix('(')?;
    let end = inner.find(')')?;
    inner[..end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('L').parse().ok())
        .collect()
}

fn fortran_to_c_order(data: &[f64], shape: &[usize]) -> Vec<f64> {
    let ndim = shape.len();
    let mut f_strides = vec![1usize; ndim];
    for d in 1..ndim {
        f_strides[d] = f_strides[d - 1] * shape[d - 1];
    }

    let mut out = Vec::with_capacity(data.len());
    let mut index = vec![0usize; ndim];
    for _ in 0..data.len() {
        let offset: usize = index.iter().zip(&f_strides).map(|(i, s)| i * s).sum();
        out.push(data[offset]);
        // Advance the C-order multi-index, last axis fastest.
        for d in (0..ndim).rev() {
            index[d] += 1;
            if index[d] < shape[d] {
                break;
            }
            index[d] = 0;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn raw_npy(descr: &str, fortran: bool, shape: &str, payload: &[u8]) -> Vec<u8> {
        let header = format!(
            "{{'descr': '{}', 'fortran_order': {}, 'shape': {}, }}\n",
            descr,
            if fortran { "True" } else { "False" },
            shape
        );
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn dummy() -> PathBuf {
        PathBuf::from("test.npy")
    }

    #[test]
    fn test_encode_then_parse() {
        let array = NpyArray::from_rows(2, 3, vec![0.0, 1.0, 2.0, 3.5, -4.0, 5.25]).unwrap();
        let bytes = encode_npy(&array);
        // Header block is 64-byte aligned.
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);

        let decoded = parse_npy(&bytes, &dummy()).unwrap();
        assert_eq!(decoded, array);
        assert_eq!(decoded.row(1), Some(&[3.5, -4.0, 5.25][..]));
    }

    #[test]
    fn test_version_two_header() {
        let header = "{'descr': '<f8', 'fortran_order': False, 'shape': (1, 3), }\n";
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&[2, 0]);
        bytes.extend_from_slice(&(header.len() as u32).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        for v in [1.0f64, 2.0, 3.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }

        let array = parse_npy(&bytes, &dummy()).unwrap();
        assert_eq!(array.shape, vec![1, 3]);
        assert_eq!(array.data, vec![1.0, 2.0, 3.0]);

        // Header length pointing past the end of the file.
        bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(parse_npy(&bytes, &dummy()).is_err());
    }

    #[test]
    fn test_float32_and_big_endian() {
        let payload: Vec<u8> = [1.5f32, -2.0, 3.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let array = parse_npy(&raw_npy("<f4", false, "(1, 3)", &payload), &dummy()).unwrap();
        assert_eq!(array.data, vec![1.5, -2.0, 3.0]);

        let payload: Vec<u8> = [7.0f64, 8.0].iter().flat_map(|v| v.to_be_bytes()).collect();
        let array = parse_npy(&raw_npy(">f8", false, "(2,)", &payload), &dummy()).unwrap();
        assert_eq!(array.shape, vec![2]);
        assert_eq!(array.data, vec![7.0, 8.0]);
    }

    #[test]
    fn test_integer_dtypes() {
        let payload: Vec<u8> = [-3i32, 4, 5].iter().flat_map(|v| v.to_le_bytes()).collect();
        let array = parse_npy(&raw_npy("<i4", false, "(1, 3)", &payload), &dummy()).unwrap();
        assert_eq!(array.data, vec![-3.0, 4.0, 5.0]);

        let array = parse_npy(&raw_npy("|u1", false, "(3,)", &[0, 128, 255]), &dummy()).unwrap();
        assert_eq!(array.data, vec![0.0, 128.0, 255.0]);
    }

    #[test]
    fn test_fortran_order_is_transposed() {
        // Column-major storage of [[1, 2, 3], [4, 5, 6]].
        let payload: Vec<u8> = [1.0f64, 4.0, 2.0, 5.0, 3.0, 6.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let array = parse_npy(&raw_npy("<f8", true, "(2, 3)", &payload), &dummy()).unwrap();
        assert_eq!(array.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_empty_rows() {
        let array = parse_npy(&raw_npy("<f8", false, "(0, 3)", &[]), &dummy()).unwrap();
        assert_eq!(array.rows(), 0);
        assert_eq!(array.cols(), 3);
        assert!(array.data.is_empty());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let err = parse_npy(b"not an npy file at all", &dummy()).unwrap_err();
        assert!(matches!(err, MeshError::ParseError { .. }));
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let payload = 1.0f64.to_le_bytes();
        let err = parse_npy(&raw_npy("<f8", false, "(2, 3)", &payload), &dummy()).unwrap_err();
        assert!(err.to_string().contains("payload"));
    }

    #[test]
    fn test_rejects_unsupported_dtype() {
        let err = parse_npy(&raw_npy("<c16", false, "(1,)", &[0; 16]), &dummy()).unwrap_err();
        assert!(err.to_string().contains("dtype"));
    }

    #[test]
    fn test_write_and_read_file() {
        let file = tempfile::NamedTempFile::with_suffix(".npy").unwrap();
        let array = NpyArray::from_rows(1, 6, vec![1.0, 2.0, 3.0, 0.0, 0.0, 1.0]).unwrap();
        write_npy(&array, file.path()).unwrap();
        assert_eq!(read_npy(file.path()).unwrap(), array);
    }

    #[test]
    fn test_from_rows_checks_length() {
        assert!(NpyArray::from_rows(2, 3, vec![0.0; 5]).is_none());
    }
}
