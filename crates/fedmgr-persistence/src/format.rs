//! Binary encoding primitives for the federation state file.
//!
//! All multi-byte integers are stored little-endian. Strings are written
//! as `[len: u32][utf-8 bytes]`. The file header is a bare `u16` format
//! version; readers validate it against the supported range before
//! looking at anything else.

use std::io::{self, Read, Write};

use crc32fast::Hasher;
use thiserror::Error;

/// Current on-disk format version. Writers always emit this.
///
/// v1: cluster records carry name, control host/port, federation name and id
/// v2: adds the federation membership state and feature flags
pub const FORMAT_VERSION: u16 = 2;

/// Oldest format version this build can still read.
pub const MIN_FORMAT_VERSION: u16 = 1;

/// Errors that can occur when reading or writing the state format.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unexpected end of file")]
    UnexpectedEof,

    #[error("incompatible state version {found}, supported range is {min}..={max}")]
    UnsupportedVersion { found: u16, min: u16, max: u16 },

    #[error("crc32 mismatch (expected {expected:#010x}, got {actual:#010x})")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl FormatError {
    /// Returns the underlying OS error code, if this error came from a
    /// failed system call.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            FormatError::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// Returns true when the file was written by an unsupported version.
    pub fn is_incompatible_version(&self) -> bool {
        matches!(self, FormatError::UnsupportedVersion { .. })
    }
}

/// Computes a CRC32 checksum over a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    let mut h = Hasher::new();
    h.update(data);
    h.finalize()
}

// ---------------------------------------------------------------------------
// write helpers
// ---------------------------------------------------------------------------

/// Writes a `u16` in little-endian.
pub fn write_u16(w: &mut impl Write, val: u16) -> io::Result<()> {
    w.write_all(&val.to_le_bytes())
}

/// Writes a `u32` in little-endian.
pub fn write_u32(w: &mut impl Write, val: u32) -> io::Result<()> {
    w.write_all(&val.to_le_bytes())
}

/// Writes an `i64` in little-endian.
pub fn write_i64(w: &mut impl Write, val: i64) -> io::Result<()> {
    w.write_all(&val.to_le_bytes())
}

/// Writes a collection length as u32, returning an error if it exceeds `u32::MAX`.
pub fn write_len(w: &mut impl Write, len: usize) -> io::Result<()> {
    let len = u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("collection length {len} exceeds u32::MAX"),
        )
    })?;
    write_u32(w, len)
}

/// Writes a length-prefixed string: `[len: u32][utf-8 bytes]`.
pub fn write_str(w: &mut impl Write, s: &str) -> io::Result<()> {
    if s.len() > MAX_FIELD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("field length {} exceeds maximum of {MAX_FIELD_LEN}", s.len()),
        ));
    }
    write_len(w, s.len())?;
    w.write_all(s.as_bytes())
}

/// Writes the file header (the format version).
pub fn write_header(w: &mut impl Write, version: u16) -> io::Result<()> {
    write_u16(w, version)
}

// ---------------------------------------------------------------------------
// read helpers
// ---------------------------------------------------------------------------

/// Reads a `u16` in little-endian.
pub fn read_u16(r: &mut impl Read) -> Result<u16, FormatError> {
    let mut buf = [0u8; 2];
    read_exact(r, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Reads a `u32` in little-endian.
pub fn read_u32(r: &mut impl Read) -> Result<u32, FormatError> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads an `i64` in little-endian.
pub fn read_i64(r: &mut impl Read) -> Result<i64, FormatError> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// Maximum length of a single string field. Cluster names and host
/// names are short; anything near this limit is a corrupt length prefix.
pub const MAX_FIELD_LEN: usize = 64 * 1024;

/// Reads a length-prefixed utf-8 string.
pub fn read_str(r: &mut impl Read) -> Result<String, FormatError> {
    let len = read_u32(r)? as usize;
    if len > MAX_FIELD_LEN {
        return Err(FormatError::InvalidData(format!(
            "field length {len} exceeds maximum of {MAX_FIELD_LEN}"
        )));
    }
    let mut buf = vec![0u8; len];
    read_exact(r, &mut buf)?;
    String::from_utf8(buf).map_err(|_| FormatError::InvalidData("string is not valid utf-8".into()))
}

/// Reads exactly `buf.len()` bytes, returning `UnexpectedEof` on short read.
fn read_exact(r: &mut impl Read, buf: &mut [u8]) -> Result<(), FormatError> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FormatError::UnexpectedEof
        } else {
            FormatError::Io(e)
        }
    })
}

/// Reads the file header and validates the version against the
/// supported range. Returns the version on success.
pub fn read_header(r: &mut impl Read) -> Result<u16, FormatError> {
    let version = read_u16(r)?;
    if !(MIN_FORMAT_VERSION..=FORMAT_VERSION).contains(&version) {
        return Err(FormatError::UnsupportedVersion {
            found: version,
            min: MIN_FORMAT_VERSION,
            max: FORMAT_VERSION,
        });
    }
    Ok(version)
}

/// Upper bound on the number of cluster records in one file. A federation
/// is a handful of clusters; a larger count means the file is corrupt.
pub const MAX_RECORD_COUNT: u32 = 4096;

/// Validates a deserialized record count.
pub fn validate_record_count(count: u32) -> Result<(), FormatError> {
    if count > MAX_RECORD_COUNT {
        return Err(FormatError::InvalidData(format!(
            "record count {count} exceeds max {MAX_RECORD_COUNT}"
        )));
    }
    Ok(())
}

/// Verifies that two CRC32 values match.
pub fn verify_crc32_values(computed: u32, stored: u32) -> Result<(), FormatError> {
    if computed != stored {
        return Err(FormatError::ChecksumMismatch {
            expected: stored,
            actual: computed,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn str_round_trip() {
        let mut buf = Vec::new();
        write_str(&mut buf, "cluster-a").unwrap();
        assert_eq!(read_str(&mut Cursor::new(&buf)).unwrap(), "cluster-a");
    }

    #[test]
    fn empty_str_round_trip() {
        let mut buf = Vec::new();
        write_str(&mut buf, "").unwrap();
        assert_eq!(read_str(&mut Cursor::new(&buf)).unwrap(), "");
    }

    #[test]
    fn header_accepts_supported_range() {
        for version in MIN_FORMAT_VERSION..=FORMAT_VERSION {
            let mut buf = Vec::new();
            write_header(&mut buf, version).unwrap();
            assert_eq!(read_header(&mut Cursor::new(&buf)).unwrap(), version);
        }
    }

    #[test]
    fn header_rejects_below_minimum() {
        let mut buf = Vec::new();
        write_header(&mut buf, MIN_FORMAT_VERSION - 1).unwrap();
        let err = read_header(&mut Cursor::new(&buf)).unwrap_err();
        assert!(err.is_incompatible_version());
    }

    #[test]
    fn header_rejects_above_maximum() {
        let mut buf = Vec::new();
        write_header(&mut buf, FORMAT_VERSION + 1).unwrap();
        let err = read_header(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(
            err,
            FormatError::UnsupportedVersion { found, .. } if found == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn truncated_input_returns_eof() {
        let buf = [0u8; 2]; // too short for u32
        let err = read_u32(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, FormatError::UnexpectedEof));
    }

    #[test]
    fn read_str_rejects_oversized_length() {
        let mut buf = Vec::new();
        write_u32(&mut buf, (MAX_FIELD_LEN as u32) + 1).unwrap();
        let err = read_str(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, FormatError::InvalidData(_)));
    }

    #[test]
    fn read_str_rejects_invalid_utf8() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 2).unwrap();
        buf.extend_from_slice(&[0xC3, 0x28]);
        let err = read_str(&mut Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, FormatError::InvalidData(_)));
    }

    #[test]
    fn record_count_bound() {
        validate_record_count(MAX_RECORD_COUNT).unwrap();
        assert!(validate_record_count(MAX_RECORD_COUNT + 1).is_err());
    }

    #[test]
    fn raw_os_error_only_for_io() {
        let io = FormatError::Io(io::Error::from_raw_os_error(13));
        assert_eq!(io.raw_os_error(), Some(13));
        assert_eq!(FormatError::UnexpectedEof.raw_os_error(), None);
    }
}
