//! The federation state file.
//!
//! One file per controller state directory (`fed_mgr_state`). It holds the
//! list of clusters in the federation the controller belonged to when it
//! last shut down, with the local cluster's own record first.
//!
//! File layout:
//! ```text
//! [version: 2B][saved_at: 8B][record_count: 4B]
//! [records...]
//! [footer_crc32: 4B]
//! ```
//!
//! Each record:
//! ```text
//! [name][control_host][control_port: 2B][fed_name][fed_id: 4B]
//! v2+: [fed_state: 4B][fed_flags: 4B]
//! ```
//! Strings are `[len: 4B][utf-8]`. `saved_at` is unix seconds. The CRC
//! covers every byte before the footer.
//!
//! Writes go to `<file>.new`, are fsynced, and then rotated into place
//! with hard links: `<file>` becomes `<file>.old` and `<file>.new`
//! becomes `<file>`. Renaming over the live file is never used.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::format::{self, FormatError};

/// Name of the state file inside the state directory.
pub const STATE_FILE: &str = "fed_mgr_state";

/// One cluster as stored in the state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEntry {
    pub name: String,
    pub control_host: String,
    pub control_port: u16,
    /// Name of the federation the cluster belongs to.
    pub fed_name: String,
    /// Cluster id assigned by the federation.
    pub fed_id: u32,
    pub fed_state: u32,
    pub fed_flags: u32,
}

/// The decoded contents of a state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    /// Format version the record was decoded from (or will be written as).
    pub version: u16,
    /// Unix timestamp (seconds) of the save.
    pub saved_at: i64,
    pub clusters: Vec<ClusterEntry>,
}

impl StateRecord {
    /// Creates a record stamped with the current time and format version.
    pub fn new(clusters: Vec<ClusterEntry>) -> Self {
        let saved_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self {
            version: format::FORMAT_VERSION,
            saved_at,
            clusters,
        }
    }

    /// Encodes the record using `self.version`'s layout.
    pub fn encode(&self) -> Result<Vec<u8>, FormatError> {
        let mut buf = Vec::new();
        format::write_header(&mut buf, self.version)?;
        format::write_i64(&mut buf, self.saved_at)?;
        format::write_len(&mut buf, self.clusters.len())?;
        for entry in &self.clusters {
            format::write_str(&mut buf, &entry.name)?;
            format::write_str(&mut buf, &entry.control_host)?;
            format::write_u16(&mut buf, entry.control_port)?;
            format::write_str(&mut buf, &entry.fed_name)?;
            format::write_u32(&mut buf, entry.fed_id)?;
            if self.version >= 2 {
                format::write_u32(&mut buf, entry.fed_state)?;
                format::write_u32(&mut buf, entry.fed_flags)?;
            }
        }
        let checksum = format::crc32(&buf);
        format::write_u32(&mut buf, checksum)?;
        Ok(buf)
    }

    /// Decodes a complete state file.
    ///
    /// The version is checked before anything else so a file from an
    /// unsupported release is rejected without interpreting its body.
    pub fn decode(data: &[u8]) -> Result<Self, FormatError> {
        let mut r = Cursor::new(data);
        let version = format::read_header(&mut r)?;

        if data.len() < 4 {
            return Err(FormatError::UnexpectedEof);
        }
        let (body, footer) = data.split_at(data.len() - 4);
        let stored = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
        format::verify_crc32_values(format::crc32(body), stored)?;

        let mut r = Cursor::new(body);
        r.set_position(2);
        let saved_at = format::read_i64(&mut r)?;
        let count = format::read_u32(&mut r)?;
        format::validate_record_count(count)?;

        let mut clusters = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = format::read_str(&mut r)?;
            let control_host = format::read_str(&mut r)?;
            let control_port = format::read_u16(&mut r)?;
            let fed_name = format::read_str(&mut r)?;
            let fed_id = format::read_u32(&mut r)?;
            let (fed_state, fed_flags) = if version >= 2 {
                (format::read_u32(&mut r)?, format::read_u32(&mut r)?)
            } else {
                (0, 0)
            };
            clusters.push(ClusterEntry {
                name,
                control_host,
                control_port,
                fed_name,
                fed_id,
                fed_state,
                fed_flags,
            });
        }

        if r.position() as usize != body.len() {
            return Err(FormatError::InvalidData(format!(
                "{} trailing bytes after {count} records",
                body.len() - r.position() as usize
            )));
        }

        Ok(Self {
            version,
            saved_at,
            clusters,
        })
    }
}

/// Returns the state file path inside a state directory.
pub fn state_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATE_FILE)
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Writes `record` to the state directory using the link/unlink rotation.
///
/// If the new file cannot be created or written, it is removed and the
/// existing state file is left untouched.
pub fn write_state(state_dir: &Path, record: &StateRecord) -> Result<(), FormatError> {
    let data = record.encode()?;

    let reg_file = state_path(state_dir);
    let old_file = sibling_path(&reg_file, ".old");
    let new_file = sibling_path(&reg_file, ".new");

    if let Err(e) = write_synced(&new_file, &data) {
        let _ = fs::remove_file(&new_file);
        return Err(e.into());
    }

    let _ = fs::remove_file(&old_file);
    if let Err(e) = fs::hard_link(&reg_file, &old_file) {
        // the first save has no previous file to keep
        debug!(
            "unable to link {} -> {}: {e}",
            reg_file.display(),
            old_file.display()
        );
    }
    let _ = fs::remove_file(&reg_file);
    // on failure the fresh data stays in `.new` rather than being discarded
    fs::hard_link(&new_file, &reg_file)?;
    let _ = fs::remove_file(&new_file);

    Ok(())
}

/// Creates `path` with owner-only permissions, writes `data` and fsyncs.
fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file: File = opts.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Reads and decodes the state file. Returns `Ok(None)` when the file
/// does not exist, which is the normal first-start case.
pub fn read_state(state_dir: &Path) -> Result<Option<StateRecord>, FormatError> {
    let path = state_path(state_dir);
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    StateRecord::decode(&data).map(Some)
}
