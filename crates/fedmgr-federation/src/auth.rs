//! Shared-secret authentication for controller-to-controller frames.
//!
//! Clusters in one federation may share a secret. When configured, every
//! request and response frame carries an HMAC-SHA256 tag and frames with
//! a bad tag end the connection.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// HMAC tag length (SHA-256 output).
pub const TAG_LEN: usize = 32;

/// A secret shared by the controllers of a federation.
///
/// Holds a keyed MAC ready to be cloned per frame. `Debug` never prints
/// the key.
#[derive(Clone)]
pub struct ControllerSecret {
    mac: HmacSha256,
}

impl ControllerSecret {
    /// Creates a secret from a password string.
    pub fn from_password(password: &str) -> Self {
        // HMAC accepts keys of any length
        let mac = HmacSha256::new_from_slice(password.as_bytes())
            .unwrap_or_else(|_| unreachable!("hmac key length is unrestricted"));
        Self { mac }
    }

    /// Reads the secret from a file, ignoring trailing whitespace.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let contents = std::fs::read_to_string(path)?;
        let password = contents.trim_end();
        if password.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("controller auth file {} is empty", path.display()),
            ));
        }
        Ok(Self::from_password(password))
    }

    /// Computes the tag for `payload`.
    pub fn sign(&self, payload: &[u8]) -> [u8; TAG_LEN] {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.finalize().into_bytes().into()
    }

    /// Checks `tag` against `payload` in constant time.
    pub fn verify(&self, payload: &[u8], tag: &[u8]) -> bool {
        tag.len() == TAG_LEN && bool::from(self.sign(payload).ct_eq(tag))
    }
}

impl std::fmt::Debug for ControllerSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ControllerSecret([redacted])")
    }
}
