//! MD5 checksums over representation plaintext.
//!
//! The record format stores the raw 16-byte digest; hex is only for
//! display and error reporting.

use std::fmt;

use md5::{Digest, Md5};

pub const MD5_DIGEST_LEN: usize = 16;

/// A 16-byte MD5 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Md5Digest(pub [u8; MD5_DIGEST_LEN]);

impl Md5Digest {
    /// Digest of the given bytes.
    pub fn of(bytes: &[u8]) -> Md5Digest {
        let mut hasher = Md5::new();
        hasher.update(bytes);
        Md5Digest(hasher.finalize().into())
    }

    /// Build from a raw digest slice; `None` unless exactly 16 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Md5Digest> {
        let array: [u8; MD5_DIGEST_LEN] = bytes.try_into().ok()?;
        Some(Md5Digest(array))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(MD5_DIGEST_LEN * 2);
        for byte in self.0 {
            s.push(char::from_digit(u32::from(byte >> 4), 16).expect("nibble"));
            s.push(char::from_digit(u32::from(byte & 0xf), 16).expect("nibble"));
        }
        s
    }
}

impl fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests() {
        // Well-known MD5 test vectors.
        assert_eq!(
            Md5Digest::of(b"").to_hex(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            Md5Digest::of(b"abc").to_hex(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn from_bytes_length_checked() {
        let digest = Md5Digest::of(b"abc");
        assert_eq!(Md5Digest::from_bytes(digest.as_bytes()), Some(digest));
        assert_eq!(Md5Digest::from_bytes(b"short"), None);
    }
}
