use std::fmt;

use sha2::{Digest as _, Sha256};
use zeroize::{Zeroize, Zeroizing};

use super::secret::SharedKey;

/// Size of a locally produced digest in bytes
pub const DIGEST_SIZE: usize = 32;

/// Appended to the concatenated parts before deriving a key, so a candidate
/// key never equals a plain digest of the same material. The spelling is part
/// of the wire contract and must not be corrected.
pub const KEY_DOMAIN_SEPARATOR: &[u8] = b"MAGIC COOKIE FOR SENSOR AUTHENTICAION";

/// A public digest, either computed locally or received from a peer
///
/// Peer digests are not required to be [`DIGEST_SIZE`] bytes long; see
/// [`digests_match`] for how differing lengths are compared.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Digest(Vec<u8>);

impl Digest {
    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        Ok(Self(hex::decode(hex_str)?))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<[u8; DIGEST_SIZE]> for Digest {
    fn from(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Digest {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// SHA-256 applied twice over the concatenation of `chunks`
pub fn double_sha256(chunks: &[&[u8]]) -> [u8; DIGEST_SIZE] {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    let mut inner: [u8; DIGEST_SIZE] = hasher.finalize().into();
    let outer: [u8; DIGEST_SIZE] = Sha256::digest(inner).into();
    inner.zeroize();
    outer
}

/// Public digest of a single candidate key part
pub fn part_digest(raw: &[u8]) -> Digest {
    double_sha256(&[raw]).into()
}

/// Derive candidate key bytes from the concatenated raw parts
pub fn derive_key(concatenated: &[u8]) -> SharedKey {
    let bytes = Zeroizing::new(double_sha256(&[concatenated, KEY_DOMAIN_SEPARATOR]));
    SharedKey::from(*bytes)
}

/// Public digest of a derived key
pub fn key_digest(key: &SharedKey) -> Digest {
    double_sha256(&[key.bytes()]).into()
}

/// Compare two digests over the length of the shorter one
///
/// Peers running older builds may send truncated digests, so by default a
/// length mismatch is tolerated with a warning and only the common prefix is
/// compared. With `strict` set, digests of different lengths never match.
pub fn digests_match(local: &[u8], remote: &[u8], strict: bool) -> bool {
    if local.len() != remote.len() {
        if strict || local.is_empty() || remote.is_empty() {
            return false;
        }
        tracing::warn!(
            "comparing digests of different lengths ({} vs {}), using the common prefix",
            local.len(),
            remote.len()
        );
    }
    let len = local.len().min(remote.len());
    local[..len] == remote[..len]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_double_sha256_known_vector() {
        // sha256(sha256("")) is a well known constant
        let digest = double_sha256(&[b""]);
        assert_eq!(
            hex::encode(digest),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn test_chunks_hash_like_concatenation() {
        assert_eq!(double_sha256(&[b"ab", b"cd"]), double_sha256(&[b"abcd"]));
    }

    #[test]
    fn test_key_differs_from_part_digest() {
        let key = derive_key(b"material");
        assert_ne!(key.bytes(), part_digest(b"material").as_bytes());
        assert_ne!(key_digest(&key).as_bytes(), key.bytes());
    }

    #[test]
    fn test_digests_match_prefix() {
        let full = part_digest(b"x");
        let truncated = &full.as_bytes()[..16];
        assert!(digests_match(full.as_bytes(), truncated, false));
        assert!(!digests_match(full.as_bytes(), truncated, true));
        assert!(!digests_match(full.as_bytes(), &[], false));
    }

    #[test]
    fn test_digest_hex() {
        let digest = part_digest(b"abc");
        let parsed = Digest::from_hex(&digest.to_string()).unwrap();
        assert_eq!(parsed, digest);
        assert!(Digest::from_hex("zz").is_err());
    }
}
