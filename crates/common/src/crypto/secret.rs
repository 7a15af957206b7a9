//! Zeroizing containers for key material

use std::fmt;
use std::ops::Deref;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a derived candidate key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Raw bytes of a candidate key part
///
/// Zeroized on drop. `Debug` only shows the length.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for SecretBytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Deref for SecretBytes {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes({} bytes)", self.0.len())
    }
}

/// A 256-bit key agreed with (or proposed to) a peer
///
/// Candidate keys and the final shared key both use this type. The bytes are
/// zeroized on drop and redacted from `Debug`; use [`SharedKey::to_hex`] when
/// the key really has to be rendered.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; KEY_SIZE]);

impl Deref for SharedKey {
    type Target = [u8; KEY_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; KEY_SIZE]> for SharedKey {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        SharedKey(bytes)
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(<redacted>)")
    }
}

impl SharedKey {
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Byte-wise exclusive-or of two keys
    ///
    /// Commutative, so both sides of a reconciliation race arrive at the same
    /// value regardless of which key each of them held first.
    pub fn xor(&self, other: &SharedKey) -> SharedKey {
        let mut out = [0u8; KEY_SIZE];
        for (o, (a, b)) in out.iter_mut().zip(self.0.iter().zip(other.0.iter())) {
            *o = a ^ b;
        }
        SharedKey(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_xor_is_commutative() {
        let a = SharedKey::from([0x0f; KEY_SIZE]);
        let b = SharedKey::from([0xf1; KEY_SIZE]);
        assert_eq!(a.xor(&b), b.xor(&a));
        assert_eq!(a.xor(&b).bytes(), &[0xfe; KEY_SIZE]);
        assert_eq!(a.xor(&a).bytes(), &[0u8; KEY_SIZE]);
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SharedKey::from([0xab; KEY_SIZE]);
        assert!(!format!("{:?}", key).contains("ab"));
        let raw = SecretBytes::new(vec![0xcd; 4]);
        assert_eq!(format!("{:?}", raw), "SecretBytes(4 bytes)");
    }
}
