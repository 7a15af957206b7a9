//! Cryptographic primitives for the candidate key protocol
//!
//! - **Part digests**: every candidate key part is advertised only as a double
//!   SHA-256 digest of its raw bytes
//! - **Key derivation**: a candidate key is the double SHA-256 of the
//!   concatenated parts, mixed with a fixed domain separator
//! - **Key digests**: the public fingerprint of a candidate key is a second
//!   double SHA-256 over the derived key bytes
//!
//! # Secret handling
//!
//! Raw parts live in [`SecretBytes`] and derived keys in [`SharedKey`]. Both
//! zeroize their contents on drop and never print them through `Debug`.

mod digest;
mod secret;

pub use digest::{
    derive_key, digests_match, double_sha256, key_digest, part_digest, Digest,
    DIGEST_SIZE, KEY_DOMAIN_SEPARATOR,
};
pub use secret::{SecretBytes, SharedKey, KEY_SIZE};
