//! Cryptographic primitives for secure blocks.
//!
//! Provides password-based key derivation, AES-256-GCM and the binary
//! envelope that carries salt and IV next to the ciphertext.

pub mod aead;
pub mod envelope;
pub mod kdf;

pub use envelope::{Envelope, decrypt, encrypt};
pub use kdf::derive_key;

/// Length of the salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the IV (12 bytes for AES-GCM).
pub const IV_LEN: usize = 12;
/// Length of the encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the trailing GCM authentication tag.
pub const TAG_LEN: usize = 16;
/// PBKDF2-HMAC-SHA256 iteration count.
pub const ITERATIONS: u32 = 100_000;
