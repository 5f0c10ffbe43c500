//! Password-based encryption of short messages into copy-paste safe text
//! blocks, with optional hiding of those blocks inside image pixels.
//!
//! ```text
//! plaintext + password -> PBKDF2 -> AES-256-GCM -> envelope -> base64 -> armor
//! ```
//!
//! [`encode`] and [`decode`] run the whole chain synchronously; the
//! [`Dispatcher`] runs them on dedicated worker threads so async callers never
//! block on key derivation. [`stego`] hides any text in an RGBA carrier.

pub mod armor;
pub mod crypto;
pub mod dispatch;
mod error;
pub mod payload;
pub mod stego;
pub mod storage;

pub use crate::dispatch::{DispatchResponse, Dispatcher, Operation, RequestId};
pub use crate::error::{PhantomError, Result};
pub use crate::payload::Payload;
pub use crate::stego::Carrier;
pub use crate::storage::Storage;

use base64::{Engine, engine::general_purpose::STANDARD};
use crypto::{Envelope, TAG_LEN};

/// Encrypts `plaintext` under `password` into an armored block.
pub fn encode(plaintext: &str, password: &str) -> Result<String> {
    let envelope = crypto::encrypt(plaintext.as_bytes(), password)?;
    let base64 = STANDARD.encode(envelope.to_bytes());

    Ok(armor::wrap(&base64))
}

/// Recovers the plaintext of an armored block.
///
/// # Errors
///
/// - [`PhantomError::Format`] if the block framing or its base64 is broken
/// - [`PhantomError::MalformedEnvelope`] if the decoded bytes are too short
/// - [`PhantomError::Authentication`] on a wrong password or tampering
pub fn decode(block: &str, password: &str) -> Result<String> {
    let base64 = armor::unwrap(block)?;
    let bytes = STANDARD
        .decode(base64.as_bytes())
        .map_err(|_| PhantomError::Format("payload is not valid base64"))?;

    let envelope = Envelope::from_bytes(&bytes)?;
    let plaintext = crypto::decrypt(&envelope, password)?;

    Ok(String::from_utf8_lossy(&plaintext).into_owned())
}

/// Worker body used by [`Dispatcher::new`].
pub fn process(operation: Operation, payload: &str, password: &str) -> Result<String> {
    match operation {
        Operation::Encode => encode(payload, password),
        Operation::Decode => decode(payload, password),
    }
}

/// Exact length of the block [`encode`] produces for `plaintext_len` bytes.
pub fn encoded_len(plaintext_len: usize) -> usize {
    let envelope_len = Envelope::MIN_LEN + plaintext_len + TAG_LEN;
    let base64_len = envelope_len.div_ceil(3) * 4;

    armor::wrapped_len(base64_len)
}
