//! Text armor for encrypted envelopes.
//!
//! Turns base64 into a delimited, copy-paste safe block and back. The
//! transform is reversible by anyone and is not a security boundary; it only
//! gives ciphertext a recognisable shape. Blocks carry a revision number in
//! their header line, and parsing dispatches on it.

use crate::error::{PhantomError, Result};

pub mod v1;

/// Prefix shared by every block header, whatever its revision.
pub const BLOCK_MARKER: &str = "--- PHANTOM SECURE BLOCK";

const REVISION_PREFIX: &str = "--- PHANTOM SECURE BLOCK REVISION ";
const HEADER_SUFFIX: &str = " ---";

/// Returns `true` if `text` looks like a secure block.
///
/// Only the leading marker is checked; use [`unwrap`] to validate.
pub fn is_block(text: &str) -> bool {
    text.trim_start().starts_with(BLOCK_MARKER)
}

/// Wraps base64 into a block of the current revision.
pub fn wrap(base64: &str) -> String {
    v1::wrap(base64)
}

/// Length of the block [`wrap`] produces for `base64_len` input characters.
pub fn wrapped_len(base64_len: usize) -> usize {
    v1::wrapped_len(base64_len)
}

/// Recovers the base64 payload from a block.
///
/// # Errors
///
/// Returns [`PhantomError::Format`] if:
/// - No block header is present
/// - The revision is unsupported
/// - The footer is missing or the payload is empty
pub fn unwrap(block: &str) -> Result<String> {
    match revision(block)? {
        v1::REVISION => v1::unwrap(block),
        _ => Err(PhantomError::Format("unsupported block revision")),
    }
}

fn revision(block: &str) -> Result<u32> {
    let start = block
        .find(REVISION_PREFIX)
        .ok_or(PhantomError::Format("missing block header"))?;

    let rest = &block[start + REVISION_PREFIX.len()..];
    let end = rest
        .find(HEADER_SUFFIX)
        .ok_or(PhantomError::Format("missing block header"))?;

    rest[..end]
        .trim()
        .parse()
        .map_err(|_| PhantomError::Format("unreadable block revision"))
}
