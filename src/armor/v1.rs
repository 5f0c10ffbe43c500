//! Block revision 1.
//!
//! ```text
//! --- PHANTOM SECURE BLOCK REVISION 1 ---
//! <chunk>
//! -==-
//! <chunk>
//! --- END OF SECURE BLOCK ---
//! ```
//!
//! Each chunk holds up to 64 characters of the reversed base64 payload.

use crate::error::{PhantomError, Result};

pub const REVISION: u32 = 1;

pub const HEADER: &str = "--- PHANTOM SECURE BLOCK REVISION 1 ---";
pub const FOOTER: &str = "--- END OF SECURE BLOCK ---";
pub const SEPARATOR: &str = "-==-";
pub const CHUNK_LEN: usize = 64;

pub fn wrap(base64: &str) -> String {
    let reversed: Vec<char> = base64.chars().rev().collect();

    let chunks: Vec<String> = reversed
        .chunks(CHUNK_LEN)
        .map(|chunk| chunk.iter().collect())
        .collect();

    let joiner = format!("\n{SEPARATOR}\n");
    format!("{HEADER}\n{}\n{FOOTER}", chunks.join(&joiner))
}

pub fn wrapped_len(base64_len: usize) -> usize {
    let chunks = base64_len.div_ceil(CHUNK_LEN);
    let separators = chunks.saturating_sub(1) * (SEPARATOR.len() + 2);

    HEADER.len() + 1 + base64_len + separators + 1 + FOOTER.len()
}

/// Extracts the payload between header and footer, drops line breaks,
/// whitespace and separators, and reverses it back.
pub fn unwrap(block: &str) -> Result<String> {
    let start = block
        .find(HEADER)
        .ok_or(PhantomError::Format("missing block header"))?
        + HEADER.len();

    let end = block
        .rfind(FOOTER)
        .filter(|&end| end >= start)
        .ok_or(PhantomError::Format("missing block footer"))?;

    let body = block[start..end].replace(SEPARATOR, "");
    let payload: String = body
        .chars()
        .filter(|c| !c.is_whitespace())
        .rev()
        .collect();

    if payload.is_empty() {
        return Err(PhantomError::Format("empty block payload"));
    }

    Ok(payload)
}
