//! Plaintext framing for text and files.
//!
//! A file travels as
//! ```text
//! [PHANTOM_FILE:<name>:<mime>]
//! data:<mime>;base64,<data>
//! ```
//! Anything else is treated as plain text.

use base64::{Engine, engine::general_purpose::STANDARD};

const FILE_PREFIX: &str = "[PHANTOM_FILE:";
const METADATA_END: &str = "]\n";

pub const DEFAULT_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    File {
        name: String,
        mime: String,
        data: Vec<u8>,
    },
}

impl Payload {
    pub fn file(name: &str, mime: &str, data: Vec<u8>) -> Self {
        Payload::File {
            name: sanitize_name(name),
            mime: sanitize_mime(mime),
            data,
        }
    }

    pub fn to_plaintext(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::File { name, mime, data } => format!(
                "{FILE_PREFIX}{}:{}{METADATA_END}data:{};base64,{}",
                sanitize_name(name),
                sanitize_mime(mime),
                sanitize_mime(mime),
                STANDARD.encode(data)
            ),
        }
    }

    /// Parses decrypted plaintext. Malformed file framing yields `Text`.
    pub fn from_plaintext(plaintext: String) -> Self {
        match parse_file(&plaintext) {
            Some(file) => file,
            None => Payload::Text(plaintext),
        }
    }
}

fn parse_file(plaintext: &str) -> Option<Payload> {
    let rest = plaintext.strip_prefix(FILE_PREFIX)?;
    let (metadata, body) = rest.split_once(METADATA_END)?;
    let (name, mime) = metadata.split_once(':')?;

    let (_, encoded) = body.strip_prefix("data:")?.split_once(";base64,")?;
    let data = STANDARD.decode(encoded.trim_end()).ok()?;

    Some(Payload::File {
        name: sanitize_name(name),
        mime: mime.to_string(),
        data,
    })
}

/// Replaces characters that would break the metadata line or a file path.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ':' | ']' | '/' | '\\' | '\n' | '\r' => '_',
            c => c,
        })
        .collect()
}

fn sanitize_mime(mime: &str) -> String {
    let cleaned: String = mime
        .chars()
        .filter(|c| !matches!(c, ']' | ';' | ',' | '\n' | '\r') && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        DEFAULT_MIME.to_string()
    } else {
        cleaned
    }
}
