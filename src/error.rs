use thiserror::Error;

#[derive(Debug, Error)]
pub enum PhantomError {
    /// Armor sentinels missing or the block body is unusable.
    #[error("invalid secure block: {0}")]
    Format(&'static str),

    #[error("malformed envelope")]
    MalformedEnvelope,

    /// Every decryption failure collapses into this one message.
    #[error("decryption failed: wrong password or tampered data")]
    Authentication,

    #[error("carrier too small: payload needs {needed} bits, carrier holds {available}")]
    Capacity { needed: usize, available: usize },

    #[error("no hidden payload found in carrier")]
    NotFound,

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("invalid carrier: {0}")]
    InvalidCarrier(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(&'static str),

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("encryption failed")]
    Encryption,

    #[error("OS random generator unavailable")]
    Random,
}

pub type Result<T> = std::result::Result<T, PhantomError>;
