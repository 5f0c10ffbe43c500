//! LSB steganography in the alpha channel of RGBA pixel buffers.
//!
//! Every pixel carries one payload bit in the low bit of its alpha byte.
//! Payload bytes are written most significant bit first and terminated by
//! [`END_MARKER`]; pixels past the end of the payload are left untouched.

use image::{DynamicImage, RgbaImage};

use crate::error::{PhantomError, Result};

/// Terminates every embedded payload.
pub const END_MARKER: &str = "[[PHANTOM_END]]";

const CHANNELS: usize = 4;
const ALPHA: usize = 3;

/// A width x height grid of RGBA pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Carrier {
    image: RgbaImage,
}

impl Carrier {
    /// Creates a carrier from raw RGBA bytes in row-major order.
    ///
    /// # Errors
    ///
    /// Returns [`PhantomError::InvalidCarrier`] if `pixels` is not exactly
    /// `width * height * 4` bytes long.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(CHANNELS));

        if expected != Some(pixels.len()) {
            return Err(PhantomError::InvalidCarrier(format!(
                "{} bytes do not form a {width}x{height} RGBA image",
                pixels.len()
            )));
        }

        RgbaImage::from_raw(width, height, pixels)
            .map(|image| Self { image })
            .ok_or_else(|| PhantomError::InvalidCarrier("unusable pixel buffer".to_string()))
    }

    /// Converts any decoded image to an RGBA carrier.
    pub fn from_image(image: &DynamicImage) -> Self {
        Self {
            image: image.to_rgba8(),
        }
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Number of payload bits the carrier can hold, marker included.
    pub fn capacity_bits(&self) -> usize {
        self.pixels().len() / CHANNELS
    }

    /// Largest secret, in bytes, that fits next to the end marker.
    pub fn capacity(&self) -> usize {
        (self.capacity_bits() / 8).saturating_sub(END_MARKER.len())
    }

    fn alpha_mut(&mut self) -> impl Iterator<Item = &mut u8> {
        let raw: &mut [u8] = &mut self.image;
        raw.iter_mut().skip(ALPHA).step_by(CHANNELS)
    }

    fn alpha(&self) -> impl Iterator<Item = u8> + '_ {
        self.pixels().iter().skip(ALPHA).step_by(CHANNELS).copied()
    }
}

/// Hides `secret` in a copy of `carrier`.
///
/// The input carrier is never modified, so a failed call leaves nothing
/// half-written behind.
///
/// # Errors
///
/// - [`PhantomError::InvalidPayload`] if the secret contains [`END_MARKER`]
/// - [`PhantomError::Capacity`] if the carrier has too few pixels
pub fn embed(secret: &str, carrier: &Carrier) -> Result<Carrier> {
    if secret.contains(END_MARKER) {
        return Err(PhantomError::InvalidPayload(
            "secret contains the end-of-data marker",
        ));
    }

    let payload: Vec<u8> = secret.bytes().chain(END_MARKER.bytes()).collect();
    let needed = payload.len() * 8;
    let available = carrier.capacity_bits();
    if needed > available {
        return Err(PhantomError::Capacity { needed, available });
    }

    let bits = payload
        .iter()
        .flat_map(|&byte| (0..8).rev().map(move |shift| (byte >> shift) & 1));

    let mut stego = carrier.clone();
    for (alpha, bit) in stego.alpha_mut().zip(bits) {
        *alpha = (*alpha & !1) | bit;
    }

    tracing::debug!(
        secret_len = secret.len(),
        bits = needed,
        available,
        "payload embedded"
    );
    Ok(stego)
}

/// Recovers a secret hidden with [`embed`].
///
/// # Errors
///
/// Returns [`PhantomError::NotFound`] if no end marker appears in the alpha
/// channel, or if the bytes before it are not valid UTF-8.
pub fn extract(carrier: &Carrier) -> Result<String> {
    let marker = END_MARKER.as_bytes();
    let mut decoded = Vec::new();
    let mut current = 0u8;

    for (index, alpha) in carrier.alpha().enumerate() {
        current = (current << 1) | (alpha & 1);
        if index % 8 != 7 {
            continue;
        }

        decoded.push(current);
        current = 0;

        if decoded.ends_with(marker) {
            decoded.truncate(decoded.len() - marker.len());
            return String::from_utf8(decoded).map_err(|_| PhantomError::NotFound);
        }
    }

    Err(PhantomError::NotFound)
}
