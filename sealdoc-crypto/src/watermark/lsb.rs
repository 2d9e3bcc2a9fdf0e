//! Least-significant-bit embedding into decoded image pixels.
//!
//! Decoding and re-encoding images is delegated to a platform
//! [`PixelCodec`]; this module only touches the sample bits. The bit stream
//! is `MAGIC (4) || payload length (u32 BE) || payload`, one bit per R, G
//! and B sample (alpha is left alone so transparency never shifts). Any
//! lossy re-encode destroys it, which is why extraction always falls back to
//! the delimiter frame.

use super::embedder::{EmbedMethod, WatermarkEmbedder};
use crate::error::CryptoResult;
use std::sync::Arc;

const LSB_MAGIC: &[u8; 4] = b"SDW1";
const HEADER_LEN: usize = LSB_MAGIC.len() + 4;
const CHANNELS: usize = 4;

/// Decoded RGBA8 image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA samples, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

impl PixelBuffer {
    /// Number of payload bytes (after the header) this image can hold.
    pub fn capacity(&self) -> usize {
        let bits = (self.rgba.len() / CHANNELS) * 3;
        (bits / 8).saturating_sub(HEADER_LEN)
    }
}

/// Platform capability for pixel-level access to encoded images.
pub trait PixelCodec: Send + Sync {
    /// Decodes an encoded image, or `None` if the format is not supported.
    fn decode(&self, image: &[u8]) -> Option<PixelBuffer>;

    /// Re-encodes pixels losslessly in the format of `original`.
    fn encode(&self, pixels: &PixelBuffer, original: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// Hides the payload in pixel LSBs through a [`PixelCodec`].
#[derive(Clone)]
pub struct LsbEmbedder {
    codec: Arc<dyn PixelCodec>,
}

impl LsbEmbedder {
    pub fn new(codec: Arc<dyn PixelCodec>) -> Self {
        Self { codec }
    }
}

impl WatermarkEmbedder for LsbEmbedder {
    fn method(&self) -> EmbedMethod {
        EmbedMethod::Lsb
    }

    fn embed(&self, content: &[u8], payload: &str) -> CryptoResult<Option<Vec<u8>>> {
        let Some(mut pixels) = self.codec.decode(content) else {
            return Ok(None);
        };
        if !write_bits(&mut pixels, payload.as_bytes()) {
            return Ok(None);
        }
        self.codec.encode(&pixels, content).map(Some)
    }

    fn extract(&self, content: &[u8]) -> Option<String> {
        let pixels = self.codec.decode(content)?;
        let bytes = read_bits(&pixels)?;
        String::from_utf8(bytes).ok()
    }
}

/// Writes header + payload into the sample LSBs. Returns `false` when the
/// image is too small.
fn write_bits(pixels: &mut PixelBuffer, payload: &[u8]) -> bool {
    if payload.len() > pixels.capacity() || u32::try_from(payload.len()).is_err() {
        return false;
    }

    let mut stream = Vec::with_capacity(HEADER_LEN + payload.len());
    stream.extend_from_slice(LSB_MAGIC);
    stream.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    stream.extend_from_slice(payload);

    let bits = stream
        .iter()
        .flat_map(|byte| (0..8).rev().map(move |i| (byte >> i) & 1));

    for (sample, bit) in color_samples_mut(&mut pixels.rgba).zip(bits) {
        *sample = (*sample & !1) | bit;
    }
    true
}

fn read_bits(pixels: &PixelBuffer) -> Option<Vec<u8>> {
    let mut bits = color_samples(&pixels.rgba).map(|s| s & 1);
    let mut next_byte = || -> Option<u8> {
        let mut byte = 0u8;
        for _ in 0..8 {
            byte = (byte << 1) | bits.next()?;
        }
        Some(byte)
    };

    let mut header = [0u8; HEADER_LEN];
    for slot in header.iter_mut() {
        *slot = next_byte()?;
    }
    if &header[..LSB_MAGIC.len()] != LSB_MAGIC {
        return None;
    }

    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len > pixels.capacity() {
        return None;
    }

    (0..len).map(|_| next_byte()).collect()
}

fn color_samples(rgba: &[u8]) -> impl Iterator<Item = u8> + '_ {
    rgba.iter()
        .enumerate()
        .filter(|(i, _)| i % CHANNELS != 3)
        .map(|(_, s)| *s)
}

fn color_samples_mut(rgba: &mut [u8]) -> impl Iterator<Item = &mut u8> {
    rgba.iter_mut()
        .enumerate()
        .filter(|(i, _)| i % CHANNELS != 3)
        .map(|(_, s)| s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let rgba = (0..width * height * 4).map(|i| (i % 251) as u8).collect();
        PixelBuffer { width, height, rgba }
    }

    #[test]
    fn bits_roundtrip() {
        let mut pixels = gradient(32, 32);
        assert!(write_bits(&mut pixels, b"abc-123|bob@x.com"));
        assert_eq!(read_bits(&pixels).unwrap(), b"abc-123|bob@x.com");
    }

    #[test]
    fn alpha_untouched_and_changes_are_lsb_only() {
        let original = gradient(16, 16);
        let mut pixels = original.clone();
        assert!(write_bits(&mut pixels, b"payload"));

        for (i, (a, b)) in original.rgba.iter().zip(&pixels.rgba).enumerate() {
            if i % 4 == 3 {
                assert_eq!(a, b, "alpha sample {i} changed");
            } else {
                assert!(a ^ b <= 1, "sample {i} changed beyond the LSB");
            }
        }
    }

    #[test]
    fn too_small_image_declines() {
        let mut pixels = gradient(2, 2);
        assert!(!write_bits(&mut pixels, b"far too long for four pixels"));
    }

    #[test]
    fn unmarked_image_reads_nothing() {
        let pixels = PixelBuffer { width: 8, height: 8, rgba: vec![0u8; 256] };
        assert!(read_bits(&pixels).is_none());
    }
}
