//! Forensic watermarking: signed payloads and their placement in content.
//!
//! A [`WatermarkCodec`] is built once from the platform's [`Capabilities`].
//! If a [`PixelCodec`] is available, images get LSB embedding; otherwise
//! they get the delimiter frame. Documents always use the frame, placed
//! according to their container format.

mod embedder;
mod lsb;
mod payload;

pub use embedder::{
    DelimiterEmbedder, EmbedMethod, PdfCommentEmbedder, WatermarkEmbedder, ZipCommentEmbedder,
};
pub use lsb::{LsbEmbedder, PixelBuffer, PixelCodec};
pub use payload::{
    FIELD_DELIMITER, Verification, VerifyFailure, WatermarkPayload, build_signed_payload,
    generate_watermark_hash, verify, verify_encoded,
};

use crate::error::{CryptoError, CryptoResult};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Broad content category, which decides where a watermark may go.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Image,
    Pdf,
    /// ZIP-based containers: DOCX, XLSX, PPTX, ODT, plain ZIP.
    ZipContainer,
    Text,
    Binary,
}

impl ContentKind {
    /// Classifies by file extension (with or without the leading dot).
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "heic" | "heif" => Self::Image,
            "pdf" => Self::Pdf,
            "docx" | "xlsx" | "pptx" | "odt" | "ods" | "odp" | "zip" | "epub" => {
                Self::ZipContainer
            }
            "txt" | "md" | "csv" | "json" | "xml" | "html" | "htm" | "rtf" | "log" => Self::Text,
            _ => Self::Binary,
        }
    }

    /// Classifies by MIME type.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Self::Image
        } else if mime == "application/pdf" {
            Self::Pdf
        } else if mime == "application/zip"
            || mime.starts_with("application/vnd.openxmlformats-officedocument")
            || mime.starts_with("application/vnd.oasis.opendocument")
            || mime == "application/epub+zip"
        {
            Self::ZipContainer
        } else if mime.starts_with("text/") || mime == "application/json" {
            Self::Text
        } else {
            Self::Binary
        }
    }
}

/// What the host platform can do, probed once at startup.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub pixel_codec: Option<Arc<dyn PixelCodec>>,
}

impl Capabilities {
    /// No native image access; every image uses the delimiter frame.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_pixel_codec(codec: Arc<dyn PixelCodec>) -> Self {
        Self {
            pixel_codec: Some(codec),
        }
    }
}

/// Watermarked content and how the payload was placed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Embedded {
    pub data: Vec<u8>,
    pub method: EmbedMethod,
}

/// Embeds and extracts watermark payloads.
pub struct WatermarkCodec {
    image: Box<dyn WatermarkEmbedder>,
    pdf: PdfCommentEmbedder,
    zip: ZipCommentEmbedder,
    append: DelimiterEmbedder,
}

impl WatermarkCodec {
    /// Chooses the image strategy from the capability probe. The choice is
    /// fixed for the lifetime of the codec.
    pub fn new(capabilities: &Capabilities) -> Self {
        let image: Box<dyn WatermarkEmbedder> = match &capabilities.pixel_codec {
            Some(codec) => Box::new(LsbEmbedder::new(Arc::clone(codec))),
            None => Box::new(DelimiterEmbedder),
        };
        Self {
            image,
            pdf: PdfCommentEmbedder,
            zip: ZipCommentEmbedder,
            append: DelimiterEmbedder,
        }
    }

    /// The strategy used for images.
    pub fn image_method(&self) -> EmbedMethod {
        self.image.method()
    }

    /// Embeds `payload` into `content`.
    ///
    /// Falls back to the appended frame whenever the preferred placement
    /// cannot carry the payload, so this only fails on a codec error.
    pub fn embed(
        &self,
        content: &[u8],
        payload: &WatermarkPayload,
        kind: ContentKind,
    ) -> CryptoResult<Embedded> {
        let encoded = payload.to_string();

        let preferred: Option<&dyn WatermarkEmbedder> = match kind {
            ContentKind::Image => Some(self.image.as_ref()),
            ContentKind::Pdf => Some(&self.pdf),
            ContentKind::ZipContainer => Some(&self.zip),
            ContentKind::Text | ContentKind::Binary => None,
        };

        if let Some(embedder) = preferred {
            if let Some(data) = embedder.embed(content, &encoded)? {
                return Ok(Embedded {
                    data,
                    method: embedder.method(),
                });
            }
        }

        let data = self
            .append
            .embed(content, &encoded)?
            .ok_or_else(|| CryptoError::Embedding("append placement declined".into()))?;
        Ok(Embedded {
            data,
            method: EmbedMethod::Delimiter,
        })
    }

    /// Extracts a payload, trying the format-specific reader first and the
    /// appended frame last. `None` means no watermark, which is normal for
    /// unrelated files.
    pub fn extract(&self, content: &[u8], kind: ContentKind) -> Option<WatermarkPayload> {
        let readers: [Option<&dyn WatermarkEmbedder>; 2] = match kind {
            ContentKind::Image => [Some(self.image.as_ref()), None],
            ContentKind::Pdf => [Some(&self.pdf), None],
            ContentKind::ZipContainer => [Some(&self.zip), None],
            ContentKind::Text | ContentKind::Binary => [None, None],
        };

        readers
            .into_iter()
            .flatten()
            .chain(std::iter::once(&self.append as &dyn WatermarkEmbedder))
            .filter_map(|reader| reader.extract(content))
            .find_map(|raw| WatermarkPayload::parse(&raw).ok())
    }

    /// Removes an embedded payload where the placement is reversible.
    pub fn strip(&self, content: &[u8], kind: ContentKind) -> Vec<u8> {
        match kind {
            ContentKind::Image => self.append.strip(&self.image.strip(content)),
            ContentKind::Pdf => self.append.strip(&self.pdf.strip(content)),
            ContentKind::ZipContainer => self.append.strip(&self.zip.strip(content)),
            ContentKind::Text | ContentKind::Binary => self.append.strip(content),
        }
    }

    /// [`embed`](Self::embed) for base64-encoded content.
    pub fn embed_base64(
        &self,
        content_b64: &str,
        payload: &WatermarkPayload,
        kind: ContentKind,
    ) -> CryptoResult<(String, EmbedMethod)> {
        let content = decode_content(content_b64)
            .map_err(|e| CryptoError::UnsupportedInput(format!("content is not base64: {e}")))?;
        let embedded = self.embed(&content, payload, kind)?;
        Ok((STANDARD.encode(embedded.data), embedded.method))
    }

    /// [`extract`](Self::extract) for base64-encoded content.
    pub fn extract_base64(&self, content_b64: &str, kind: ContentKind) -> Option<WatermarkPayload> {
        let content = decode_content(content_b64).ok()?;
        self.extract(&content, kind)
    }
}

/// Decodes base64 content, tolerating the line wrapping of MIME transports.
fn decode_content(content_b64: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = content_b64.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact)
}

impl Default for WatermarkCodec {
    fn default() -> Self {
        Self::new(&Capabilities::none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension() {
        assert_eq!(ContentKind::from_extension("PNG"), ContentKind::Image);
        assert_eq!(ContentKind::from_extension(".pdf"), ContentKind::Pdf);
        assert_eq!(ContentKind::from_extension("docx"), ContentKind::ZipContainer);
        assert_eq!(ContentKind::from_extension("txt"), ContentKind::Text);
        assert_eq!(ContentKind::from_extension("bin"), ContentKind::Binary);
    }

    #[test]
    fn kind_from_mime() {
        assert_eq!(ContentKind::from_mime("image/jpeg"), ContentKind::Image);
        assert_eq!(ContentKind::from_mime("application/pdf"), ContentKind::Pdf);
        assert_eq!(
            ContentKind::from_mime(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            ),
            ContentKind::ZipContainer
        );
        assert_eq!(ContentKind::from_mime("text/plain"), ContentKind::Text);
        assert_eq!(ContentKind::from_mime("application/octet-stream"), ContentKind::Binary);
    }

    #[test]
    fn default_codec_uses_delimiter_for_images() {
        assert_eq!(WatermarkCodec::default().image_method(), EmbedMethod::Delimiter);
    }
}
