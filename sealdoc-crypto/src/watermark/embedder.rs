//! Watermark placement strategies.
//!
//! All non-pixel strategies store the payload in the same frame,
//! `<<SEALDOC-WM:` + base64(payload) + `>>`, and differ only in *where* the
//! frame goes so the host format stays valid:
//!
//! - [`DelimiterEmbedder`]: after the content (text, generic binary, images
//!   without pixel access; PNG/JPEG decoders ignore trailing bytes).
//! - [`PdfCommentEmbedder`]: a `%` comment line just before the final
//!   `%%EOF`, which keeps `startxref` offsets valid.
//! - [`ZipCommentEmbedder`]: the End-Of-Central-Directory comment of
//!   ZIP-based formats (DOCX, XLSX, ...), which keeps archive offsets valid.

use crate::error::CryptoResult;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

pub(crate) const FRAME_OPEN: &[u8] = b"<<SEALDOC-WM:";
pub(crate) const FRAME_CLOSE: &[u8] = b">>";

const PDF_EOF: &[u8] = b"%%EOF";
const ZIP_EOCD_SIGNATURE: &[u8] = &[0x50, 0x4b, 0x05, 0x06];
const ZIP_EOCD_MIN_LEN: usize = 22;
const ZIP_MAX_COMMENT: usize = u16::MAX as usize;

/// How a payload was placed into the content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbedMethod {
    /// Least-significant bits of image pixels.
    Lsb,
    /// Delimited frame appended after the content.
    Delimiter,
    /// Delimited frame inside a PDF comment before `%%EOF`.
    PdfComment,
    /// Delimited frame inside the ZIP end-of-central-directory comment.
    ZipComment,
}

/// A placement strategy for watermark payloads.
pub trait WatermarkEmbedder: Send + Sync {
    fn method(&self) -> EmbedMethod;

    /// Returns the watermarked content, or `None` if this strategy cannot
    /// carry the payload in this content (no capacity, missing structure).
    fn embed(&self, content: &[u8], payload: &str) -> CryptoResult<Option<Vec<u8>>>;

    /// Returns the raw payload string if one is present.
    fn extract(&self, content: &[u8]) -> Option<String>;

    /// Removes a previously embedded payload. Strategies that alter the
    /// content irreversibly return it unchanged.
    fn strip(&self, content: &[u8]) -> Vec<u8> {
        content.to_vec()
    }
}

/// Appends the frame after the content.
#[derive(Debug, Default, Clone, Copy)]
pub struct DelimiterEmbedder;

impl WatermarkEmbedder for DelimiterEmbedder {
    fn method(&self) -> EmbedMethod {
        EmbedMethod::Delimiter
    }

    fn embed(&self, content: &[u8], payload: &str) -> CryptoResult<Option<Vec<u8>>> {
        let mut out = self.strip(content);
        out.push(b'\n');
        out.extend_from_slice(&encode_frame(payload));
        Ok(Some(out))
    }

    fn extract(&self, content: &[u8]) -> Option<String> {
        let (start, end) = last_frame(content)?;
        decode_frame(&content[start..end])
    }

    fn strip(&self, content: &[u8]) -> Vec<u8> {
        let Some((start, end)) = last_frame(content) else {
            return content.to_vec();
        };
        if end != content.len() {
            // Frame is not trailing; it belongs to some other placement.
            return content.to_vec();
        }
        let cut = if start > 0 && content[start - 1] == b'\n' { start - 1 } else { start };
        content[..cut].to_vec()
    }
}

/// Places the frame in a PDF comment line before the last `%%EOF`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfCommentEmbedder;

impl PdfCommentEmbedder {
    fn comment_line(payload: &str) -> Vec<u8> {
        let mut line = Vec::with_capacity(payload.len() * 2);
        line.push(b'%');
        line.extend_from_slice(&encode_frame(payload));
        line.push(b'\n');
        line
    }

    /// Byte range of an embedded comment line, including its newline.
    fn comment_range(content: &[u8]) -> Option<(usize, usize)> {
        let eof = rfind(content, PDF_EOF)?;
        let head = &content[..eof];
        let marker_at = rfind(head, FRAME_OPEN)?;
        if marker_at == 0 || head[marker_at - 1] != b'%' {
            return None;
        }
        let line_end = head[marker_at..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| marker_at + p + 1)?;
        Some((marker_at - 1, line_end))
    }
}

impl WatermarkEmbedder for PdfCommentEmbedder {
    fn method(&self) -> EmbedMethod {
        EmbedMethod::PdfComment
    }

    fn embed(&self, content: &[u8], payload: &str) -> CryptoResult<Option<Vec<u8>>> {
        let content = self.strip(content);
        let Some(eof) = rfind(&content, PDF_EOF) else {
            return Ok(None);
        };

        let mut out = Vec::with_capacity(content.len() + payload.len() * 2);
        out.extend_from_slice(&content[..eof]);
        if !out.ends_with(b"\n") && !out.ends_with(b"\r") {
            out.push(b'\n');
        }
        out.extend_from_slice(&Self::comment_line(payload));
        out.extend_from_slice(&content[eof..]);
        Ok(Some(out))
    }

    fn extract(&self, content: &[u8]) -> Option<String> {
        let (start, end) = Self::comment_range(content)?;
        let (frame_start, frame_end) = last_frame(&content[start..end])?;
        decode_frame(&content[start + frame_start..start + frame_end])
    }

    fn strip(&self, content: &[u8]) -> Vec<u8> {
        match Self::comment_range(content) {
            Some((start, end)) => [&content[..start], &content[end..]].concat(),
            None => content.to_vec(),
        }
    }
}

/// Stores the frame in the ZIP end-of-central-directory comment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipCommentEmbedder;

impl ZipCommentEmbedder {
    /// Offset of the EOCD record whose comment runs exactly to end of file.
    fn eocd_offset(content: &[u8]) -> Option<usize> {
        if content.len() < ZIP_EOCD_MIN_LEN {
            return None;
        }
        let last = content.len() - ZIP_EOCD_MIN_LEN;
        let first = last.saturating_sub(ZIP_MAX_COMMENT);

        (first..=last).rev().find(|&pos| {
            content[pos..pos + 4] == *ZIP_EOCD_SIGNATURE
                && pos + ZIP_EOCD_MIN_LEN + comment_len(content, pos) == content.len()
        })
    }

    fn rewrite_comment(content: &[u8], eocd: usize, comment: &[u8]) -> Option<Vec<u8>> {
        let len = u16::try_from(comment.len()).ok()?;
        let mut out = Vec::with_capacity(eocd + ZIP_EOCD_MIN_LEN + comment.len());
        out.extend_from_slice(&content[..eocd + 20]);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(comment);
        Some(out)
    }
}

impl WatermarkEmbedder for ZipCommentEmbedder {
    fn method(&self) -> EmbedMethod {
        EmbedMethod::ZipComment
    }

    fn embed(&self, content: &[u8], payload: &str) -> CryptoResult<Option<Vec<u8>>> {
        let content = self.strip(content);
        let Some(eocd) = Self::eocd_offset(&content) else {
            return Ok(None);
        };

        let mut comment = content[eocd + ZIP_EOCD_MIN_LEN..].to_vec();
        comment.extend_from_slice(&encode_frame(payload));
        Ok(Self::rewrite_comment(&content, eocd, &comment))
    }

    fn extract(&self, content: &[u8]) -> Option<String> {
        let eocd = Self::eocd_offset(content)?;
        let comment = &content[eocd + ZIP_EOCD_MIN_LEN..];
        let (start, end) = last_frame(comment)?;
        decode_frame(&comment[start..end])
    }

    fn strip(&self, content: &[u8]) -> Vec<u8> {
        let Some(eocd) = Self::eocd_offset(content) else {
            return content.to_vec();
        };
        let comment = &content[eocd + ZIP_EOCD_MIN_LEN..];
        let Some((start, end)) = last_frame(comment) else {
            return content.to_vec();
        };
        let cleaned = [&comment[..start], &comment[end..]].concat();
        Self::rewrite_comment(content, eocd, &cleaned).unwrap_or_else(|| content.to_vec())
    }
}

fn comment_len(content: &[u8], eocd: usize) -> usize {
    u16::from_le_bytes([content[eocd + 20], content[eocd + 21]]) as usize
}

pub(crate) fn encode_frame(payload: &str) -> Vec<u8> {
    let body = STANDARD.encode(payload.as_bytes());
    let mut frame = Vec::with_capacity(FRAME_OPEN.len() + body.len() + FRAME_CLOSE.len());
    frame.extend_from_slice(FRAME_OPEN);
    frame.extend_from_slice(body.as_bytes());
    frame.extend_from_slice(FRAME_CLOSE);
    frame
}

/// Range `[start, end)` of the last complete frame in `content`.
pub(crate) fn last_frame(content: &[u8]) -> Option<(usize, usize)> {
    let start = rfind(content, FRAME_OPEN)?;
    let body_start = start + FRAME_OPEN.len();
    let close = find(&content[body_start..], FRAME_CLOSE)?;
    Some((start, body_start + close + FRAME_CLOSE.len()))
}

fn decode_frame(frame: &[u8]) -> Option<String> {
    let body = frame
        .strip_prefix(FRAME_OPEN)?
        .strip_suffix(FRAME_CLOSE)?;
    let bytes = STANDARD.decode(body).ok()?;
    String::from_utf8(bytes).ok()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAYLOAD: &str = "doc|a@x.com|1|dev|00ff";

    fn minimal_pdf() -> Vec<u8> {
        b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\nxref\n0 1\ntrailer\n<<>>\nstartxref\n9\n%%EOF\n".to_vec()
    }

    /// An empty ZIP archive: just an EOCD record with an optional comment.
    fn empty_zip(comment: &[u8]) -> Vec<u8> {
        let mut zip = ZIP_EOCD_SIGNATURE.to_vec();
        zip.extend_from_slice(&[0u8; 16]);
        zip.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        zip.extend_from_slice(comment);
        zip
    }

    #[test]
    fn append_roundtrip_and_strip() {
        let original = b"plain text body".to_vec();
        let marked = DelimiterEmbedder.embed(&original, PAYLOAD).unwrap().unwrap();

        assert!(marked.starts_with(&original));
        assert_eq!(DelimiterEmbedder.extract(&marked).as_deref(), Some(PAYLOAD));
        assert_eq!(DelimiterEmbedder.strip(&marked), original);
    }

    #[test]
    fn append_replaces_previous_frame() {
        let once = DelimiterEmbedder.embed(b"body", "first").unwrap().unwrap();
        let twice = DelimiterEmbedder.embed(&once, "second").unwrap().unwrap();

        assert_eq!(DelimiterEmbedder.extract(&twice).as_deref(), Some("second"));
        assert_eq!(DelimiterEmbedder.strip(&twice), b"body".to_vec());
    }

    #[test]
    fn pdf_comment_sits_before_eof() {
        let pdf = minimal_pdf();
        let marked = PdfCommentEmbedder.embed(&pdf, PAYLOAD).unwrap().unwrap();

        assert!(marked.ends_with(b"%%EOF\n"));
        assert!(marked.starts_with(b"%PDF-1.4\n"));
        let xref_before = find(&pdf, b"startxref").unwrap();
        let xref_after = find(&marked, b"startxref").unwrap();
        assert_eq!(xref_before, xref_after, "content before the trailer must not move");

        assert_eq!(PdfCommentEmbedder.extract(&marked).as_deref(), Some(PAYLOAD));
        assert_eq!(PdfCommentEmbedder.strip(&marked), pdf);
    }

    #[test]
    fn pdf_without_eof_declines() {
        assert!(PdfCommentEmbedder.embed(b"not a pdf", PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn zip_comment_keeps_archive_valid() {
        let zip = empty_zip(b"built by office");
        let marked = ZipCommentEmbedder.embed(&zip, PAYLOAD).unwrap().unwrap();

        let eocd = ZipCommentEmbedder::eocd_offset(&marked).unwrap();
        assert_eq!(eocd, 0);
        assert_eq!(eocd + ZIP_EOCD_MIN_LEN + comment_len(&marked, eocd), marked.len());
        assert!(marked[ZIP_EOCD_MIN_LEN..].starts_with(b"built by office"));

        assert_eq!(ZipCommentEmbedder.extract(&marked).as_deref(), Some(PAYLOAD));
        assert_eq!(ZipCommentEmbedder.strip(&marked), zip);
    }

    #[test]
    fn zip_without_eocd_declines() {
        assert!(ZipCommentEmbedder.embed(b"PK but not really", PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn content_without_frame_yields_none() {
        assert_eq!(DelimiterEmbedder.extract(b"nothing to see"), None);
        assert_eq!(PdfCommentEmbedder.extract(&minimal_pdf()), None);
        assert_eq!(ZipCommentEmbedder.extract(&empty_zip(b"")), None);
    }
}
