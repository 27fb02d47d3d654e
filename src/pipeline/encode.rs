//! Image encoding: raw payload bytes → base64 + MIME type.
//!
//! VLM APIs accept images as base64 data embedded in the JSON request body.
//! Images extracted from a PDF keep their original encoding (usually JPEG or
//! PNG), so the bytes are passed through untouched and only the MIME type is
//! sniffed from the magic bytes; re-encoding would cost time and fidelity.

use crate::service::ImagePayload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// A payload ready to attach to a vision request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Base64 of the original bytes (no `data:` prefix).
    pub data: String,
    pub mime_type: String,
}

/// Encode a payload for the vision request.
///
/// Unrecognised formats are labelled `image/png`; providers sniff the bytes
/// themselves and only reject a missing MIME type.
pub fn encode_payload(payload: &ImagePayload) -> EncodedImage {
    let mime_type = image::guess_format(&payload.bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("image/png")
        .to_string();

    let data = STANDARD.encode(&payload.bytes);
    debug!("Encoded {} payload → {} bytes base64", mime_type, data.len());

    EncodedImage { data, mime_type }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::io::Cursor;

    #[test]
    fn encode_png_payload() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("png encode");

        let encoded = encode_payload(&ImagePayload { bytes: buf.clone() });
        assert_eq!(encoded.mime_type, "image/png");
        let decoded = STANDARD.decode(&encoded.data).expect("valid base64");
        assert_eq!(decoded, buf);
    }

    #[test]
    fn jpeg_magic_is_recognised() {
        let encoded = encode_payload(&ImagePayload {
            bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'],
        });
        assert_eq!(encoded.mime_type, "image/jpeg");
    }

    #[test]
    fn unknown_bytes_default_to_png() {
        let encoded = encode_payload(&ImagePayload {
            bytes: b"not an image".to_vec(),
        });
        assert_eq!(encoded.mime_type, "image/png");
    }
}
