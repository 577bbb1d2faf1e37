//! Image reference validation, done before anything leaves the process.
//!
//! Embedded images are sized from their base64 length; the payload is never
//! decoded here.

use std::sync::LazyLock;

use image::ImageFormat;
use regex::Regex;
use url::Url;

/// `data:image/<subtype>;base64,<payload>`
#[allow(clippy::unwrap_used)]
static DATA_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data:image/([A-Za-z0-9.+-]+);base64,").unwrap());

/// Formats we forward to the model.
const ACCEPTED_FORMATS: [ImageFormat; 3] = [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::WebP];

/// A checked image reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageRef {
    /// An https URL pointing at an image file.
    Remote(Url),
    /// An inline base64 data URI.
    Embedded {
        /// Format named in the data URI.
        format: ImageFormat,
        /// Size the payload decodes to.
        decoded_len: usize,
    },
}

/// Why an image reference was refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvalidImage {
    /// Nothing was supplied.
    Empty,
    /// Not a data URI and not a parseable URL.
    Unrecognised,
    /// URL without https.
    InsecureScheme(String),
    /// Format or file extension we don't accept.
    UnsupportedFormat(String),
    /// Payload isn't valid base64.
    BadEncoding,
    /// Decoded payload would exceed the ceiling.
    TooLarge {
        /// Decoded size in bytes.
        size: usize,
        /// Configured ceiling in bytes.
        max: usize,
    },
}

impl std::fmt::Display for InvalidImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Missing image."),
            Self::Unrecognised => write!(f, "Image must be a data URI or an https URL."),
            Self::InsecureScheme(scheme) => {
                write!(f, "Image URLs must use https, got {scheme}.")
            }
            Self::UnsupportedFormat(format) => {
                write!(f, "Unsupported image format {format:?}; use jpeg, png or webp.")
            }
            Self::BadEncoding => write!(f, "Image data is not valid base64."),
            Self::TooLarge { size, max } => {
                write!(f, "Image is too large ({size} bytes, limit {max} bytes).")
            }
        }
    }
}

impl std::error::Error for InvalidImage {}

/// Returns true when `image` is acceptable under `max_bytes`.
pub fn validate(image: &str, max_bytes: usize) -> bool {
    parse_image_ref(image, max_bytes).is_ok()
}

/// Checks `image` and says why it was refused.
pub fn parse_image_ref(image: &str, max_bytes: usize) -> Result<ImageRef, InvalidImage> {
    let image = image.trim();
    if image.is_empty() {
        return Err(InvalidImage::Empty);
    }

    if let Some(captures) = DATA_URI.captures(image) {
        let subtype = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let format = accepted_format(ImageFormat::from_mime_type(format!(
            "image/{}",
            subtype.to_ascii_lowercase()
        )))
        .or_else(|| accepted_format(ImageFormat::from_extension(subtype.to_ascii_lowercase())))
        .ok_or_else(|| InvalidImage::UnsupportedFormat(subtype.to_string()))?;

        let payload = &image[captures.get(0).map(|m| m.end()).unwrap_or_default()..];
        let decoded_len = decoded_len(payload).ok_or(InvalidImage::BadEncoding)?;
        if decoded_len > max_bytes {
            return Err(InvalidImage::TooLarge {
                size: decoded_len,
                max: max_bytes,
            });
        }
        return Ok(ImageRef::Embedded {
            format,
            decoded_len,
        });
    }

    let url = Url::parse(image).map_err(|_| InvalidImage::Unrecognised)?;
    if url.scheme() != "https" {
        return Err(InvalidImage::InsecureScheme(url.scheme().to_string()));
    }
    let extension = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if accepted_format(ImageFormat::from_extension(&extension)).is_none() {
        return Err(InvalidImage::UnsupportedFormat(extension));
    }
    Ok(ImageRef::Remote(url))
}

fn accepted_format(format: Option<ImageFormat>) -> Option<ImageFormat> {
    format.filter(|format| ACCEPTED_FORMATS.contains(format))
}

/// Decoded byte length of a standard-alphabet base64 payload, from its length
/// alone. Returns `None` when the text can't be base64.
fn decoded_len(payload: &str) -> Option<usize> {
    let bytes = payload.as_bytes();
    let padding = bytes.iter().rev().take_while(|b| **b == b'=').count();
    let body = &bytes[..bytes.len() - padding];
    if padding > 2 || body.is_empty() {
        return None;
    }
    if !body
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/')
    {
        return None;
    }
    if padding > 0 && bytes.len() % 4 != 0 {
        return None;
    }
    let tail = match body.len() % 4 {
        0 => 0,
        1 => return None,
        2 => 1,
        _ => 2,
    };
    Some(body.len() / 4 * 3 + tail)
}
