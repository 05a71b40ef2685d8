use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use image::ImageFormat;
use thiserror::Error;

/// The bytes are never decoded here. Only the vision model judges whether
/// they form a usable picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    mime_type: String,
    data: Bytes,
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("photo is not a data URI")]
    NotADataUri,
    #[error("data URI is not base64 encoded")]
    NotBase64,
    #[error("data URI has no mime type")]
    MissingMimeType,
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[source] base64::DecodeError),
    #[error("image is empty")]
    Empty,
    #[error("could not determine image format")]
    UnknownFormat,
}

impl EncodedImage {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        EncodedImage {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn from_data_uri(uri: &str) -> Result<Self, ImageError> {
        let uri = uri.trim();
        let rest = match uri.get(..5) {
            Some(scheme) if scheme.eq_ignore_ascii_case("data:") => &uri[5..],
            _ => return Err(ImageError::NotADataUri),
        };
        let comma = rest.find(',').ok_or(ImageError::NotADataUri)?;
        let (header, payload) = (&rest[..comma], &rest[comma + 1..]);

        let mut params = header.split(';').map(str::trim);
        let mime_type = params.next().unwrap_or("").to_ascii_lowercase();
        if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err(ImageError::NotBase64);
        }
        if mime_type.is_empty() {
            return Err(ImageError::MissingMimeType);
        }

        let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let data = STANDARD
            .decode(payload.as_bytes())
            .map_err(ImageError::InvalidBase64)?;
        if data.is_empty() {
            return Err(ImageError::Empty);
        }
        Ok(EncodedImage::new(mime_type, data))
    }

    /// A missing or generic content type is replaced by one sniffed from the
    /// magic bytes.
    pub fn from_upload(content_type: Option<&str>, data: Bytes) -> Result<Self, ImageError> {
        if data.is_empty() {
            return Err(ImageError::Empty);
        }
        let declared = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");
        let mime_type = match declared {
            Some(mime) => mime,
            None => sniff_mime_type(&data)
                .ok_or(ImageError::UnknownFormat)?
                .to_string(),
        };
        Ok(EncodedImage::new(mime_type, data))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

fn sniff_mime_type(data: &[u8]) -> Option<&'static str> {
    match image::guess_format(data).ok()? {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::Tiff => Some("image/tiff"),
        ImageFormat::Ico => Some("image/x-icon"),
        ImageFormat::Avif => Some("image/avif"),
        _ => None,
    }
}
