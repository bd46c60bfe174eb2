//! Upload boundary.
//!
//! Only JPEG and PNG are accepted. Anything else is rejected before any
//! session state is touched.
//!
//! # Example
//!
//! ```ignore
//! use image_cropper_core::upload::{ImageKind, UploadedImage};
//!
//! let bytes = std::fs::read("portrait.png")?;
//! let kind = ImageKind::from_mime("image/png")?;
//! let upload = UploadedImage::decode(bytes, kind)?;
//! println!("{}x{}", upload.width(), upload.height());
//! ```

use crate::error::{AppError, Result};
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// Message shown to the user for rejected files.
pub const INVALID_FILE_TYPE_MESSAGE: &str = "Only JPG and PNG files are allowed!";

/// The raster kinds the upload boundary accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// Resolves a MIME type such as `image/jpeg`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidFileType`] for anything but JPEG and PNG.
    pub fn from_mime(mime: &str) -> Result<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" => Ok(Self::Jpeg),
            "image/png" => Ok(Self::Png),
            _ => Err(invalid_file_type()),
        }
    }

    /// Resolves a file path by its extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("jpg" | "jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            _ => Err(invalid_file_type()),
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
        }
    }
}

fn invalid_file_type() -> AppError {
    AppError::InvalidFileType(INVALID_FILE_TYPE_MESSAGE.to_string())
}

/// A decoded upload, ready to be handed to a session.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub kind: ImageKind,
    pub image: DynamicImage,
}

impl UploadedImage {
    /// Decodes `bytes`, checking that the content really is `kind`.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidFileType`] if the bytes are not the declared kind
    /// - [`AppError::Decode`] if the image is corrupt or has zero size
    pub fn decode(bytes: Vec<u8>, kind: ImageKind) -> Result<Self> {
        match image::guess_format(&bytes) {
            Ok(format) if format == kind.format() => {}
            _ => return Err(invalid_file_type()),
        }

        let image = image::load_from_memory_with_format(&bytes, kind.format())
            .map_err(|e| AppError::decode(e.to_string()))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(AppError::decode("image has zero width or height"));
        }

        tracing::info!(
            mime = kind.mime(),
            width = image.width(),
            height = image.height(),
            "decoded upload"
        );
        Ok(Self { kind, image })
    }

    /// Reads and decodes a file, choosing the kind from its extension.
    pub fn open(path: &Path) -> Result<Self> {
        let kind = ImageKind::from_path(path)?;
        let bytes = std::fs::read(path)?;
        Self::decode(bytes, kind)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([10, 20, 30])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    #[test]
    fn accepts_jpeg_and_png_mime() {
        assert_eq!(ImageKind::from_mime("image/jpeg").unwrap(), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_mime("IMAGE/PNG").unwrap(), ImageKind::Png);
    }

    #[test]
    fn rejects_other_mime_with_user_message() {
        for mime in ["image/gif", "image/webp", "application/pdf", ""] {
            let err = ImageKind::from_mime(mime).unwrap_err();
            assert_eq!(err.to_string(), INVALID_FILE_TYPE_MESSAGE);
        }
    }

    #[test]
    fn resolves_extensions() {
        assert_eq!(ImageKind::from_path(Path::new("a/b.JPG")).unwrap(), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_path(Path::new("b.jpeg")).unwrap(), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_path(Path::new("c.png")).unwrap(), ImageKind::Png);
        assert!(ImageKind::from_path(Path::new("d.gif")).is_err());
        assert!(ImageKind::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn decodes_png() {
        let upload = UploadedImage::decode(encoded(ImageFormat::Png), ImageKind::Png).unwrap();
        assert_eq!((upload.width(), upload.height()), (8, 6));
    }

    #[test]
    fn decodes_jpeg() {
        let upload = UploadedImage::decode(encoded(ImageFormat::Jpeg), ImageKind::Jpeg).unwrap();
        assert_eq!((upload.width(), upload.height()), (8, 6));
    }

    #[test]
    fn content_must_match_declared_kind() {
        let err = UploadedImage::decode(encoded(ImageFormat::Png), ImageKind::Jpeg).unwrap_err();
        assert!(matches!(err, AppError::InvalidFileType(_)));
    }

    #[test]
    fn truncated_png_fails_to_decode() {
        let mut bytes = encoded(ImageFormat::Png);
        bytes.truncate(40);
        let err = UploadedImage::decode(bytes, ImageKind::Png).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }
}
