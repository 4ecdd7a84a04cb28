// pixbatch/src/processors/loader.rs
use super::classifier::classify_path;
use super::raw::RawDecoder;
use crate::core::{ConvertError, ImageFormat, Result};
use image::{DynamicImage, GenericImageView, ImageReader};
use std::path::Path;

/// How a source file is turned into pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    Standard,
    /// Develop through the RAW sub-decoder, then decode the lossless intermediate.
    Raw,
}

impl DecodeStrategy {
    pub fn for_format(format: ImageFormat) -> Self {
        if format.is_raw() {
            DecodeStrategy::Raw
        } else {
            DecodeStrategy::Standard
        }
    }
}

pub struct Loader {
    max_dimensions: Option<(u32, u32)>,
    raw: RawDecoder,
}

impl Loader {
    pub fn new() -> Self {
        Self {
            max_dimensions: Some((100_000, 100_000)),
            raw: RawDecoder::new(),
        }
    }

    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_dimensions = Some((width, height));
        self
    }

    pub fn load(&self, path: &Path) -> Result<DynamicImage> {
        log::debug!("Loading image from: {}", path.display());

        self.validate_path(path)?;

        let image = match DecodeStrategy::for_format(classify_path(path)) {
            DecodeStrategy::Standard => self.decode_standard(path)?,
            DecodeStrategy::Raw => {
                let intermediate = self.raw.decode_to_intermediate(path)?;
                self.load_from_bytes(path, &intermediate)?
            }
        };

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ConvertError::Decode {
                path: path.to_path_buf(),
                message: "decoded image is empty".to_string(),
                source: None,
            });
        }

        if let Some((max_w, max_h)) = self.max_dimensions {
            if width > max_w || height > max_h {
                return Err(ConvertError::Decode {
                    path: path.to_path_buf(),
                    message: format!(
                        "image dimensions {}x{} exceed maximum {}x{}",
                        width, height, max_w, max_h
                    ),
                    source: None,
                });
            }
        }

        log::debug!(
            "Loaded image: {}x{} pixels, color: {:?}",
            width,
            height,
            image.color()
        );

        Ok(image)
    }

    /// Standard decode of in-memory bytes; `origin` is only used for errors.
    pub fn load_from_bytes(&self, origin: &Path, data: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(data)
            .map_err(|e| ConvertError::decode(origin, "failed to decode image data", e))
    }

    fn decode_standard(&self, path: &Path) -> Result<DynamicImage> {
        let reader = ImageReader::open(path)
            .map_err(|e| ConvertError::decode(path, "failed to open file", e))?
            .with_guessed_format()
            .map_err(|e| ConvertError::decode(path, "failed to read file header", e))?;

        reader
            .decode()
            .map_err(|e| ConvertError::decode(path, "failed to decode image", e))
    }

    fn validate_path(&self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(ConvertError::SourceNotFound(path.to_path_buf()));
        }

        let metadata = path.metadata().map_err(|e| ConvertError::read(path, e))?;
        if metadata.len() == 0 {
            return Err(ConvertError::Decode {
                path: path.to_path_buf(),
                message: "file is empty".to_string(),
                source: None,
            });
        }

        Ok(())
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FailureReason;
    use image::RgbImage;

    #[test]
    fn strategy_follows_format() {
        assert_eq!(DecodeStrategy::for_format(ImageFormat::Jpeg), DecodeStrategy::Standard);
        assert_eq!(DecodeStrategy::for_format(ImageFormat::AdobeDng), DecodeStrategy::Raw);
        assert_eq!(DecodeStrategy::for_format(ImageFormat::OtherRaw), DecodeStrategy::Raw);
    }

    #[test]
    fn loads_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        RgbImage::new(12, 7).save(&path).unwrap();

        let img = Loader::new().load(&path).unwrap();
        assert_eq!(img.dimensions(), (12, 7));
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let err = Loader::new().load(Path::new("/nope/missing.jpg")).unwrap_err();
        assert_eq!(err.reason(), FailureReason::SourceNotFound);
        assert!(err.to_string().contains("/nope/missing.jpg"));
    }

    #[test]
    fn corrupt_and_empty_files_are_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        let corrupt = dir.path().join("corrupt.jpg");
        std::fs::write(&corrupt, b"\xFF\xD8 not really a jpeg").unwrap();
        let err = Loader::new().load(&corrupt).unwrap_err();
        assert_eq!(err.reason(), FailureReason::DecodeFailed);
        assert!(std::error::Error::source(&err).is_some());

        let empty = dir.path().join("empty.png");
        std::fs::write(&empty, b"").unwrap();
        let err = Loader::new().load(&empty).unwrap_err();
        assert_eq!(err.reason(), FailureReason::DecodeFailed);
    }

    #[test]
    fn oversized_images_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        RgbImage::new(40, 10).save(&path).unwrap();

        let loader = Loader::new().with_max_dimensions(32, 32);
        assert!(loader.load(&path).is_err());
    }
}
