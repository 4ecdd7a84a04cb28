// pixbatch/src/processors/compressor.rs
use crate::core::{ConvertError, ImageFormat, Result};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use oxipng::{optimize_from_memory, Options};

const AVIF_SPEED: u8 = 6;

pub struct Compressor {
    png_preset: u8,
}

impl Compressor {
    pub fn new() -> Self {
        Self { png_preset: 2 }
    }

    /// Encodes `image` as `format`. `quality` is 0 to 100; lossy codecs
    /// clamp it to their accepted range and PNG ignores it.
    pub fn encode(&self, image: &DynamicImage, format: ImageFormat, quality: i32) -> Result<Vec<u8>> {
        let quality = quality.clamp(1, 100) as u8;

        log::debug!(
            "Encoding {}x{} image as {} with quality {}",
            image.width(),
            image.height(),
            format,
            quality
        );

        let data = match format {
            ImageFormat::Jpeg => self.encode_jpeg(image, quality)?,
            ImageFormat::Png => self.encode_png(image)?,
            ImageFormat::WebP => self.encode_webp(image, quality)?,
            ImageFormat::Avif => self.encode_avif(image, quality)?,
            other => {
                return Err(ConvertError::UnsupportedFormat(format!(
                    "{} cannot be used as an output format",
                    other
                )))
            }
        };

        if data.is_empty() {
            return Err(ConvertError::encode(format, "encoder returned no data"));
        }

        Ok(data)
    }

    fn encode_jpeg(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
        let rgb = image.to_rgb8();
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality)
            .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            .map_err(|e| encode_error(ImageFormat::Jpeg, e))?;
        Ok(buffer)
    }

    fn encode_png(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        if image.color().has_alpha() {
            let rgba = image.to_rgba8();
            PngEncoder::new(&mut buffer)
                .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ExtendedColorType::Rgba8)
                .map_err(|e| encode_error(ImageFormat::Png, e))?;
        } else {
            let rgb = image.to_rgb8();
            PngEncoder::new(&mut buffer)
                .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                .map_err(|e| encode_error(ImageFormat::Png, e))?;
        }

        optimize_from_memory(&buffer, &Options::from_preset(self.png_preset)).map_err(|e| {
            ConvertError::Encode {
                format: ImageFormat::Png,
                message: format!("PNG optimization failed: {}", e),
                source: None,
            }
        })
    }

    fn encode_webp(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
        let mut rgba = image.to_rgba8();
        quantize_rgb(rgba.as_mut(), quality);

        let mut buffer = Vec::new();
        WebPEncoder::new_lossless(&mut buffer)
            .encode(rgba.as_raw(), rgba.width(), rgba.height(), ExtendedColorType::Rgba8)
            .map_err(|e| encode_error(ImageFormat::WebP, e))?;
        Ok(buffer)
    }

    fn encode_avif(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
        let rgba = image.to_rgba8();
        let mut buffer = Vec::new();
        AvifEncoder::new_with_speed_quality(&mut buffer, AVIF_SPEED, quality)
            .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ExtendedColorType::Rgba8)
            .map_err(|e| encode_error(ImageFormat::Avif, e))?;
        Ok(buffer)
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_error(format: ImageFormat, e: image::ImageError) -> ConvertError {
    ConvertError::Encode {
        format,
        message: e.to_string(),
        source: Some(Box::new(e)),
    }
}

/// Reduces RGB precision in place so the lossless WebP encoder still trades
/// detail for size below quality 100. Alpha is left untouched.
fn quantize_rgb(data: &mut [u8], quality: u8) {
    if quality >= 100 {
        return;
    }
    let levels = levels_for_quality(quality);
    let step = 255.0 / (levels as f32 - 1.0);
    for pixel in data.chunks_exact_mut(4) {
        for channel in pixel.iter_mut().take(3) {
            let bucket = (f32::from(*channel) / step).round();
            *channel = (bucket * step).round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn levels_for_quality(quality: u8) -> u16 {
    if quality >= 100 {
        return 256;
    }
    let normalized = (quality as f32).clamp(1.0, 100.0) / 100.0;
    let levels = 2.0 + normalized * normalized * 254.0;
    levels.round().clamp(2.0, 256.0) as u16
}
