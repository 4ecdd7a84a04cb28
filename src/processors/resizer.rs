// pixbatch/src/processors/resizer.rs
use crate::core::ResizeAlgorithm;
use image::{imageops::FilterType, DynamicImage, GenericImageView};

pub struct Resizer {
    algorithm: ResizeAlgorithm,
}

impl Resizer {
    pub fn new(algorithm: ResizeAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Dimensions after fitting the long edge into `max_long_edge`, or `None`
    /// when the image already fits.
    pub fn target_dimensions(width: u32, height: u32, max_long_edge: u32) -> Option<(u32, u32)> {
        if max_long_edge == 0 || width == 0 || height == 0 || width.max(height) <= max_long_edge {
            return None;
        }

        let aspect = width as f64 / height as f64;
        let max = max_long_edge as f64;

        let (new_w, new_h) = if aspect >= 1.0 {
            (max_long_edge, (max / aspect).round() as u32)
        } else {
            ((max * aspect).round() as u32, max_long_edge)
        };

        Some((new_w.max(1), new_h.max(1)))
    }

    /// Fits the image into `max_long_edge`, passing it through untouched when
    /// it already fits.
    pub fn resize(&self, image: DynamicImage, max_long_edge: u32) -> DynamicImage {
        let (width, height) = image.dimensions();

        let Some((new_w, new_h)) = Self::target_dimensions(width, height, max_long_edge) else {
            log::debug!("Image dimensions unchanged, skipping resize");
            return image;
        };

        log::debug!(
            "Resizing image from {}x{} to {}x{}",
            width,
            height,
            new_w,
            new_h
        );

        image.resize_exact(new_w, new_h, self.get_filter_type())
    }

    fn get_filter_type(&self) -> FilterType {
        match self.algorithm {
            ResizeAlgorithm::Nearest => FilterType::Nearest,
            ResizeAlgorithm::Bilinear => FilterType::Triangle,
            ResizeAlgorithm::Bicubic => FilterType::CatmullRom,
            ResizeAlgorithm::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl Default for Resizer {
    fn default() -> Self {
        Self::new(ResizeAlgorithm::Lanczos3)
    }
}
