// pixbatch/src/processors/raw.rs
//! Camera RAW sub-decoder.
//!
//! Sensor data comes from `rawloader`. It is developed into an 8-bit RGB
//! image with a 2x2 superpixel step, rotated according to the EXIF
//! orientation, and re-encoded losslessly as PNG. The PNG bytes are what the
//! standard decode path consumes.

use super::metadata::{MetadataProcessor, Orientation};
use crate::core::{ConvertError, Result};
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbImage};
use std::path::Path;

const GAMMA: f32 = 1.0 / 2.2;
/// CFA colour lookup window; large enough for Bayer (2x2) and X-Trans (6x6).
const CFA_WINDOW: usize = 6;

/// Sensor readout detached from the decoder library.
#[derive(Debug, Clone)]
pub struct SensorData {
    pub width: usize,
    pub height: usize,
    /// Components per pixel: 1 for mosaiced sensors, 3 for linear RGB.
    pub cpp: usize,
    pub data: Vec<u16>,
    /// Top, right, bottom, left.
    pub crops: [usize; 4],
    pub black_levels: [u16; 4],
    pub white_levels: [u16; 4],
    pub wb_coeffs: [f32; 4],
    /// Colour index (0 red, 1 green, 2 blue, 3 second green) relative to the
    /// top-left corner of the cropped area.
    pub cfa: [[usize; CFA_WINDOW]; CFA_WINDOW],
}

impl SensorData {
    fn from_raw(raw: &rawloader::RawImage) -> Self {
        let data = match &raw.data {
            rawloader::RawImageData::Integer(values) => values.clone(),
            rawloader::RawImageData::Float(values) => values
                .iter()
                .map(|&v| (v * 65535.0).clamp(0.0, 65535.0) as u16)
                .collect(),
        };

        let [top, _, _, left] = raw.crops;
        let mut cfa = [[0usize; CFA_WINDOW]; CFA_WINDOW];
        for (row, colors) in cfa.iter_mut().enumerate() {
            for (col, color) in colors.iter_mut().enumerate() {
                *color = raw.cfa.color_at(top + row, left + col);
            }
        }

        Self {
            width: raw.width,
            height: raw.height,
            cpp: raw.cpp,
            data,
            crops: raw.crops,
            black_levels: raw.blacklevels,
            white_levels: raw.whitelevels,
            wb_coeffs: raw.wb_coeffs,
            cfa,
        }
    }

    fn active_area(&self) -> (usize, usize, usize, usize) {
        let [top, right, bottom, left] = self.crops;
        let width = self.width.saturating_sub(left + right);
        let height = self.height.saturating_sub(top + bottom);
        (left, top, width, height)
    }

    fn normalized(&self, value: u16, channel: usize) -> f32 {
        let black = self.black_levels[channel] as f32;
        let white = self.white_levels[channel] as f32;
        let range = (white - black).max(1.0);
        ((value as f32 - black) / range).clamp(0.0, 1.0)
    }

    /// White balance multipliers for R, G, B normalised to green.
    fn white_balance(&self) -> [f32; 3] {
        let sane = |v: f32| if v.is_finite() && v > 0.0 { v } else { 1.0 };
        let green = sane(self.wb_coeffs[1]);
        [
            sane(self.wb_coeffs[0]) / green,
            1.0,
            sane(self.wb_coeffs[2]) / green,
        ]
    }
}

fn to_display(linear: f32) -> u8 {
    (linear.clamp(0.0, 1.0).powf(GAMMA) * 255.0).round() as u8
}

/// Develops sensor data into an sRGB-ish 8-bit image.
///
/// Mosaiced sensors are reduced to one output pixel per 2x2 block. A channel
/// missing from a block (possible with X-Trans) takes the block's mean.
pub fn develop(sensor: &SensorData) -> std::result::Result<RgbImage, String> {
    let (x0, y0, width, height) = sensor.active_area();
    let wb = sensor.white_balance();

    match sensor.cpp {
        3 => {
            if width == 0 || height == 0 {
                return Err("sensor area is empty".to_string());
            }
            if sensor.data.len() < sensor.width * sensor.height * 3 {
                return Err("sensor data is truncated".to_string());
            }
            let mut out = RgbImage::new(width as u32, height as u32);
            for (x, y, pixel) in out.enumerate_pixels_mut() {
                let base = ((y0 + y as usize) * sensor.width + x0 + x as usize) * 3;
                for c in 0..3 {
                    let v = sensor.normalized(sensor.data[base + c], c) * wb[c];
                    pixel.0[c] = to_display(v);
                }
            }
            Ok(out)
        }
        1 => {
            let (out_w, out_h) = (width / 2, height / 2);
            if out_w == 0 || out_h == 0 {
                return Err("sensor area is too small".to_string());
            }
            if sensor.data.len() < sensor.width * sensor.height {
                return Err("sensor data is truncated".to_string());
            }
            let mut out = RgbImage::new(out_w as u32, out_h as u32);
            for (x, y, pixel) in out.enumerate_pixels_mut() {
                let mut sums = [0f32; 3];
                let mut counts = [0u32; 3];
                for dy in 0..2 {
                    for dx in 0..2 {
                        let row = y as usize * 2 + dy;
                        let col = x as usize * 2 + dx;
                        let color = sensor.cfa[row % CFA_WINDOW][col % CFA_WINDOW];
                        let value = sensor.data[(y0 + row) * sensor.width + x0 + col];
                        let channel = if color == 3 { 1 } else { color.min(2) };
                        sums[channel] += sensor.normalized(value, color.min(3));
                        counts[channel] += 1;
                    }
                }
                let present: Vec<f32> = (0..3)
                    .filter(|&c| counts[c] > 0)
                    .map(|c| sums[c] / counts[c] as f32)
                    .collect();
                let fallback = present.iter().sum::<f32>() / present.len().max(1) as f32;
                for c in 0..3 {
                    let mean = if counts[c] > 0 {
                        sums[c] / counts[c] as f32
                    } else {
                        fallback
                    };
                    pixel.0[c] = to_display(mean * wb[c]);
                }
            }
            Ok(out)
        }
        other => Err(format!("unsupported sensor layout with {} components", other)),
    }
}

pub struct RawDecoder {
    metadata: MetadataProcessor,
}

impl RawDecoder {
    pub fn new() -> Self {
        Self {
            metadata: MetadataProcessor::new(),
        }
    }

    /// Decodes a RAW file into lossless PNG bytes, orientation applied.
    pub fn decode_to_intermediate(&self, path: &Path) -> Result<Vec<u8>> {
        log::debug!("Developing RAW file {}", path.display());

        let raw = std::panic::catch_unwind(|| rawloader::decode_file(path))
            .map_err(|_| ConvertError::Decode {
                path: path.to_path_buf(),
                message: "RAW decoder fault: decoder panicked".to_string(),
                source: None,
            })?
            .map_err(|e| ConvertError::decode(path, format!("RAW decoder fault: {}", e), e))?;

        let sensor = SensorData::from_raw(&raw);
        let orientation = self.metadata.orientation(path);
        self.develop_to_intermediate(path, &sensor, orientation)
    }

    /// Develops sensor data, applies `orientation` and re-encodes the result
    /// as PNG. `origin` is only used for errors.
    pub fn develop_to_intermediate(
        &self,
        origin: &Path,
        sensor: &SensorData,
        orientation: Orientation,
    ) -> Result<Vec<u8>> {
        let developed = develop(sensor).map_err(|msg| ConvertError::Decode {
            path: origin.to_path_buf(),
            message: format!("RAW decoder fault: {}", msg),
            source: None,
        })?;

        if orientation != Orientation::Normal {
            log::debug!("Applying orientation {:?} to {}", orientation, origin.display());
        }
        let image = orientation.apply(DynamicImage::ImageRgb8(developed));

        encode_lossless(&image)
            .map_err(|e| ConvertError::decode(origin, "lossless re-encode failed", e))
    }
}

impl Default for RawDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_lossless(image: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer).write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buffer)
}
