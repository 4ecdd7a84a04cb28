// pixbatch/src/core/settings.rs
use super::{ConvertError, ImageFile, ImageFormat, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the folder created next to the source when no output directory is set.
pub const DEFAULT_SUBFOLDER: &str = "converted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatQualityPair {
    pub format: ImageFormat,
    pub quality: Option<i32>,
}

impl FormatQualityPair {
    pub fn new(format: ImageFormat, quality: Option<i32>) -> Self {
        Self { format, quality }
    }
}

/// Export one source to several formats in a single run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiFormatSettings {
    pub enabled: bool,
    pub targets: Vec<FormatQualityPair>,
}

impl MultiFormatSettings {
    pub fn new(targets: Vec<FormatQualityPair>) -> Self {
        Self {
            enabled: true,
            targets,
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.targets.is_empty()
    }

    /// Targets in list order with repeated formats dropped (first one wins),
    /// since two entries of one format would resolve to the same output file.
    pub fn targets(&self) -> Vec<FormatQualityPair> {
        let mut seen = Vec::with_capacity(self.targets.len());
        for pair in &self.targets {
            if !seen.iter().any(|p: &FormatQualityPair| p.format == pair.format) {
                seen.push(*pair);
            }
        }
        seen
    }

    /// Parses a list such as `webp:80,png,avif:50`.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut targets = Vec::new();

        for item in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, quality) = match item.split_once(':') {
                Some((name, q)) => {
                    let q = q.trim().parse::<i32>().map_err(|_| {
                        ConvertError::InvalidSettings(format!("Invalid quality in '{}'", item))
                    })?;
                    (name, Some(q))
                }
                None => (item, None),
            };
            targets.push(FormatQualityPair::new(name.parse()?, quality));
        }

        if targets.is_empty() {
            return Err(ConvertError::InvalidSettings(
                "At least one target format must be given".to_string(),
            ));
        }

        Ok(Self::new(targets))
    }
}

/// Built-in setting bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// WebP, quality 80, long edge 1920.
    Web,
    /// PNG, quality 100, original size.
    Quality,
    /// WebP, quality 60, long edge 1280.
    Size,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSettings {
    pub quality: i32,
    pub max_pixel_size: Option<i32>,
    pub enable_resizing: bool,
    pub target_format: ImageFormat,
    pub output_directory: Option<PathBuf>,
    pub overwrite_existing: bool,
    pub preserve_timestamp: bool,
    pub multi_format: Option<MultiFormatSettings>,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            quality: 85,
            max_pixel_size: Some(2048),
            enable_resizing: true,
            target_format: ImageFormat::WebP,
            output_directory: None,
            overwrite_existing: true,
            preserve_timestamp: false,
            multi_format: None,
        }
    }
}

impl ConversionSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0..=100).contains(&self.quality) {
            return Err(ConvertError::InvalidSettings(
                "Quality must be between 0 and 100".to_string(),
            ));
        }

        if matches!(self.max_pixel_size, Some(size) if size <= 0) {
            return Err(ConvertError::InvalidSettings(
                "Max pixel size must be greater than 0".to_string(),
            ));
        }

        if self.target_format == ImageFormat::Unknown {
            return Err(ConvertError::InvalidSettings(
                "Target format must be specified".to_string(),
            ));
        }

        if !self.target_format.is_encodable() {
            return Err(ConvertError::InvalidSettings(format!(
                "{} is not an output format",
                self.target_format
            )));
        }

        if let Some(multi) = self.multi_format.as_ref().filter(|m| m.is_active()) {
            for pair in &multi.targets {
                if !pair.format.is_encodable() {
                    return Err(ConvertError::InvalidSettings(format!(
                        "{} is not an output format",
                        pair.format
                    )));
                }
                if matches!(pair.quality, Some(q) if !(0..=100).contains(&q)) {
                    return Err(ConvertError::InvalidSettings(format!(
                        "Quality for {} must be between 0 and 100",
                        pair.format
                    )));
                }
            }
        }

        Ok(())
    }

    /// Long-edge cap to resize to, if resizing applies at all.
    pub fn resize_limit(&self) -> Option<u32> {
        if !self.enable_resizing {
            return None;
        }
        self.max_pixel_size
            .filter(|size| *size > 0)
            .map(|size| size as u32)
    }

    pub fn output_directory_for(&self, source_directory: &Path) -> PathBuf {
        match &self.output_directory {
            Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
            _ => source_directory.join(DEFAULT_SUBFOLDER),
        }
    }

    pub fn multi_format_active(&self) -> bool {
        self.multi_format.as_ref().is_some_and(MultiFormatSettings::is_active)
    }

    pub fn apply_preset(&mut self, preset: Preset) {
        match preset {
            Preset::Web => {
                self.target_format = ImageFormat::WebP;
                self.quality = 80;
                self.max_pixel_size = Some(1920);
                self.enable_resizing = true;
            }
            Preset::Quality => {
                self.target_format = ImageFormat::Png;
                self.quality = 100;
                self.max_pixel_size = None;
                self.enable_resizing = false;
            }
            Preset::Size => {
                self.target_format = ImageFormat::WebP;
                self.quality = 60;
                self.max_pixel_size = Some(1280);
                self.enable_resizing = true;
            }
        }
    }
}

/// Merges batch settings, per-file overrides and an optional fan-out target
/// into the settings for one encode. Highest tier wins per field:
/// fan-out target, then per-file custom values, then the batch.
pub fn resolve(
    batch: &ConversionSettings,
    file: &ImageFile,
    target: Option<&FormatQualityPair>,
) -> ConversionSettings {
    let base_quality = file.custom_quality.unwrap_or(batch.quality);
    let base_format = file.custom_target_format.unwrap_or(batch.target_format);

    ConversionSettings {
        quality: target.and_then(|t| t.quality).unwrap_or(base_quality),
        max_pixel_size: file.custom_max_pixel_size.or(batch.max_pixel_size),
        enable_resizing: batch.enable_resizing,
        target_format: target.map(|t| t.format).unwrap_or(base_format),
        output_directory: batch.output_directory.clone(),
        overwrite_existing: batch.overwrite_existing,
        preserve_timestamp: batch.preserve_timestamp,
        multi_format: None,
    }
}

/// Effective settings for every encode a file needs: one per fan-out target
/// when multi-format export is active, otherwise exactly one.
pub fn resolve_targets(batch: &ConversionSettings, file: &ImageFile) -> Vec<ConversionSettings> {
    match batch.multi_format.as_ref().filter(|m| m.is_active()) {
        Some(multi) => multi
            .targets()
            .iter()
            .map(|pair| resolve(batch, file, Some(pair)))
            .collect(),
        None => vec![resolve(batch, file, None)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_quality(quality: i32) -> ConversionSettings {
        ConversionSettings {
            quality,
            ..Default::default()
        }
    }

    #[test]
    fn quality_bounds() {
        for q in [0, 1, 50, 85, 100] {
            assert!(with_quality(q).validate().is_ok(), "quality {} should be valid", q);
        }
        for q in [-1, -50, 101, 150] {
            assert!(with_quality(q).validate().is_err(), "quality {} should be invalid", q);
        }
    }

    #[test]
    fn max_pixel_size_bounds() {
        let mut settings = ConversionSettings::default();
        for size in [None, Some(1), Some(2048)] {
            settings.max_pixel_size = size;
            assert!(settings.validate().is_ok());
        }
        for size in [Some(0), Some(-10)] {
            settings.max_pixel_size = size;
            assert!(settings.validate().is_err());
        }
    }

    #[test]
    fn unknown_target_is_always_invalid() {
        let settings = ConversionSettings {
            target_format: ImageFormat::Unknown,
            quality: 50,
            max_pixel_size: None,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConvertError::InvalidSettings(_)));
    }

    #[test]
    fn raw_or_bmp_target_is_invalid() {
        for format in [ImageFormat::Bmp, ImageFormat::Gif, ImageFormat::NikonRaw] {
            let settings = ConversionSettings {
                target_format: format,
                ..Default::default()
            };
            assert!(settings.validate().is_err());
        }
    }

    #[test]
    fn custom_quality_beats_batch_quality() {
        let batch = ConversionSettings::default();
        let mut file = ImageFile::new("/photos", "a.jpg");
        file.custom_quality = Some(40);

        let resolved = resolve(&batch, &file, None);
        assert_eq!(resolved.quality, 40);
        assert_eq!(resolved.target_format, ImageFormat::WebP);
        assert_eq!(resolved.max_pixel_size, Some(2048));
    }

    #[test]
    fn fan_out_quality_beats_custom_quality() {
        let batch = ConversionSettings::default();
        let mut file = ImageFile::new("/photos", "a.jpg");
        file.custom_quality = Some(40);
        file.custom_target_format = Some(ImageFormat::Jpeg);
        file.custom_max_pixel_size = Some(800);

        let pair = FormatQualityPair::new(ImageFormat::Png, Some(90));
        let resolved = resolve(&batch, &file, Some(&pair));
        assert_eq!(resolved.quality, 90);
        assert_eq!(resolved.target_format, ImageFormat::Png);
        assert_eq!(resolved.max_pixel_size, Some(800));

        let pair = FormatQualityPair::new(ImageFormat::Avif, None);
        let resolved = resolve(&batch, &file, Some(&pair));
        assert_eq!(resolved.quality, 40);
        assert_eq!(resolved.target_format, ImageFormat::Avif);
        assert!(resolved.multi_format.is_none());
    }

    #[test]
    fn resolve_targets_fans_out_only_when_active() {
        let mut batch = ConversionSettings::default();
        let file = ImageFile::new("/photos", "a.jpg");
        assert_eq!(resolve_targets(&batch, &file).len(), 1);

        batch.multi_format = Some(MultiFormatSettings {
            enabled: false,
            targets: vec![FormatQualityPair::new(ImageFormat::Png, None)],
        });
        assert_eq!(resolve_targets(&batch, &file).len(), 1);

        batch.multi_format = Some(MultiFormatSettings::parse("webp:70,png,webp:10").unwrap());
        let targets = resolve_targets(&batch, &file);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].target_format, ImageFormat::WebP);
        assert_eq!(targets[0].quality, 70);
        assert_eq!(targets[1].target_format, ImageFormat::Png);
        assert_eq!(targets[1].quality, 85);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(MultiFormatSettings::parse("").is_err());
        assert!(MultiFormatSettings::parse("webp:high").is_err());
        assert!(MultiFormatSettings::parse("tiff").is_err());
    }

    #[test]
    fn resize_limit_respects_flag() {
        let mut settings = ConversionSettings::default();
        assert_eq!(settings.resize_limit(), Some(2048));
        settings.enable_resizing = false;
        assert_eq!(settings.resize_limit(), None);
        settings.enable_resizing = true;
        settings.max_pixel_size = None;
        assert_eq!(settings.resize_limit(), None);
    }

    #[test]
    fn output_directory_defaults_to_subfolder() {
        let mut settings = ConversionSettings::default();
        assert_eq!(
            settings.output_directory_for(Path::new("/photos")),
            PathBuf::from("/photos/converted")
        );
        settings.output_directory = Some(PathBuf::new());
        assert_eq!(
            settings.output_directory_for(Path::new("/photos")),
            PathBuf::from("/photos/converted")
        );
        settings.output_directory = Some(PathBuf::from("/out"));
        assert_eq!(settings.output_directory_for(Path::new("/photos")), PathBuf::from("/out"));
    }

    #[test]
    fn presets() {
        let mut settings = ConversionSettings::default();
        settings.apply_preset(Preset::Quality);
        assert_eq!(settings.target_format, ImageFormat::Png);
        assert_eq!(settings.resize_limit(), None);
        assert!(settings.validate().is_ok());

        settings.apply_preset(Preset::Size);
        assert_eq!(settings.quality, 60);
        assert_eq!(settings.resize_limit(), Some(1280));
    }
}
