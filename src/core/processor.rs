// pixbatch/src/core/processor.rs
use super::{
    CancellationToken, ConversionResult, ConversionSettings, ConvertError, ConvertedImage,
    FailureReason, ImageFile, ResizeAlgorithm, Result,
};
use crate::processors::{Compressor, Loader, Resizer};
use crate::utils::{prepare_output_path, resolve_output_path};
use image::{DynamicImage, GenericImageView};
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Where a conversion unit is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
    Pending,
    Decoding,
    Resizing,
    Encoding,
    Writing,
    Succeeded,
    Failed(FailureReason),
}

/// Per-file conversion unit: decode, fit, encode and write one source.
///
/// A `Converter` holds no per-file state and can be shared across threads.
pub struct Converter {
    loader: Loader,
    resizer: Resizer,
    compressor: Compressor,
}

impl Converter {
    pub fn new() -> Self {
        Self {
            loader: Loader::new(),
            resizer: Resizer::default(),
            compressor: Compressor::new(),
        }
    }

    pub fn with_algorithm(mut self, algorithm: ResizeAlgorithm) -> Self {
        self.resizer = Resizer::new(algorithm);
        self
    }

    pub fn convert(
        &self,
        file: &ImageFile,
        settings: &ConversionSettings,
        cancel: &CancellationToken,
    ) -> ConversionResult {
        self.convert_with_observer(file, settings, cancel, &mut |_| {})
    }

    /// Same as [`Converter::convert`], reporting every stage transition.
    pub fn convert_with_observer(
        &self,
        file: &ImageFile,
        settings: &ConversionSettings,
        cancel: &CancellationToken,
        observer: &mut dyn FnMut(ConversionStage),
    ) -> ConversionResult {
        observer(ConversionStage::Pending);

        let result = self.run_single(file, settings, cancel, observer);
        match &result {
            Ok(out) => {
                observer(ConversionStage::Succeeded);
                log::info!(
                    "Converted {} -> {} ({} bytes, {})",
                    file.file_name,
                    out.output_path.display(),
                    out.output_size,
                    out.dimensions()
                );
            }
            Err(e) => {
                observer(ConversionStage::Failed(e.reason()));
                log::warn!("Conversion of {} failed: {}", file.file_name, e);
            }
        }

        result.into()
    }

    /// Converts one source into several targets. The source is decoded once
    /// and resized once per distinct size cap; targets are then encoded in
    /// parallel. Results come back in target order.
    pub fn convert_formats(
        &self,
        file: &ImageFile,
        targets: &[ConversionSettings],
        cancel: &CancellationToken,
    ) -> Vec<ConversionResult> {
        if targets.is_empty() {
            return Vec::new();
        }

        let validations: Vec<Result<()>> = targets.iter().map(ConversionSettings::validate).collect();
        if validations.iter().all(|v| v.is_err()) {
            return validations
                .into_iter()
                .filter_map(std::result::Result::err)
                .map(ConversionResult::Failure)
                .collect();
        }

        if cancel.is_cancelled() {
            return targets
                .iter()
                .map(|_| ConversionResult::Failure(ConvertError::Cancelled))
                .collect();
        }

        let source = file.full_path();
        let image = match self.loader.load(&source) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Decoding {} failed: {}", file.file_name, e);
                let copy = e.detached();
                let mut original = Some(e);
                return validations
                    .into_iter()
                    .map(|v| match v {
                        Err(invalid) => ConversionResult::Failure(invalid),
                        Ok(()) => ConversionResult::Failure(
                            original.take().unwrap_or_else(|| copy.detached()),
                        ),
                    })
                    .collect();
            }
        };

        let mut variants: Vec<(u32, DynamicImage)> = Vec::new();
        for (settings, validation) in targets.iter().zip(&validations) {
            if validation.is_err() {
                continue;
            }
            if let Some(limit) = self.effective_limit(&image, settings) {
                if !variants.iter().any(|(l, _)| *l == limit) {
                    variants.push((limit, self.resizer.resize(image.clone(), limit)));
                }
            }
        }

        targets
            .par_iter()
            .zip(validations.into_par_iter())
            .map(|(settings, validation)| {
                let result = validation.and_then(|_| {
                    let fitted = match self.effective_limit(&image, settings) {
                        Some(limit) => variants
                            .iter()
                            .find(|(l, _)| *l == limit)
                            .map(|(_, img)| img)
                            .unwrap_or(&image),
                        None => &image,
                    };
                    self.encode_and_write(file, &source, fitted, settings, cancel, &mut |_| {})
                });
                if let Err(e) = &result {
                    log::warn!(
                        "Conversion of {} to {} failed: {}",
                        file.file_name,
                        settings.target_format,
                        e
                    );
                }
                ConversionResult::from(result)
            })
            .collect()
    }

    fn run_single(
        &self,
        file: &ImageFile,
        settings: &ConversionSettings,
        cancel: &CancellationToken,
        observer: &mut dyn FnMut(ConversionStage),
    ) -> Result<ConvertedImage> {
        settings.validate()?;

        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }

        let source = file.full_path();

        observer(ConversionStage::Decoding);
        let mut image = self.loader.load(&source)?;

        if let Some(limit) = self.effective_limit(&image, settings) {
            observer(ConversionStage::Resizing);
            image = self.resizer.resize(image, limit);
        }

        self.encode_and_write(file, &source, &image, settings, cancel, observer)
    }

    /// Size cap to apply, only when resizing is enabled and the image exceeds it.
    fn effective_limit(&self, image: &DynamicImage, settings: &ConversionSettings) -> Option<u32> {
        let (width, height) = image.dimensions();
        settings
            .resize_limit()
            .filter(|limit| width.max(height) > *limit)
    }

    fn encode_and_write(
        &self,
        file: &ImageFile,
        source: &Path,
        image: &DynamicImage,
        settings: &ConversionSettings,
        cancel: &CancellationToken,
        observer: &mut dyn FnMut(ConversionStage),
    ) -> Result<ConvertedImage> {
        let (width, height) = image.dimensions();
        let output_path = resolve_output_path(file, settings, width, height)?;
        prepare_output_path(&output_path, settings.overwrite_existing)?;

        observer(ConversionStage::Encoding);
        let bytes = self
            .compressor
            .encode(image, settings.target_format, settings.quality)?;

        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }

        observer(ConversionStage::Writing);
        write_output(&output_path, &bytes, settings.overwrite_existing)?;

        if settings.preserve_timestamp {
            if let Err(e) = copy_modified_time(source, &output_path) {
                log::warn!(
                    "Could not preserve timestamp on {}: {}",
                    output_path.display(),
                    e
                );
            }
        }

        let output_size = fs::metadata(&output_path)
            .map(|m| m.len())
            .unwrap_or(bytes.len() as u64);

        Ok(ConvertedImage {
            output_path,
            format: settings.target_format,
            output_size,
            width,
            height,
        })
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes through a temporary file in the destination directory so the
/// target path only ever holds a complete file.
fn write_output(path: &Path, bytes: &[u8], overwrite: bool) -> Result<()> {
    let directory = path
        .parent()
        .ok_or_else(|| ConvertError::Write {
            path: path.to_path_buf(),
            message: "output path has no parent directory".to_string(),
            source: None,
        })?;

    let mut builder = tempfile::Builder::new();
    if let Some(permissions) = new_file_permissions() {
        builder.permissions(permissions);
    }
    let mut tmp = builder
        .tempfile_in(directory)
        .map_err(|e| ConvertError::write(path, e))?;
    tmp.write_all(bytes).map_err(|e| ConvertError::write(path, e))?;
    tmp.flush().map_err(|e| ConvertError::write(path, e))?;

    // a replaced file keeps its mode
    if overwrite {
        if let Ok(existing) = fs::metadata(path) {
            tmp.as_file()
                .set_permissions(existing.permissions())
                .map_err(|e| ConvertError::write(path, e))?;
        }
    }

    if overwrite {
        if path.exists() {
            fs::remove_file(path).map_err(|e| ConvertError::write(path, e))?;
        }
        tmp.persist(path)
            .map_err(|e| ConvertError::write(path, e.error))?;
    } else {
        tmp.persist_noclobber(path)
            .map_err(|e| ConvertError::write(path, e.error))?;
    }

    Ok(())
}

/// Mode for freshly created outputs; the process umask still applies.
#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}

fn copy_modified_time(source: &Path, target: &Path) -> std::io::Result<()> {
    let modified = fs::metadata(source)?.modified()?;
    let file = fs::OpenOptions::new().write(true).open(target)?;
    file.set_modified(modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ImageFormat;
    use image::RgbImage;
    use std::path::PathBuf;

    fn source(dir: &Path, name: &str, width: u32, height: u32) -> ImageFile {
        let path = dir.join(name);
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .save(&path)
            .unwrap();
        ImageFile::from_path(&path).unwrap()
    }

    fn settings(out: &Path) -> ConversionSettings {
        ConversionSettings {
            output_directory: Some(out.to_path_buf()),
            target_format: ImageFormat::Png,
            ..Default::default()
        }
    }

    #[test]
    fn stages_for_resized_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let file = source(dir.path(), "wide.png", 300, 100);
        let mut settings = settings(&dir.path().join("out"));
        settings.max_pixel_size = Some(150);

        let mut stages = Vec::new();
        let result = Converter::new().convert_with_observer(
            &file,
            &settings,
            &CancellationToken::new(),
            &mut |stage| stages.push(stage),
        );

        assert!(result.is_success());
        assert_eq!(
            stages,
            vec![
                ConversionStage::Pending,
                ConversionStage::Decoding,
                ConversionStage::Resizing,
                ConversionStage::Encoding,
                ConversionStage::Writing,
                ConversionStage::Succeeded,
            ]
        );
        let out = result.output().unwrap();
        assert_eq!((out.width, out.height), (150, 50));
        assert_eq!(out.dimensions(), "150 x 50");
        assert!(out.output_path.ends_with("wide-150.png"));
    }

    #[test]
    fn small_images_skip_resizing() {
        let dir = tempfile::tempdir().unwrap();
        let file = source(dir.path(), "small.png", 40, 30);
        let settings = settings(&dir.path().join("out"));

        let mut stages = Vec::new();
        let result = Converter::new().convert_with_observer(
            &file,
            &settings,
            &CancellationToken::new(),
            &mut |stage| stages.push(stage),
        );
        assert!(result.is_success());
        assert!(!stages.contains(&ConversionStage::Resizing));
        assert!(result.output().unwrap().output_path.ends_with("small-40.png"));
    }

    #[test]
    fn cancelled_before_start_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = source(dir.path(), "a.png", 10, 10);
        let out = dir.path().join("out");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut stages = Vec::new();
        let result = Converter::new().convert_with_observer(
            &file,
            &settings(&out),
            &cancel,
            &mut |stage| stages.push(stage),
        );
        assert_eq!(result.failure_reason(), Some(FailureReason::Cancelled));
        assert_eq!(
            stages,
            vec![
                ConversionStage::Pending,
                ConversionStage::Failed(FailureReason::Cancelled)
            ]
        );
        assert!(!out.exists());
    }

    #[test]
    fn existing_output_without_overwrite_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = source(dir.path(), "a.png", 10, 10);
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let existing = out.join("a-10.png");
        fs::write(&existing, b"keep me").unwrap();

        let mut settings = settings(&out);
        settings.overwrite_existing = false;
        let result = Converter::new().convert(&file, &settings, &CancellationToken::new());

        assert_eq!(result.failure_reason(), Some(FailureReason::WriteFailed));
        assert!(result.error_message().unwrap().contains("already exists"));
        assert_eq!(fs::read(&existing).unwrap(), b"keep me");
    }

    #[test]
    fn existing_output_is_replaced_when_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let file = source(dir.path(), "a.png", 10, 10);
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let existing = out.join("a-10.png");
        fs::write(&existing, b"old").unwrap();

        let result = Converter::new().convert(&file, &settings(&out), &CancellationToken::new());
        assert!(result.is_success());
        assert_ne!(fs::read(&existing).unwrap(), b"old");
        // no temporary files left behind
        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn outputs_are_not_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = source(dir.path(), "a.png", 8, 8);
        let out = dir.path().join("out");
        let settings = ConversionSettings {
            target_format: ImageFormat::Jpeg,
            ..settings(&out)
        };

        let result = Converter::new().convert(&file, &settings, &CancellationToken::new());
        let written = &result.output().unwrap().output_path;

        let reference = out.join("reference");
        fs::write(&reference, b"x").unwrap();
        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(written), mode(&reference) & 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn replaced_output_keeps_its_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = source(dir.path(), "a.png", 10, 10);
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let existing = out.join("a-10.png");
        fs::write(&existing, b"old").unwrap();
        fs::set_permissions(&existing, fs::Permissions::from_mode(0o640)).unwrap();

        let result = Converter::new().convert(&file, &settings(&out), &CancellationToken::new());
        assert!(result.is_success());
        let mode = fs::metadata(&existing).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn preserves_source_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let file = source(dir.path(), "a.png", 10, 10);
        let old = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000_000);
        fs::OpenOptions::new()
            .write(true)
            .open(file.full_path())
            .unwrap()
            .set_modified(old)
            .unwrap();

        let mut settings = settings(&dir.path().join("out"));
        settings.preserve_timestamp = true;
        let result = Converter::new().convert(&file, &settings, &CancellationToken::new());

        let out = &result.output().unwrap().output_path;
        assert_eq!(fs::metadata(out).unwrap().modified().unwrap(), old);
    }

    #[test]
    fn fan_out_decodes_once_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = source(dir.path(), "photo.png", 200, 100);
        let out = dir.path().join("out");
        let base = settings(&out);
        let targets: Vec<ConversionSettings> = [ImageFormat::WebP, ImageFormat::Png, ImageFormat::Jpeg]
            .into_iter()
            .map(|format| ConversionSettings {
                target_format: format,
                max_pixel_size: Some(100),
                ..base.clone()
            })
            .collect();

        let results = Converter::new().convert_formats(&file, &targets, &CancellationToken::new());
        let paths: Vec<PathBuf> = results
            .iter()
            .map(|r| r.output().unwrap().output_path.clone())
            .collect();
        assert_eq!(
            paths,
            vec![out.join("photo-100.webp"), out.join("photo-100.png"), out.join("photo-100.jpg")]
        );
    }

    #[test]
    fn fan_out_invalid_entry_fails_alone() {
        let dir = tempfile::tempdir().unwrap();
        let file = source(dir.path(), "photo.png", 20, 10);
        let base = settings(&dir.path().join("out"));
        let targets = vec![
            ConversionSettings {
                quality: 150,
                target_format: ImageFormat::WebP,
                ..base.clone()
            },
            base.clone(),
        ];

        let results = Converter::new().convert_formats(&file, &targets, &CancellationToken::new());
        assert_eq!(results[0].failure_reason(), Some(FailureReason::InvalidSettings));
        assert!(results[1].is_success());
    }

    #[test]
    fn fan_out_missing_source_fails_every_target() {
        let dir = tempfile::tempdir().unwrap();
        let file = ImageFile::new(dir.path(), "gone.png");
        let base = settings(&dir.path().join("out"));
        let targets = vec![
            base.clone(),
            ConversionSettings {
                target_format: ImageFormat::WebP,
                ..base
            },
        ];

        let results = Converter::new().convert_formats(&file, &targets, &CancellationToken::new());
        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.failure_reason(), Some(FailureReason::SourceNotFound));
        }
        assert!(results[0].error_message().unwrap().contains("gone.png"));
    }
}
