// pixbatch/src/core/mod.rs
pub mod processor;
pub mod settings;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub use processor::{ConversionStage, Converter};
pub use settings::{
    resolve, resolve_targets, ConversionSettings, FormatQualityPair, MultiFormatSettings, Preset,
};

/// Logical image formats known to the pipeline.
///
/// RAW sub-kinds only select the decode path; encoding is limited to
/// [`ImageFormat::ENCODABLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageFormat {
    #[default]
    Unknown,
    Jpeg,
    Png,
    WebP,
    Avif,
    Bmp,
    Gif,
    NikonRaw,
    CanonRaw,
    SonyRaw,
    AdobeDng,
    OtherRaw,
}

impl ImageFormat {
    pub const ENCODABLE: [ImageFormat; 4] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::WebP,
        ImageFormat::Avif,
    ];

    pub fn is_raw(self) -> bool {
        matches!(
            self,
            ImageFormat::NikonRaw
                | ImageFormat::CanonRaw
                | ImageFormat::SonyRaw
                | ImageFormat::AdobeDng
                | ImageFormat::OtherRaw
        )
    }

    pub fn is_encodable(self) -> bool {
        Self::ENCODABLE.contains(&self)
    }

    /// Canonical output extension, only defined for encodable formats.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            ImageFormat::Jpeg => Some("jpg"),
            ImageFormat::Png => Some("png"),
            ImageFormat::WebP => Some("webp"),
            ImageFormat::Avif => Some("avif"),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ImageFormat::Unknown => "Unknown",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::WebP => "WebP",
            ImageFormat::Avif => "AVIF",
            ImageFormat::Bmp => "BMP",
            ImageFormat::Gif => "GIF",
            ImageFormat::NikonRaw => "Nikon RAW",
            ImageFormat::CanonRaw => "Canon RAW",
            ImageFormat::SonyRaw => "Sony RAW",
            ImageFormat::AdobeDng => "Adobe DNG",
            ImageFormat::OtherRaw => "RAW",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ImageFormat {
    type Err = ConvertError;

    /// Parses an output format name as typed on the command line.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "webp" => Ok(ImageFormat::WebP),
            "avif" => Ok(ImageFormat::Avif),
            other => Err(ConvertError::UnsupportedFormat(format!(
                "'{}' is not an output format (expected jpeg, png, webp or avif)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeAlgorithm {
    Nearest,
    Bilinear,
    Bicubic,
    #[default]
    Lanczos3,
}

/// Why a conversion unit ended in the failed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    InvalidSettings,
    SourceNotFound,
    DecodeFailed,
    EncodeFailed,
    Cancelled,
    WriteFailed,
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("File not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Failed to decode {}: {message}", path.display())]
    Decode {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Failed to encode image to {format}: {message}")]
    Encode {
        format: ImageFormat,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Failed to write {}: {message}", path.display())]
    Write {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Conversion was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConvertError {
    pub fn decode<E>(path: &Path, message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        ConvertError::Decode {
            path: path.to_path_buf(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Error for a source that could not be read: a missing file is
    /// `SourceNotFound`, anything else a decode failure.
    pub fn read(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConvertError::SourceNotFound(path.to_path_buf())
        } else {
            ConvertError::decode(path, "failed to read file", source)
        }
    }

    pub fn encode(format: ImageFormat, message: impl Into<String>) -> Self {
        ConvertError::Encode {
            format,
            message: message.into(),
            source: None,
        }
    }

    pub fn write(path: &Path, source: std::io::Error) -> Self {
        ConvertError::Write {
            path: path.to_path_buf(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub fn reason(&self) -> FailureReason {
        match self {
            ConvertError::InvalidSettings(_) | ConvertError::Config(_) => {
                FailureReason::InvalidSettings
            }
            ConvertError::SourceNotFound(_) => FailureReason::SourceNotFound,
            ConvertError::Decode { .. } | ConvertError::Image(_) => FailureReason::DecodeFailed,
            ConvertError::Encode { .. } | ConvertError::UnsupportedFormat(_) => {
                FailureReason::EncodeFailed
            }
            ConvertError::Write { .. } | ConvertError::Io(_) => FailureReason::WriteFailed,
            ConvertError::Cancelled => FailureReason::Cancelled,
        }
    }

    /// Copy of this error with the same kind and message but without the
    /// underlying cause, for reporting one failure against several targets.
    pub fn detached(&self) -> ConvertError {
        match self {
            ConvertError::InvalidSettings(msg) => ConvertError::InvalidSettings(msg.clone()),
            ConvertError::SourceNotFound(path) => ConvertError::SourceNotFound(path.clone()),
            ConvertError::Decode { path, message, .. } => ConvertError::Decode {
                path: path.clone(),
                message: message.clone(),
                source: None,
            },
            ConvertError::Encode { format, message, .. } => ConvertError::Encode {
                format: *format,
                message: message.clone(),
                source: None,
            },
            ConvertError::Write { path, message, .. } => ConvertError::Write {
                path: path.clone(),
                message: message.clone(),
                source: None,
            },
            ConvertError::Cancelled => ConvertError::Cancelled,
            ConvertError::Io(e) => ConvertError::Io(std::io::Error::new(e.kind(), e.to_string())),
            ConvertError::Image(e) => ConvertError::Decode {
                path: PathBuf::new(),
                message: e.to_string(),
                source: None,
            },
            ConvertError::UnsupportedFormat(msg) => ConvertError::UnsupportedFormat(msg.clone()),
            ConvertError::Config(msg) => ConvertError::Config(msg.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

/// Cooperative cancellation flag shared between the caller and a running batch.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Externally observed lifecycle of one file in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FileStatus {
    #[default]
    Pending,
    Converting,
    Succeeded,
    SucceededMulti(usize),
    Partial { succeeded: usize, total: usize },
    Failed(Option<String>),
    Cancelled,
}

impl FileStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FileStatus::Pending | FileStatus::Converting)
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            FileStatus::Succeeded | FileStatus::SucceededMulti(_) | FileStatus::Partial { .. }
        )
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Pending => write!(f, "Pending"),
            FileStatus::Converting => write!(f, "Converting"),
            FileStatus::Succeeded => write!(f, "Succeeded"),
            FileStatus::SucceededMulti(n) => write!(f, "Succeeded ({} formats)", n),
            FileStatus::Partial { succeeded, total } => {
                write!(f, "Partial ({}/{})", succeeded, total)
            }
            FileStatus::Failed(None) => write!(f, "Failed"),
            FileStatus::Failed(Some(msg)) => write!(f, "Failed: {}", msg),
            FileStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// One source image and its conversion state.
#[derive(Debug, Clone, Default)]
pub struct ImageFile {
    pub file_name: String,
    pub directory: PathBuf,
    pub size_before: u64,
    pub dimensions_before: Option<(u32, u32)>,
    pub selected: bool,
    pub custom_quality: Option<i32>,
    pub custom_max_pixel_size: Option<i32>,
    pub custom_target_format: Option<ImageFormat>,
    pub size_after: Option<u64>,
    pub dimensions_after: Option<(u32, u32)>,
    pub status: FileStatus,
}

impl ImageFile {
    pub fn new(directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            directory: directory.into(),
            selected: true,
            ..Default::default()
        }
    }

    /// Builds an entry from a file on disk. Pixel dimensions are read from
    /// the header for standard formats and left unknown for RAW sources.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ConvertError::Decode {
                path: path.to_path_buf(),
                message: "file name is not valid UTF-8".to_string(),
                source: None,
            })?
            .to_string();
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let metadata = std::fs::metadata(path).map_err(|e| ConvertError::read(path, e))?;
        let mut file = Self::new(directory, file_name);
        file.size_before = metadata.len();

        if !file.format().is_raw() {
            match image::image_dimensions(path) {
                Ok(dims) => file.dimensions_before = Some(dims),
                Err(e) => log::debug!("Could not read dimensions of {}: {}", path.display(), e),
            }
        }

        Ok(file)
    }

    pub fn full_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    pub fn format(&self) -> ImageFormat {
        crate::processors::classify_path(Path::new(&self.file_name))
    }

    /// Percentage saved by the last single-format conversion.
    pub fn compression_ratio(&self) -> Option<f64> {
        match self.size_after {
            Some(after) if after > 0 => crate::utils::percent_saved(self.size_before, after),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.size_after = None;
        self.dimensions_after = None;
        self.status = FileStatus::Pending;
    }
}

/// A file written by one conversion unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedImage {
    pub output_path: PathBuf,
    pub format: ImageFormat,
    pub output_size: u64,
    pub width: u32,
    pub height: u32,
}

impl ConvertedImage {
    pub fn dimensions(&self) -> String {
        format!("{} x {}", self.width, self.height)
    }
}

/// Outcome of one conversion unit run. Every per-file error ends up here.
#[derive(Debug)]
pub enum ConversionResult {
    Success(ConvertedImage),
    Failure(ConvertError),
}

impl ConversionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionResult::Success(_))
    }

    pub fn output(&self) -> Option<&ConvertedImage> {
        match self {
            ConversionResult::Success(out) => Some(out),
            ConversionResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ConvertError> {
        match self {
            ConversionResult::Success(_) => None,
            ConversionResult::Failure(e) => Some(e),
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error().map(ToString::to_string)
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error().and_then(std::error::Error::source)
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.error().map(ConvertError::reason)
    }
}

impl From<Result<ConvertedImage>> for ConversionResult {
    fn from(result: Result<ConvertedImage>) -> Self {
        match result {
            Ok(out) => ConversionResult::Success(out),
            Err(e) => ConversionResult::Failure(e),
        }
    }
}
