// pixbatch/src/lib.rs
pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod utils;

pub use crate::config::{AppLanguage, AppTheme, UserSettings};
pub use crate::core::{
    resolve, resolve_targets, CancellationToken, ConversionResult, ConversionSettings,
    ConversionStage, ConvertError, ConvertedImage, Converter, FailureReason, FileStatus,
    FormatQualityPair, ImageFile, ImageFormat, MultiFormatSettings, Preset, ResizeAlgorithm,
    Result,
};
pub use crate::processors::{
    classify, classify_path, BatchHandle, BatchProcessor, BatchProgress, BatchState,
    BatchSummary, CompressionSummary,
};
pub use crate::utils::{
    collect_inputs, format_eta, format_file_size, resolve_output_path, scan_directory,
};

pub mod prelude {
    pub use crate::{
        BatchProcessor, CancellationToken, ConversionSettings, Converter, ImageFile, ImageFormat,
    };
}

// Re-export commonly used types
pub use image::DynamicImage;
