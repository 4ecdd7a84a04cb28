// pixbatch/src/cli.rs
use crate::core::{ImageFormat, Preset, ResizeAlgorithm};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pixbatch")]
#[command(version, about = "Batch image converter with RAW support", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert images, optionally resizing them
    Convert {
        /// Image files and/or folders
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory (default: "converted" next to each source)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Quality 0-100 for lossy formats
        #[arg(short, long)]
        quality: Option<i32>,

        /// Maximum long edge in pixels
        #[arg(short, long = "max-size")]
        max_size: Option<i32>,

        /// Keep the original dimensions
        #[arg(long)]
        no_resize: bool,

        /// Target format: jpeg, png, webp or avif
        #[arg(short, long)]
        format: Option<ImageFormat>,

        /// Export several formats at once, e.g. "webp:80,png,avif:50"
        #[arg(long, value_name = "LIST", conflicts_with = "format")]
        formats: Option<String>,

        /// Fail instead of replacing existing output files
        #[arg(long)]
        no_overwrite: bool,

        /// Copy the source modification time to the output
        #[arg(long)]
        preserve_timestamp: bool,

        /// Start from a built-in preset
        #[arg(long, value_enum)]
        preset: Option<PresetArg>,

        /// Resampling filter
        #[arg(short, long, value_enum, default_value = "lanczos3")]
        algorithm: Algorithm,

        /// Include subfolders when scanning folders
        #[arg(short, long)]
        recursive: bool,

        /// Remember these options as the new defaults
        #[arg(long)]
        save_settings: bool,
    },

    /// Show information about an image
    Info {
        /// Input image file
        input: PathBuf,
    },

    /// Show or reset the saved default settings
    Settings {
        /// Restore the built-in defaults
        #[arg(long)]
        reset: bool,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Algorithm {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl From<Algorithm> for ResizeAlgorithm {
    fn from(algo: Algorithm) -> Self {
        match algo {
            Algorithm::Nearest => ResizeAlgorithm::Nearest,
            Algorithm::Bilinear => ResizeAlgorithm::Bilinear,
            Algorithm::Bicubic => ResizeAlgorithm::Bicubic,
            Algorithm::Lanczos3 => ResizeAlgorithm::Lanczos3,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PresetArg {
    /// WebP, quality 80, 1920 px
    Web,
    /// PNG, original size
    Quality,
    /// WebP, quality 60, 1280 px
    Size,
}

impl From<PresetArg> for Preset {
    fn from(preset: PresetArg) -> Self {
        match preset {
            PresetArg::Web => Preset::Web,
            PresetArg::Quality => Preset::Quality,
            PresetArg::Size => Preset::Size,
        }
    }
}
