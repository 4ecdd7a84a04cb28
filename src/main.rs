// pixbatch/src/main.rs
use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use pixbatch::cli::{Algorithm, Cli, Commands, PresetArg};
use pixbatch::processors::MetadataProcessor;
use pixbatch::{
    classify_path, collect_inputs, format_file_size, BatchProcessor, CancellationToken,
    ConversionSettings, Converter, FileStatus, ImageFile, ImageFormat, MultiFormatSettings,
    UserSettings,
};
use std::path::PathBuf;

struct ConvertArgs {
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    quality: Option<i32>,
    max_size: Option<i32>,
    no_resize: bool,
    format: Option<ImageFormat>,
    formats: Option<String>,
    no_overwrite: bool,
    preserve_timestamp: bool,
    preset: Option<PresetArg>,
    algorithm: Algorithm,
    recursive: bool,
    save_settings: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    match cli.command {
        Commands::Convert {
            inputs,
            output,
            quality,
            max_size,
            no_resize,
            format,
            formats,
            no_overwrite,
            preserve_timestamp,
            preset,
            algorithm,
            recursive,
            save_settings,
        } => process_convert(ConvertArgs {
            inputs,
            output,
            quality,
            max_size,
            no_resize,
            format,
            formats,
            no_overwrite,
            preserve_timestamp,
            preset,
            algorithm,
            recursive,
            save_settings,
        }),
        Commands::Info { input } => process_info(input),
        Commands::Settings { reset } => process_settings(reset),
    }
}

/// Saved defaults, then the preset, then explicit flags.
fn build_settings(user: &UserSettings, args: &ConvertArgs) -> Result<ConversionSettings> {
    let mut settings = user.to_conversion_settings();

    if let Some(preset) = args.preset {
        settings.apply_preset(preset.into());
    }
    if let Some(quality) = args.quality {
        settings.quality = quality;
    }
    if let Some(max_size) = args.max_size {
        settings.max_pixel_size = Some(max_size);
        settings.enable_resizing = true;
    }
    if args.no_resize {
        settings.enable_resizing = false;
    }
    if let Some(format) = args.format {
        settings.target_format = format;
    }
    if let Some(list) = &args.formats {
        settings.multi_format =
            Some(MultiFormatSettings::parse(list).context("Invalid --formats list")?);
    }
    if let Some(dir) = &args.output {
        settings.output_directory = Some(dir.clone());
    }
    if args.no_overwrite {
        settings.overwrite_existing = false;
    }
    if args.preserve_timestamp {
        settings.preserve_timestamp = true;
    }

    settings.validate().context("Invalid conversion settings")?;
    Ok(settings)
}

fn process_convert(args: ConvertArgs) -> Result<()> {
    let mut user = UserSettings::load();
    let settings = build_settings(&user, &args)?;
    let recursive = args.recursive || user.include_subfolders;

    if args.save_settings {
        user.update_from(&settings);
        user.include_subfolders = recursive;
        if let Err(e) = user.save() {
            log::warn!("Could not save settings: {}", e);
        }
    }

    let paths = collect_inputs(&args.inputs, recursive);
    if paths.is_empty() {
        bail!("No supported images found in the given inputs");
    }

    let files: Vec<ImageFile> = paths
        .iter()
        .filter_map(|path| match ImageFile::from_path(path) {
            Ok(file) => Some(file),
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                None
            }
        })
        .collect();

    let pb = create_progress_bar(files.len());
    let processor = BatchProcessor::new(settings)
        .with_converter(Converter::new().with_algorithm(args.algorithm.into()));
    let handle = processor.spawn(files, CancellationToken::new());

    for progress in handle.progress().iter() {
        pb.set_position(progress.processed as u64);
        pb.set_message(format!(
            "{} {}",
            progress.current_file,
            progress.eta_string().unwrap_or_default()
        ));
    }

    let (files, summary) = handle.join().context("Batch conversion failed")?;
    pb.finish_and_clear();

    for file in &files {
        match file.status {
            FileStatus::Failed(_) | FileStatus::Partial { .. } => {
                println!("{}: {}", file.file_name, file.status);
            }
            FileStatus::Succeeded => {
                if let Some(ratio) = file.compression_ratio() {
                    log::debug!("{}: saved {:.1}%", file.file_name, ratio);
                }
            }
            _ => {}
        }
    }

    println!("{}", summary);
    if let Some(dir) = &summary.output_directory {
        println!("Output folder: {}", dir.display());
    }

    Ok(())
}

fn create_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    match ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => log::debug!("Falling back to the default progress style: {}", e),
    }
    pb
}

fn process_info(input: PathBuf) -> Result<()> {
    if !input.is_file() {
        bail!("File does not exist: {}", input.display());
    }

    let file = ImageFile::from_path(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let format = classify_path(&input);
    let metadata = MetadataProcessor::new();

    println!("=== Image Information ===");
    println!("File: {}", input.display());
    println!("Format: {}", format);
    println!("Size: {}", format_file_size(file.size_before));
    match file.dimensions_before {
        Some((width, height)) => println!("Dimensions: {} x {} pixels", width, height),
        None if format.is_raw() => println!("Dimensions: determined when developed"),
        None => println!("Dimensions: unknown"),
    }

    match metadata.read_metadata(&input) {
        Ok(Some(exif)) => {
            println!("Orientation: {:?}", MetadataProcessor::orientation_of(&exif));
            if let Some((make, model)) = metadata.get_camera_info(&exif) {
                println!("Camera: {} {}", make, model);
            }
        }
        Ok(None) => println!("Has EXIF metadata: false"),
        Err(e) => log::debug!("No readable EXIF in {}: {}", input.display(), e),
    }

    Ok(())
}

fn process_settings(reset: bool) -> Result<()> {
    let path = UserSettings::default_path();

    let settings = if reset {
        let defaults = UserSettings::default();
        defaults.save().context("Failed to reset settings")?;
        println!("Settings reset to defaults");
        defaults
    } else {
        UserSettings::load()
    };

    match &path {
        Some(path) => println!("Settings file: {}", path.display()),
        None => println!("Settings file: unavailable"),
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&settings).context("Failed to format settings")?
    );

    Ok(())
}
