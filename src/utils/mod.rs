// pixbatch/src/utils/mod.rs
use crate::core::{ConversionSettings, ConvertError, ImageFile, Result};
use crate::processors::is_supported_input;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

/// Destination for one encode: `{stem}-{long edge}.{ext}` in the configured
/// output directory, or in `converted/` next to the source.
pub fn resolve_output_path(
    file: &ImageFile,
    settings: &ConversionSettings,
    final_width: u32,
    final_height: u32,
) -> Result<PathBuf> {
    let extension = settings.target_format.extension().ok_or_else(|| {
        ConvertError::InvalidSettings(format!(
            "{} is not an output format",
            settings.target_format
        ))
    })?;

    let stem = Path::new(&file.file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");

    let directory = settings.output_directory_for(&file.directory);
    let file_name = format!("{}-{}.{}", stem, final_width.max(final_height), extension);

    Ok(directory.join(file_name))
}

/// Creates the destination directory and applies the overwrite policy.
/// An existing file is only replaced when `overwrite` is set; the
/// replacement itself happens at write time.
pub fn prepare_output_path(path: &Path, overwrite: bool) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConvertError::write(path, e))?;
    }

    if path.exists() && !overwrite {
        return Err(ConvertError::Write {
            path: path.to_path_buf(),
            message: "output file already exists".to_string(),
            source: None,
        });
    }

    Ok(())
}

/// Supported images in `dir`, sorted by path.
pub fn scan_directory(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let mut paths: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_supported_input(path))
        .collect();

    paths.sort();
    paths
}

/// Expands a mixed list of files and directories into supported image
/// paths. Duplicates are dropped and first-seen order is kept.
pub fn collect_inputs(inputs: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut collected: Vec<PathBuf> = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for input in inputs {
        let found = if input.is_dir() {
            scan_directory(input, recursive)
        } else if input.is_file() && is_supported_input(input) {
            vec![input.clone()]
        } else {
            log::warn!("Ignoring {}: not a supported image", input.display());
            Vec::new()
        };

        for path in found {
            if seen.insert(path.clone()) {
                collected.push(path);
            }
        }
    }

    collected
}

/// Share of `before` saved by shrinking to `after`, in percent. Negative when
/// the output grew; `None` without a source size.
pub fn percent_saved(before: u64, after: u64) -> Option<f64> {
    if before == 0 {
        return None;
    }
    Some((1.0 - after as f64 / before as f64) * 100.0)
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    let number = format!("{:.2}", size);
    let number = number.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", number, UNITS[unit])
}

/// Human readable remaining time, e.g. `≈ 2m 3s remaining`.
pub fn format_eta(remaining: Duration) -> String {
    let total = remaining.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("≈ {}h {}m remaining", hours, minutes)
    } else if minutes > 0 {
        format!("≈ {}m {}s remaining", minutes, seconds)
    } else {
        format!("≈ {}s remaining", seconds)
    }
}
