// pixbatch/src/processors/classifier.rs
use crate::core::ImageFormat;
use std::path::Path;

/// Extensions accepted when scanning folders or taking dropped files.
pub const SUPPORTED_INPUT_EXTENSIONS: [&str; 17] = [
    "jpg", "jpeg", "png", "bmp", "gif", // standard
    "nef", "cr2", "cr3", "arw", "dng", "raw", "raf", "orf", "rw2", "pef", "srw", "erf", // RAW
];

/// Maps a file extension (with or without the leading dot) to a format.
pub fn classify(extension: &str) -> ImageFormat {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => ImageFormat::Jpeg,
        "png" => ImageFormat::Png,
        "bmp" => ImageFormat::Bmp,
        "gif" => ImageFormat::Gif,
        "webp" => ImageFormat::WebP,
        "avif" => ImageFormat::Avif,
        "nef" => ImageFormat::NikonRaw,
        "cr2" | "cr3" => ImageFormat::CanonRaw,
        "arw" => ImageFormat::SonyRaw,
        "dng" => ImageFormat::AdobeDng,
        "raw" | "raf" | "orf" | "rw2" | "pef" | "srw" | "erf" => ImageFormat::OtherRaw,
        _ => ImageFormat::Unknown,
    }
}

pub fn classify_path(path: &Path) -> ImageFormat {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(classify)
        .unwrap_or(ImageFormat::Unknown)
}

pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_INPUT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_extensions() {
        assert_eq!(classify("jpg"), ImageFormat::Jpeg);
        assert_eq!(classify(".JPEG"), ImageFormat::Jpeg);
        assert_eq!(classify("Png"), ImageFormat::Png);
        assert_eq!(classify("webp"), ImageFormat::WebP);
        assert_eq!(classify("avif"), ImageFormat::Avif);
        assert_eq!(classify("bmp"), ImageFormat::Bmp);
        assert_eq!(classify("gif"), ImageFormat::Gif);
    }

    #[test]
    fn raw_extensions() {
        assert_eq!(classify("NEF"), ImageFormat::NikonRaw);
        assert_eq!(classify("cr2"), ImageFormat::CanonRaw);
        assert_eq!(classify("cr3"), ImageFormat::CanonRaw);
        assert_eq!(classify("arw"), ImageFormat::SonyRaw);
        assert_eq!(classify(".dng"), ImageFormat::AdobeDng);
        for ext in ["raw", "raf", "orf", "rw2", "pef", "srw", "erf"] {
            assert_eq!(classify(ext), ImageFormat::OtherRaw, "{}", ext);
            assert!(classify(ext).is_raw());
        }
    }

    #[test]
    fn unknown_extensions() {
        assert_eq!(classify(""), ImageFormat::Unknown);
        assert_eq!(classify("tiff"), ImageFormat::Unknown);
        assert_eq!(classify_path(Path::new("README")), ImageFormat::Unknown);
    }

    #[test]
    fn scan_filter_excludes_webp_and_avif() {
        assert!(is_supported_input(Path::new("/a/IMG_1.JPG")));
        assert!(is_supported_input(Path::new("/a/DSC_1.nef")));
        assert!(!is_supported_input(Path::new("/a/b.webp")));
        assert!(!is_supported_input(Path::new("/a/b.avif")));
        assert!(!is_supported_input(Path::new("/a/notes.txt")));
    }
}
