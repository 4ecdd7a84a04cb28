// pixbatch/src/config.rs
use crate::core::{ConversionSettings, ConvertError, ImageFormat, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "pixbatch";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AppTheme {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AppLanguage {
    #[default]
    English,
    German,
}

/// Preferences remembered between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSettings {
    pub quality: i32,
    pub max_pixel_size: i32,
    pub enable_resizing: bool,
    pub overwrite_existing: bool,
    pub preserve_timestamp: bool,
    pub include_subfolders: bool,
    pub output_directory: String,
    pub selected_target_format: ImageFormat,
    pub theme: AppTheme,
    pub language: AppLanguage,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            quality: 85,
            max_pixel_size: 2048,
            enable_resizing: true,
            overwrite_existing: true,
            preserve_timestamp: false,
            include_subfolders: false,
            output_directory: String::new(),
            selected_target_format: ImageFormat::WebP,
            theme: AppTheme::System,
            language: AppLanguage::English,
        }
    }
}

impl UserSettings {
    /// `<config dir>/pixbatch/settings.json`, falling back to the home directory.
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir().or_else(dirs::home_dir)?;
        path.push(APP_DIR);
        path.push(SETTINGS_FILE);
        Some(path)
    }

    /// Loads the saved settings; any problem yields the defaults.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.is_file() {
            return Self::default();
        }

        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|json| serde_json::from_str(&json).map_err(|e| e.to_string()));

        match parsed {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring unreadable settings at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::default_path().ok_or_else(|| {
            ConvertError::Config("could not determine the configuration directory".to_string())
        })?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConvertError::Config(format!("failed to serialize settings: {}", e)))?;
        fs::write(path, json)?;

        log::debug!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn to_conversion_settings(&self) -> ConversionSettings {
        let output_directory = match self.output_directory.trim() {
            "" => None,
            dir => Some(PathBuf::from(dir)),
        };

        ConversionSettings {
            quality: self.quality,
            max_pixel_size: Some(self.max_pixel_size),
            enable_resizing: self.enable_resizing,
            target_format: self.selected_target_format,
            output_directory,
            overwrite_existing: self.overwrite_existing,
            preserve_timestamp: self.preserve_timestamp,
            multi_format: None,
        }
    }

    /// Copies the conversion fields back; theme, language and the subfolder
    /// flag are kept.
    pub fn update_from(&mut self, settings: &ConversionSettings) {
        self.quality = settings.quality;
        if let Some(size) = settings.max_pixel_size {
            self.max_pixel_size = size;
        }
        self.enable_resizing = settings.enable_resizing;
        self.selected_target_format = settings.target_format;
        self.output_directory = settings
            .output_directory
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();
        self.overwrite_existing = settings.overwrite_existing;
        self.preserve_timestamp = settings.preserve_timestamp;
    }

    pub fn from_conversion_settings(settings: &ConversionSettings) -> Self {
        let mut user = Self::default();
        user.update_from(settings);
        user
    }
}
