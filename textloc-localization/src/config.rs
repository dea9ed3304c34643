use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use unic_langid::LanguageIdentifier;

use crate::error::LocalizationError;
use crate::locale::{detect_system_locale, match_supported, parse_locale};

/// Localization configuration, usually read from a RON file:
///
/// ```ron
/// (
///     tables_dir: "assets",
///     default_locale: "en-US",
///     fallback_locale: "en-US",
///     locales: ["en-US", "de-DE"],
///     string_tables: ["ui"],
///     font_tables: ["fonts"],
///     material_tables: [],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationConfig {
    /// Root directory holding one sub-directory per locale
    pub tables_dir: PathBuf,
    pub default_locale: String,
    /// Locale consulted when an entry is missing from the selected locale
    pub fallback_locale: String,
    /// Supported locales
    pub locales: Vec<String>,
    pub string_tables: Vec<String>,
    pub font_tables: Vec<String>,
    pub material_tables: Vec<String>,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            tables_dir: PathBuf::from("assets"),
            default_locale: "en-US".to_string(),
            fallback_locale: "en-US".to_string(),
            locales: vec!["en-US".to_string()],
            string_tables: Vec::new(),
            font_tables: Vec::new(),
            material_tables: Vec::new(),
        }
    }
}

impl LocalizationConfig {
    /// Load configuration from a RON file.
    ///
    /// A relative `tables_dir` is resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, LocalizationError> {
        let content = std::fs::read_to_string(path).map_err(|source| LocalizationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_ron_str(&content)?;
        if config.tables_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.tables_dir = parent.join(&config.tables_dir);
            }
        }
        info!("Loaded localization config from {:?}", path);
        Ok(config)
    }

    pub fn from_ron_str(content: &str) -> Result<Self, LocalizationError> {
        let config: Self = ron::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every configured locale tag parses and the default and
    /// fallback locales are supported
    pub fn validate(&self) -> Result<(), LocalizationError> {
        let supported = self.supported_locales()?;
        for tag in [&self.default_locale, &self.fallback_locale] {
            let locale = parse_locale(tag)?;
            if !supported.contains(&locale) {
                return Err(LocalizationError::UnsupportedLocale(tag.clone()));
            }
        }
        Ok(())
    }

    pub fn supported_locales(&self) -> Result<Vec<LanguageIdentifier>, LocalizationError> {
        self.locales.iter().map(|tag| parse_locale(tag)).collect()
    }

    pub fn default_locale(&self) -> Result<LanguageIdentifier, LocalizationError> {
        parse_locale(&self.default_locale)
    }

    pub fn fallback_locale(&self) -> Result<LanguageIdentifier, LocalizationError> {
        parse_locale(&self.fallback_locale)
    }

    /// Decide the startup locale.
    ///
    /// A command line override takes precedence; an invalid or unsupported one
    /// is reported and environment detection is used instead, then the default.
    pub fn resolve_locale(
        &self,
        cli_override: Option<&str>,
    ) -> Result<LanguageIdentifier, LocalizationError> {
        let supported = self.supported_locales()?;

        if let Some(tag) = cli_override {
            match parse_locale(tag) {
                Ok(candidate) => {
                    if let Some(locale) = match_supported(&candidate, &supported) {
                        return Ok(locale);
                    }
                    warn!(
                        "Unsupported locale from command line: '{}', falling back to environment detection",
                        tag
                    );
                }
                Err(e) => warn!("{}, falling back to environment detection", e),
            }
        }

        if let Some(locale) = detect_system_locale(&supported) {
            return Ok(locale);
        }

        info!(
            "No supported locale detected from environment, using {} as default",
            self.default_locale
        );
        self.default_locale()
    }
}
