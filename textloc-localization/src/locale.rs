use tracing::{debug, info};
use unic_langid::LanguageIdentifier;

use crate::error::LocalizationError;

/// Parse a BCP 47 tag such as `en-US` or a POSIX-style `en_US.UTF-8`
pub fn parse_locale(tag: &str) -> Result<LanguageIdentifier, LocalizationError> {
    let normalized = normalize_tag(tag);
    if normalized.is_empty() {
        return Err(LocalizationError::InvalidLocale(tag.to_string()));
    }
    normalized
        .parse::<LanguageIdentifier>()
        .map_err(|_| LocalizationError::InvalidLocale(tag.to_string()))
}

/// Strip encoding/modifier suffixes and convert `_` separators to `-`
fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim();
    let tag = tag.split('.').next().unwrap_or(tag);
    let tag = tag.split('@').next().unwrap_or(tag);
    tag.replace('_', "-")
}

/// Pick the supported locale matching `candidate`.
///
/// Exact matches win; otherwise the first supported locale with the same
/// language subtag is used (`de-AT` resolves to `de-DE`).
pub fn match_supported(
    candidate: &LanguageIdentifier,
    supported: &[LanguageIdentifier],
) -> Option<LanguageIdentifier> {
    if let Some(exact) = supported.iter().find(|locale| *locale == candidate) {
        return Some(exact.clone());
    }
    supported
        .iter()
        .find(|locale| locale.language == candidate.language)
        .cloned()
}

/// Environment variables consulted for the system locale, in order
pub const LOCALE_ENV_VARS: [&str; 3] = ["LANG", "LC_ALL", "LANGUAGE"];

/// Detect a supported locale from `LANG`, `LC_ALL` and `LANGUAGE`
pub fn detect_system_locale(supported: &[LanguageIdentifier]) -> Option<LanguageIdentifier> {
    detect_locale_with(|name| std::env::var(name).ok(), supported)
}

/// Locale detection over an arbitrary variable lookup
pub fn detect_locale_with<F>(lookup: F, supported: &[LanguageIdentifier]) -> Option<LanguageIdentifier>
where
    F: Fn(&str) -> Option<String>,
{
    for var in LOCALE_ENV_VARS {
        let Some(value) = lookup(var) else {
            continue;
        };
        // LANGUAGE can hold a colon separated priority list
        for tag in value.split(':').filter(|tag| !tag.is_empty()) {
            let Ok(candidate) = parse_locale(tag) else {
                debug!("Ignoring unparsable locale '{}' from {}", tag, var);
                continue;
            };
            if let Some(locale) = match_supported(&candidate, supported) {
                info!("Detected locale from {} environment variable: {}", var, locale);
                return Some(locale);
            }
        }
    }
    None
}
